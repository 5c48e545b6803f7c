use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use tokio::fs;

/// Creates `path` and any missing parents. Succeeds if it already exists.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if fs::try_exists(path).await? {
        return Ok(());
    }
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("creating config directory {}", path.display()))?;
    debug!("Created config directory {}", path.display());
    Ok(())
}
