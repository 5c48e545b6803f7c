use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::constants::{
    BLUETOOTH_OPERATION_TIMEOUT_SECS, CONNECT_RETRY_DELAY_MS, DEFAULT_PASSWORD,
    DEFAULT_SCAN_DURATION_SECS, MAX_CONNECT_RETRIES, MIN_RSSI_THRESHOLD, TIMEFLIP_NAME,
};
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "timeflip_config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Password written on login. Resets to "000000" when the battery is replaced.
    pub password: String,

    /// Advertised name prefix used to recognise TimeFlip devices while scanning.
    pub name_prefix: String,

    /// How long a scan runs before giving up, in seconds.
    pub scan_duration_secs: u64,

    /// Devices with a weaker signal are ignored.
    pub min_rssi: i16,

    pub max_connect_retries: u32,

    pub connect_retry_delay_ms: u64,

    /// Upper bound for a single read, write or connect, in seconds.
    pub operation_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            password: DEFAULT_PASSWORD.to_string(),
            name_prefix: TIMEFLIP_NAME.to_string(),
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            min_rssi: MIN_RSSI_THRESHOLD,
            max_connect_retries: MAX_CONNECT_RETRIES,
            connect_retry_delay_ms: CONNECT_RETRY_DELAY_MS,
            operation_timeout_secs: BLUETOOTH_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Loads the config from `config_dir`, falling back to defaults when the file is missing.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        if !fs::try_exists(&file_path).await? {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config into `config_dir`.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize client config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;

        info!("Client config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_config(dir.path()).await.unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.password, "000000");
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("config");
        let config = ClientConfig {
            password: "123456".to_string(),
            scan_duration_secs: 12,
            ..ClientConfig::default()
        };

        config.save_config(&nested).await.unwrap();
        let loaded = ClientConfig::load_config(&nested).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.scan_duration(), Duration::from_secs(12));
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{ "min_rssi": -70 }"#).unwrap();

        let config = ClientConfig::load_config(dir.path()).await.unwrap();
        assert_eq!(config.min_rssi, -70);
        assert_eq!(config.name_prefix, TIMEFLIP_NAME);
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "not json").unwrap();
        assert!(ClientConfig::load_config(dir.path()).await.is_err());
    }
}
