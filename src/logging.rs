use std::sync::Once;

use log::LevelFilter;

static INIT: Once = Once::new();

/// Initializes `env_logger` once. `RUST_LOG` overrides `level`.
pub fn init(level: LevelFilter) {
    INIT.call_once(|| {
        let result = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .format_timestamp_millis()
            .try_init();

        match result {
            Ok(()) => log::info!("Logging initialized"),
            // Some other logger was installed first, keep it
            Err(e) => eprintln!("Failed to initialize logger: {}", e),
        }
    });
}
