//! Error types for the TimeFlip client

use thiserror::Error;
use uuid::Uuid;

/// Result alias used by the device-facing parts of the crate
pub type Result<T> = std::result::Result<T, TimeFlipError>;

#[derive(Debug, Error)]
pub enum TimeFlipError {
    #[error("Connected device is not a TimeFlip")]
    NotTimeFlipDevice,

    #[error("Not connected to a TimeFlip device. Please connect first")]
    NotConnected,

    #[error("This command requires a login to the TimeFlip device. Please login")]
    CommandRequiresLogin,

    #[error("Unable to execute the command {command:02x?}")]
    CommandExecution { command: Vec<u8> },

    #[error("The result of the command {command:02x?} is malformed, please check if you are logged in")]
    CommandResult { command: Vec<u8> },

    #[error("No TimeFlip device found matching {0:?}")]
    DeviceNotFound(String),

    #[error("No Bluetooth adapter found")]
    NoAdapter,

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),
}

impl TimeFlipError {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }
}
