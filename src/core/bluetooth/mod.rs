//! Bluetooth functionality for the TimeFlip client
//! This module handles scanning, connecting, and exchanging data with
//! the device over GATT.

pub(crate) mod commands;
pub(crate) mod connection;
pub mod constants;
pub(crate) mod manager;
pub(crate) mod notification;
pub(crate) mod scanner;
pub(crate) mod transport;
pub(crate) mod types;

// Re-export types that should be publicly accessible
pub use commands::CommandExecutor;
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use manager::TimeFlipManager;
pub use notification::NotificationHandler;
pub use scanner::{BluetoothScanner, extract_mac_address, is_timeflip_name};
pub use transport::{BluestTransport, GattTransport, NotificationReceiver};
pub use types::DiscoveredDevice;
