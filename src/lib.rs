//! TimeFlip client library
//! A client for the TimeFlip BLE time-tracking device: discover it, log in,
//! read its status, battery and calibration, and follow facet changes.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
mod utils;

pub use config::ClientConfig;
pub use crate::core::bluetooth::{BluestTransport, DiscoveredDevice, GattTransport};
pub use crate::core::{
    DeviceStatus, FacetEvent, History, HistoryEntry, TimeFlipClient, TimeFlipCommand,
    TimeFlipManager,
};
pub use error::{Result, TimeFlipError};
