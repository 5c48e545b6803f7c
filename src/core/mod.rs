//! Core functionality for the TimeFlip client
//! This module contains the device protocol and the Bluetooth plumbing around it

pub mod bluetooth;
pub mod client;
pub mod protocol;

// Re-export commonly used types
pub use bluetooth::TimeFlipManager;
pub use client::TimeFlipClient;
pub use protocol::{DeviceStatus, FacetEvent, History, HistoryEntry, TimeFlipCommand};
