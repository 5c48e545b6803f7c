//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;

/// Represents a discovered TimeFlip device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Platform-specific unique identifier for the device (especially important on macOS)
    pub id: String,
    /// The advertised name of the device
    pub name: String,
    /// The address of the device (MAC address on most platforms, "N/A" when the id has none)
    pub address: String,
    /// The signal strength (RSSI) of the device, if known
    pub rssi: Option<i16>,
    /// Whether the device was already connected when found
    pub is_connected: bool,
}

impl DiscoveredDevice {
    /// Creates a new DiscoveredDevice instance
    pub fn new(
        id: String,
        name: String,
        address: String,
        rssi: Option<i16>,
        is_connected: bool,
    ) -> Self {
        Self {
            id,
            name,
            address,
            rssi,
            is_connected,
        }
    }

    /// True if `query` names this device by id, name or address
    pub fn matches(&self, query: &str) -> bool {
        self.id == query || self.name == query || self.address.eq_ignore_ascii_case(query)
    }
}
