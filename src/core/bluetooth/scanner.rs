use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::LazyLock;
use std::time::Duration;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::types::DiscoveredDevice;
use crate::error::{Result, TimeFlipError};

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("valid MAC address pattern")
});

pub struct BluetoothScanner {
    adapter: Adapter,
    devices: Arc<Mutex<HashMap<String, Device>>>,
    cancel_token: CancellationToken,
    name_prefix: String,
    min_rssi_threshold: i16,
    scan_timeout: Duration,
}

impl BluetoothScanner {
    pub fn new(
        adapter: Adapter,
        name_prefix: impl Into<String>,
        min_rssi_threshold: i16,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            cancel_token: CancellationToken::new(),
            name_prefix: name_prefix.into(),
            min_rssi_threshold,
            scan_timeout,
        }
    }

    /// Token that stops the running or next scan when cancelled.
    ///
    /// A cancelled handle is spent: later scans need a fresh one.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Returns a device seen by a previous scan
    pub fn device(&self, id: &str) -> Option<Device> {
        self.devices.lock().ok()?.get(id).cloned()
    }

    /// Scans for TimeFlip devices until the scan timeout elapses
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>> {
        self.run_scan(None).await
    }

    /// Scans until a TimeFlip matching `query` (id, name or address) shows up
    pub async fn find_device(&mut self, query: &str) -> Result<Device> {
        let found = self.run_scan(Some(query)).await?;
        found
            .first()
            .and_then(|discovered| self.device(&discovered.id))
            .ok_or_else(|| TimeFlipError::DeviceNotFound(query.to_string()))
    }

    async fn run_scan(&mut self, query: Option<&str>) -> Result<Vec<DiscoveredDevice>> {
        if let Ok(mut devices) = self.devices.lock() {
            devices.clear();
        }
        if renew_if_cancelled(&mut self.cancel_token) {
            debug!("Previous scan was cancelled, starting with a fresh token");
        }
        let mut found = Vec::new();

        // find connected devices first
        info!("Checking for connected devices");
        for device in self.adapter.connected_devices().await? {
            if !self.is_timeflip(&device) {
                continue;
            }
            let discovered = self.record_device(device, None).await;
            if query.is_some_and(|query| discovered.matches(query)) {
                return Ok(vec![discovered]);
            }
            found.push(discovered);
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(self.scan_timeout);
        tokio::pin!(deadline);

        // Process discovered devices in real-time
        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let device = discovered_device.device;
                            let rssi = discovered_device.rssi;

                            debug!("Found device - Device: {:?}, RSSI: {:?}", device, rssi);
                            // Only include devices with medium or stronger signal strength
                            if rssi.is_some_and(|strength| strength < self.min_rssi_threshold) {
                                continue;
                            }
                            if !self.is_timeflip(&device) {
                                continue;
                            }
                            let id = device.id().to_string();
                            if found.iter().any(|known: &DiscoveredDevice| known.id == id) {
                                continue;
                            }
                            let discovered = self.record_device(device, rssi).await;
                            if query.is_some_and(|query| discovered.matches(query)) {
                                return Ok(vec![discovered]);
                            }
                            found.push(discovered);
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    info!("Scan timeout reached.");
                    break;
                }
                _ = self.cancel_token.cancelled() => {
                    info!("Scan cancelled.");
                    break;
                }
            }
        }

        match query {
            Some(query) => Err(TimeFlipError::DeviceNotFound(query.to_string())),
            None => {
                info!("Scan complete, {} TimeFlip device(s) found", found.len());
                Ok(found)
            }
        }
    }

    async fn record_device(&self, device: Device, rssi: Option<i16>) -> DiscoveredDevice {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        let rssi = match rssi {
            Some(rssi) => Some(rssi),
            None => device.rssi().await.ok(),
        };
        let address = extract_mac_address(&id).unwrap_or_else(|| "N/A".to_string());
        let is_connected = device.is_connected().await;

        info!(
            "Found TimeFlip device: Address: {}, ID: {}, Name: {:?}, RSSI: {:?}, Is Connected: {:?}",
            address, id, name, rssi, is_connected
        );

        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(id.clone(), device);
        }
        DiscoveredDevice::new(id, name, address, rssi, is_connected)
    }

    fn is_timeflip(&self, device: &Device) -> bool {
        device
            .name()
            .ok()
            .is_some_and(|name| is_timeflip_name(&name, &self.name_prefix))
    }
}

/// Replaces a spent token, keeping live ones so handles already given out still work
fn renew_if_cancelled(token: &mut CancellationToken) -> bool {
    if !token.is_cancelled() {
        return false;
    }
    *token = CancellationToken::new();
    true
}

/// Returns true if an advertised name belongs to a TimeFlip
pub fn is_timeflip_name(name: &str, prefix: &str) -> bool {
    name.to_ascii_lowercase()
        .starts_with(&prefix.to_ascii_lowercase())
}

/// Pulls the last MAC address out of a platform device id
pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
    MAC_ADDRESS
        .find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_extraction() {
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLE00:1a:7d:da:71:13-c0:11:22:33:44:55"),
            Some("C0:11:22:33:44:55".to_string())
        );
        assert_eq!(
            extract_mac_address("hci0/dev_AA-BB-CC-DD-EE-FF"),
            Some("AA-BB-CC-DD-EE-FF".to_string())
        );
        assert_eq!(extract_mac_address("5E8C1B2A-0000-4000-8000-00805F9B34FB"), None);
    }

    #[test]
    fn timeflip_names() {
        assert!(is_timeflip_name("TimeFlip", "TimeFlip"));
        assert!(is_timeflip_name("timeflip 2", "TimeFlip"));
        assert!(!is_timeflip_name("Gear VR Controller", "TimeFlip"));
    }

    #[test]
    fn live_token_is_kept_for_handles_taken_earlier() {
        let mut token = CancellationToken::new();
        let handle = token.clone();

        assert!(!renew_if_cancelled(&mut token));
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn spent_token_is_replaced() {
        let mut token = CancellationToken::new();
        token.cancel();

        assert!(renew_if_cancelled(&mut token));
        assert!(!token.is_cancelled());
    }
}
