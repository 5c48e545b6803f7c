//! Bluetooth connection handling for the TimeFlip
//! This module handles connecting to and disconnecting from the device

use std::collections::HashMap;
use std::time::Duration;

use bluest::{Adapter, Characteristic, Device};
use log::{info, warn};
use uuid::Uuid;

use crate::core::bluetooth::constants::{KNOWN_CHARACTERISTICS, UUID_FACET};
use crate::core::bluetooth::transport::BluestTransport;
use crate::error::{Result, TimeFlipError};

/// Connection manager for the device
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    max_retries: u32,
    retry_delay: Duration,
    operation_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        adapter: Adapter,
        max_retries: u32,
        retry_delay: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            max_retries: max_retries.max(1),
            retry_delay,
            operation_timeout,
        }
    }

    /// Connect to the device with retry mechanism
    pub async fn connect_with_retry(&self, device: &Device) -> Result<BluestTransport> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match self.try_connect(device).await {
                Ok(transport) => {
                    info!("Successfully connected to device");
                    return Ok(transport);
                }
                // Retrying will not turn another device into a TimeFlip
                Err(TimeFlipError::NotTimeFlipDevice) => {
                    return Err(TimeFlipError::NotTimeFlipDevice);
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);

                    if attempt + 1 < self.max_retries {
                        info!("Retrying connection in {:?}...", self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(TimeFlipError::NotConnected))
    }

    /// Try to connect to the device
    async fn try_connect(&self, device: &Device) -> Result<BluestTransport> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        info!("Device details - ID: {}, Name: {:?}", id, name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", id);
            tokio::time::timeout(self.operation_timeout, self.adapter.connect_device(device))
                .await
                .map_err(|_| TimeFlipError::Timeout("connecting"))??;
        }

        info!("Connection successful, discovering services...");
        let characteristics = self.discover_characteristics(device).await?;
        if !characteristics.contains_key(&UUID_FACET) {
            warn!("Facet characteristic missing on {}", id);
            return Err(TimeFlipError::NotTimeFlipDevice);
        }

        info!("Connection and discovery completed successfully");
        Ok(BluestTransport::new(
            self.adapter.clone(),
            device.clone(),
            characteristics,
            self.operation_timeout,
        ))
    }

    async fn discover_characteristics(
        &self,
        device: &Device,
    ) -> Result<HashMap<Uuid, Characteristic>> {
        let mut found = HashMap::new();
        for service in device.discover_services().await? {
            info!("Available service: {}", service.uuid());
            for characteristic in service.discover_characteristics().await? {
                let uuid = characteristic.uuid();
                if KNOWN_CHARACTERISTICS.contains(&uuid) {
                    info!("Found characteristic: {}", uuid);
                    found.insert(uuid, characteristic);
                }
            }
        }
        Ok(found)
    }

    /// Disconnect from the device
    pub async fn disconnect(&self, device: &Device) -> Result<()> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }
}
