//! Bluetooth manager for the TimeFlip client
//! This module provides the main interface for bluetooth operations

use std::future::Future;

use bluest::Adapter;
use log::{info, warn};

use crate::config::ClientConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::transport::BluestTransport;
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::core::client::TimeFlipClient;
use crate::error::{Result, TimeFlipError};

/// Finds TimeFlip devices and hands out connected clients
pub struct TimeFlipManager {
    config: ClientConfig,
    /// Connection manager
    connection_manager: ConnectionManager,
    /// Bluetooth scanner
    scanner: BluetoothScanner,
}

impl TimeFlipManager {
    /// Creates a new TimeFlipManager on the default adapter
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let adapter = Adapter::default().await.ok_or(TimeFlipError::NoAdapter)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let connection_manager = ConnectionManager::new(
            adapter.clone(),
            config.max_connect_retries,
            config.connect_retry_delay(),
            config.operation_timeout(),
        );
        let scanner = BluetoothScanner::new(
            adapter,
            config.name_prefix.clone(),
            config.min_rssi,
            config.scan_duration(),
        );

        Ok(Self {
            config,
            connection_manager,
            scanner,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Scans for nearby TimeFlip devices
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>> {
        self.scanner.scan().await
    }

    /// Connects to the TimeFlip named by `query` (id, name or address).
    ///
    /// A device seen by the last scan is reused, otherwise a new scan looks for it.
    pub async fn connect(&mut self, query: &str) -> Result<TimeFlipClient<BluestTransport>> {
        let device = match self.scanner.device(query) {
            Some(device) => device,
            None => self.scanner.find_device(query).await?,
        };

        let transport = self.connection_manager.connect_with_retry(&device).await;
        let transport = match transport {
            Ok(transport) => transport,
            Err(e) => {
                let release = self.connection_manager.disconnect(&device);
                return fail_after_release(e, release, &device.id().to_string()).await;
            }
        };

        match TimeFlipClient::connect(transport).await {
            Ok(client) => Ok(client),
            Err(e) => {
                let release = self.connection_manager.disconnect(&device);
                fail_after_release(e, release, &device.id().to_string()).await
            }
        }
    }

    /// Connects to the first TimeFlip found
    pub async fn connect_first(&mut self) -> Result<TimeFlipClient<BluestTransport>> {
        let prefix = self.config.name_prefix.clone();
        let devices = self.scan().await?;
        let first = devices
            .first()
            .ok_or_else(|| TimeFlipError::DeviceNotFound(prefix))?;
        let id = first.id.clone();
        self.connect(&id).await
    }

    /// Connects and logs in with the configured password
    pub async fn connect_and_login(
        &mut self,
        query: &str,
    ) -> Result<TimeFlipClient<BluestTransport>> {
        let mut client = self.connect(query).await?;
        if !client.login(&self.config.password).await? {
            warn!("Device {} did not accept the configured password", query);
        }
        Ok(client)
    }
}

/// Releases the link after a failed connect and returns the connect error.
/// A release failure is only logged.
async fn fail_after_release<T>(
    error: TimeFlipError,
    release: impl Future<Output = Result<()>>,
    device_id: &str,
) -> Result<T> {
    if let Err(release_error) = release.await {
        warn!("Failed to release {}: {}", device_id, release_error);
    }
    Err(error)
}
