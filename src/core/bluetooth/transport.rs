//! GATT transport used by the TimeFlip client
//! The client only needs to read, write and subscribe to characteristics by
//! UUID. `BluestTransport` does that on top of the `bluest` handles found at
//! connect time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, TimeFlipError};

/// Receiving end of a characteristic subscription
pub type NotificationReceiver = mpsc::Receiver<Result<Vec<u8>>>;

const NOTIFICATION_BUFFER: usize = 16;

/// Characteristic level access to a connected device
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Platform identifier of the peer
    fn id(&self) -> String;

    /// Read the current value of a characteristic
    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>>;

    /// Write a value to a characteristic, waiting for the response
    async fn write(&self, uuid: Uuid, data: &[u8]) -> Result<()>;

    /// Subscribe to notifications of a characteristic until `cancel` fires
    async fn subscribe(
        &self,
        uuid: Uuid,
        cancel: CancellationToken,
    ) -> Result<NotificationReceiver>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;
}

/// `GattTransport` backed by a connected `bluest` device
#[derive(Clone)]
pub struct BluestTransport {
    adapter: Adapter,
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
    operation_timeout: Duration,
}

impl BluestTransport {
    pub fn new(
        adapter: Adapter,
        device: Device,
        characteristics: HashMap<Uuid, Characteristic>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            device,
            characteristics,
            operation_timeout,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or(TimeFlipError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl GattTransport for BluestTransport {
    fn id(&self) -> String {
        self.device.id().to_string()
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(uuid)?;
        let value = tokio::time::timeout(self.operation_timeout, characteristic.read())
            .await
            .map_err(|_| TimeFlipError::Timeout("reading a characteristic"))??;
        debug!("Read {}: {:02x?}", uuid, value);
        Ok(value)
    }

    async fn write(&self, uuid: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        debug!("Writing {}: {:02x?}", uuid, data);
        // bluest writes with response by default
        tokio::time::timeout(self.operation_timeout, characteristic.write(data))
            .await
            .map_err(|_| TimeFlipError::Timeout("writing a characteristic"))??;
        Ok(())
    }

    async fn subscribe(
        &self,
        uuid: Uuid,
        cancel: CancellationToken,
    ) -> Result<NotificationReceiver> {
        let characteristic = self.characteristic(uuid)?.clone();
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();

        // The notification stream borrows the characteristic, so both live in the task
        tokio::spawn(async move {
            let mut stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            info!("Subscribed to notifications on {}", uuid);

            loop {
                tokio::select! {
                    item = stream.next() => match item {
                        Some(value) => {
                            if tx.send(value.map_err(TimeFlipError::from)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Notification stream on {} has ended.", uuid);
                            break;
                        }
                    },
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("Unsubscribed from {}", uuid);
        });

        match tokio::time::timeout(self.operation_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(rx),
            Ok(Ok(Err(e))) => {
                error!("Failed to subscribe to notifications: {}", e);
                Err(e.into())
            }
            Ok(Err(_)) => Err(TimeFlipError::malformed(
                "subscription",
                "notification task ended early",
            )),
            Err(_) => Err(TimeFlipError::Timeout("subscribing to notifications")),
        }
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn disconnect(&self) -> Result<()> {
        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter.disconnect_device(&self.device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }
}
