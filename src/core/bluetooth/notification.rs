//! Notification handling for the TimeFlip facet characteristic
//! This module turns raw facet notifications into `FacetEvent`s.

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{FACET_CHANNEL_CAPACITY, UUID_FACET};
use crate::core::bluetooth::transport::{GattTransport, NotificationReceiver};
use crate::core::protocol::{FacetEvent, decode_facet};
use crate::error::Result;

/// Notification handler for facet changes
#[derive(Default)]
pub struct NotificationHandler {
    cancel_token: Option<CancellationToken>,
    task_handle: Option<JoinHandle<()>>,
}

impl NotificationHandler {
    /// Create a new NotificationHandler
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Subscribe to facet notifications and forward them as events.
    ///
    /// The facet is read once after subscribing and queued before the
    /// forwarding task starts, so it is always the first event. Changes that
    /// arrive during that read stay buffered behind it.
    pub async fn setup_notifications<T: GattTransport + ?Sized>(
        &mut self,
        transport: &T,
    ) -> Result<mpsc::Receiver<FacetEvent>> {
        if self.cancel_token.is_some() {
            self.stop_notifications().await;
        }

        info!("Subscribing to facet notifications...");
        let cancel_token = CancellationToken::new();
        let notifications = transport
            .subscribe(UUID_FACET, cancel_token.clone())
            .await?;

        let current = match Self::read_current_facet(transport).await {
            Ok(facet) => facet,
            Err(e) => {
                warn!("Could not read the current facet, unsubscribing: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
        };
        debug!("Current facet is {}", current);

        let (tx, rx) = mpsc::channel(FACET_CHANNEL_CAPACITY);
        // Capacity is above zero and the receiver is in hand
        let _ = tx.try_send(FacetEvent::new(current));

        let cancel_for_task = cancel_token.clone();
        let handle = tokio::spawn(async move {
            Self::process_notifications(notifications, tx, cancel_for_task).await;
        });

        self.cancel_token = Some(cancel_token);
        self.task_handle = Some(handle);
        Ok(rx)
    }

    async fn read_current_facet<T: GattTransport + ?Sized>(transport: &T) -> Result<u8> {
        decode_facet(&transport.read(UUID_FACET).await?)
    }

    /// Stop the notification task and wait for it to finish
    pub async fn stop_notifications(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            info!("Stopping facet notifications.");
            token.cancel();
        }

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Notification task finished with an unexpected join error: {:?}", e);
                }
            }
        }
    }

    /// Process notifications from the facet characteristic
    async fn process_notifications(
        mut notifications: NotificationReceiver,
        tx: mpsc::Sender<FacetEvent>,
        cancel_token: CancellationToken,
    ) {
        info!("Listening for facet notifications...");

        loop {
            tokio::select! {
                result = notifications.recv() => match result {
                    Some(Ok(value)) => {
                        debug!("Received facet data: {:?}", value);
                        match decode_facet(&value) {
                            Ok(facet) => {
                                if tx.send(FacetEvent::new(facet)).await.is_err() {
                                    info!("Facet receiver dropped");
                                    break;
                                }
                            }
                            Err(e) => warn!("Ignoring facet notification: {}", e),
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            }
        }

        info!("Notification stream ended");
    }
}

impl Drop for NotificationHandler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
