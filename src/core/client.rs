//! TimeFlip client
//! Connection and login state on top of a `GattTransport`, plus every device
//! operation. Commands that touch the timer state require a login first.

use log::{info, warn};
use tokio::sync::mpsc;

use crate::core::bluetooth::commands::CommandExecutor;
use crate::core::bluetooth::constants::{
    DEFAULT_PASSWORD, UUID_BATTERY_LEVEL, UUID_CALIBRATION_VERSION, UUID_DEVICE_NAME, UUID_FACET,
    UUID_FIRMWARE_REVISION, UUID_PASSWORD_INPUT,
};
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::transport::GattTransport;
use crate::core::protocol::{self, DeviceStatus, FacetEvent, History, TimeFlipCommand};
use crate::error::{Result, TimeFlipError};

/// Client for a single TimeFlip device
pub struct TimeFlipClient<T: GattTransport> {
    transport: T,
    connected: bool,
    logged_in: bool,
    notification_handler: NotificationHandler,
    auto_pause_time: Option<u16>,
}

impl<T: GattTransport> TimeFlipClient<T> {
    /// Wraps a connected transport and checks that the peer is a TimeFlip.
    ///
    /// Any GATT device can be connected to, so the facet characteristic is read
    /// once: only a TimeFlip answers it.
    pub async fn connect(transport: T) -> Result<Self> {
        if !transport.is_connected().await {
            return Err(TimeFlipError::NotConnected);
        }

        let client = Self {
            transport,
            connected: true,
            logged_in: false,
            notification_handler: NotificationHandler::new(),
            auto_pause_time: None,
        };

        if let Err(e) = client.read_facet_characteristic().await {
            warn!("Facet read failed on {}: {}", client.transport.id(), e);
            return Err(TimeFlipError::NotTimeFlipDevice);
        }

        info!("Connected to TimeFlip {}", client.transport.id());
        Ok(client)
    }

    /// Stops facet notifications if they run, then disconnects
    pub async fn disconnect(&mut self) -> Result<()> {
        self.ensure_connected()?;

        self.notification_handler.stop_notifications().await;
        self.transport.disconnect().await?;

        self.connected = false;
        self.logged_in = false;
        info!("Disconnected from TimeFlip {}", self.transport.id());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Auto-pause time last set or read, in minutes
    pub fn auto_pause_time(&self) -> Option<u16> {
        self.auto_pause_time
    }

    /// Battery level as a percentage (0 to 100)
    pub async fn battery_level(&self) -> Result<u8> {
        self.ensure_connected()?;
        protocol::decode_battery_level(&self.transport.read(UUID_BATTERY_LEVEL).await?)
    }

    pub async fn firmware_revision(&self) -> Result<String> {
        self.ensure_connected()?;
        protocol::decode_firmware_revision(&self.transport.read(UUID_FIRMWARE_REVISION).await?)
    }

    pub async fn device_name(&self) -> Result<String> {
        self.ensure_connected()?;
        protocol::decode_device_name(&self.transport.read(UUID_DEVICE_NAME).await?)
    }

    /// Logs in with `password` and reports whether the device accepted it.
    ///
    /// The device never acknowledges a login. Until one succeeds the facet
    /// characteristic reads empty, which is what decides the outcome here.
    pub async fn login(&mut self, password: &str) -> Result<bool> {
        self.ensure_connected()?;
        let payload = protocol::encode_password(password)?;

        self.transport.write(UUID_PASSWORD_INPUT, &payload).await?;
        let facet = self.read_facet_characteristic().await?;
        self.logged_in = !facet.is_empty();

        if self.logged_in {
            info!("Logged in to TimeFlip {}", self.transport.id());
        } else {
            warn!("Login to TimeFlip {} was not accepted", self.transport.id());
        }
        Ok(self.logged_in)
    }

    /// Logs in with the factory password
    pub async fn login_default(&mut self) -> Result<bool> {
        self.login(DEFAULT_PASSWORD).await
    }

    /// Subscribes to facet changes.
    ///
    /// The current facet is read right away and delivered as the first event.
    pub async fn setup_facets(&mut self) -> Result<mpsc::Receiver<FacetEvent>> {
        self.ensure_logged_in()?;
        self.notification_handler.setup_notifications(&self.transport).await
    }

    /// True while facet changes are being forwarded
    pub fn is_following_facets(&self) -> bool {
        self.notification_handler.is_active()
    }

    pub async fn stop_setup_facets(&mut self) -> Result<()> {
        self.ensure_logged_in()?;
        self.notification_handler.stop_notifications().await;
        Ok(())
    }

    /// Lock, pause and auto-pause state of the device
    pub async fn get_status(&mut self) -> Result<DeviceStatus> {
        self.ensure_logged_in()?;
        let result = self
            .executor()
            .run_and_read_output(TimeFlipCommand::Status, true)
            .await?;

        let status = protocol::decode_status(&result)?;
        self.auto_pause_time = Some(status.auto_pause_time);
        Ok(status)
    }

    pub async fn pause(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::PauseOn, false).await
    }

    pub async fn unpause(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::PauseOff, false).await
    }

    /// Locks the device on its current facet
    pub async fn lock(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::LockOn, false).await
    }

    pub async fn unlock(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::LockOff, false).await
    }

    /// Recorded durations in seconds, grouped by facet
    pub async fn get_history(&self) -> Result<History> {
        self.ensure_logged_in()?;
        self.executor().read_history().await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::HistoryDelete, false).await
    }

    /// Sets the minutes after which the device pauses counting, 0 disables it
    pub async fn set_auto_pause(&mut self, minutes: u16) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor()
            .run(TimeFlipCommand::AutoPause(minutes), true)
            .await?;
        self.auto_pause_time = Some(minutes);
        Ok(())
    }

    /// Like `set_auto_pause` for values that still need range checking
    pub async fn set_auto_pause_checked(&mut self, minutes: i64) -> Result<()> {
        if minutes < 0 {
            return Err(TimeFlipError::InvalidArgument(
                "auto-pause time must not be negative".to_string(),
            ));
        }
        let minutes = u16::try_from(minutes).map_err(|_| {
            TimeFlipError::InvalidArgument("auto-pause time must fit in two bytes".to_string())
        })?;
        self.set_auto_pause(minutes).await
    }

    /// Resets the calibration version. Replacing the battery does the same.
    pub async fn reset_calibration(&self) -> Result<()> {
        self.ensure_logged_in()?;
        self.executor().run(TimeFlipCommand::CalibrationReset, false).await
    }

    /// Facet the device rests on: 0 to 47, or 63 while paused
    pub async fn get_current_facet(&self) -> Result<u8> {
        self.ensure_logged_in()?;
        protocol::decode_facet(&self.read_facet_characteristic().await?)
    }

    /// Version of the calibration synced with the device
    pub async fn get_current_calibration_version(&self) -> Result<u32> {
        self.ensure_logged_in()?;
        protocol::decode_calibration_version(
            &self.transport.read(UUID_CALIBRATION_VERSION).await?,
        )
    }

    pub async fn set_current_calibration_version(&self, version: u32) -> Result<()> {
        self.ensure_logged_in()?;
        self.transport
            .write(
                UUID_CALIBRATION_VERSION,
                &protocol::encode_calibration_version(version),
            )
            .await
    }

    fn executor(&self) -> CommandExecutor<'_, T> {
        CommandExecutor::new(&self.transport)
    }

    async fn read_facet_characteristic(&self) -> Result<Vec<u8>> {
        self.transport.read(UUID_FACET).await
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected {
            return Err(TimeFlipError::NotConnected);
        }
        Ok(())
    }

    fn ensure_logged_in(&self) -> Result<()> {
        self.ensure_connected()?;
        if !self.logged_in {
            return Err(TimeFlipError::CommandRequiresLogin);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::bluetooth::constants::{
        COMMAND_OK, COMMAND_RESULT_LEN, PAUSE_FACET_ID, STATUS_FLAG_FALSE, STATUS_FLAG_TRUE,
        UUID_COMMAND_INPUT, UUID_COMMAND_RESULT,
    };
    use crate::core::bluetooth::transport::mock::MockTransport;

    fn timeflip() -> MockTransport {
        let transport = MockTransport::new();
        transport.set_value(UUID_FACET, &[3]);
        transport.set_value(UUID_BATTERY_LEVEL, &[76]);
        transport
    }

    async fn logged_in(transport: &MockTransport) -> TimeFlipClient<MockTransport> {
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();
        assert!(client.login_default().await.unwrap());
        client
    }

    #[tokio::test]
    async fn connect_rejects_devices_without_facet() {
        let transport = MockTransport::new();
        transport.fail_reads(UUID_FACET);

        let result = TimeFlipClient::connect(transport).await;
        assert!(matches!(result, Err(TimeFlipError::NotTimeFlipDevice)));
    }

    #[tokio::test]
    async fn connect_requires_a_live_transport() {
        let transport = timeflip();
        transport.disconnect().await.unwrap();

        let result = TimeFlipClient::connect(transport).await;
        assert!(matches!(result, Err(TimeFlipError::NotConnected)));
    }

    #[tokio::test]
    async fn battery_level_needs_no_login() {
        let transport = timeflip();
        let client = TimeFlipClient::connect(transport).await.unwrap();
        assert_eq!(client.battery_level().await.unwrap(), 76);
    }

    #[tokio::test]
    async fn commands_require_login() {
        let transport = timeflip();
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();

        assert!(matches!(
            client.get_status().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
        assert!(matches!(
            client.get_current_calibration_version().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn login_writes_password_and_checks_facet() {
        let transport = timeflip();
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();

        assert!(client.login("424242").await.unwrap());
        assert!(client.is_logged_in());
        assert_eq!(
            transport.writes_to(UUID_PASSWORD_INPUT),
            vec![b"424242".to_vec()]
        );
    }

    #[tokio::test]
    async fn login_fails_when_facet_reads_empty() {
        let transport = timeflip();
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();
        transport.set_value(UUID_FACET, &[]);

        assert!(!client.login("999999").await.unwrap());
        assert!(matches!(
            client.get_current_facet().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
    }

    #[tokio::test]
    async fn status_is_decoded_and_cached() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;
        let mut result = vec![STATUS_FLAG_FALSE, STATUS_FLAG_TRUE, 15, 0];
        result.resize(COMMAND_RESULT_LEN, 0);
        transport.set_value(UUID_COMMAND_INPUT, &[0x10, COMMAND_OK]);
        transport.set_value(UUID_COMMAND_RESULT, &result);

        let status = client.get_status().await.unwrap();
        assert_eq!(
            status,
            DeviceStatus {
                locked: false,
                paused: true,
                auto_pause_time: 15,
            }
        );
        assert_eq!(client.auto_pause_time(), Some(15));
        assert_eq!(transport.writes_to(UUID_COMMAND_INPUT), vec![vec![0x10]]);
    }

    #[tokio::test]
    async fn auto_pause_command_does_not_accumulate() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;
        transport.set_value(UUID_COMMAND_INPUT, &[0x05, COMMAND_OK]);

        client.set_auto_pause(30).await.unwrap();
        client.set_auto_pause(0x0102).await.unwrap();

        assert_eq!(
            transport.writes_to(UUID_COMMAND_INPUT),
            vec![vec![0x05, 30, 0], vec![0x05, 0x02, 0x01]]
        );
        assert_eq!(client.auto_pause_time(), Some(0x0102));
    }

    #[tokio::test]
    async fn auto_pause_range_is_checked() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;

        assert!(matches!(
            client.set_auto_pause_checked(-1).await,
            Err(TimeFlipError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.set_auto_pause_checked(1 << 16).await,
            Err(TimeFlipError::InvalidArgument(_))
        ));
        assert!(transport.writes_to(UUID_COMMAND_INPUT).is_empty());
    }

    #[tokio::test]
    async fn simple_commands_write_their_bytes() {
        let transport = timeflip();
        let client = logged_in(&transport).await;

        client.pause().await.unwrap();
        client.unpause().await.unwrap();
        client.lock().await.unwrap();
        client.unlock().await.unwrap();
        client.clear_history().await.unwrap();
        client.reset_calibration().await.unwrap();

        assert_eq!(
            transport.writes_to(UUID_COMMAND_INPUT),
            vec![
                vec![0x06, 0x01],
                vec![0x06, 0x02],
                vec![0x04, 0x01],
                vec![0x04, 0x02],
                vec![0x02],
                vec![0x03],
            ]
        );
    }

    #[tokio::test]
    async fn calibration_version_round_trip() {
        let transport = timeflip();
        let client = logged_in(&transport).await;
        transport.set_value(UUID_CALIBRATION_VERSION, &[0x10, 0x00, 0x00, 0x00]);

        assert_eq!(client.get_current_calibration_version().await.unwrap(), 16);
        client.set_current_calibration_version(17).await.unwrap();
        assert_eq!(
            transport.writes_to(UUID_CALIBRATION_VERSION),
            vec![vec![17, 0, 0, 0]]
        );
    }

    #[tokio::test]
    async fn facet_events_start_with_current_facet() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;

        let mut events = client.setup_facets().await.unwrap();
        assert_eq!(events.recv().await.unwrap().facet, 3);

        transport.notify(&[PAUSE_FACET_ID]).await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.facet, PAUSE_FACET_ID);
        assert!(event.paused);

        client.stop_setup_facets().await.unwrap();
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn disconnect_stops_notifications_and_resets_state() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;
        let _events = client.setup_facets().await.unwrap();

        client.disconnect().await.unwrap();

        assert!(transport.was_disconnected());
        assert!(!transport.is_subscribed());
        assert!(!client.is_connected());
        assert!(!client.is_logged_in());
        assert!(matches!(
            client.battery_level().await,
            Err(TimeFlipError::NotConnected)
        ));
        assert!(matches!(client.disconnect().await, Err(TimeFlipError::NotConnected)));
    }

    #[tokio::test]
    async fn current_facet_is_the_first_event_even_if_a_change_races_it() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;
        transport.notify_on_read(UUID_FACET, &[9]);

        let mut events = client.setup_facets().await.unwrap();

        assert_eq!(events.recv().await.unwrap().facet, 3);
        assert_eq!(events.recv().await.unwrap().facet, 9);
    }

    #[tokio::test]
    async fn failed_facet_read_cancels_the_subscription() {
        let transport = timeflip();
        let mut client = logged_in(&transport).await;
        transport.fail_reads(UUID_FACET);

        assert!(client.setup_facets().await.is_err());
        assert!(!client.is_following_facets());
        assert!(!transport.is_subscribed());
    }

    #[tokio::test]
    async fn facet_subscription_requires_login_and_connection() {
        let transport = timeflip();
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();

        assert!(matches!(
            client.setup_facets().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
        assert!(matches!(
            client.stop_setup_facets().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
        assert!(!transport.is_subscribed());

        client.login_default().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(matches!(
            client.setup_facets().await,
            Err(TimeFlipError::NotConnected)
        ));
        assert!(matches!(
            client.stop_setup_facets().await,
            Err(TimeFlipError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn history_goes_through_the_login_gate() {
        let transport = timeflip();
        let mut client = TimeFlipClient::connect(transport.clone()).await.unwrap();
        assert!(matches!(
            client.get_history().await,
            Err(TimeFlipError::CommandRequiresLogin)
        ));
        assert!(transport.writes_to(UUID_COMMAND_INPUT).is_empty());

        client.login_default().await.unwrap();
        let mut packet = vec![1, 0, 12 << 2];
        packet.resize(COMMAND_RESULT_LEN, 0);
        transport.queue_value(UUID_COMMAND_RESULT, &packet);
        transport.set_value(UUID_COMMAND_RESULT, &[0; COMMAND_RESULT_LEN]);

        let history = client.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[&12], vec![1]);
        assert_eq!(transport.writes_to(UUID_COMMAND_INPUT), vec![vec![0x01]]);
    }
}
