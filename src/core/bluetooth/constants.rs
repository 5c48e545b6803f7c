//! Constants used throughout the client
//! This module contains the UUIDs, command bytes and timing defaults
//! used to talk to a TimeFlip device.

use uuid::Uuid;

/// Advertised name prefix of TimeFlip devices
pub const TIMEFLIP_NAME: &str = "TimeFlip";

/// Builds a UUID from the Bluetooth SIG base `0000XXXX-0000-1000-8000-00805f9b34fb`
pub const fn generic_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb | ((short as u128) << 96))
}

/// Builds a UUID from the TimeFlip base `f119XXXX-71a4-11e6-bdf4-0800200c9a66`
pub const fn timeflip_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0xf119_0000_71a4_11e6_bdf4_0800200c9a66 | ((short as u128) << 96))
}

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = generic_uuid(0x1800);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = generic_uuid(0x180A);
pub const UUID_BATTERY_SERVICE: Uuid = generic_uuid(0x180F);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = generic_uuid(0x2A00);
pub const UUID_BATTERY_LEVEL: Uuid = generic_uuid(0x2A19);
pub const UUID_FIRMWARE_REVISION: Uuid = generic_uuid(0x2A26);

/// The UUID of the TimeFlip service
pub const UUID_TIMEFLIP_SERVICE: Uuid = timeflip_uuid(0x6F50);

/// TimeFlip characteristic UUIDs
pub const UUID_ACCELEROMETER_DATA: Uuid = timeflip_uuid(0x6F51);
pub const UUID_FACET: Uuid = timeflip_uuid(0x6F52);
pub const UUID_COMMAND_RESULT: Uuid = timeflip_uuid(0x6F53);
pub const UUID_COMMAND_INPUT: Uuid = timeflip_uuid(0x6F54);
pub const UUID_CALIBRATION_VERSION: Uuid = timeflip_uuid(0x6F56);
pub const UUID_PASSWORD_INPUT: Uuid = timeflip_uuid(0x6F57);

/// Every characteristic the client may touch, collected at connect time
pub const KNOWN_CHARACTERISTICS: [Uuid; 9] = [
    UUID_ACCELEROMETER_DATA,
    UUID_BATTERY_LEVEL,
    UUID_CALIBRATION_VERSION,
    UUID_COMMAND_INPUT,
    UUID_COMMAND_RESULT,
    UUID_DEVICE_NAME,
    UUID_FACET,
    UUID_FIRMWARE_REVISION,
    UUID_PASSWORD_INPUT,
];

/// Every time the battery is removed and installed the password resets to this
pub const DEFAULT_PASSWORD: &str = "000000";

/// Result byte of a command acknowledgement
pub const COMMAND_ERROR: u8 = 0x01;
pub const COMMAND_OK: u8 = 0x02;

/// Length of the command result characteristic payload
pub const COMMAND_RESULT_LEN: usize = 21;

/// Boolean encoding used by status flags
pub const STATUS_FLAG_TRUE: u8 = 0x01;
pub const STATUS_FLAG_FALSE: u8 = 0x02;

/// Facet reported while the device is paused
pub const PAUSE_FACET_ID: u8 = 63;

/// Highest facet id of a regular face
pub const MAX_FACET_ID: u8 = 47;

/// Number of history entries packed in one command result
pub const HISTORY_ENTRIES_PER_PACKET: usize = 7;

/// Upper bound on history packets read in one go
pub const MAX_HISTORY_PACKETS: usize = 4096;

/// Maximum number of connection retries
pub const MAX_CONNECT_RETRIES: u32 = 5;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Timeout for Bluetooth operations in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Devices weaker than this are ignored while scanning
pub const MIN_RSSI_THRESHOLD: i16 = -90;

/// Capacity of the facet event channel
pub const FACET_CHANNEL_CAPACITY: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_follow_their_templates() {
        assert_eq!(
            UUID_BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(UUID_FACET.to_string(), "f1196f52-71a4-11e6-bdf4-0800200c9a66");
        assert_eq!(
            UUID_PASSWORD_INPUT.to_string(),
            "f1196f57-71a4-11e6-bdf4-0800200c9a66"
        );
    }
}
