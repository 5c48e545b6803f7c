//! TimeFlip payload encoding and decoding
//! This module turns raw characteristic values into typed data and back.
//! Every multi-byte integer on the wire is little-endian.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    COMMAND_OK, COMMAND_RESULT_LEN, HISTORY_ENTRIES_PER_PACKET, PAUSE_FACET_ID, STATUS_FLAG_FALSE,
    STATUS_FLAG_TRUE,
};
use crate::error::{Result, TimeFlipError};

/// Commands written to the command input characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFlipCommand {
    /// Start streaming history packets into the command result (0x01)
    History,
    /// Delete the stored history (0x02)
    HistoryDelete,
    /// Reset the calibration version (0x03)
    CalibrationReset,
    /// Lock the current facet (0x04, 0x01)
    LockOn,
    /// Unlock the facet (0x04, 0x02)
    LockOff,
    /// Set the auto-pause time in minutes (0x05, lo, hi)
    AutoPause(u16),
    /// Pause counting (0x06, 0x01)
    PauseOn,
    /// Resume counting (0x06, 0x02)
    PauseOff,
    /// Write lock, pause and auto-pause state into the command result (0x10)
    Status,
}

impl TimeFlipCommand {
    /// Convert the command to its byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::History => vec![0x01],
            Self::HistoryDelete => vec![0x02],
            Self::CalibrationReset => vec![0x03],
            Self::LockOn => vec![0x04, STATUS_FLAG_TRUE],
            Self::LockOff => vec![0x04, STATUS_FLAG_FALSE],
            Self::AutoPause(minutes) => {
                let [lo, hi] = minutes.to_le_bytes();
                vec![0x05, lo, hi]
            }
            Self::PauseOn => vec![0x06, STATUS_FLAG_TRUE],
            Self::PauseOff => vec![0x06, STATUS_FLAG_FALSE],
            Self::Status => vec![0x10],
        }
    }

    pub fn opcode(&self) -> u8 {
        self.to_bytes()[0]
    }
}

/// Lock, pause and auto-pause state reported by the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub locked: bool,
    pub paused: bool,
    /// Minutes after which the device pauses by itself, 0 when disabled
    pub auto_pause_time: u16,
}

/// A facet change reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetEvent {
    pub facet: u8,
    pub paused: bool,
    pub received_at: DateTime<Local>,
}

impl FacetEvent {
    pub fn new(facet: u8) -> Self {
        Self {
            facet,
            paused: facet == PAUSE_FACET_ID,
            received_at: Local::now(),
        }
    }
}

/// One recorded interval: how long the device rested on a facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub facet: u8,
    pub seconds: u32,
}

/// Recorded durations grouped by facet, in device order
pub type History = BTreeMap<u8, Vec<u32>>;

/// Reads a little-endian unsigned integer of at most eight bytes
pub fn decode_le(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(TimeFlipError::malformed(
            "integer",
            format!("{} bytes do not fit in 64 bits", bytes.len()),
        ));
    }
    Ok(bytes
        .iter()
        .rev()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

/// Battery level as a percentage between 0 and 100
pub fn decode_battery_level(bytes: &[u8]) -> Result<u8> {
    if bytes.is_empty() {
        return Err(TimeFlipError::malformed("battery level", "empty payload"));
    }
    let level = decode_le(bytes)?;
    if level > 100 {
        return Err(TimeFlipError::malformed(
            "battery level",
            format!("{} is not a percentage", level),
        ));
    }
    Ok(level as u8)
}

pub fn decode_firmware_revision(bytes: &[u8]) -> Result<String> {
    decode_ascii("firmware revision", bytes)
}

pub fn decode_device_name(bytes: &[u8]) -> Result<String> {
    decode_ascii("device name", bytes)
}

fn decode_ascii(what: &'static str, bytes: &[u8]) -> Result<String> {
    if !bytes.is_ascii() {
        return Err(TimeFlipError::malformed(what, "not ASCII"));
    }
    // Some firmwares pad strings with NULs
    Ok(String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string())
}

/// The facet the device currently rests on
pub fn decode_facet(bytes: &[u8]) -> Result<u8> {
    if bytes.is_empty() {
        return Err(TimeFlipError::malformed("facet", "empty payload"));
    }
    let facet = decode_le(bytes)?;
    u8::try_from(facet)
        .map_err(|_| TimeFlipError::malformed("facet", format!("{} out of range", facet)))
}

pub fn decode_calibration_version(bytes: &[u8]) -> Result<u32> {
    if bytes.len() > 4 {
        return Err(TimeFlipError::malformed(
            "calibration version",
            format!("expected at most 4 bytes, got {}", bytes.len()),
        ));
    }
    Ok(decode_le(bytes)? as u32)
}

pub fn encode_calibration_version(version: u32) -> [u8; 4] {
    version.to_le_bytes()
}

/// Password bytes as written to the password input characteristic
pub fn encode_password(password: &str) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(TimeFlipError::InvalidArgument(
            "password must not be empty".to_string(),
        ));
    }
    if !password.is_ascii() {
        return Err(TimeFlipError::InvalidArgument(
            "password must be ASCII".to_string(),
        ));
    }
    Ok(password.as_bytes().to_vec())
}

/// Validates the `[opcode, result]` pair read back from the command input
pub fn check_command_ack(command: &[u8], ack: &[u8]) -> Result<()> {
    match (command.first(), ack) {
        (Some(opcode), [echoed, result, ..]) if echoed == opcode && *result == COMMAND_OK => Ok(()),
        _ => Err(TimeFlipError::CommandExecution {
            command: command.to_vec(),
        }),
    }
}

/// Makes sure a command result has the fixed payload length
pub fn check_command_result(command: &[u8], result: &[u8]) -> Result<()> {
    if result.len() != COMMAND_RESULT_LEN {
        return Err(TimeFlipError::CommandResult {
            command: command.to_vec(),
        });
    }
    Ok(())
}

pub fn decode_status(result: &[u8]) -> Result<DeviceStatus> {
    check_command_result(&TimeFlipCommand::Status.to_bytes(), result)?;
    Ok(DeviceStatus {
        locked: result[0] == STATUS_FLAG_TRUE,
        paused: result[1] == STATUS_FLAG_TRUE,
        auto_pause_time: u16::from_le_bytes([result[2], result[3]]),
    })
}

/// True for the all-zero packet that ends a history transfer
pub fn is_history_terminator(packet: &[u8]) -> bool {
    packet.len() == COMMAND_RESULT_LEN && packet.iter().all(|byte| *byte == 0)
}

/// Splits one history packet into its seven entries.
///
/// Each entry is three bytes. The upper six bits of the last byte carry the
/// facet, the remaining eighteen bits are the duration in seconds.
pub fn decode_history_packet(packet: &[u8]) -> Result<Vec<HistoryEntry>> {
    check_command_result(&TimeFlipCommand::History.to_bytes(), packet)?;
    Ok(packet
        .chunks_exact(3)
        .take(HISTORY_ENTRIES_PER_PACKET)
        .map(|entry| HistoryEntry {
            facet: entry[2] >> 2,
            seconds: u32::from_le_bytes([entry[0], entry[1], entry[2] & 0x03, 0]),
        })
        .collect())
}

/// Entry count carried in the first two bytes of a history packet
pub fn history_count(packet: &[u8]) -> usize {
    match packet {
        [lo, hi, ..] => usize::from(u16::from_le_bytes([*lo, *hi])),
        _ => 0,
    }
}

/// Assembles the packets of one history transfer, terminator excluded.
///
/// The count in the last packet decides how many entries are real; the rest
/// is padding.
pub fn decode_history(packets: &[Vec<u8>]) -> Result<History> {
    let mut entries = Vec::new();
    let mut count = 0;
    for packet in packets {
        count = history_count(packet);
        entries.extend(decode_history_packet(packet)?);
    }
    entries.truncate(count);

    let mut history = History::new();
    for entry in entries {
        history.entry(entry.facet).or_default().push(entry.seconds);
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(entries: &[(u8, u32)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(COMMAND_RESULT_LEN);
        for (facet, seconds) in entries {
            let [a, b, c, _] = seconds.to_le_bytes();
            bytes.extend([a, b, (facet << 2) | (c & 0x03)]);
        }
        bytes.resize(COMMAND_RESULT_LEN, 0);
        bytes
    }

    #[test]
    fn command_encodings() {
        assert_eq!(TimeFlipCommand::History.to_bytes(), vec![0x01]);
        assert_eq!(TimeFlipCommand::HistoryDelete.to_bytes(), vec![0x02]);
        assert_eq!(TimeFlipCommand::CalibrationReset.to_bytes(), vec![0x03]);
        assert_eq!(TimeFlipCommand::LockOn.to_bytes(), vec![0x04, 0x01]);
        assert_eq!(TimeFlipCommand::LockOff.to_bytes(), vec![0x04, 0x02]);
        assert_eq!(TimeFlipCommand::PauseOn.to_bytes(), vec![0x06, 0x01]);
        assert_eq!(TimeFlipCommand::PauseOff.to_bytes(), vec![0x06, 0x02]);
        assert_eq!(TimeFlipCommand::Status.to_bytes(), vec![0x10]);
        assert_eq!(
            TimeFlipCommand::AutoPause(0x1234).to_bytes(),
            vec![0x05, 0x34, 0x12]
        );
        assert_eq!(TimeFlipCommand::AutoPause(90).opcode(), 0x05);
    }

    #[test]
    fn little_endian_integers() {
        assert_eq!(decode_le(&[]).unwrap(), 0);
        assert_eq!(decode_le(&[0x2a]).unwrap(), 42);
        assert_eq!(decode_le(&[0x01, 0x02]).unwrap(), 0x0201);
        assert!(decode_le(&[0; 9]).is_err());
    }

    #[test]
    fn battery_level_is_a_percentage() {
        assert_eq!(decode_battery_level(&[87]).unwrap(), 87);
        assert!(decode_battery_level(&[]).is_err());
        assert!(decode_battery_level(&[101]).is_err());
    }

    #[test]
    fn facet_decoding() {
        assert_eq!(decode_facet(&[5]).unwrap(), 5);
        assert_eq!(decode_facet(&[63, 0]).unwrap(), PAUSE_FACET_ID);
        assert!(decode_facet(&[]).is_err());
        assert!(decode_facet(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn facet_event_flags_pause() {
        assert!(FacetEvent::new(PAUSE_FACET_ID).paused);
        assert!(!FacetEvent::new(12).paused);
    }

    #[test]
    fn calibration_version_is_four_bytes() {
        assert_eq!(encode_calibration_version(0x01020304), [4, 3, 2, 1]);
        assert_eq!(decode_calibration_version(&[4, 3, 2, 1]).unwrap(), 0x01020304);
        assert_eq!(decode_calibration_version(&[7]).unwrap(), 7);
        assert!(decode_calibration_version(&[0; 5]).is_err());
    }

    #[test]
    fn strings_are_ascii() {
        assert_eq!(decode_firmware_revision(b"1.05\0").unwrap(), "1.05");
        assert_eq!(decode_device_name(b"TimeFlip").unwrap(), "TimeFlip");
        assert!(decode_firmware_revision(&[0xff]).is_err());
    }

    #[test]
    fn password_must_be_ascii() {
        assert_eq!(encode_password("000000").unwrap(), b"000000".to_vec());
        assert!(encode_password("").is_err());
        assert!(encode_password("пароль").is_err());
    }

    #[test]
    fn ack_must_echo_opcode_and_report_ok() {
        let command = TimeFlipCommand::Status.to_bytes();
        assert!(check_command_ack(&command, &[0x10, COMMAND_OK]).is_ok());
        assert!(matches!(
            check_command_ack(&command, &[0x10, crate::core::bluetooth::COMMAND_ERROR]),
            Err(TimeFlipError::CommandExecution { .. })
        ));
        assert!(check_command_ack(&command, &[0x05, COMMAND_OK]).is_err());
        assert!(check_command_ack(&command, &[0x10]).is_err());
    }

    #[test]
    fn status_decoding() {
        let mut result = vec![STATUS_FLAG_TRUE, STATUS_FLAG_FALSE, 0x2c, 0x01];
        result.resize(COMMAND_RESULT_LEN, 0);
        assert_eq!(
            decode_status(&result).unwrap(),
            DeviceStatus {
                locked: true,
                paused: false,
                auto_pause_time: 300,
            }
        );
        assert!(matches!(
            decode_status(&result[..20]),
            Err(TimeFlipError::CommandResult { .. })
        ));
    }

    #[test]
    fn history_entry_splits_facet_from_seconds() {
        let entries = decode_history_packet(&packet(&[(3, 0x3_ffff), (47, 60)])).unwrap();
        assert_eq!(entries.len(), HISTORY_ENTRIES_PER_PACKET);
        assert_eq!(entries[0], HistoryEntry { facet: 3, seconds: 0x3_ffff });
        assert_eq!(entries[1], HistoryEntry { facet: 47, seconds: 60 });
    }

    #[test]
    fn history_is_truncated_to_the_last_count_and_grouped() {
        // The first two bytes of every packet double as the entry count, so
        // the first entry's seconds also encode the number of entries.
        let first = packet(&[(0, 9), (1, 10), (2, 20), (1, 30), (4, 40), (5, 50), (6, 60)]);
        let second = packet(&[(0, 9), (2, 70), (3, 80)]);
        let history = decode_history(&[first, second]).unwrap();

        assert_eq!(history.values().map(Vec::len).sum::<usize>(), 9);
        assert_eq!(history[&0], vec![9, 9]);
        assert_eq!(history[&1], vec![10, 30]);
        assert_eq!(history[&2], vec![20, 70]);
        assert!(!history.contains_key(&3));
    }

    #[test]
    fn empty_history() {
        assert!(decode_history(&[]).unwrap().is_empty());
        assert!(is_history_terminator(&[0; COMMAND_RESULT_LEN]));
        assert!(!is_history_terminator(&packet(&[(1, 1)])));
    }
}
