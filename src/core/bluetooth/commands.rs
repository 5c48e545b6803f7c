//! TimeFlip command execution
//! Commands are written to the command input characteristic. Some of them
//! leave a 21 byte answer in the command result characteristic.

use log::{debug, info, warn};

use crate::core::bluetooth::constants::{
    MAX_HISTORY_PACKETS, UUID_COMMAND_INPUT, UUID_COMMAND_RESULT,
};
use crate::core::bluetooth::transport::GattTransport;
use crate::core::protocol::{
    History, TimeFlipCommand, check_command_ack, check_command_result, decode_history,
    is_history_terminator,
};
use crate::error::Result;

/// Runs commands against a connected TimeFlip
pub struct CommandExecutor<'a, T: GattTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: GattTransport + ?Sized> CommandExecutor<'a, T> {
    /// Create a new CommandExecutor
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Send a command, optionally reading back the acknowledgement
    pub async fn run(&self, command: TimeFlipCommand, check_if_successful: bool) -> Result<()> {
        let bytes = command.to_bytes();
        info!("Sending command: {:?}", command);
        self.transport.write(UUID_COMMAND_INPUT, &bytes).await?;

        if check_if_successful {
            let ack = self.transport.read(UUID_COMMAND_INPUT).await?;
            debug!("Command {:?} acknowledged with {:02x?}", command, ack);
            if let Err(e) = check_command_ack(&bytes, &ack) {
                warn!("Command {:?} was rejected: {:02x?}", command, ack);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Send a command and return its 21 byte result
    pub async fn run_and_read_output(
        &self,
        command: TimeFlipCommand,
        check_if_successful: bool,
    ) -> Result<Vec<u8>> {
        self.run(command, check_if_successful).await?;

        let result = self.transport.read(UUID_COMMAND_RESULT).await?;
        check_command_result(&command.to_bytes(), &result)?;
        Ok(result)
    }

    /// Request the history and read packets until the all-zero terminator
    pub async fn read_history(&self) -> Result<History> {
        self.run(TimeFlipCommand::History, false).await?;

        let mut packets = Vec::new();
        loop {
            let packet = self.transport.read(UUID_COMMAND_RESULT).await?;
            if is_history_terminator(&packet) {
                break;
            }
            packets.push(packet);
            if packets.len() >= MAX_HISTORY_PACKETS {
                warn!(
                    "History transfer did not terminate after {} packets, stopping",
                    MAX_HISTORY_PACKETS
                );
                break;
            }
        }

        debug!("Received {} history packets", packets.len());
        decode_history(&packets)
    }
}
