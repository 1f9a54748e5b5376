//! One request/response exchange with the controller.
//!
//! An exchange always runs the same way:
//!
//! 1. discard stale input
//! 2. write the framed command
//! 3. read the handshake line
//! 4. on NAK: enquire once, decode the error payload and fail
//! 5. on ACK: enquire once per expected reply line and collect the lines
//!
//! The session owns the transport exclusively, so two exchanges can never
//! interleave on the wire. Callers that share a session put it behind a lock.

use crate::error::GaugeResult;
use crate::protocol::{
    decode_error_payload, decode_handshake, encode_command, strip_terminator, Acknowledge,
    Command, Control,
};
use crate::transport::Transport;
use tracing::{debug, warn};

/// Frame sent to ask the controller for the pending data line.
const ENQUIRY: [u8; 1] = [Control::Enq.byte()];

/// Drives exchanges over an owned transport.
#[derive(Debug)]
pub struct CommandSession<T> {
    transport: T,
}

impl<T: Transport> CommandSession<T> {
    /// Take ownership of a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Run one exchange for a typed command.
    ///
    /// Returns `expected_reply_count` lines with their terminators removed.
    ///
    /// # Errors
    /// Framing errors from the handshake, [`crate::GaugeError::InstrumentNegativeAcknowledge`]
    /// when the controller rejects the command, and any transport failure.
    pub async fn execute(
        &mut self,
        command: &Command,
        expected_reply_count: usize,
    ) -> GaugeResult<Vec<String>> {
        self.exchange(&command.to_string(), command.encode(), expected_reply_count)
            .await
    }

    /// Run one exchange for a raw mnemonic with optional arguments.
    pub async fn execute_raw<S: AsRef<str>>(
        &mut self,
        mnemonic: &str,
        args: &[S],
        expected_reply_count: usize,
    ) -> GaugeResult<Vec<String>> {
        let frame = encode_command(mnemonic, args);
        let label = String::from_utf8_lossy(strip_terminator(&frame)).into_owned();
        self.exchange(&label, frame, expected_reply_count).await
    }

    /// Close the transport.
    pub async fn close(&mut self) -> GaugeResult<()> {
        self.transport.close().await
    }

    async fn exchange(
        &mut self,
        label: &str,
        frame: Vec<u8>,
        expected_reply_count: usize,
    ) -> GaugeResult<Vec<String>> {
        let stale = self.transport.clear_input_buffer().await?;
        if stale > 0 {
            debug!(command = label, bytes = stale, "dropped stale input before exchange");
        }

        debug!(command = label, "-> {}", frame.escape_ascii());
        self.transport.write(&frame).await?;

        let raw = self.transport.read_until_terminator().await?;
        debug!(command = label, "<- {}", raw.escape_ascii());
        let handshake = decode_handshake(&raw)?;

        if handshake.ack == Acknowledge::Negative {
            let payload = self.enquire(label).await?;
            let report = decode_error_payload(&payload)?;
            warn!(
                command = label,
                system_error = report.system_error,
                gauge_error = report.gauge_error,
                "command rejected"
            );
            return Err(report.into_error());
        }

        let mut lines = Vec::with_capacity(expected_reply_count);
        for _ in 0..expected_reply_count {
            lines.push(self.enquire(label).await?);
        }
        Ok(lines)
    }

    async fn enquire(&mut self, label: &str) -> GaugeResult<String> {
        self.transport.write(&ENQUIRY).await?;
        let raw = self.transport.read_until_terminator().await?;
        debug!(command = label, "<- {}", raw.escape_ascii());
        Ok(String::from_utf8_lossy(strip_terminator(&raw)).into_owned())
    }
}
