//! Simulated TPG256A for testing without hardware
//!
//! `MockTransport` behaves like the controller at the protocol level: it
//! acknowledges every well-formed command, keeps the reply pending until the
//! host sends `<ENQ>`, and answers unknown mnemonics with a syntax-error NAK.
//! A cloneable [`MockHandle`] stays with the test to change readings and to
//! script one-shot faults while the transport itself is owned by the driver.
//!
//! Reading from an empty input buffer reports EOF instead of blocking, so a
//! test that forgets an enquiry fails fast instead of hanging.
//!
//! # Example
//!
//! ```
//! use maxigauge::transport::MockTransport;
//! use maxigauge::MaxiGauge;
//!
//! # async fn example() -> maxigauge::GaugeResult<()> {
//! let transport = MockTransport::new();
//! let handle = transport.handle();
//! handle.set_reading(2, 0, 4.2e-7);
//!
//! let gauge = MaxiGauge::new(transport);
//! assert_eq!(gauge.pressure(2).await?.pressure(), 4.2e-7);
//! # Ok(())
//! # }
//! ```

use super::Transport;
use crate::error::{GaugeError, GaugeResult};
use crate::protocol::{strip_terminator, Control, LINE_TERMINATOR};
use crate::reading::CHANNEL_COUNT;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// System error code the controller reports for an unknown mnemonic.
const SYNTAX_ERROR: u32 = 4096;

/// One-shot behaviour for the next command with a given head (`PR4`, `DCC` ...).
#[derive(Debug, Clone)]
enum Scripted {
    /// NAK, then serve `<system>,<gauge>` on enquiry
    Reject { system: u32, gauge: u32 },
    /// ACK, then serve this line verbatim on enquiry
    Reply(String),
    /// Send these bytes in place of the handshake line, nothing pending
    Handshake(Vec<u8>),
}

#[derive(Debug)]
struct DeviceState {
    readings: [(u8, f64); CHANNEL_COUNT],
    contrast: i64,
    keys: u8,
    scripted: HashMap<String, VecDeque<Scripted>>,
    input: VecDeque<u8>,
    pending: Option<String>,
    frames: Vec<Vec<u8>>,
    closed: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        let mut readings = [(0u8, 0.0f64); CHANNEL_COUNT];
        for (i, slot) in readings.iter_mut().enumerate() {
            *slot = (0, 1.0e-6 * (i + 1) as f64);
        }
        Self {
            readings,
            contrast: 10,
            keys: 0,
            scripted: HashMap::new(),
            input: VecDeque::new(),
            pending: None,
            frames: Vec::new(),
            closed: false,
        }
    }
}

impl DeviceState {
    fn push_line(&mut self, line: &[u8]) {
        self.input.extend(line);
        self.input.extend(LINE_TERMINATOR);
    }

    fn acknowledge(&mut self, ack: Control, pending: Option<String>) {
        self.push_line(&[ack.byte()]);
        self.pending = pending;
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        if frame == [Control::Enq.byte()] {
            if let Some(reply) = self.pending.take() {
                self.push_line(reply.as_bytes());
            }
            return;
        }

        let text = String::from_utf8_lossy(strip_terminator(frame)).into_owned();
        let (head, args) = match text.split_once(',') {
            Some((head, args)) => (head.to_string(), Some(args.to_string())),
            None => (text.clone(), None),
        };

        if let Some(script) = self.scripted.get_mut(&head).and_then(VecDeque::pop_front) {
            match script {
                Scripted::Reject { system, gauge } => {
                    self.acknowledge(Control::Nak, Some(format!("{},{}", system, gauge)))
                }
                Scripted::Reply(line) => self.acknowledge(Control::Ack, Some(line)),
                Scripted::Handshake(raw) => {
                    self.input.extend(raw);
                    self.pending = None;
                }
            }
            return;
        }

        let reply = match (head.as_str(), args.as_deref()) {
            ("DCC", None) => Some(self.contrast.to_string()),
            ("DCC", Some(value)) => match value.trim().parse() {
                Ok(contrast) => {
                    self.contrast = contrast;
                    Some(self.contrast.to_string())
                }
                Err(_) => None,
            },
            ("TKB", None) => Some(self.keys.to_string()),
            (head, None) => head
                .strip_prefix("PR")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| (1..=CHANNEL_COUNT).contains(n))
                .map(|n| {
                    let (status, pressure) = self.readings[n - 1];
                    format!("{},{:.4E}", status, pressure)
                }),
            _ => None,
        };

        match reply {
            Some(line) => self.acknowledge(Control::Ack, Some(line)),
            None => self.acknowledge(Control::Nak, Some(format!("{},0", SYNTAX_ERROR))),
        }
    }
}

fn lock(state: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory transport connected to a simulated controller.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<DeviceState>>,
}

impl MockTransport {
    /// A controller with six healthy gauges reading `n * 1e-6` mbar on channel `n`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for steering the simulated controller from a test.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, bytes: &[u8]) -> GaugeResult<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock transport closed",
            )
            .into());
        }
        state.frames.push(bytes.to_vec());
        state.handle_frame(bytes);
        Ok(())
    }

    async fn read_until_terminator(&mut self) -> GaugeResult<Vec<u8>> {
        let mut state = lock(&self.state);
        if state.input.is_empty() {
            return Err(GaugeError::UnexpectedEof);
        }
        let end = state
            .input
            .iter()
            .position(|&b| b == b'\n')
            .map_or(state.input.len(), |pos| pos + 1);
        Ok(state.input.drain(..end).collect())
    }

    async fn clear_input_buffer(&mut self) -> GaugeResult<usize> {
        let mut state = lock(&self.state);
        let stale = state.input.len();
        state.input.clear();
        Ok(stale)
    }

    async fn close(&mut self) -> GaugeResult<()> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

/// Test-side controls for a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl MockHandle {
    /// Set the status and pressure reported for a channel (1..=6).
    pub fn set_reading(&self, channel: usize, status: u8, pressure: f64) {
        if (1..=CHANNEL_COUNT).contains(&channel) {
            lock(&self.state).readings[channel - 1] = (status, pressure);
        }
    }

    /// Set the display contrast the controller reports.
    pub fn set_contrast(&self, contrast: i64) {
        lock(&self.state).contrast = contrast;
    }

    /// Current display contrast of the simulated controller.
    pub fn contrast(&self) -> i64 {
        lock(&self.state).contrast
    }

    /// Set the key bitmask returned by `TKB` (bit 0 = key 1).
    pub fn set_keys(&self, keys: u8) {
        lock(&self.state).keys = keys;
    }

    /// Reject the next command with this head, reporting the given bitmasks.
    pub fn reject_next(&self, head: &str, system: u32, gauge: u32) {
        self.script(head, Scripted::Reject { system, gauge });
    }

    /// Acknowledge the next command with this head but answer `line` verbatim.
    pub fn reply_next(&self, head: &str, line: &str) {
        self.script(head, Scripted::Reply(line.to_string()));
    }

    /// Replace the handshake of the next command with this head by `raw`.
    pub fn handshake_next(&self, head: &str, raw: &[u8]) {
        self.script(head, Scripted::Handshake(raw.to_vec()));
    }

    /// Put bytes into the input buffer as if they arrived unsolicited.
    pub fn inject_input(&self, bytes: &[u8]) {
        lock(&self.state).input.extend(bytes);
    }

    /// Every frame written so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.state).frames.clone()
    }

    /// Whether the driver closed the transport.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn script(&self, head: &str, script: Scripted) {
        lock(&self.state)
            .scripted
            .entry(head.to_string())
            .or_default()
            .push_back(script);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENQ: &[u8] = &[0x05];

    #[tokio::test]
    async fn acknowledges_and_serves_reply_on_enquiry() {
        let mut transport = MockTransport::new();
        transport.handle().set_reading(1, 0, 2.5e-3);

        transport.write(b"PR1\r\n").await.unwrap();
        assert_eq!(transport.read_until_terminator().await.unwrap(), b"\x06\r\n");

        transport.write(ENQ).await.unwrap();
        assert_eq!(
            transport.read_until_terminator().await.unwrap(),
            b"0,2.5000E-3\r\n"
        );
    }

    #[tokio::test]
    async fn unknown_mnemonic_is_rejected_with_syntax_error() {
        let mut transport = MockTransport::new();

        transport.write(b"XYZ\r\n").await.unwrap();
        assert_eq!(transport.read_until_terminator().await.unwrap(), b"\x15\r\n");

        transport.write(ENQ).await.unwrap();
        assert_eq!(transport.read_until_terminator().await.unwrap(), b"4096,0\r\n");
    }

    #[tokio::test]
    async fn empty_input_reads_as_eof() {
        let mut transport = MockTransport::new();
        assert!(matches!(
            transport.read_until_terminator().await,
            Err(GaugeError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn scripted_faults_fire_once() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        handle.handshake_next("DCC", b"\r\n");

        transport.write(b"DCC\r\n").await.unwrap();
        assert_eq!(transport.read_until_terminator().await.unwrap(), b"\r\n");

        transport.write(b"DCC\r\n").await.unwrap();
        assert_eq!(transport.read_until_terminator().await.unwrap(), b"\x06\r\n");
    }

    #[tokio::test]
    async fn contrast_setting_is_remembered() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();

        transport.write(b"DCC,15\r\n").await.unwrap();
        transport.read_until_terminator().await.unwrap();
        assert_eq!(handle.contrast(), 15);
    }

    #[tokio::test]
    async fn closed_transport_refuses_writes() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        transport.close().await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            transport.write(b"PR1\r\n").await,
            Err(GaugeError::Io(_))
        ));
    }
}
