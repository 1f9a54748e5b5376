//! Serial transport for the MaxiGauge.
//!
//! Wraps any async byte stream in a `BufReader` so replies can be read line by
//! line. On real hardware the stream is a `tokio_serial::SerialStream` opened by
//! [`SerialTransportBuilder::open`]; in tests it is one half of a
//! `tokio::io::duplex` pair.
//!
//! # Example
//!
//! ```no_run
//! use maxigauge::transport::SerialTransportBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> maxigauge::GaugeResult<()> {
//! let transport = SerialTransportBuilder::new("/dev/ttyUSB0", 9600)
//!     .with_open_timeout(Duration::from_millis(200))
//!     .open()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::Transport;
use crate::config::ConnectionConfig;
use crate::error::{GaugeError, GaugeResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port: `tokio_serial::SerialStream` on hardware,
/// `tokio::io::DuplexStream` in tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Builder for opening a [`SerialTransport`] on a named port.
///
/// Default configuration:
/// * baud rate as given (the TPG256A ships at 9600)
/// * open timeout: 200 ms
/// * read timeout: none (a silent instrument blocks the caller)
/// * drain window: 0 (only input already available is discarded)
#[derive(Debug, Clone)]
pub struct SerialTransportBuilder {
    resource: String,
    baud_rate: u32,
    open_timeout: Duration,
    read_timeout: Option<Duration>,
    drain_window: Duration,
}

impl SerialTransportBuilder {
    /// Create a builder for `resource` (e.g. "/dev/ttyUSB0", "COM3").
    pub fn new(resource: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            resource: resource.into(),
            baud_rate,
            open_timeout: Duration::from_millis(200),
            read_timeout: None,
            drain_window: Duration::ZERO,
        }
    }

    /// Builder for the port described by a `[connection]` section.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.resource.clone(), config.baud_rate)
            .with_open_timeout(config.open_timeout)
            .with_read_timeout(config.read_timeout)
            .with_drain_window(config.drain_window)
    }

    /// Bound the time spent opening the port.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Fail reads that do not complete a line in time.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// How long [`Transport::clear_input_buffer`] keeps listening for stale bytes.
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// Wrap an already open stream with this configuration.
    pub fn attach(self, stream: impl SerialPortIO + 'static) -> SerialTransport {
        SerialTransport {
            resource: self.resource,
            port: BufReader::new(Box::new(stream)),
            read_timeout: self.read_timeout,
            drain_window: self.drain_window,
        }
    }

    /// Open the port (8N1, no flow control).
    ///
    /// The blocking open runs on the blocking pool so the runtime is not stalled.
    ///
    /// # Errors
    /// [`GaugeError::ConnectionUnavailable`] if the device is missing, cannot be
    /// opened, or does not open within the open timeout.
    #[cfg(feature = "serial")]
    pub async fn open(self) -> GaugeResult<SerialTransport> {
        use tokio::task::spawn_blocking;
        use tokio_serial::SerialPortBuilderExt;

        let unavailable = |reason: String| GaugeError::ConnectionUnavailable {
            resource: self.resource.clone(),
            reason,
        };

        let path = self.resource.clone();
        let baud_rate = self.baud_rate;
        let opening = spawn_blocking(move || {
            tokio_serial::new(&path, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        });

        let stream = tokio::time::timeout(self.open_timeout, opening)
            .await
            .map_err(|_| unavailable(format!("open timed out after {:?}", self.open_timeout)))?
            .map_err(|e| unavailable(format!("spawn_blocking for port opening failed: {}", e)))?
            .map_err(|e| unavailable(e.to_string()))?;

        debug!(resource = %self.resource, baud = baud_rate, "serial port opened");
        Ok(self.attach(stream))
    }
}

/// Line-oriented transport over a serial stream.
pub struct SerialTransport {
    resource: String,
    port: BufReader<DynSerial>,
    read_timeout: Option<Duration>,
    drain_window: Duration,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("resource", &self.resource)
            .field("read_timeout", &self.read_timeout)
            .field("drain_window", &self.drain_window)
            .finish()
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> GaugeResult<()> {
        let port = self.port.get_mut();
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_until_terminator(&mut self) -> GaugeResult<Vec<u8>> {
        let mut line = Vec::new();
        let read_timeout = self.read_timeout;
        let read = self.port.read_until(b'\n', &mut line);

        let n = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no line terminator within {:?}", limit),
                )
            })??,
            None => read.await?,
        };

        if n == 0 {
            return Err(GaugeError::UnexpectedEof);
        }
        Ok(line)
    }

    async fn clear_input_buffer(&mut self) -> GaugeResult<usize> {
        let buffered = self.port.buffer().len();
        self.port.consume(buffered);

        let drained = drain_pending(self.port.get_mut(), self.drain_window).await?;
        let total = buffered + drained;
        if total > 0 {
            debug!(resource = %self.resource, bytes = total, "discarded stale input");
        }
        Ok(total)
    }

    async fn close(&mut self) -> GaugeResult<()> {
        self.port.get_mut().shutdown().await?;
        debug!(resource = %self.resource, "serial port closed");
        Ok(())
    }
}

/// Read and discard data until nothing arrives within `window`.
///
/// A zero window still picks up everything that is already readable, since the
/// read is polled once before the timeout is checked.
async fn drain_pending<R: AsyncRead + Unpin>(port: &mut R, window: Duration) -> GaugeResult<usize> {
    let mut discard = [0u8; 256];
    let mut total = 0usize;

    loop {
        match tokio::time::timeout(window, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total += n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break,
        }
    }

    Ok(total)
}
