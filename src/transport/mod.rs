//! Byte transports the command session talks through.
//!
//! The session only needs four primitives: write a frame, read one line up to
//! and including LF, throw away stale input and close. Anything providing them
//! can carry the protocol:
//!
//! - [`SerialTransport`]: RS-232 / USB-serial adapters via `tokio-serial`, or any
//!   async stream (tests use `tokio::io::duplex`)
//! - [`MockTransport`]: an in-memory simulated TPG256A

pub mod mock;
pub mod serial;

pub use mock::{MockHandle, MockTransport};
pub use serial::{SerialTransport, SerialTransportBuilder};

use crate::error::GaugeResult;
use async_trait::async_trait;

/// Duplex, line-oriented byte channel to the instrument.
#[async_trait]
pub trait Transport: Send {
    /// Write the whole buffer.
    async fn write(&mut self, bytes: &[u8]) -> GaugeResult<()>;

    /// Read one line, including its terminator.
    ///
    /// Blocks until the terminator arrives unless the transport was opened
    /// with a read timeout.
    async fn read_until_terminator(&mut self) -> GaugeResult<Vec<u8>>;

    /// Discard any input that arrived before the next exchange.
    ///
    /// Returns the number of bytes dropped.
    async fn clear_input_buffer(&mut self) -> GaugeResult<usize>;

    /// Release the underlying resource.
    async fn close(&mut self) -> GaugeResult<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, bytes: &[u8]) -> GaugeResult<()> {
        (**self).write(bytes).await
    }

    async fn read_until_terminator(&mut self) -> GaugeResult<Vec<u8>> {
        (**self).read_until_terminator().await
    }

    async fn clear_input_buffer(&mut self) -> GaugeResult<usize> {
        (**self).clear_input_buffer().await
    }

    async fn close(&mut self) -> GaugeResult<()> {
        (**self).close().await
    }
}
