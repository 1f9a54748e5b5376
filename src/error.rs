//! Custom error types for the driver.
//!
//! This module defines the primary error type, `GaugeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures that can occur while talking to a MaxiGauge, from
//! connection problems to framing violations and instrument-side rejections.
//!
//! ## Error Hierarchy
//!
//! `GaugeError` falls into four broad categories:
//!
//! 1. **Connection Errors** - `ConnectionUnavailable`, `Io`, `UnexpectedEof`
//!    - Occur while opening or using the transport
//!    - `ConnectionUnavailable` is fatal to construction of the driver
//!
//! 2. **Framing Errors** - `MalformedHandshake`, `UnknownHandshake`
//!    - The handshake trailer of a reply did not follow the protocol
//!    - Fatal to the current exchange, never retried
//!
//! 3. **Instrument Errors** - `InstrumentNegativeAcknowledge`, `UnknownErrorCode`,
//!    `MalformedErrorPayload`
//!    - The instrument rejected a command, possibly with an undecodable payload
//!
//! 4. **Decode/Validation Errors** - `UnparsablePressureLine`, `UnparsableReply`,
//!    `InvalidChannel`, `InvalidStatus`
//!    - A data line or a value did not satisfy its format or range
//!
//! Nothing in the crate retries automatically. The continuous sampler is the only
//! place where these errors are recovered, at the granularity of one sampling cycle.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type GaugeResult<T> = std::result::Result<T, GaugeError>;

/// Which of the two instrument error tables a code was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Controller-level error bitmask (watchdog, memory, syntax ...).
    System,
    /// Gauge-level error bitmask (measurement/identification per sensor).
    Gauge,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::System => "system",
            ErrorCategory::Gauge => "gauge",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for the MaxiGauge driver.
#[derive(Error, Debug)]
pub enum GaugeError {
    #[error("Instrument not available at '{resource}': {reason}")]
    ConnectionUnavailable { resource: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected EOF from transport")]
    UnexpectedEof,

    #[error("Only received a line termination from MaxiGauge ({raw:?}), expected ACK or NAK")]
    MalformedHandshake { raw: Vec<u8> },

    #[error("Expected ACK or NAK from MaxiGauge but got byte 0x{byte:02X} in {raw:?}")]
    UnknownHandshake { byte: u8, raw: Vec<u8> },

    #[error("MaxiGauge rejected the command: system error '{system_error}', gauge error '{gauge_error}'")]
    InstrumentNegativeAcknowledge {
        system_error: String,
        gauge_error: String,
    },

    #[error("Unknown {category} error code {code}")]
    UnknownErrorCode { category: ErrorCategory, code: i64 },

    #[error("Malformed error payload: {line:?}")]
    MalformedErrorPayload { line: String },

    #[error("Problem interpreting the returned line {line:?}: {reason}")]
    UnparsablePressureLine { line: String, reason: String },

    #[error("Unexpected reply to {command}: {line:?}")]
    UnparsableReply { command: String, line: String },

    #[error("Sensor channel must be between 1 and 6, got {0}")]
    InvalidChannel(i64),

    #[error("Pressure status must be between 0 and 6, got {0}")]
    InvalidStatus(i64),

    #[error("Continuous sampler was already started")]
    SamplerAlreadyStarted,
}

impl GaugeError {
    /// Whether the error was produced by the protocol exchange itself (as opposed to
    /// a broken transport). Sampling cycles that fail this way are simply skipped.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            GaugeError::MalformedHandshake { .. }
                | GaugeError::UnknownHandshake { .. }
                | GaugeError::InstrumentNegativeAcknowledge { .. }
                | GaugeError::UnknownErrorCode { .. }
                | GaugeError::MalformedErrorPayload { .. }
                | GaugeError::UnparsablePressureLine { .. }
                | GaugeError::UnparsableReply { .. }
                | GaugeError::InvalidChannel(_)
                | GaugeError::InvalidStatus(_)
        )
    }
}
