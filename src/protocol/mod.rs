//! MaxiGauge TPG256A wire protocol
//!
//! Reference: MaxiGauge TPG256A operating manual, "Computer interface".
//!
//! Protocol Overview:
//! - Format: ASCII mnemonic commands over RS-232, 9600 8N1 by default
//! - Terminator: CR LF
//! - Every command is answered with a handshake line `<ACK|NAK><CR><LF>`
//! - Data is only transmitted after the host sends `<ENQ>`
//! - Pressure replies: `<status>,<mantissa>E<sign><exponent>` (e.g. `0,1.234E-06`)
//! - Error replies (after NAK): `<system bitmask>,<gauge bitmask>`
//!
//! The decoders in this module are pure: they never touch the transport.

pub mod codes;
pub mod command;

pub use command::{encode_command, Command, Control, Mnemonic};

use crate::error::{ErrorCategory, GaugeError, GaugeResult};
use crate::reading::{Channel, PressureReading};

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Trailer of a handshake line: one acknowledgement byte plus the terminator.
const HANDSHAKE_TRAILER_LEN: usize = LINE_TERMINATOR.len() + 1;

/// Polarity of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledge {
    /// ACK: the command was accepted
    Positive,
    /// NAK: the command was rejected, an error report is pending
    Negative,
}

/// A decoded handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Whether the instrument accepted the command.
    pub ack: Acknowledge,
    /// Bytes preceding the acknowledgement byte (usually empty).
    pub content: Vec<u8>,
}

/// Decode a handshake line.
///
/// The acknowledgement byte sits at a fixed offset from the end of the line
/// (`len - 3`), directly in front of the CR LF terminator.
///
/// # Errors
/// - [`GaugeError::MalformedHandshake`] if the line is shorter than three bytes
///   (some controllers only send a bare terminator after `DCC`)
/// - [`GaugeError::UnknownHandshake`] if the byte is neither ACK nor NAK
pub fn decode_handshake(raw: &[u8]) -> GaugeResult<Handshake> {
    if raw.len() < HANDSHAKE_TRAILER_LEN {
        return Err(GaugeError::MalformedHandshake { raw: raw.to_vec() });
    }

    let split = raw.len() - HANDSHAKE_TRAILER_LEN;
    let ack = match Control::from_byte(raw[split]) {
        Some(Control::Nak) => Acknowledge::Negative,
        Some(Control::Ack) => Acknowledge::Positive,
        _ => {
            return Err(GaugeError::UnknownHandshake {
                byte: raw[split],
                raw: raw.to_vec(),
            })
        }
    };

    Ok(Handshake {
        ack,
        content: raw[..split].to_vec(),
    })
}

/// Remove a trailing CR LF (or a lone CR or LF) from a received line.
pub fn strip_terminator(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Decoded names of the two error bitmasks sent after a NAK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    /// Name from the system error table
    pub system_error: &'static str,
    /// Name from the gauge error table
    pub gauge_error: &'static str,
}

impl ErrorReport {
    /// Turn the report into the error surfaced to the caller of the exchange.
    pub fn into_error(self) -> GaugeError {
        GaugeError::InstrumentNegativeAcknowledge {
            system_error: self.system_error.to_string(),
            gauge_error: self.gauge_error.to_string(),
        }
    }
}

/// Decode `<system>,<gauge>` into the names of both error codes.
///
/// # Errors
/// - [`GaugeError::MalformedErrorPayload`] if the line is not two integers
/// - [`GaugeError::UnknownErrorCode`] if a code is missing from its table,
///   negative values included
pub fn decode_error_payload(line: &str) -> GaugeResult<ErrorReport> {
    let malformed = || GaugeError::MalformedErrorPayload {
        line: line.to_string(),
    };

    let (system, gauge) = line.split_once(',').ok_or_else(malformed)?;
    let system: i64 = system.trim().parse().map_err(|_| malformed())?;
    let gauge: i64 = gauge.trim().parse().map_err(|_| malformed())?;

    let system_error = codes::system_error_name(system).ok_or(GaugeError::UnknownErrorCode {
        category: ErrorCategory::System,
        code: system,
    })?;
    let gauge_error = codes::gauge_error_name(gauge).ok_or(GaugeError::UnknownErrorCode {
        category: ErrorCategory::Gauge,
        code: gauge,
    })?;

    Ok(ErrorReport {
        system_error,
        gauge_error,
    })
}

/// Decode a `PR<n>` reply (`<status>,<pressure>`) for `channel`.
///
/// The first field is the status code and the last one the pressure.
///
/// # Errors
/// [`GaugeError::UnparsablePressureLine`] if either field fails to parse or the
/// values do not form a valid [`PressureReading`].
pub fn decode_pressure_line(line: &str, channel: Channel) -> GaugeResult<PressureReading> {
    let unparsable = |reason: String| GaugeError::UnparsablePressureLine {
        line: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.trim().split(',').collect();
    let (status, pressure) = match fields.as_slice() {
        [first, .., last] => (*first, *last),
        _ => return Err(unparsable("expected <status>,<pressure>".into())),
    };

    let status: i64 = status
        .trim()
        .parse()
        .map_err(|e| unparsable(format!("status {:?}: {}", status, e)))?;
    let pressure: f64 = pressure
        .trim()
        .parse()
        .map_err(|e| unparsable(format!("pressure {:?}: {}", pressure, e)))?;

    PressureReading::new(i64::from(channel.number()), status, pressure)
        .map_err(|e| unparsable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorStatus;

    const ACK: u8 = Control::Ack.byte();
    const NAK: u8 = Control::Nak.byte();

    #[test]
    fn short_handshake_is_malformed() {
        for raw in [&b""[..], &b"\n"[..], &b"\r\n"[..]] {
            assert!(matches!(
                decode_handshake(raw),
                Err(GaugeError::MalformedHandshake { .. })
            ));
        }
    }

    #[test]
    fn ack_at_offset_is_positive() {
        let hs = decode_handshake(&[ACK, b'\r', b'\n']).unwrap();
        assert_eq!(hs.ack, Acknowledge::Positive);
        assert!(hs.content.is_empty());
    }

    #[test]
    fn nak_at_offset_is_negative() {
        let hs = decode_handshake(&[NAK, b'\r', b'\n']).unwrap();
        assert_eq!(hs.ack, Acknowledge::Negative);
    }

    #[test]
    fn leading_bytes_are_kept_as_content() {
        let hs = decode_handshake(&[b'X', b'Y', ACK, b'\r', b'\n']).unwrap();
        assert_eq!(hs.ack, Acknowledge::Positive);
        assert_eq!(hs.content, b"XY");
    }

    #[test]
    fn other_byte_at_offset_is_unknown() {
        let err = decode_handshake(b"OK\r\n").unwrap_err();
        assert!(matches!(err, GaugeError::UnknownHandshake { byte: b'K', .. }));
    }

    #[test]
    fn error_payload_names_both_codes() {
        let report = decode_error_payload("1,0").unwrap();
        assert_eq!(report.system_error, "Watchdog has responded");
        assert_eq!(report.gauge_error, "No error");

        match report.into_error() {
            GaugeError::InstrumentNegativeAcknowledge {
                system_error,
                gauge_error,
            } => {
                assert_eq!(system_error, "Watchdog has responded");
                assert_eq!(gauge_error, "No error");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn error_payload_with_unknown_code_fails() {
        assert!(matches!(
            decode_error_payload("3,0"),
            Err(GaugeError::UnknownErrorCode {
                category: ErrorCategory::System,
                code: 3
            })
        ));
        assert!(matches!(
            decode_error_payload("0,64"),
            Err(GaugeError::UnknownErrorCode {
                category: ErrorCategory::Gauge,
                code: 64
            })
        ));
    }

    #[test]
    fn negative_error_code_is_unknown() {
        assert!(matches!(
            decode_error_payload("-1,0"),
            Err(GaugeError::UnknownErrorCode {
                category: ErrorCategory::System,
                code: -1
            })
        ));
        assert!(matches!(
            decode_error_payload("0,-8"),
            Err(GaugeError::UnknownErrorCode {
                category: ErrorCategory::Gauge,
                code: -8
            })
        ));
    }

    #[test]
    fn error_payload_must_be_two_integers() {
        assert!(matches!(
            decode_error_payload("4096"),
            Err(GaugeError::MalformedErrorPayload { .. })
        ));
        assert!(matches!(
            decode_error_payload("x,0"),
            Err(GaugeError::MalformedErrorPayload { .. })
        ));
    }

    #[test]
    fn pressure_line_decodes() {
        let channel = Channel::new(3).unwrap();
        let reading = decode_pressure_line("0,1.234E-06", channel).unwrap();
        assert_eq!(reading.channel(), channel);
        assert_eq!(reading.status(), SensorStatus::Ok);
        assert_eq!(reading.pressure(), 1.234e-6);
    }

    #[test]
    fn pressure_line_accepts_signed_exponent_and_padding() {
        let channel = Channel::new(1).unwrap();
        let reading = decode_pressure_line(" 2, +1.0000E+03", channel).unwrap();
        assert_eq!(reading.status(), SensorStatus::Overrange);
        assert_eq!(reading.pressure(), 1000.0);
    }

    #[test]
    fn garbage_pressure_lines_are_rejected() {
        let channel = Channel::new(4).unwrap();
        for line in ["", "0", "a,1.0E-03", "0,abc", "9,1.0E-03"] {
            assert!(
                matches!(
                    decode_pressure_line(line, channel),
                    Err(GaugeError::UnparsablePressureLine { .. })
                ),
                "line {:?} should not decode",
                line
            );
        }
    }

    #[test]
    fn terminator_is_stripped() {
        assert_eq!(strip_terminator(b"0,1.0E-03\r\n"), b"0,1.0E-03");
        assert_eq!(strip_terminator(b"12\n"), b"12");
        assert_eq!(strip_terminator(b"12"), b"12");
    }
}
