//! Pressure reading value types.
//!
//! A [`PressureReading`] is the validated result of one `PR<n>` query: the
//! channel it came from, the sensor status reported by the controller and the
//! pressure in millibar. Construction validates both closed ranges.

use crate::error::{GaugeError, GaugeResult};
use serde::Serialize;
use std::fmt;

/// Number of gauge channels on a TPG256A.
pub const CHANNEL_COUNT: usize = 6;

/// A gauge channel number in `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    /// Validate a channel number.
    ///
    /// # Errors
    /// Returns [`GaugeError::InvalidChannel`] outside `1..=6`.
    pub fn new(number: i64) -> GaugeResult<Self> {
        if (1..=CHANNEL_COUNT as i64).contains(&number) {
            Ok(Self(number as u8))
        } else {
            Err(GaugeError::InvalidChannel(number))
        }
    }

    /// All six channels in ascending order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT as u8).map(Channel)
    }

    /// The channel number (1-based).
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based position of this channel in a six-slot array.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensor status code reported alongside every pressure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SensorStatus {
    /// Measurement data okay
    Ok = 0,
    /// Pressure below the measurement range
    Underrange = 1,
    /// Pressure above the measurement range
    Overrange = 2,
    /// Sensor error
    SensorError = 3,
    /// Sensor switched off
    SensorOff = 4,
    /// No sensor connected
    NoSensor = 5,
    /// Sensor identification error
    IdentificationError = 6,
}

impl SensorStatus {
    /// Decode a status code.
    ///
    /// # Errors
    /// Returns [`GaugeError::InvalidStatus`] outside `0..=6`.
    pub fn from_code(code: i64) -> GaugeResult<Self> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Underrange),
            2 => Ok(Self::Overrange),
            3 => Ok(Self::SensorError),
            4 => Ok(Self::SensorOff),
            5 => Ok(Self::NoSensor),
            6 => Ok(Self::IdentificationError),
            other => Err(GaugeError::InvalidStatus(other)),
        }
    }

    /// Wire value of the status.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable status text, as printed in the instrument manual.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "Measurement data okay",
            Self::Underrange => "Underrange",
            Self::Overrange => "Overrange",
            Self::SensorError => "Sensor error",
            Self::SensorOff => "Sensor off",
            Self::NoSensor => "No sensor",
            Self::IdentificationError => "Identification error",
        }
    }

    /// Under- and overrange values are still meaningful bounds and take part in
    /// averaging; every other non-OK status does not.
    pub fn is_valid_for_averaging(self) -> bool {
        matches!(self, Self::Ok | Self::Underrange | Self::Overrange)
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One validated reading from a single gauge channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureReading {
    channel: Channel,
    status: SensorStatus,
    /// Pressure in mbar
    pressure: f64,
}

impl PressureReading {
    /// Build a reading from raw values.
    ///
    /// # Errors
    /// [`GaugeError::InvalidChannel`] or [`GaugeError::InvalidStatus`] when either
    /// value is outside its range.
    pub fn new(channel: i64, status: i64, pressure: f64) -> GaugeResult<Self> {
        Ok(Self {
            channel: Channel::new(channel)?,
            status: SensorStatus::from_code(status)?,
            pressure,
        })
    }

    /// Channel the reading was taken from.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Sensor status reported with the value.
    pub fn status(&self) -> SensorStatus {
        self.status
    }

    /// Pressure in mbar, as reported regardless of status.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    /// Pressure if the status allows it to be averaged, NaN otherwise.
    pub fn value_for_averaging(&self) -> f64 {
        if self.status.is_valid_for_averaging() {
            self.pressure
        } else {
            f64::NAN
        }
    }
}

impl fmt::Display for PressureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gauge #{}: Status {} ({}), Pressure: {:e} mbar",
            self.channel,
            self.status.code(),
            self.status.name(),
            self.pressure
        )
    }
}
