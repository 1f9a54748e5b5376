//! Control bytes and the mnemonic catalogue of the TPG256A.
//!
//! Reference: MaxiGauge TPG256A operating manual, "Computer interface"
//! (control characters p. 81, mnemonics p. 85).

use super::LINE_TERMINATOR;
use crate::reading::Channel;
use std::fmt;

/// ASCII control characters used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Control {
    /// End of text (Ctrl-C), resets the interface
    Etx = 0x03,
    /// Enquiry, requests transmission of the pending data line
    Enq = 0x05,
    /// Positive acknowledgement
    Ack = 0x06,
    /// Line feed
    Lf = 0x0A,
    /// Carriage return
    Cr = 0x0D,
    /// Negative acknowledgement
    Nak = 0x15,
    /// Escape
    Esc = 0x1B,
}

impl Control {
    /// Raw wire byte.
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte, if it is one of the protocol's control characters.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x03 => Some(Self::Etx),
            0x05 => Some(Self::Enq),
            0x06 => Some(Self::Ack),
            0x0A => Some(Self::Lf),
            0x0D => Some(Self::Cr),
            0x15 => Some(Self::Nak),
            0x1B => Some(Self::Esc),
            _ => None,
        }
    }
}

/// Instrument mnemonics.
///
/// Mnemonics marked "per channel" take the channel (or relay) number as a
/// suffix, e.g. `PR3` queries channel 3. [`Command::pressure`] builds the only
/// typed addressed command; the others go out as raw text through
/// [`crate::MaxiGauge::send_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    /// Baud rate
    Bau,
    /// Calibration factor, per channel
    Ca,
    /// Measurement point names
    Cid,
    /// Display control bargraph
    Dcb,
    /// Display control contrast
    Dcc,
    /// Display control digits
    Dcd,
    /// Display control screensave
    Dcs,
    /// Degas
    Dgs,
    /// Error status
    Err,
    /// Filter time constant
    Fil,
    /// Full scale range of linear sensors
    Fsr,
    /// Parameter setup lock
    Loc,
    /// Node (device) address for RS485
    Nad,
    /// Offset correction
    Ofc,
    /// Program number
    Pnr,
    /// Status and pressure, per channel
    Pr,
    /// Underrange control
    Puc,
    /// Interface
    Rsx,
    /// Save default
    Sav,
    /// Sensor control, per channel
    Sc,
    /// Sensor on/off
    Sen,
    /// Set point control source, per relay
    Sp,
    /// Set point status
    Sps,
    /// Test A/D converter identification inputs
    Tai,
    /// Test A/D converter measurement value inputs
    Tas,
    /// Display test
    Tdi,
    /// EEPROM test
    Tee,
    /// EPROM test
    Tep,
    /// Sensor identification
    Tid,
    /// Keyboard test
    Tkb,
    /// RAM test
    Tra,
    /// Unit of measurement
    Uni,
    /// Watchdog and system error control
    Wdt,
}

impl Mnemonic {
    /// Wire text of the mnemonic, without any channel suffix.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bau => "BAU",
            Self::Ca => "CA",
            Self::Cid => "CID",
            Self::Dcb => "DCB",
            Self::Dcc => "DCC",
            Self::Dcd => "DCD",
            Self::Dcs => "DCS",
            Self::Dgs => "DGS",
            Self::Err => "ERR",
            Self::Fil => "FIL",
            Self::Fsr => "FSR",
            Self::Loc => "LOC",
            Self::Nad => "NAD",
            Self::Ofc => "OFC",
            Self::Pnr => "PNR",
            Self::Pr => "PR",
            Self::Puc => "PUC",
            Self::Rsx => "RSX",
            Self::Sav => "SAV",
            Self::Sc => "SC",
            Self::Sen => "SEN",
            Self::Sp => "SP",
            Self::Sps => "SPS",
            Self::Tai => "TAI",
            Self::Tas => "TAS",
            Self::Tdi => "TDI",
            Self::Tee => "TEE",
            Self::Tep => "TEP",
            Self::Tid => "TID",
            Self::Tkb => "TKB",
            Self::Tra => "TRA",
            Self::Uni => "UNI",
            Self::Wdt => "WDT",
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command ready to be framed: mnemonic, optional channel suffix and
/// optional comma-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    mnemonic: Mnemonic,
    channel: Option<Channel>,
    args: Vec<String>,
}

impl Command {
    /// Bare query, e.g. `DCC`.
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            channel: None,
            args: Vec::new(),
        }
    }

    /// `PR<n>`: status and pressure of one channel.
    pub fn pressure(channel: Channel) -> Self {
        Self {
            mnemonic: Mnemonic::Pr,
            channel: Some(channel),
            args: Vec::new(),
        }
    }

    /// Append a parameter, turning the query into a setting.
    pub fn with_arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Mnemonic text including the channel suffix (`PR3`).
    pub fn head(&self) -> String {
        match self.channel {
            Some(channel) => format!("{}{}", self.mnemonic, channel),
            None => self.mnemonic.to_string(),
        }
    }

    /// Full framed request bytes.
    pub fn encode(&self) -> Vec<u8> {
        encode_command(&self.head(), &self.args[..])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.head())?;
        for arg in &self.args {
            write!(f, ",{}", arg)?;
        }
        Ok(())
    }
}

/// Frame a mnemonic: `MNEMONIC[,arg1,arg2...]<CR><LF>`.
///
/// Arguments are only formatted, never validated.
pub fn encode_command<S: AsRef<str>>(mnemonic: &str, args: &[S]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(mnemonic.len() + LINE_TERMINATOR.len() + 8);
    frame.extend_from_slice(mnemonic.as_bytes());
    for arg in args {
        frame.push(b',');
        frame.extend_from_slice(arg.as_ref().as_bytes());
    }
    frame.extend_from_slice(LINE_TERMINATOR);
    frame
}
