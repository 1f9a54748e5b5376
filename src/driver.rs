//! Pfeiffer Vacuum MaxiGauge TPG256A driver
//!
//! Reference: MaxiGauge TPG256A operating manual, "Computer interface"
//!
//! Protocol Overview:
//! - Format: ASCII mnemonics, CR LF terminated, see [`crate::protocol`]
//! - Baud: 9600, 8N1, no flow control
//! - Every command is acknowledged, data follows only after `<ENQ>`
//! - Six gauge channels, queried one at a time with `PR1`..`PR6`
//!
//! The driver keeps its [`CommandSession`] behind an async mutex, so it can be
//! shared (`Arc<MaxiGauge<_>>`) between a foreground caller and the continuous
//! sampler without two exchanges ever interleaving on the wire.
//!
//! # Usage
//!
//! ```no_run
//! use maxigauge::config::ConnectionConfig;
//! use maxigauge::MaxiGauge;
//!
//! # async fn example() -> maxigauge::GaugeResult<()> {
//! let gauge = MaxiGauge::connect(&ConnectionConfig::default()).await?;
//! for reading in gauge.pressures().await? {
//!     println!("{}", reading);
//! }
//! gauge.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{GaugeError, GaugeResult};
use crate::protocol::{decode_pressure_line, Command, Mnemonic};
use crate::reading::{Channel, PressureReading, CHANNEL_COUNT};
use crate::session::CommandSession;
use crate::transport::Transport;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[cfg(feature = "serial")]
use crate::config::ConnectionConfig;
#[cfg(feature = "serial")]
use crate::transport::{SerialTransport, SerialTransportBuilder};

/// Number of front panel keys reported by the keyboard test.
pub const KEY_COUNT: usize = 5;

/// Driver for one TPG256A controller.
#[derive(Debug)]
pub struct MaxiGauge<T> {
    session: Mutex<CommandSession<T>>,
}

#[cfg(feature = "serial")]
impl MaxiGauge<SerialTransport> {
    /// Open the serial port described by `config` and wrap it in a driver.
    ///
    /// # Errors
    /// [`GaugeError::ConnectionUnavailable`] if the port cannot be opened.
    pub async fn connect(config: &ConnectionConfig) -> GaugeResult<Self> {
        let transport = SerialTransportBuilder::from_config(config).open().await?;
        info!(resource = %config.resource, baud = config.baud_rate, "connected to MaxiGauge");
        Ok(Self::new(transport))
    }
}

impl<T: Transport> MaxiGauge<T> {
    /// Wrap an already open transport.
    pub fn new(transport: T) -> Self {
        Self {
            session: Mutex::new(CommandSession::new(transport)),
        }
    }

    /// Status and pressure of one channel (1..=6).
    ///
    /// # Errors
    /// [`GaugeError::InvalidChannel`] before anything is sent for a channel outside
    /// `1..=6`; otherwise any exchange or decode failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn pressure(&self, channel: i64) -> GaugeResult<PressureReading> {
        let channel = Channel::new(channel)?;
        self.read_channel(channel).await
    }

    /// Readings of all six channels in ascending channel order.
    ///
    /// Every channel is queried even if an earlier one fails; the first failure
    /// is then returned.
    pub async fn pressures(&self) -> GaugeResult<Vec<PressureReading>> {
        let mut readings = Vec::with_capacity(CHANNEL_COUNT);
        let mut first_error = None;

        for channel in Channel::all() {
            match self.read_channel(channel).await {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    debug!(channel = channel.number(), error = %e, "channel query failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(readings),
        }
    }

    /// Current display contrast (0..=20 on the instrument).
    pub async fn display_contrast(&self) -> GaugeResult<i64> {
        self.query_integer(Command::new(Mnemonic::Dcc)).await
    }

    /// Set the display contrast and return the value the instrument reports back.
    ///
    /// The value is not checked here; the instrument rejects out-of-range values
    /// with a NAK, which surfaces as [`GaugeError::InstrumentNegativeAcknowledge`].
    pub async fn set_display_contrast(&self, contrast: i64) -> GaugeResult<i64> {
        let value = self
            .query_integer(Command::new(Mnemonic::Dcc).with_arg(contrast))
            .await?;
        info!(contrast = value, "display contrast set");
        Ok(value)
    }

    /// Keys pressed since the controller was switched on, index 0 = key 1.
    pub async fn pressed_keys(&self) -> GaugeResult<[bool; KEY_COUNT]> {
        let mask = self.query_integer(Command::new(Mnemonic::Tkb)).await?;
        let mut keys = [false; KEY_COUNT];
        for (bit, key) in keys.iter_mut().enumerate() {
            *key = mask & (1 << bit) != 0;
        }
        Ok(keys)
    }

    /// Short human-readable summary of the display contrast and the keys.
    pub async fn check_device(&self) -> GaugeResult<String> {
        let contrast = self.display_contrast().await?;
        let keys = self.pressed_keys().await?;

        let pressed: Vec<String> = keys
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .map(|(i, _)| (i + 1).to_string())
            .collect();
        let pressed = if pressed.is_empty() {
            "none".to_string()
        } else {
            pressed.join(", ")
        };

        Ok(format!(
            "The Display Contrast is currently set to {} (out of 20).\n\
             Keys pressed since MaxiGauge was switched on: {} (out of 1,2,3,4,5).",
            contrast, pressed
        ))
    }

    /// Run an arbitrary exchange, returning the raw reply lines.
    ///
    /// Escape hatch for mnemonics without a typed wrapper.
    pub async fn send(&self, command: &Command, expected_reply_count: usize) -> GaugeResult<Vec<String>> {
        self.session
            .lock()
            .await
            .execute(command, expected_reply_count)
            .await
    }

    /// Send a mnemonic given as text, with optional comma-separated arguments.
    ///
    /// Covers everything the typed operations do not, e.g. `send_raw("SEN", &["0", "2"], 1)`
    /// or an addressed query such as `send_raw("CA1", &[], 1)`. The text is sent as
    /// is; the instrument rejects unknown mnemonics with a NAK.
    pub async fn send_raw<S: AsRef<str>>(
        &self,
        mnemonic: &str,
        args: &[S],
        expected_reply_count: usize,
    ) -> GaugeResult<Vec<String>> {
        self.session
            .lock()
            .await
            .execute_raw(mnemonic, args, expected_reply_count)
            .await
    }

    /// Close the transport.
    pub async fn close(self) -> GaugeResult<()> {
        let mut session = self.session.into_inner();
        session.close().await?;
        info!("MaxiGauge connection closed");
        Ok(())
    }

    async fn read_channel(&self, channel: Channel) -> GaugeResult<PressureReading> {
        let command = Command::pressure(channel);
        let line = self.single_line(&command).await?;
        decode_pressure_line(&line, channel)
    }

    async fn query_integer(&self, command: Command) -> GaugeResult<i64> {
        let line = self.single_line(&command).await?;
        line.trim().parse().map_err(|_| GaugeError::UnparsableReply {
            command: command.to_string(),
            line,
        })
    }

    async fn single_line(&self, command: &Command) -> GaugeResult<String> {
        let mut lines = self.send(command, 1).await?;
        lines.pop().ok_or_else(|| GaugeError::UnparsableReply {
            command: command.to_string(),
            line: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorStatus;
    use crate::transport::{MockHandle, MockTransport};

    fn gauge() -> (MaxiGauge<MockTransport>, MockHandle) {
        let transport = MockTransport::new();
        let handle = transport.handle();
        (MaxiGauge::new(transport), handle)
    }

    #[tokio::test]
    async fn pressure_decodes_reading_for_channel() {
        let (gauge, handle) = gauge();
        handle.set_reading(3, 0, 1.234e-6);

        let reading = gauge.pressure(3).await.unwrap();
        assert_eq!(reading.channel().number(), 3);
        assert_eq!(reading.status(), SensorStatus::Ok);
        assert_eq!(reading.pressure(), 1.234e-6);
    }

    #[tokio::test]
    async fn invalid_channel_is_rejected_before_any_io() {
        let (gauge, handle) = gauge();

        for channel in [0, 7, -3] {
            assert!(matches!(
                gauge.pressure(channel).await,
                Err(GaugeError::InvalidChannel(n)) if n == channel
            ));
        }
        assert!(handle.frames().is_empty());
    }

    #[tokio::test]
    async fn pressures_queries_channels_in_ascending_order() {
        let (gauge, handle) = gauge();

        let readings = gauge.pressures().await.unwrap();
        let channels: Vec<u8> = readings.iter().map(|r| r.channel().number()).collect();
        assert_eq!(channels, vec![1, 2, 3, 4, 5, 6]);

        let commands: Vec<Vec<u8>> = handle
            .frames()
            .into_iter()
            .filter(|frame| frame.as_slice() != [0x05])
            .collect();
        let expected: Vec<Vec<u8>> = (1..=6).map(|n| format!("PR{}\r\n", n).into_bytes()).collect();
        assert_eq!(commands, expected);
    }

    #[tokio::test]
    async fn malformed_channel_fails_pressures_but_every_channel_is_queried() {
        let (gauge, handle) = gauge();
        handle.reply_next("PR4", "garbage");

        let err = gauge.pressures().await.unwrap_err();
        assert!(matches!(err, GaugeError::UnparsablePressureLine { .. }));
        // Six commands plus six enquiries.
        assert_eq!(handle.frames().len(), 12);

        // The fault was one-shot.
        assert_eq!(gauge.pressures().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn rejected_contrast_setting_names_both_errors() {
        let (gauge, handle) = gauge();
        handle.reject_next("DCC", 1, 0);

        match gauge.set_display_contrast(10).await {
            Err(GaugeError::InstrumentNegativeAcknowledge {
                system_error,
                gauge_error,
            }) => {
                assert_eq!(system_error, "Watchdog has responded");
                assert_eq!(gauge_error, "No error");
            }
            other => panic!("expected NAK, got {:?}", other),
        }
        assert_eq!(handle.frames()[0], b"DCC,10\r\n".to_vec());
    }

    #[tokio::test]
    async fn contrast_query_and_setting() {
        let (gauge, handle) = gauge();
        handle.set_contrast(7);

        assert_eq!(gauge.display_contrast().await.unwrap(), 7);
        assert_eq!(gauge.set_display_contrast(14).await.unwrap(), 14);
        assert_eq!(handle.contrast(), 14);
    }

    #[tokio::test]
    async fn non_integer_reply_is_unparsable() {
        let (gauge, handle) = gauge();
        handle.reply_next("DCC", "bright");

        assert!(matches!(
            gauge.display_contrast().await,
            Err(GaugeError::UnparsableReply { line, .. }) if line == "bright"
        ));
    }

    #[tokio::test]
    async fn key_bitmask_maps_bit_i_to_key_i_plus_one() {
        let (gauge, handle) = gauge();
        handle.set_keys(0b10101);

        assert_eq!(
            gauge.pressed_keys().await.unwrap(),
            [true, false, true, false, true]
        );
    }

    #[tokio::test]
    async fn check_device_summarises_contrast_and_keys() {
        let (gauge, handle) = gauge();
        handle.set_contrast(12);
        handle.set_keys(0b00110);

        let summary = gauge.check_device().await.unwrap();
        assert!(summary.contains("set to 12 (out of 20)"));
        assert!(summary.contains("switched on: 2, 3 "));
    }

    #[tokio::test]
    async fn raw_mnemonic_is_framed_and_answered() {
        let (gauge, handle) = gauge();

        let lines = gauge.send_raw("DCC", &["12"], 1).await.unwrap();
        assert_eq!(lines, vec!["12".to_string()]);
        assert_eq!(handle.frames()[0], b"DCC,12\r\n".to_vec());
        assert_eq!(handle.contrast(), 12);
    }

    #[tokio::test]
    async fn raw_unknown_mnemonic_is_a_syntax_error() {
        let (gauge, _handle) = gauge();

        match gauge.send_raw::<&str>("XYZ", &[], 1).await {
            Err(GaugeError::InstrumentNegativeAcknowledge { system_error, .. }) => {
                assert_eq!(system_error, "Syntax error");
            }
            other => panic!("expected NAK, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_releases_transport() {
        let (gauge, handle) = gauge();
        gauge.close().await.unwrap();
        assert!(handle.is_closed());
    }
}
