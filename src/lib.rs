//! # MaxiGauge
//!
//! Driver for the Pfeiffer Vacuum MaxiGauge TPG256A six-channel vacuum gauge
//! controller, plus a background sampler that writes time-averaged pressures to
//! a plain text log.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: wire format. Control bytes, the mnemonic catalogue, command
//!   framing and the pure decoders for handshakes, error payloads and pressure
//!   lines. The static error-code tables live in `protocol::codes`.
//! - **`transport`**: the `Transport` trait the protocol runs over, with a
//!   `tokio-serial` implementation and an in-memory simulated controller.
//! - **`session`**: one full request/response exchange (command, handshake,
//!   enquiries) over an exclusively owned transport.
//! - **`reading`**: validated `PressureReading` values and sensor status codes.
//! - **`driver`**: the `MaxiGauge` façade with typed operations
//!   (`pressure`, `pressures`, display contrast, keyboard test).
//! - **`sampler`**: `ContinuousSampler`, the cancellable periodic task with
//!   drift-corrected pacing and windowed averaging.
//! - **`pressure_log`**: the append-only, fsync'd averaged log.
//! - **`config`**: Figment-based configuration (TOML file + environment).
//! - **`logging`**: `tracing-subscriber` initialisation for binaries.
//! - **`error`**: the crate-wide `GaugeError` enum.
//!
//! ## Quick start
//!
//! ```no_run
//! use maxigauge::config::GaugeConfig;
//! use maxigauge::MaxiGauge;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GaugeConfig::load()?;
//! let gauge = MaxiGauge::connect(&config.connection).await?;
//! let reading = gauge.pressure(1).await?;
//! println!("{}", reading);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod pressure_log;
pub mod protocol;
pub mod reading;
pub mod sampler;
pub mod session;
pub mod transport;

pub use driver::MaxiGauge;
pub use error::{GaugeError, GaugeResult};
pub use reading::{Channel, PressureReading, SensorStatus};
pub use sampler::{ContinuousSampler, SamplerConfig, SamplerState};
