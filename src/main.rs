//! CLI Entry Point for maxigauge
//!
//! Provides command-line access to a MaxiGauge TPG256A:
//! - One-shot queries (device check, pressures, display contrast)
//! - Live display of all six channels
//! - Continuous recording of averaged pressures to a text log
//!
//! # Usage
//!
//! ```bash
//! maxigauge --port /dev/ttyUSB0 read
//! maxigauge read --channel 3 --json
//! maxigauge contrast 10
//! maxigauge send TID
//! maxigauge watch --interval 1s
//! maxigauge record --interval 500ms --average 10 --log tpg256a-data.txt
//! maxigauge --mock record --average 2
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use maxigauge::config::{ConnectionConfig, GaugeConfig, DEFAULT_CONFIG_PATH};
use maxigauge::logging::{self, OutputFormat, TracingConfig};
use maxigauge::pressure_log::{format_scientific, format_timestamp};
use maxigauge::sampler::{ContinuousSampler, SamplerState};
#[cfg(feature = "serial")]
use maxigauge::transport::SerialTransportBuilder;
use maxigauge::transport::{MockTransport, Transport};
use maxigauge::{MaxiGauge, PressureReading};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

type DynGauge = MaxiGauge<Box<dyn Transport>>;

#[derive(Parser)]
#[command(name = "maxigauge")]
#[command(about = "Pfeiffer Vacuum MaxiGauge TPG256A driver", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port, overrides connection.resource
    #[arg(long, global = true)]
    port: Option<String>,

    /// Talk to a simulated controller instead of a serial port
    #[arg(long, global = true)]
    mock: bool,

    /// Log level, overrides application.log_level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print display contrast and pressed keys
    Check,

    /// Read one channel or all six
    Read {
        /// Channel number (1-6); all channels if omitted
        #[arg(long)]
        channel: Option<i64>,

        /// Print readings as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query the display contrast, or set it when a value is given
    Contrast {
        /// New contrast (0-20)
        value: Option<i64>,
    },

    /// Send a raw mnemonic and print the reply lines
    Send {
        /// Mnemonic, including a channel suffix where needed (e.g. "TID", "CA1")
        mnemonic: String,

        /// Comma-separated parameters
        #[arg(value_delimiter = ',')]
        args: Vec<String>,

        /// Number of reply lines to enquire
        #[arg(long, default_value_t = 1)]
        replies: usize,
    },

    /// Print all six pressures at a fixed interval until Ctrl+C
    Watch {
        /// Time between lines (e.g. "1s", "500ms")
        #[arg(long, value_parser = parse_duration, default_value = "1s")]
        interval: Duration,
    },

    /// Record averaged pressures to the log until Ctrl+C
    Record {
        /// Sampling interval, overrides sampling.interval
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Samples per averaged record, overrides sampling.averaging_window
        #[arg(long)]
        average: Option<usize>,

        /// Log file, overrides sampling.log_path
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GaugeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(port) = &cli.port {
        config.connection.resource = port.clone();
    }
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let tracing_config = TracingConfig::from_gauge_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_format(cli.log_format);
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    let gauge = open_gauge(&config, cli.mock).await?;

    match cli.command {
        Commands::Check => {
            println!("{}", gauge.check_device().await?);
            close(gauge).await
        }
        Commands::Read { channel, json } => {
            let readings = match channel {
                Some(channel) => vec![gauge.pressure(channel).await?],
                None => gauge.pressures().await?,
            };
            print_readings(&readings, json)?;
            close(gauge).await
        }
        Commands::Contrast { value } => {
            let contrast = match value {
                Some(value) => gauge.set_display_contrast(value).await?,
                None => gauge.display_contrast().await?,
            };
            println!("Display contrast: {} (out of 20)", contrast);
            close(gauge).await
        }
        Commands::Send {
            mnemonic,
            args,
            replies,
        } => {
            for line in gauge.send_raw(&mnemonic, &args, replies).await? {
                println!("{}", line);
            }
            close(gauge).await
        }
        Commands::Watch { interval } => watch(gauge, interval).await,
        Commands::Record {
            interval,
            average,
            log,
        } => {
            let mut sampling = config.sampling.clone();
            if let Some(interval) = interval {
                sampling.interval = interval;
            }
            if let Some(average) = average {
                sampling.averaging_window = average;
            }
            if let Some(log) = log {
                sampling.log_path = log;
            }
            record(gauge, sampling).await
        }
    }
}

async fn open_gauge(config: &GaugeConfig, mock: bool) -> Result<DynGauge> {
    let transport: Box<dyn Transport> = if mock {
        info!("using simulated MaxiGauge");
        Box::new(MockTransport::new())
    } else {
        open_serial(&config.connection).await?
    };
    Ok(MaxiGauge::new(transport))
}

#[cfg(feature = "serial")]
async fn open_serial(connection: &ConnectionConfig) -> Result<Box<dyn Transport>> {
    let transport = SerialTransportBuilder::from_config(connection)
        .open()
        .await
        .with_context(|| format!("Failed to open MaxiGauge at {}", connection.resource))?;
    info!(resource = %connection.resource, "connected to MaxiGauge");
    Ok(Box::new(transport))
}

#[cfg(not(feature = "serial"))]
async fn open_serial(connection: &ConnectionConfig) -> Result<Box<dyn Transport>> {
    bail!(
        "Serial support not compiled in, cannot open {}; rebuild with --features serial or use --mock",
        connection.resource
    )
}

fn print_readings(readings: &[PressureReading], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(readings)?);
    } else {
        for reading in readings {
            println!("{}", reading);
        }
    }
    Ok(())
}

/// One `watch` line: timestamp then a field per channel, empty where unusable.
fn format_line(readings: &[PressureReading]) -> String {
    let values: Vec<String> = readings
        .iter()
        .map(|r| format_scientific(r.value_for_averaging()))
        .collect();
    format!("{}, {}", format_timestamp(Utc::now()), values.join(", "))
}

async fn watch(gauge: DynGauge, interval: Duration) -> Result<()> {
    if interval.is_zero() {
        bail!("--interval must be greater than zero");
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match gauge.pressures().await {
                    Ok(readings) => println!("{}", format_line(&readings)),
                    Err(e) => warn!(error = %e, "reading skipped"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("interrupt received, stopping");
                break;
            }
        }
    }

    close(gauge).await
}

async fn record(gauge: DynGauge, sampling: maxigauge::SamplerConfig) -> Result<()> {
    if sampling.interval.is_zero() {
        bail!("--interval must be greater than zero");
    }
    if sampling.averaging_window == 0 {
        warn!("averaging window is 0, nothing will be written to the log");
    }

    let gauge = Arc::new(gauge);
    let mut sampler = ContinuousSampler::new(Arc::clone(&gauge), sampling.clone());
    sampler.start()?;
    let watcher = sampler.stop_on_ctrl_c();

    println!(
        "Recording every {} to {} (average of {}), Ctrl+C to stop",
        humantime_serde::re::humantime::format_duration(sampling.interval),
        sampling.log_path.display(),
        sampling.averaging_window
    );

    let mut latest = sampler.subscribe();
    let mut state = sampler.watch_state();
    loop {
        tokio::select! {
            changed = latest.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = latest.borrow_and_update().clone();
                if let Some(readings) = snapshot {
                    println!("{}", format_line(&readings));
                }
            }
            _ = state.wait_for(|s| *s == SamplerState::Stopped) => break,
        }
    }

    sampler.wait_stopped().await;
    watcher.abort();
    info!(
        samples = sampler.samples_taken(),
        skipped = sampler.skipped_cycles(),
        records = sampler.records_written(),
        "recording finished"
    );
    drop(sampler);

    match Arc::try_unwrap(gauge) {
        Ok(gauge) => close(gauge).await,
        Err(_) => Ok(()),
    }
}

async fn close(gauge: DynGauge) -> Result<()> {
    gauge.close().await.context("Failed to close MaxiGauge")
}
