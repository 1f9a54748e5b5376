//! Append-only text log of averaged pressures.
//!
//! One record per line:
//!
//! ```text
//! 1700000000.123, 2.000E-03, , 1.500E-06, 1.000E+03, 4.200E-07, 5.000E-05
//! ```
//!
//! The timestamp is Unix seconds with millisecond precision, followed by one
//! field per channel. A channel without a usable value leaves its field empty.
//! Every record is flushed and synced before [`PressureLog::append`] returns,
//! so a crash loses at most the record being written.

use crate::error::GaugeResult;
use crate::reading::CHANNEL_COUNT;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tpg256a-data.txt";

/// One averaged record: representative time plus a mean per channel (NaN if none).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    /// Time of the sample in the middle of the averaged window
    pub timestamp: DateTime<Utc>,
    /// Mean pressure per channel in mbar, channel 1 first
    pub values: [f64; CHANNEL_COUNT],
}

/// Lazily opened append-only log file.
#[derive(Debug)]
pub struct PressureLog {
    path: PathBuf,
    file: Option<File>,
    records: u64,
}

impl PressureLog {
    /// Prepare a log at `path`. Nothing is created until the first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            records: 0,
        }
    }

    /// Where records are appended.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, then flush and sync it to disk.
    pub async fn append(&mut self, record: &LogRecord) -> GaugeResult<()> {
        let line = format_record(record);

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?;
                info!(path = %self.path.display(), "opened pressure log");
                self.file.insert(file)
            }
        };

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        self.records += 1;
        debug!(path = %self.path.display(), record = line.trim_end(), "appended average");
        Ok(())
    }

    /// Flush and close the file. A later [`PressureLog::append`] reopens it.
    pub async fn close(&mut self) -> GaugeResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
            info!(path = %self.path.display(), records = self.records, "closed pressure log");
        }
        Ok(())
    }
}

/// Render a record as one log line, including the trailing newline.
pub fn format_record(record: &LogRecord) -> String {
    let mut line = format_timestamp(record.timestamp);
    for value in record.values {
        line.push_str(", ");
        line.push_str(&format_scientific(value));
    }
    line.push('\n');
    line
}

/// Unix seconds with three decimals.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}.{:03}",
        timestamp.timestamp(),
        timestamp.timestamp_subsec_millis().min(999)
    )
}

/// Scientific notation with three decimals and a signed, two-digit exponent
/// (`2.000E-03`). NaN renders as an empty string.
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return String::new();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }

    let raw = format!("{:.3E}", value);
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exponent.abs())
        }
        None => raw,
    }
}
