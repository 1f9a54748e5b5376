//! Continuous background sampling with averaging.
//!
//! A [`ContinuousSampler`] polls all six channels at a fixed interval on a
//! spawned Tokio task, buffers the usable values and every `averaging_window`
//! samples writes one averaged record to a [`PressureLog`].
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ──start()──► Running ──stop() / Ctrl+C / drop──► Stopping ──loop exits──► Stopped
//! ```
//!
//! `stop()`, the Ctrl+C watcher and `Drop` all cancel the same
//! [`CancellationToken`]. The loop checks the token once per cycle, never in
//! the middle of an exchange. A window that is still incomplete when the loop
//! exits is discarded, the log is then flushed and closed.
//!
//! # Failure handling
//!
//! A cycle in which any channel query fails is skipped: nothing is buffered,
//! the sample counter does not advance, and the next cycle runs on schedule.
//!
//! # Pacing
//!
//! Each cycle lasts `interval`, measured from its start. After the queries the
//! task always pauses [`MIN_PAUSE`], then sleeps in [`COARSE_STEP`] slices while
//! more than one slice remains, then sleeps the exact remainder. A cycle that
//! overruns its interval is followed immediately by the next one; missed cycles
//! are not made up.
//!
//! # Example
//!
//! ```no_run
//! use maxigauge::sampler::{ContinuousSampler, SamplerConfig};
//! use maxigauge::transport::MockTransport;
//! use maxigauge::MaxiGauge;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> maxigauge::GaugeResult<()> {
//! let gauge = Arc::new(MaxiGauge::new(MockTransport::new()));
//! let config = SamplerConfig {
//!     interval: Duration::from_secs(1),
//!     averaging_window: 10,
//!     ..SamplerConfig::default()
//! };
//!
//! let mut sampler = ContinuousSampler::new(gauge, config);
//! sampler.start()?;
//! sampler.stop_on_ctrl_c();
//! sampler.wait_stopped().await;
//! # Ok(())
//! # }
//! ```

use crate::driver::MaxiGauge;
use crate::error::{GaugeError, GaugeResult};
use crate::pressure_log::{LogRecord, PressureLog, DEFAULT_LOG_FILE};
use crate::reading::{PressureReading, CHANNEL_COUNT};
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause taken after every cycle, whatever the interval.
pub const MIN_PAUSE: Duration = Duration::from_millis(100);

/// Slice length of the coarse part of the pacing sleep.
pub const COARSE_STEP: Duration = Duration::from_millis(200);

/// Exit status used when Ctrl+C arrives while a stop is already in progress.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Sampling configuration (`[sampling]` section of the config file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Target period of one sampling cycle
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Samples reduced into one log record (0 disables the log)
    #[serde(default)]
    pub averaging_window: usize,
    /// File the averaged records are appended to
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            averaging_window: 0,
            log_path: default_log_path(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

/// Lifecycle of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SamplerState {
    /// Created, not started
    Idle,
    /// Loop is sampling
    Running,
    /// Stop requested, loop has not yet exited
    Stopping,
    /// Loop exited and the log is closed
    Stopped,
}

/// One buffered cycle: when it was taken and a value per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time the readings were collected
    pub timestamp: DateTime<Utc>,
    /// Pressure per channel (index 0 = channel 1), NaN where not usable
    pub values: [f64; CHANNEL_COUNT],
}

impl Sample {
    /// Build a sample from a set of readings.
    ///
    /// Readings whose status is not valid for averaging, and channels missing
    /// from `readings`, become NaN.
    pub fn from_readings(timestamp: DateTime<Utc>, readings: &[PressureReading]) -> Self {
        let mut values = [f64::NAN; CHANNEL_COUNT];
        for reading in readings {
            values[reading.channel().index()] = reading.value_for_averaging();
        }
        Self { timestamp, values }
    }
}

/// Reduce a full window to one record.
///
/// Each channel gets the plain arithmetic mean of its buffered values, so one
/// NaN makes that channel's mean NaN. The timestamp is the one of the sample at
/// index `len / 2`. Returns `None` for an empty window.
pub fn average_window(samples: &[Sample]) -> Option<LogRecord> {
    let middle = samples.get(samples.len() / 2)?;

    let mut values = [0.0; CHANNEL_COUNT];
    for sample in samples {
        for (sum, value) in values.iter_mut().zip(sample.values) {
            *sum += value;
        }
    }
    let count = samples.len() as f64;
    for value in &mut values {
        *value /= count;
    }

    Some(LogRecord {
        timestamp: middle.timestamp,
        values,
    })
}

/// Counters shared between the sampling task and its owner.
#[derive(Debug, Default)]
struct Counters {
    samples: AtomicU64,
    skipped_cycles: AtomicU64,
    records: AtomicU64,
}

/// Background sampler bound to one driver.
pub struct ContinuousSampler<T: Transport + 'static> {
    gauge: Arc<MaxiGauge<T>>,
    config: SamplerConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SamplerState>>,
    latest: Arc<watch::Sender<Option<Vec<PressureReading>>>>,
    counters: Arc<Counters>,
    task: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> std::fmt::Debug for ContinuousSampler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousSampler")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("samples", &self.samples_taken())
            .finish()
    }
}

impl<T: Transport + 'static> ContinuousSampler<T> {
    /// Create an idle sampler.
    pub fn new(gauge: Arc<MaxiGauge<T>>, config: SamplerConfig) -> Self {
        let (state, _) = watch::channel(SamplerState::Idle);
        let (latest, _) = watch::channel(None);
        Self {
            gauge,
            config,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            latest: Arc::new(latest),
            counters: Arc::new(Counters::default()),
            task: None,
        }
    }

    /// Spawn the sampling task.
    ///
    /// # Errors
    /// [`GaugeError::SamplerAlreadyStarted`] unless the sampler is idle.
    pub fn start(&mut self) -> GaugeResult<()> {
        let started = self.state.send_if_modified(|state| {
            if *state == SamplerState::Idle {
                *state = SamplerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(GaugeError::SamplerAlreadyStarted);
        }

        info!(
            interval = ?self.config.interval,
            averaging_window = self.config.averaging_window,
            log = %self.config.log_path.display(),
            "starting continuous sampling"
        );

        let worker = Worker {
            gauge: Arc::clone(&self.gauge),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
            latest: Arc::clone(&self.latest),
            counters: Arc::clone(&self.counters),
        };
        self.task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Request a stop. Returns immediately and may be called any number of times.
    pub fn stop(&self) {
        request_stop(&self.cancel, &self.state);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SamplerState {
        *self.state.borrow()
    }

    /// Token that stops the sampler when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver for state changes.
    pub fn watch_state(&self) -> watch::Receiver<SamplerState> {
        self.state.subscribe()
    }

    /// Receiver for the readings of the most recent successful cycle.
    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<PressureReading>>> {
        self.latest.subscribe()
    }

    /// Cycles that produced a sample.
    pub fn samples_taken(&self) -> u64 {
        self.counters.samples.load(Ordering::Relaxed)
    }

    /// Cycles skipped because a query failed.
    pub fn skipped_cycles(&self) -> u64 {
        self.counters.skipped_cycles.load(Ordering::Relaxed)
    }

    /// Averaged records written to the log.
    pub fn records_written(&self) -> u64 {
        self.counters.records.load(Ordering::Relaxed)
    }

    /// Wait until the sampling task has exited.
    ///
    /// Returns at once for a sampler that was never started.
    pub async fn wait_stopped(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            error!(error = %e, "sampling task ended abnormally");
            self.state.send_replace(SamplerState::Stopped);
        }
    }

    /// Stop gracefully on Ctrl+C.
    ///
    /// The first interrupt requests a stop. Any interrupt that arrives after a
    /// stop was requested (by Ctrl+C, [`stop`](Self::stop) or drop) and before
    /// the loop has exited terminates the process with status
    /// [`FORCED_EXIT_CODE`]. The watcher finishes once the sampler is
    /// [`SamplerState::Stopped`].
    pub fn stop_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "cannot listen for Ctrl+C");
                        return;
                    }
                    info!("interrupt received, stopping sampler (press Ctrl+C again to abort)");
                    request_stop(&cancel, &state);
                }
                _ = cancel.cancelled() => {}
            }

            let mut stopped = state.subscribe();
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        warn!("interrupt while stopping, exiting immediately");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
                _ = stopped.wait_for(|s| *s == SamplerState::Stopped) => {}
            }
        })
    }
}

impl<T: Transport + 'static> Drop for ContinuousSampler<T> {
    fn drop(&mut self) {
        request_stop(&self.cancel, &self.state);
    }
}

fn request_stop(cancel: &CancellationToken, state: &watch::Sender<SamplerState>) {
    cancel.cancel();
    state.send_if_modified(|current| match *current {
        SamplerState::Running => {
            *current = SamplerState::Stopping;
            true
        }
        SamplerState::Idle => {
            *current = SamplerState::Stopped;
            true
        }
        SamplerState::Stopping | SamplerState::Stopped => false,
    });
}

/// State moved onto the sampling task.
struct Worker<T> {
    gauge: Arc<MaxiGauge<T>>,
    config: SamplerConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SamplerState>>,
    latest: Arc<watch::Sender<Option<Vec<PressureReading>>>>,
    counters: Arc<Counters>,
}

impl<T: Transport + 'static> Worker<T> {
    async fn run(self) {
        let window_len = self.config.averaging_window;
        let mut log = PressureLog::new(&self.config.log_path);
        let mut window: Vec<Sample> = Vec::with_capacity(window_len);
        let mut sample_count: u64 = 0;

        while !self.cancel.is_cancelled() {
            let cycle_start = Instant::now();

            match self.gauge.pressures().await {
                Ok(readings) => {
                    let sample = Sample::from_readings(Utc::now(), &readings);
                    self.latest.send_replace(Some(readings));
                    sample_count += 1;
                    self.counters.samples.fetch_add(1, Ordering::Relaxed);

                    if window_len > 0 {
                        window.push(sample);
                        if sample_count % window_len as u64 == 0 {
                            self.flush_window(&mut log, &window).await;
                            window.clear();
                        }
                    }
                }
                Err(e) => {
                    self.counters.skipped_cycles.fetch_add(1, Ordering::Relaxed);
                    if e.is_protocol_error() {
                        warn!(error = %e, "sampling cycle skipped");
                    } else {
                        error!(error = %e, "sampling cycle skipped");
                    }
                }
            }

            pace(cycle_start, self.config.interval, &self.cancel).await;
        }

        if !window.is_empty() {
            debug!(samples = window.len(), "discarding incomplete averaging window");
        }
        if let Err(e) = log.close().await {
            error!(error = %e, "failed to close pressure log");
        }

        self.state.send_replace(SamplerState::Stopped);
        info!(samples = sample_count, "continuous sampling stopped");
    }

    async fn flush_window(&self, log: &mut PressureLog, window: &[Sample]) {
        let Some(record) = average_window(window) else {
            return;
        };
        match log.append(&record).await {
            Ok(()) => {
                self.counters.records.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(error = %e, path = %log.path().display(), "failed to append average"),
        }
    }
}

/// Sleep out the rest of a cycle that started at `cycle_start`.
///
/// Cancellation is checked between coarse slices; once seen, the remaining
/// coarse slices and the final sleep are skipped.
async fn pace(cycle_start: Instant, interval: Duration, cancel: &CancellationToken) {
    sleep(MIN_PAUSE).await;

    let mut remaining = interval.saturating_sub(cycle_start.elapsed());
    while remaining > COARSE_STEP {
        if cancel.is_cancelled() {
            return;
        }
        sleep(COARSE_STEP).await;
        remaining = interval.saturating_sub(cycle_start.elapsed());
    }

    if cancel.is_cancelled() {
        return;
    }
    sleep(remaining).await;
}
