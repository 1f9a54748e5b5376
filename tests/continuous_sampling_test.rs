//! Integration tests for the continuous sampler writing its averaged log.

use maxigauge::sampler::{ContinuousSampler, SamplerConfig, SamplerState};
use maxigauge::transport::MockTransport;
use maxigauge::MaxiGauge;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn averaged_records_reach_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("tpg256a-data.txt");

    let transport = MockTransport::new();
    let handle = transport.handle();
    // Channel 2 switched off: its column stays empty.
    handle.set_reading(2, 4, 0.0);
    handle.set_reading(1, 0, 1.0e-3);

    let mut sampler = ContinuousSampler::new(
        Arc::new(MaxiGauge::new(transport)),
        SamplerConfig {
            interval: Duration::from_secs(1),
            averaging_window: 2,
            log_path: log_path.clone(),
        },
    );
    sampler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(4500)).await;
    sampler.stop();
    sampler.wait_stopped().await;
    assert_eq!(sampler.state(), SamplerState::Stopped);

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert!(!lines.is_empty());
    assert_eq!(lines.len() as u64, sampler.records_written());

    for line in lines {
        let fields: Vec<&str> = line.split(", ").collect();
        assert_eq!(fields.len(), 7, "unexpected layout: {:?}", line);
        assert!(fields[0].parse::<f64>().is_ok(), "bad timestamp in {:?}", line);
        assert_eq!(
            &fields[1..],
            &["1.000E-03", "", "3.000E-06", "4.000E-06", "5.000E-06", "6.000E-06"]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn incomplete_window_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("partial.txt");

    let mut sampler = ContinuousSampler::new(
        Arc::new(MaxiGauge::new(MockTransport::new())),
        SamplerConfig {
            interval: Duration::from_secs(1),
            averaging_window: 100,
            log_path: log_path.clone(),
        },
    );
    sampler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    sampler.stop();
    sampler.wait_stopped().await;

    assert!(sampler.samples_taken() >= 3);
    assert_eq!(sampler.records_written(), 0);
    assert!(!log_path.exists());
}

#[tokio::test(start_paused = true)]
async fn foreground_queries_interleave_with_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let gauge = Arc::new(MaxiGauge::new(MockTransport::new()));

    let mut sampler = ContinuousSampler::new(
        Arc::clone(&gauge),
        SamplerConfig {
            interval: Duration::from_millis(300),
            averaging_window: 0,
            log_path: dir.path().join("unused.txt"),
        },
    );
    sampler.start().unwrap();

    for _ in 0..5 {
        assert_eq!(gauge.display_contrast().await.unwrap(), 10);
        tokio::time::sleep(Duration::from_millis(170)).await;
    }

    sampler.stop();
    sampler.wait_stopped().await;
    assert_eq!(sampler.skipped_cycles(), 0);
    assert!(sampler.samples_taken() > 0);
}
