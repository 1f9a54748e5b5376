//! End-to-end tests of the driver over a byte stream.
//!
//! A scripted instrument sits on the far end of a `tokio::io::duplex` pair and
//! answers exactly like a TPG256A: handshake line first, data only on `<ENQ>`.

use maxigauge::transport::{SerialTransport, SerialTransportBuilder};
use maxigauge::{GaugeError, MaxiGauge, SensorStatus};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const ACK: &[u8] = b"\x06\r\n";
const NAK: &[u8] = b"\x15\r\n";
const ENQ: u8 = 0x05;

/// Replies keyed by the command line without its terminator.
/// `Err` rejects the command and serves the payload as the error report.
/// Commands missing from the script are rejected as a syntax error.
type Script = HashMap<&'static str, Result<&'static str, &'static str>>;

/// Run a fake controller until the host closes its end.
///
/// Returns every command line it received, in order.
async fn fake_controller(mut device: DuplexStream, script: Script) -> Vec<String> {
    let mut received = Vec::new();
    let mut line = Vec::new();
    let mut pending: Option<&'static str> = None;
    let mut byte = [0u8; 1];

    while let Ok(1) = device.read(&mut byte).await {
        match byte[0] {
            ENQ if line.is_empty() => {
                if let Some(reply) = pending.take() {
                    device.write_all(reply.as_bytes()).await.unwrap();
                    device.write_all(b"\r\n").await.unwrap();
                }
            }
            b'\n' => {
                let command = String::from_utf8_lossy(&line).trim_end().to_string();
                line.clear();
                match script.get(command.as_str()) {
                    Some(Ok(reply)) => {
                        device.write_all(ACK).await.unwrap();
                        pending = Some(*reply);
                    }
                    Some(Err(payload)) => {
                        device.write_all(NAK).await.unwrap();
                        pending = Some(*payload);
                    }
                    None => {
                        device.write_all(NAK).await.unwrap();
                        pending = Some("4096,0");
                    }
                }
                received.push(command);
            }
            other => line.push(other),
        }
    }

    received
}

fn connect(script: Script) -> (MaxiGauge<SerialTransport>, tokio::task::JoinHandle<Vec<String>>) {
    let (host, device) = tokio::io::duplex(256);
    let controller = tokio::spawn(fake_controller(device, script));
    let transport = SerialTransportBuilder::new("duplex", 9600)
        .with_read_timeout(Some(Duration::from_secs(5)))
        .attach(host);
    (MaxiGauge::new(transport), controller)
}

#[tokio::test]
async fn pressure_query_round_trip() {
    let script = Script::from([("PR3", Ok("0,1.234E-06"))]);
    let (gauge, controller) = connect(script);

    let reading = gauge.pressure(3).await.unwrap();
    assert_eq!(reading.channel().number(), 3);
    assert_eq!(reading.status(), SensorStatus::Ok);
    assert_eq!(reading.pressure(), 1.234e-6);

    gauge.close().await.unwrap();
    assert_eq!(controller.await.unwrap(), vec!["PR3".to_string()]);
}

#[tokio::test]
async fn all_channels_in_order() {
    let script = Script::from([
        ("PR1", Ok("0,1.0000E-03")),
        ("PR2", Ok("1,1.0000E-04")),
        ("PR3", Ok("2,1.0000E+03")),
        ("PR4", Ok("3,0.0000E+00")),
        ("PR5", Ok("4,0.0000E+00")),
        ("PR6", Ok("5,0.0000E+00")),
    ]);
    let (gauge, controller) = connect(script);

    let readings = gauge.pressures().await.unwrap();
    let statuses: Vec<SensorStatus> = readings.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![
            SensorStatus::Ok,
            SensorStatus::Underrange,
            SensorStatus::Overrange,
            SensorStatus::SensorError,
            SensorStatus::SensorOff,
            SensorStatus::NoSensor,
        ]
    );

    gauge.close().await.unwrap();
    let received = controller.await.unwrap();
    assert_eq!(received, vec!["PR1", "PR2", "PR3", "PR4", "PR5", "PR6"]);
}

#[tokio::test]
async fn rejected_contrast_reports_decoded_errors() {
    let script = Script::from([("DCC,10", Err("1,0"))]);
    let (gauge, controller) = connect(script);

    match gauge.set_display_contrast(10).await {
        Err(GaugeError::InstrumentNegativeAcknowledge {
            system_error,
            gauge_error,
        }) => {
            assert_eq!(system_error, "Watchdog has responded");
            assert_eq!(gauge_error, "No error");
        }
        other => panic!("expected a negative acknowledge, got {:?}", other),
    }

    gauge.close().await.unwrap();
    assert_eq!(controller.await.unwrap(), vec!["DCC,10".to_string()]);
}

#[tokio::test]
async fn malformed_channel_fails_the_aggregate() {
    let script = Script::from([
        ("PR1", Ok("0,1.0E-03")),
        ("PR2", Ok("0,1.0E-03")),
        ("PR3", Ok("0,1.0E-03")),
        ("PR4", Ok("not a reading")),
        ("PR5", Ok("0,1.0E-03")),
        ("PR6", Ok("0,1.0E-03")),
    ]);
    let (gauge, controller) = connect(script);

    assert!(matches!(
        gauge.pressures().await,
        Err(GaugeError::UnparsablePressureLine { .. })
    ));

    gauge.close().await.unwrap();
    // The failing channel does not stop the remaining queries.
    assert_eq!(controller.await.unwrap().len(), 6);
}

#[tokio::test]
async fn device_check_and_keys() {
    let script = Script::from([("DCC", Ok("10")), ("TKB", Ok("9"))]);
    let (gauge, controller) = connect(script);

    assert_eq!(
        gauge.pressed_keys().await.unwrap(),
        [true, false, false, true, false]
    );
    let summary = gauge.check_device().await.unwrap();
    assert!(summary.contains("set to 10"));
    assert!(summary.contains("1, 4"));

    gauge.close().await.unwrap();
    controller.await.unwrap();
}
