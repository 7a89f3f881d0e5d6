//! End-to-end session against a fake instrument on a local socket.

use scpi_dmm::adapters::{self, TcpTransport};
use scpi_dmm::config::TransportSettings;
use scpi_dmm::instrument::{Agilent34410A, DriverOptions, MeasurementFunction};
use scpi_dmm::DmmError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answers queries from a fixed table and records every received line.
async fn fake_instrument(idn: &'static str) -> (String, JoinHandle<Vec<String>>) {
    slow_instrument(idn, "", Duration::ZERO).await
}

/// Like [`fake_instrument`], but answers `slow_command` only after `delay`.
async fn slow_instrument(
    idn: &'static str,
    slow_command: &'static str,
    delay: Duration,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            let answer = match line.as_str() {
                "*IDN?" => Some(idn),
                ":read?" => Some("-1.23450000E-02"),
                ":fetch?" => Some("+1.50000000E+00"),
                ":system:error?" => Some("+0,\"No error\""),
                _ => None,
            };
            if line == slow_command {
                tokio::time::sleep(delay).await;
            }
            received.push(line);
            if let Some(answer) = answer {
                write_half
                    .write_all(format!("{}\n", answer).as_bytes())
                    .await
                    .unwrap();
            }
        }
        received
    });

    (address, handle)
}

#[tokio::test]
async fn initialize_configure_and_read() {
    let (address, server) =
        fake_instrument("Agilent Technologies,34410A,MY47000001,2.35-2.35-0.09-46-09").await;

    let transport = adapters::connect(&TransportSettings::Tcp {
        address,
        terminator: "\n".to_string(),
        timeout_ms: 2000,
    })
    .await
    .unwrap();
    let options = DriverOptions {
        id_query: true,
        reset: true,
        ..DriverOptions::default()
    };
    let mut dmm = Agilent34410A::initialize("lan_dmm", transport, options)
        .await
        .unwrap();

    dmm.configure_measurement(MeasurementFunction::DcVolts, 0.1, 3.0e-7)
        .await
        .unwrap();
    let value = dmm.read(Duration::from_secs(2)).await.unwrap();
    assert!((value - -1.2345e-2).abs() < 1e-12);
    assert!(!dmm.error_query().await.unwrap().is_error());
    assert_eq!(dmm.instrument_model().await.unwrap(), "34410A");

    drop(dmm);
    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            "*IDN?",
            "*RST",
            ":sense:function volt",
            ":sense:volt:range 0.1",
            ":sense:volt:resolution 0.0000003",
            ":read?",
            ":system:error?",
        ]
    );
}

#[tokio::test]
async fn wrong_instrument_fails_initialization() {
    let (address, _server) = fake_instrument("KEITHLEY INSTRUMENTS INC.,MODEL 2000,1,A20").await;
    let transport = TcpTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap();
    let options = DriverOptions {
        id_query: true,
        ..DriverOptions::default()
    };

    let result = Agilent34410A::initialize("lan_dmm", transport, options).await;
    match result {
        Err(DmmError::IdentityMismatch { expected, actual }) => {
            assert_eq!(
                expected,
                "AGILENT TECHNOLOGIES,34410A or AGILENT TECHNOLOGIES,34411A"
            );
            assert_eq!(actual, "KEITHLEY INSTRUMENTS INC.,MODEL 2000");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("initialization should have failed"),
    }
}

#[tokio::test]
async fn second_family_model_passes_identity_check() {
    let (address, _server) = fake_instrument("Agilent Technologies,34411A,MY48000002,2.40").await;
    let transport = TcpTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap();
    let options = DriverOptions {
        id_query: true,
        ..DriverOptions::default()
    };

    let mut dmm = Agilent34410A::initialize("lan_dmm", transport, options)
        .await
        .unwrap();
    assert_eq!(dmm.instrument_model().await.unwrap(), "34411A");
}

#[tokio::test]
async fn read_may_outlast_the_link_timeout() {
    let (address, _server) = slow_instrument(
        "Agilent Technologies,34410A,MY47000001,2.35",
        ":read?",
        Duration::from_millis(300),
    )
    .await;
    let transport = TcpTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(100));
    let mut dmm = Agilent34410A::new("lan_dmm", transport, DriverOptions::default());

    let value = dmm.read(Duration::from_secs(2)).await.unwrap();
    assert!((value - -1.2345e-2).abs() < 1e-12);
}

#[tokio::test]
async fn late_reading_does_not_answer_the_next_query() {
    let (address, server) = slow_instrument(
        "Agilent Technologies,34410A,MY47000001,2.35",
        ":fetch?",
        Duration::from_millis(300),
    )
    .await;
    let transport = TcpTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap();
    let mut dmm = Agilent34410A::new("lan_dmm", transport, DriverOptions::default());

    let err = dmm.fetch(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(
        err,
        DmmError::Transport(scpi_dmm::TransportError::Timeout(_))
    ));

    dmm.load_identity().await.unwrap();
    assert_eq!(
        dmm.instrument_manufacturer().await.unwrap(),
        "Agilent Technologies"
    );
    assert_eq!(dmm.instrument_model().await.unwrap(), "34410A");
    assert_eq!(dmm.read(Duration::from_secs(2)).await.unwrap(), -1.2345e-2);

    drop(dmm);
    assert_eq!(server.await.unwrap(), vec![":fetch?", "*IDN?", ":read?"]);
}

#[tokio::test]
async fn read_times_out_when_instrument_is_silent() {
    let (address, _server) = slow_instrument(
        "Agilent Technologies,34410A,MY47000001,2.35",
        ":read?",
        Duration::from_secs(5),
    )
    .await;
    let transport = TcpTransport::connect(&address, Duration::from_secs(5))
        .await
        .unwrap();
    let mut dmm = Agilent34410A::new("lan_dmm", transport, DriverOptions::default());

    let err = dmm.read(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(
        err,
        DmmError::Transport(scpi_dmm::TransportError::Timeout(_))
    ));
    assert_eq!(dmm.stale_replies(), 1);
}
