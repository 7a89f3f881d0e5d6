//! Settings loading from files and environment.

use scpi_dmm::adapters;
use scpi_dmm::config::{ConfigError, Settings, TransportSettings};
use scpi_dmm::instrument::Agilent34410A;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
#[serial]
fn load_from_file() {
    let file = write_config(
        r#"
        [application]
        log_level = "debug"

        [instrument]
        id = "rack_dmm"
        reset = true
        timeout_ms = 2500

        [transport]
        kind = "tcp"
        address = "10.1.2.3:5025"
        "#,
    );

    let settings = Settings::load_from(file.path()).unwrap();
    assert_eq!(settings.application.log_level, "debug");
    assert_eq!(settings.instrument.id, "rack_dmm");
    assert!(settings.instrument.reset);

    let options = settings.driver_options();
    assert_eq!(options.timeout, Duration::from_millis(2500));
    assert!(options.id_query);
    assert!(!options.simulate);
    assert!(matches!(
        settings.transport,
        TransportSettings::Tcp { ref address, .. } if address == "10.1.2.3:5025"
    ));
}

#[test]
#[serial]
fn environment_overrides_file() {
    let file = write_config(
        r#"
        [instrument]
        simulate = false

        [transport]
        kind = "tcp"
        address = "10.1.2.3:5025"
        "#,
    );

    std::env::set_var("SCPI_DMM_INSTRUMENT__SIMULATE", "true");
    std::env::set_var("SCPI_DMM_APPLICATION__LOG_LEVEL", "warn");
    let result = Settings::load_from(file.path());
    std::env::remove_var("SCPI_DMM_INSTRUMENT__SIMULATE");
    std::env::remove_var("SCPI_DMM_APPLICATION__LOG_LEVEL");

    let settings = result.unwrap();
    assert!(settings.instrument.simulate);
    assert_eq!(settings.application.log_level, "warn");
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults_and_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    std::env::set_var("SCPI_DMM_INSTRUMENT__SIMULATE", "true");
    let result = Settings::load_from(&path);
    std::env::remove_var("SCPI_DMM_INSTRUMENT__SIMULATE");

    let settings = result.unwrap();
    assert_eq!(settings.transport, TransportSettings::Null);
    assert_eq!(settings.instrument.self_test_settle_ms, 40_000);
}

#[test]
#[serial]
fn invalid_file_is_rejected() {
    let file = write_config(
        r#"
        [transport]
        kind = "tcp"
        address = ""
        "#,
    );
    assert!(matches!(
        Settings::load_from(file.path()),
        Err(ConfigError::ValidationError(_))
    ));

    let file = write_config("[transport]\nkind = \"carrier_pigeon\"\n");
    assert!(matches!(
        Settings::load_from(file.path()),
        Err(ConfigError::LoadError(_))
    ));
}

#[tokio::test]
#[serial]
async fn simulated_driver_from_config() {
    let file = write_config(
        r#"
        [instrument]
        id = "sim_dmm"
        simulate = true
        id_query = true
        "#,
    );
    let settings = Settings::load_from(file.path()).unwrap();

    let transport = adapters::connect(&settings.transport).await.unwrap();
    let mut dmm = Agilent34410A::initialize(
        settings.instrument.id.clone(),
        transport,
        settings.driver_options(),
    )
    .await
    .unwrap();

    assert_eq!(dmm.id(), "sim_dmm");
    assert_eq!(dmm.read_default().await.unwrap(), 0.0);
}
