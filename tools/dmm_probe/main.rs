//! DMM probe CLI tool
//!
//! Connects to an Agilent 34410A/11A using the driver configuration, prints
//! its identity, optionally takes one reading and drains the error queue.
//!
//! # Usage
//!
//! ```bash
//! # Dry run without hardware
//! cargo run --bin dmm_probe -- --simulate
//!
//! # One DC voltage reading from a LAN instrument
//! cargo run --bin dmm_probe -- --address 192.168.1.50:5025 --function dc_volts
//!
//! # Show the effective configuration
//! cargo run --bin dmm_probe -- --config config/dmm.toml --dump-config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::Serialized;
use scpi_dmm::adapters;
use scpi_dmm::config::{Settings, DEFAULT_CONFIG_PATH};
use scpi_dmm::instrument::{Agilent34410A, MeasurementFunction};
use scpi_dmm::logging;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Upper bound on error queue entries printed per run.
const MAX_ERROR_ENTRIES: usize = 20;

/// Probe an Agilent 34410A/11A DMM
#[derive(Parser, Debug)]
#[command(name = "dmm_probe")]
#[command(version)]
#[command(about = "Identify an Agilent 34410A/11A and take a reading", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run without hardware
    #[arg(long)]
    simulate: bool,

    /// Raw SCPI socket address (host:port), overrides the configured transport
    #[arg(short, long, value_name = "HOST:PORT")]
    address: Option<String>,

    /// Measurement function to configure before reading (e.g. dc_volts)
    #[arg(short, long)]
    function: Option<MeasurementFunction>,

    /// Measurement timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    read_timeout_ms: u64,

    /// Send *RST after connecting
    #[arg(long)]
    reset: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut figment = Settings::figment(&args.config);
    if args.simulate {
        figment = figment.merge(Serialized::default("instrument.simulate", true));
    }
    if args.reset {
        figment = figment.merge(Serialized::default("instrument.reset", true));
    }
    if let Some(address) = &args.address {
        figment = figment
            .merge(Serialized::default("transport.kind", "tcp"))
            .merge(Serialized::default("transport.address", address.as_str()));
    }
    Settings::from_figment(figment)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    if args.dump_config {
        print!("{}", settings.to_toml_string()?);
        return Ok(());
    }

    let level = if args.verbose {
        "debug"
    } else {
        settings.application.log_level.as_str()
    };
    logging::init_tracing(level)?;

    let transport = adapters::connect(&settings.transport)
        .await
        .context("Failed to open transport")?;
    let mut dmm = Agilent34410A::initialize(
        settings.instrument.id.clone(),
        transport,
        settings.driver_options(),
    )
    .await
    .context("Failed to initialize instrument")?;

    println!("Manufacturer: {}", dmm.instrument_manufacturer().await?);
    println!("Model:        {}", dmm.instrument_model().await?);
    println!("Firmware:     {}", dmm.instrument_firmware_revision().await?);

    if let Some(function) = args.function {
        dmm.set_measurement_function(function).await?;
        let value = dmm
            .read(Duration::from_millis(args.read_timeout_ms))
            .await
            .context("Measurement failed")?;
        println!("{}: {}", function, value);
    }

    for _ in 0..MAX_ERROR_ENTRIES {
        let entry = dmm.error_query().await?;
        if !entry.is_error() {
            break;
        }
        println!("Instrument error: {}", entry);
    }

    info!("Probe finished");
    Ok(())
}
