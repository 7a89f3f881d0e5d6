//! Cached-attribute SCPI driver for the Agilent 34410A/11A digital multimeter.
//!
//! The driver maps typed DMM attributes (measurement function, range,
//! auto-range, resolution, trigger settings) onto SCPI commands and keeps a
//! per-attribute cache that decides when the instrument has to be asked.
//!
//! - [`adapters`]: the `Transport` trait and its TCP, VISA, null and mock
//!   implementations
//! - [`instrument`]: the driver itself
//! - [`config`]: figment-based settings
//! - [`logging`]: tracing subscriber setup
//!
//! ```
//! use scpi_dmm::adapters::MockTransport;
//! use scpi_dmm::instrument::{Agilent34410A, DriverOptions, MeasurementFunction};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mock = MockTransport::new();
//! let mut dmm = Agilent34410A::new("dmm", mock.clone(), DriverOptions::default());
//! dmm.set_measurement_function(MeasurementFunction::DcVolts).await.unwrap();
//! assert_eq!(mock.writes(), vec![":sense:function volt".to_string()]);
//! # });
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;

pub use adapters::{Transport, TransportError};
pub use config::Settings;
pub use error::{DmmError, DmmResult};
pub use instrument::{Agilent34410A, DriverOptions, MeasurementFunction};
