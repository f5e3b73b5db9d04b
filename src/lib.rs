//! # DAQ Bindings
//!
//! Host-facing bindings for two acquisition drivers:
//!
//! - **`gateway`**: the host calling convention. Each gateway validates the
//!   caller's arguments and requested output count, drives the hardware crate
//!   and flattens the result into [`HostReply`](daq_core::host::HostReply)
//!   output slots.
//!   - [`gateway::pvcamicl()`]: PVCAM ICL script load / run / uninit
//!   - [`gateway::initialize_standard`], [`gateway::start_standard`],
//!     [`gateway::read_standard`]: TimeHarp standard-mode histograms
//! - **`config`**: layered configuration (defaults, TOML file, environment)
//!   using `figment`.
//! - **`logging`**: `tracing-subscriber` setup shared by the CLI and hosts.
//! - **`script_source`**: script text given as a file path or inline.
//!
//! Driver logic lives in `daq-driver-pvcam` and `daq-driver-timeharp`; value
//! and error types shared with the host live in `daq-core`.

pub mod config;
pub mod gateway;
pub mod logging;
pub mod script_source;

pub use config::BindingsConfig;
pub use gateway::{initialize_standard, pvcamicl, read_standard, start_standard, IclOption};
