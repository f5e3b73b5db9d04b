//! `daq-core`
//!
//! Shared building blocks for the daq-bindings workspace.
//!
//! The driver crates (`daq-driver-pvcam`, `daq-driver-timeharp`) wrap vendor
//! SDK calls; the root crate exposes them to a numeric host environment. Both
//! sides agree on the types defined here:
//!
//! - [`error`]: [`DaqError`](error::DaqError), the application error, and
//!   [`DriverError`](error::DriverError) for failures reported by an SDK.
//! - [`host`]: the host value model (numeric arrays, strings, struct arrays)
//!   that gateway functions consume and produce.
//! - [`limits`]: shared constants bounding script sizes and readout polling.

pub mod error;
pub mod host;
pub mod limits;

pub use error::{DaqError, DriverError, DriverErrorKind};
pub use host::{HostArray, HostData, HostReply, HostValue, StructArray};
