//! Custom error types shared across the workspace.
//!
//! This module defines the primary error type, `DaqError`, returned by every
//! host gateway. Built on `thiserror`, it keeps the error surface small:
//!
//! - **`Usage`**: The caller passed the wrong number, type or shape of
//!   arguments. Raised before any SDK call is made.
//! - **`Configuration`**: Semantic errors in loaded configuration values.
//! - **`Io`**: Wraps `std::io::Error` from reading script files.
//! - **`Driver`**: A vendor SDK call failed. Carries a [`DriverError`] with
//!   the driver name, a coarse [`DriverErrorKind`] and the SDK message.
//! - **`ScriptTooLarge`**: An acquisition script exceeded
//!   [`MAX_SCRIPT_SIZE`](crate::limits::MAX_SCRIPT_SIZE).
//!
//! Driver crates define their own fine-grained errors (one variant per failing
//! SDK step) and convert into [`DriverError`] at the gateway boundary.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Coarse classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// A subsystem could not be brought up (exposure sequence, scripting, card init).
    Initialization,
    /// The driver rejected a setting or script.
    Configuration,
    /// A status or data query to the device failed.
    Communication,
    /// A subsystem could not be torn down.
    Shutdown,
    /// The hardware reported a failed or aborted acquisition.
    Hardware,
    /// The device never reached a terminal state in time.
    Timeout,
    /// The handle does not refer to an open device.
    InvalidHandle,
    /// Anything the driver could not classify.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidHandle => "invalid_handle",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A vendor SDK failure, tagged with the driver that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver name, e.g. `pvcam` or `timeharp`.
    pub driver_type: String,
    /// Coarse failure class.
    pub kind: DriverErrorKind,
    /// SDK message, prefixed with the failing step.
    pub message: String,
}

impl DriverError {
    /// Build an error from its parts.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Primary error type for the bindings.
///
/// # Error Categories
///
/// 1. **Argument errors** - `Usage`, `ScriptTooLarge`
///    - Raised by a gateway before touching the SDK
///    - Recovery: fix the call site
///
/// 2. **Driver errors** - `Driver`
///    - Raised when an SDK call reports failure
///    - Recovery: depends on [`DriverErrorKind`]; nothing is retried automatically
///
/// 3. **Environment errors** - `Configuration`, `Io`
///    - `Configuration` from `BindingsConfig::validate`, `Io` when a script
///      file cannot be read
#[derive(Error, Debug)]
pub enum DaqError {
    /// Wrong argument count, type, shape or option string.
    ///
    /// The message is the exact text shown to the host user, e.g.
    /// `"HCAM must be a scalar"`.
    #[error("{0}")]
    Usage(String),

    /// Configuration values parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A vendor SDK call failed.
    #[error("{0}")]
    Driver(DriverError),

    /// Script text exceeds the configured maximum.
    #[error("Script size {bytes} bytes exceeds maximum {max_bytes} bytes")]
    ScriptTooLarge {
        /// Size of the rejected script.
        bytes: usize,
        /// Limit it was checked against.
        max_bytes: usize,
    },
}

impl DaqError {
    /// Shorthand for [`DaqError::Usage`].
    pub fn usage(message: impl Into<String>) -> Self {
        DaqError::Usage(message.into())
    }
}

impl From<DriverError> for DaqError {
    fn from(err: DriverError) -> Self {
        DaqError::Driver(err)
    }
}
