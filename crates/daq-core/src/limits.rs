//! Shared hard limits to prevent unbounded allocations or waits.
//!
//! This module centralizes:
//! - Script payload limits
//! - Readout polling interval and timeout defaults

use crate::error::DaqError;
use std::time::Duration;

// =============================================================================
// Timing
// =============================================================================

/// Default sleep between readout status polls (1 ms).
///
/// A zero interval turns the poll into a busy-wait.
pub const READOUT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default upper bound on a single script run (5 minutes).
///
/// ICL scripts can chain long exposures, so this is generous. When it
/// elapses the acquisition is aborted and reported as a timeout.
pub const READOUT_TIMEOUT: Duration = Duration::from_secs(300);

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum allowed acquisition script size in bytes (default: 1MB).
pub const MAX_SCRIPT_SIZE: usize = 1024 * 1024;

/// Reject scripts larger than [`MAX_SCRIPT_SIZE`].
pub fn validate_script_size(script: &str) -> Result<(), DaqError> {
    let bytes = script.len();
    if bytes > MAX_SCRIPT_SIZE {
        return Err(DaqError::ScriptTooLarge {
            bytes,
            max_bytes: MAX_SCRIPT_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_script_at_limit() {
        let script = "x".repeat(MAX_SCRIPT_SIZE);
        assert!(validate_script_size(&script).is_ok());
    }

    #[test]
    fn rejects_oversized_script() {
        let script = "x".repeat(MAX_SCRIPT_SIZE + 1);
        let err = validate_script_size(&script).unwrap_err();
        assert!(matches!(
            err,
            DaqError::ScriptTooLarge { bytes, max_bytes }
                if bytes == MAX_SCRIPT_SIZE + 1 && max_bytes == MAX_SCRIPT_SIZE
        ));
    }
}
