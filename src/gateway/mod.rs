//! Host gateways.
//!
//! Each gateway takes the caller's requested output count (`nlhs`) and its
//! argument list, validates them the way the host expects, calls the driver
//! and flattens the typed result into [`HostReply`] output slots.
//!
//! Argument problems are [`DaqError::Usage`] and never reach the driver.

pub mod pvcamicl;
pub mod timeharp;

pub use pvcamicl::{pvcamicl, IclOption};
pub use timeharp::{initialize_standard, read_standard, start_standard};

use daq_core::error::DaqError;
use daq_core::host::{HostReply, HostValue};

/// A numeric scalar argument named `name`.
pub(crate) fn scalar_arg(value: &HostValue, name: &str) -> Result<f64, DaqError> {
    if !value.is_numeric() {
        return Err(DaqError::usage(format!("{} must be numeric", name)));
    }
    if value.numel() != 1 {
        return Err(DaqError::usage(format!("{} must be a scalar", name)));
    }
    value
        .as_scalar()
        .ok_or_else(|| DaqError::usage(format!("{} must be a scalar", name)))
}

/// An integer argument named `name`: a finite numeric scalar, truncated
/// toward zero, that fits `T`.
pub(crate) fn integer_arg<T: TryFrom<i64>>(value: &HostValue, name: &str) -> Result<T, DaqError> {
    let number = scalar_arg(value, name)?;
    if !number.is_finite() {
        return Err(DaqError::usage(format!("{} must be finite", name)));
    }
    // Float-to-int `as` saturates; anything clamped fails the conversion below.
    T::try_from(number.trunc() as i64)
        .map_err(|_| DaqError::usage(format!("{} is out of range", name)))
}

/// Keep the outputs the caller asked for; the first slot is always kept
/// (the host's `ans`).
pub(crate) fn reply(mut outputs: Vec<HostValue>, nlhs: usize, warnings: Vec<String>) -> HostReply {
    outputs.truncate(nlhs.max(1));
    HostReply { outputs, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(result: Result<i16, DaqError>) -> String {
        match result {
            Err(DaqError::Usage(message)) => message,
            other => panic!("expected usage error, got {:?}", other),
        }
    }

    #[test]
    fn integer_arg_truncates_toward_zero() {
        assert_eq!(integer_arg::<i16>(&HostValue::double(2.9), "HCAM").unwrap(), 2);
        assert_eq!(integer_arg::<i16>(&HostValue::double(-2.9), "HCAM").unwrap(), -2);
        assert_eq!(integer_arg::<i32>(&HostValue::single(7.5), "Range").unwrap(), 7);
        assert_eq!(integer_arg::<i16>(&HostValue::u16_row(vec![12]), "HCAM").unwrap(), 12);
    }

    #[test]
    fn integer_arg_rejects_non_finite_values() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                usage(integer_arg(&HostValue::double(bad), "HCAM")),
                "HCAM must be finite"
            );
        }
    }

    #[test]
    fn integer_arg_rejects_values_outside_the_target_type() {
        for bad in [32768.0, -32769.0, 1e9, 1e300] {
            assert_eq!(
                usage(integer_arg(&HostValue::double(bad), "HCAM")),
                "HCAM is out of range"
            );
        }
        assert_eq!(
            integer_arg::<i16>(&HostValue::double(32767.9), "HCAM").unwrap(),
            i16::MAX
        );
    }
}
