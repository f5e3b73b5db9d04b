//! TimeHarp standard-mode gateways.
//!
//! ```text
//! OFFSET             = InitializeStandard(EXPTIME, CFDZeroCross, CFDDiscrMin, SyncLevel, Offset, Range)
//!                      StartStandard()
//! [DATA, RESOLUTION] = ReadStandard()
//! ```
//!
//! DATA is a 1x4096 uint32 histogram and RESOLUTION the bin width in ns
//! (single). Driver failures are hard errors.

use crate::gateway::{integer_arg, reply};
use daq_core::error::{DaqError, DriverError};
use daq_core::host::{HostReply, HostValue};
use daq_driver_timeharp::{StandardSettings, TimeHarpError, TimeHarpSdk};

const ARG_NAMES: [&str; 6] = [
    "EXPTIME",
    "CFDZeroCross",
    "CFDDiscrMin",
    "SyncLevel",
    "Offset",
    "Range",
];

fn driver_error(e: TimeHarpError) -> DaqError {
    DaqError::Driver(DriverError::from(e))
}

/// Initialize the card, calibrate and apply the six settings.
///
/// OFFSET is the offset the card applied, in ns.
pub fn initialize_standard<S: TimeHarpSdk + ?Sized>(
    sdk: &mut S,
    nlhs: usize,
    args: &[HostValue],
) -> Result<HostReply, DaqError> {
    if args.len() != ARG_NAMES.len() || nlhs > 1 {
        return Err(DaqError::usage("type 'help InitializeStandard' for syntax"));
    }

    let mut values = [0i32; 6];
    for ((value, arg), name) in values.iter_mut().zip(args).zip(ARG_NAMES) {
        *value = integer_arg(arg, name)?;
    }
    let [exp_time_ms, cfd_zero_cross_mv, cfd_discr_min_mv, sync_level_mv, offset_ns, range] =
        values;
    let settings = StandardSettings {
        exp_time_ms,
        cfd_zero_cross_mv,
        cfd_discr_min_mv,
        sync_level_mv,
        offset_ns,
        range,
    };

    let offset = daq_driver_timeharp::initialize_standard(sdk, &settings).map_err(driver_error)?;
    Ok(reply(
        vec![HostValue::double(f64::from(offset))],
        nlhs,
        Vec::new(),
    ))
}

/// Clear the histogram and start one acquisition.
pub fn start_standard<S: TimeHarpSdk + ?Sized>(
    sdk: &mut S,
    nlhs: usize,
    args: &[HostValue],
) -> Result<HostReply, DaqError> {
    if !args.is_empty() || nlhs > 0 {
        return Err(DaqError::usage("type 'help StartStandard' for syntax"));
    }
    daq_driver_timeharp::start_standard(sdk).map_err(driver_error)?;
    Ok(HostReply::default())
}

/// Stop the acquisition and read the histogram.
///
/// An overflowed histogram is still returned, with an `Overflow` warning.
pub fn read_standard<S: TimeHarpSdk + ?Sized>(
    sdk: &mut S,
    nlhs: usize,
    args: &[HostValue],
) -> Result<HostReply, DaqError> {
    if !args.is_empty() || nlhs > 2 {
        return Err(DaqError::usage("type 'help ReadStandard' for syntax"));
    }
    let histogram = daq_driver_timeharp::read_standard(sdk).map_err(driver_error)?;

    let warnings = if histogram.overflow {
        vec!["Overflow".to_string()]
    } else {
        Vec::new()
    };
    Ok(reply(
        vec![
            HostValue::u32_row(histogram.counts),
            HostValue::single(histogram.resolution_ns),
        ],
        nlhs,
        warnings,
    ))
}
