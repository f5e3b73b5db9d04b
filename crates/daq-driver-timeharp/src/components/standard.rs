//! Standard-mode histogramming.
//!
//! ```text
//! initialize_standard -> initialize, calibrate, CFD/sync/range/offset, mmode
//! start_standard      -> clear block 0, start
//! read_standard       -> stop, resolution, block 0
//! ```

use crate::components::sdk::{
    HistogramMode, MeasurementMode, ThError, TimeHarpSdk, ACQTMAX, ACQTMIN, BLOCKSIZE, DISCRMAX,
    DISCRMIN, FLAG_OVERFLOW, OFFSETMAX, OFFSETMIN, RANGES, SYNCMAX, SYNCMIN, ZCMAX, ZCMIN,
};
use daq_core::error::{DriverError, DriverErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Name used when converting into [`DriverError`].
pub const DRIVER_TYPE: &str = "timeharp";

/// Card settings applied by [`initialize_standard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardSettings {
    /// Acquisition time in milliseconds.
    pub exp_time_ms: i32,
    /// CFD zero-cross level in millivolts.
    pub cfd_zero_cross_mv: i32,
    /// CFD discriminator minimum in millivolts.
    pub cfd_discr_min_mv: i32,
    /// Sync input level in millivolts.
    pub sync_level_mv: i32,
    /// Requested offset in nanoseconds.
    pub offset_ns: i32,
    /// Time range index; bin width doubles with each step.
    pub range: i32,
}

impl Default for StandardSettings {
    fn default() -> Self {
        Self {
            exp_time_ms: 1000,
            cfd_zero_cross_mv: 10,
            cfd_discr_min_mv: 50,
            sync_level_mv: -50,
            offset_ns: 0,
            range: 0,
        }
    }
}

impl StandardSettings {
    /// Check every field against the TimeHarp 200 limits.
    pub fn validate(&self) -> Result<(), TimeHarpError> {
        fn check(name: &str, value: i32, min: i32, max: i32) -> Result<(), TimeHarpError> {
            if (min..=max).contains(&value) {
                Ok(())
            } else {
                Err(TimeHarpError::InvalidSettings(format!(
                    "{} = {} outside {}..={}",
                    name, value, min, max
                )))
            }
        }

        check("exp_time_ms", self.exp_time_ms, ACQTMIN, ACQTMAX)?;
        check("cfd_zero_cross_mv", self.cfd_zero_cross_mv, ZCMIN, ZCMAX)?;
        check("cfd_discr_min_mv", self.cfd_discr_min_mv, DISCRMIN, DISCRMAX)?;
        check("sync_level_mv", self.sync_level_mv, SYNCMIN, SYNCMAX)?;
        check("offset_ns", self.offset_ns, OFFSETMIN, OFFSETMAX)?;
        check("range", self.range, 0, RANGES - 1)?;
        Ok(())
    }

    /// Acquisition time as a [`Duration`].
    pub fn exposure(&self) -> Duration {
        Duration::from_millis(self.exp_time_ms.max(0) as u64)
    }
}

/// Failure of one standard-mode step.
#[derive(Debug, Error)]
pub enum TimeHarpError {
    /// A setting is outside the card limits.
    #[error("Invalid TimeHarp settings: {0}")]
    InvalidSettings(String),

    /// `TH_Initialize` failed.
    #[error("TH init error: {0}")]
    Init(#[source] ThError),

    /// `TH_Calibrate` failed.
    #[error("Calibration error: {0}")]
    Calibration(#[source] ThError),

    /// `TH_SetCFDDiscrMin` failed.
    #[error("Illegal CFDDiscrMin: {0}")]
    IllegalCfdDiscrMin(#[source] ThError),

    /// `TH_SetCFDZeroCross` failed.
    #[error("Illegal CFDZeroCross: {0}")]
    IllegalCfdZeroCross(#[source] ThError),

    /// `TH_SetSyncLevel` failed.
    #[error("Illegal SyncLevel: {0}")]
    IllegalSyncLevel(#[source] ThError),

    /// `TH_SetRange` failed.
    #[error("Error in SetRange: {0}")]
    SetRange(#[source] ThError),

    /// `TH_SetOffset` failed.
    #[error("Error in SetOffset: {0}")]
    SetOffset(#[source] ThError),

    /// `TH_SetStopOverflow` failed.
    #[error("Error in SetStopOverflow: {0}")]
    SetStopOverflow(#[source] ThError),

    /// `TH_SetMMode` failed.
    #[error("Error in SetMMode: {0}")]
    SetMeasurementMode(#[source] ThError),

    /// `TH_ClearHistMem` failed.
    #[error("Error in ClearHistMem: {0}")]
    ClearHistogram(#[source] ThError),

    /// `TH_StartMeas` failed.
    #[error("Error in StartMeas: {0}")]
    StartMeas(#[source] ThError),

    /// `TH_StopMeas` failed.
    #[error("Error in StopMeas: {0}")]
    StopMeas(#[source] ThError),

    /// `TH_CTCStatus` failed while waiting.
    #[error("Error in CTCStatus: {0}")]
    Status(#[source] ThError),

    /// The acquisition did not complete in time.
    #[error("Measurement did not finish within {timeout:?}")]
    MeasurementTimeout { timeout: Duration },

    /// `TH_GetBlock` failed.
    #[error("Error in GetBlock: {0}")]
    GetBlock(#[source] ThError),
}

impl TimeHarpError {
    /// Coarse class used when converting into [`DriverError`].
    pub fn kind(&self) -> DriverErrorKind {
        match self {
            TimeHarpError::InvalidSettings(_)
            | TimeHarpError::IllegalCfdDiscrMin(_)
            | TimeHarpError::IllegalCfdZeroCross(_)
            | TimeHarpError::IllegalSyncLevel(_)
            | TimeHarpError::SetRange(_)
            | TimeHarpError::SetOffset(_)
            | TimeHarpError::SetStopOverflow(_)
            | TimeHarpError::SetMeasurementMode(_) => DriverErrorKind::Configuration,
            TimeHarpError::Init(_) | TimeHarpError::Calibration(_) => {
                DriverErrorKind::Initialization
            }
            TimeHarpError::ClearHistogram(_)
            | TimeHarpError::StartMeas(_)
            | TimeHarpError::StopMeas(_)
            | TimeHarpError::Status(_)
            | TimeHarpError::GetBlock(_) => DriverErrorKind::Communication,
            TimeHarpError::MeasurementTimeout { .. } => DriverErrorKind::Timeout,
        }
    }
}

impl From<TimeHarpError> for DriverError {
    fn from(err: TimeHarpError) -> Self {
        DriverError::new(DRIVER_TYPE, err.kind(), err.to_string())
    }
}

/// One histogram read from the card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// [`BLOCKSIZE`] bin counts.
    pub counts: Vec<u32>,
    /// Bin width in nanoseconds.
    pub resolution_ns: f32,
    /// A bin reached the overflow limit and the card stopped counting.
    pub overflow: bool,
}

impl Histogram {
    /// Sum of all bins.
    pub fn total_counts(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Index of the fullest bin, if any bin holds counts.
    pub fn peak_bin(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .max_by_key(|(_, &c)| c)
            .map(|(i, _)| i)
    }
}

/// Bring the card up in standard mode and apply `settings`.
///
/// Returns the offset the card applied, which may differ from the requested one.
pub fn initialize_standard<S: TimeHarpSdk + ?Sized>(
    sdk: &mut S,
    settings: &StandardSettings,
) -> Result<i32, TimeHarpError> {
    settings.validate()?;

    sdk.initialize(MeasurementMode::Standard)
        .map_err(TimeHarpError::Init)?;
    sdk.calibrate().map_err(TimeHarpError::Calibration)?;
    sdk.set_cfd_discr_min(settings.cfd_discr_min_mv)
        .map_err(TimeHarpError::IllegalCfdDiscrMin)?;
    sdk.set_cfd_zero_cross(settings.cfd_zero_cross_mv)
        .map_err(TimeHarpError::IllegalCfdZeroCross)?;
    sdk.set_sync_level(settings.sync_level_mv)
        .map_err(TimeHarpError::IllegalSyncLevel)?;
    sdk.set_range(settings.range)
        .map_err(TimeHarpError::SetRange)?;
    let offset = sdk
        .set_offset(settings.offset_ns)
        .map_err(TimeHarpError::SetOffset)?;
    sdk.set_stop_overflow(true)
        .map_err(TimeHarpError::SetStopOverflow)?;
    sdk.set_mmode(HistogramMode::OneShot, settings.exp_time_ms)
        .map_err(TimeHarpError::SetMeasurementMode)?;

    if offset != settings.offset_ns {
        tracing::debug!(requested = settings.offset_ns, applied = offset, "Offset adjusted by card");
    }
    tracing::info!(
        exp_time_ms = settings.exp_time_ms,
        range = settings.range,
        offset_ns = offset,
        "TimeHarp initialized in standard mode"
    );
    Ok(offset)
}

/// Clear histogram block 0 and start a measurement.
pub fn start_standard<S: TimeHarpSdk + ?Sized>(sdk: &mut S) -> Result<(), TimeHarpError> {
    sdk.clear_hist_mem(0)
        .map_err(TimeHarpError::ClearHistogram)?;
    sdk.start_meas().map_err(TimeHarpError::StartMeas)?;
    tracing::debug!("TimeHarp measurement started");
    Ok(())
}

/// Poll until the card reports the acquisition time elapsed.
pub fn wait_for_measurement<S: TimeHarpSdk + ?Sized>(
    sdk: &mut S,
    interval: Duration,
    timeout: Duration,
) -> Result<(), TimeHarpError> {
    let started = Instant::now();
    loop {
        if sdk.ctc_status().map_err(TimeHarpError::Status)? {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(TimeHarpError::MeasurementTimeout { timeout });
        }
        std::thread::sleep(interval);
    }
}

/// Stop the measurement and read histogram block 0.
///
/// An overflowed histogram is returned with [`Histogram::overflow`] set and a
/// warning logged.
pub fn read_standard<S: TimeHarpSdk + ?Sized>(sdk: &mut S) -> Result<Histogram, TimeHarpError> {
    sdk.stop_meas().map_err(TimeHarpError::StopMeas)?;
    let resolution_ns = sdk.resolution();

    let mut counts = vec![0u32; BLOCKSIZE];
    sdk.get_block(&mut counts, 0)
        .map_err(TimeHarpError::GetBlock)?;

    let overflow = match sdk.flags() {
        Ok(flags) => flags & FLAG_OVERFLOW != 0,
        Err(e) => {
            tracing::warn!("Cannot read TimeHarp flags: {}", e);
            false
        }
    };
    if overflow {
        tracing::warn!("TimeHarp histogram overflow");
    }

    let histogram = Histogram {
        counts,
        resolution_ns,
        overflow,
    };
    tracing::info!(
        total_counts = histogram.total_counts(),
        resolution_ns,
        "TimeHarp histogram read"
    );
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        StandardSettings::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_fields_are_named() {
        let cases = [
            StandardSettings { exp_time_ms: 0, ..Default::default() },
            StandardSettings { cfd_zero_cross_mv: 41, ..Default::default() },
            StandardSettings { cfd_discr_min_mv: -1, ..Default::default() },
            StandardSettings { sync_level_mv: 401, ..Default::default() },
            StandardSettings { offset_ns: 2001, ..Default::default() },
            StandardSettings { range: RANGES, ..Default::default() },
        ];
        let names = [
            "exp_time_ms",
            "cfd_zero_cross_mv",
            "cfd_discr_min_mv",
            "sync_level_mv",
            "offset_ns",
            "range",
        ];
        for (settings, name) in cases.iter().zip(names) {
            let err = settings.validate().unwrap_err();
            assert!(err.to_string().contains(name), "{}", err);
        }
    }

    #[test]
    fn peak_bin_ignores_empty_histogram() {
        let mut h = Histogram {
            counts: vec![0; 8],
            resolution_ns: 0.1,
            overflow: false,
        };
        assert_eq!(h.peak_bin(), None);
        h.counts[5] = 3;
        h.counts[2] = 1;
        assert_eq!(h.peak_bin(), Some(5));
        assert_eq!(h.total_counts(), 4);
    }
}
