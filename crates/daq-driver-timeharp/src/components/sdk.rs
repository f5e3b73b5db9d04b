//! TimeHarp SDK seam.
//!
//! [`TimeHarpSdk`] has one method per `thlib` function the standard-mode
//! workflow uses. Library calls return a negative code on failure; the trait
//! turns that into [`ThError`] carrying the code and the library's text.

use thiserror::Error;

/// Bins in one histogram block.
pub const BLOCKSIZE: usize = 4096;
/// Number of selectable time ranges (`0..RANGES`).
pub const RANGES: i32 = 6;
/// Acquisition time limits in milliseconds.
pub const ACQTMIN: i32 = 1;
/// Longest acquisition time in milliseconds.
pub const ACQTMAX: i32 = 36_000_000;
/// Offset limits in nanoseconds.
pub const OFFSETMIN: i32 = 0;
/// Largest offset in nanoseconds.
pub const OFFSETMAX: i32 = 2000;
/// Sync level limits in millivolts.
pub const SYNCMIN: i32 = -1300;
/// Highest sync level in millivolts.
pub const SYNCMAX: i32 = 400;
/// CFD zero-cross limits in millivolts.
pub const ZCMIN: i32 = 0;
/// Highest CFD zero-cross level in millivolts.
pub const ZCMAX: i32 = 40;
/// CFD discriminator limits in millivolts.
pub const DISCRMIN: i32 = 0;
/// Highest CFD discriminator level in millivolts.
pub const DISCRMAX: i32 = 400;
/// Bit set in [`TimeHarpSdk::flags`] when a histogram bin overflowed.
pub const FLAG_OVERFLOW: i32 = 0x0200;

/// Failure reported by a `thlib` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error {code} - {message}")]
pub struct ThError {
    /// Negative `thlib` error code.
    pub code: i32,
    /// `TH_GetErrorString` text for `code`.
    pub message: String,
}

impl ThError {
    /// Build an error from a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Card operating mode passed to `TH_Initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementMode {
    /// Histogramming into on-board memory.
    Standard,
    /// Time-tagged time-resolved streaming.
    Tttr,
}

impl MeasurementMode {
    /// The `thlib` mode code.
    pub fn as_raw(self) -> i32 {
        match self {
            MeasurementMode::Standard => 0,
            MeasurementMode::Tttr => 1,
        }
    }
}

/// Histogramming mode passed to `TH_SetMMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramMode {
    /// One measurement of a fixed acquisition time.
    OneShot,
    /// Back-to-back measurements until stopped.
    Continuous,
}

impl HistogramMode {
    /// The `thlib` mode code.
    pub fn as_raw(self) -> i32 {
        match self {
            HistogramMode::OneShot => 0,
            HistogramMode::Continuous => 1,
        }
    }
}

/// `thlib` calls used by standard-mode histogramming.
pub trait TimeHarpSdk: Send {
    fn initialize(&mut self, mode: MeasurementMode) -> Result<(), ThError>;

    fn calibrate(&mut self) -> Result<(), ThError>;

    fn set_cfd_discr_min(&mut self, millivolts: i32) -> Result<(), ThError>;

    fn set_cfd_zero_cross(&mut self, millivolts: i32) -> Result<(), ThError>;

    fn set_sync_level(&mut self, millivolts: i32) -> Result<(), ThError>;

    fn set_range(&mut self, range: i32) -> Result<(), ThError>;

    /// Request an offset; returns the offset the card actually applied.
    fn set_offset(&mut self, nanoseconds: i32) -> Result<i32, ThError>;

    fn set_stop_overflow(&mut self, stop: bool) -> Result<(), ThError>;

    fn set_mmode(&mut self, mode: HistogramMode, acquisition_ms: i32) -> Result<(), ThError>;

    fn clear_hist_mem(&mut self, block: i32) -> Result<(), ThError>;

    fn start_meas(&mut self) -> Result<(), ThError>;

    fn stop_meas(&mut self) -> Result<(), ThError>;

    /// `TH_CTCStatus`: true once the acquisition time has elapsed.
    fn ctc_status(&mut self) -> Result<bool, ThError>;

    /// Bin width in nanoseconds for the current range.
    fn resolution(&mut self) -> f32;

    /// Copy histogram `block` into `counts` (at least [`BLOCKSIZE`] long).
    fn get_block(&mut self, counts: &mut [u32], block: i32) -> Result<(), ThError>;

    /// Status flags, see [`FLAG_OVERFLOW`].
    fn flags(&mut self) -> Result<i32, ThError>;

    /// Current input count rate in counts per second.
    fn count_rate(&mut self) -> Result<i32, ThError>;
}

impl<T: TimeHarpSdk + ?Sized> TimeHarpSdk for Box<T> {
    fn initialize(&mut self, mode: MeasurementMode) -> Result<(), ThError> {
        (**self).initialize(mode)
    }
    fn calibrate(&mut self) -> Result<(), ThError> {
        (**self).calibrate()
    }
    fn set_cfd_discr_min(&mut self, millivolts: i32) -> Result<(), ThError> {
        (**self).set_cfd_discr_min(millivolts)
    }
    fn set_cfd_zero_cross(&mut self, millivolts: i32) -> Result<(), ThError> {
        (**self).set_cfd_zero_cross(millivolts)
    }
    fn set_sync_level(&mut self, millivolts: i32) -> Result<(), ThError> {
        (**self).set_sync_level(millivolts)
    }
    fn set_range(&mut self, range: i32) -> Result<(), ThError> {
        (**self).set_range(range)
    }
    fn set_offset(&mut self, nanoseconds: i32) -> Result<i32, ThError> {
        (**self).set_offset(nanoseconds)
    }
    fn set_stop_overflow(&mut self, stop: bool) -> Result<(), ThError> {
        (**self).set_stop_overflow(stop)
    }
    fn set_mmode(&mut self, mode: HistogramMode, acquisition_ms: i32) -> Result<(), ThError> {
        (**self).set_mmode(mode, acquisition_ms)
    }
    fn clear_hist_mem(&mut self, block: i32) -> Result<(), ThError> {
        (**self).clear_hist_mem(block)
    }
    fn start_meas(&mut self) -> Result<(), ThError> {
        (**self).start_meas()
    }
    fn stop_meas(&mut self) -> Result<(), ThError> {
        (**self).stop_meas()
    }
    fn ctc_status(&mut self) -> Result<bool, ThError> {
        (**self).ctc_status()
    }
    fn resolution(&mut self) -> f32 {
        (**self).resolution()
    }
    fn get_block(&mut self, counts: &mut [u32], block: i32) -> Result<(), ThError> {
        (**self).get_block(counts, block)
    }
    fn flags(&mut self) -> Result<i32, ThError> {
        (**self).flags()
    }
    fn count_rate(&mut self) -> Result<i32, ThError> {
        (**self).count_rate()
    }
}
