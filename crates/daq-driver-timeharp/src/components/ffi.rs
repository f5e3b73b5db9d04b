//! [`TimeHarpSdk`] backed by the real `thlib`.

use crate::components::sdk::{HistogramMode, MeasurementMode, ThError, TimeHarpSdk, BLOCKSIZE};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use timeharp_sys::*;

/// Buffer size for `TH_GetErrorString`.
const ERROR_STRING_LEN: usize = 64;

/// Live TimeHarp 200 card.
///
/// The library drives a single card through process-wide state, so there is
/// nothing to hold beyond the marker.
#[derive(Debug, Default)]
pub struct TimeHarpFfi {
    _private: (),
}

impl TimeHarpFfi {
    /// Handle on the card driven by `thlib`.
    pub fn new() -> Self {
        Self::default()
    }
}

fn error_string(code: c_int) -> String {
    let mut buf = vec![0 as c_char; ERROR_STRING_LEN];
    // SAFETY: buf is writable and larger than the library's longest message.
    let ret = unsafe { TH_GetErrorString(buf.as_mut_ptr(), code) };
    if ret < 0 {
        return format!("unknown error {}", code);
    }
    // SAFETY: The library NUL-terminates within the buffer.
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string()
}

fn check(ret: c_int) -> Result<c_int, ThError> {
    if ret < 0 {
        Err(ThError::new(ret, error_string(ret)))
    } else {
        Ok(ret)
    }
}

impl TimeHarpSdk for TimeHarpFfi {
    fn initialize(&mut self, mode: MeasurementMode) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_Initialize(mode.as_raw()) }).map(drop)
    }

    fn calibrate(&mut self) -> Result<(), ThError> {
        // SAFETY: No arguments; card initialized by the caller.
        check(unsafe { TH_Calibrate() }).map(drop)
    }

    fn set_cfd_discr_min(&mut self, millivolts: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_SetCFDDiscrMin(millivolts) }).map(drop)
    }

    fn set_cfd_zero_cross(&mut self, millivolts: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_SetCFDZeroCross(millivolts) }).map(drop)
    }

    fn set_sync_level(&mut self, millivolts: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_SetSyncLevel(millivolts) }).map(drop)
    }

    fn set_range(&mut self, range: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_SetRange(range) }).map(drop)
    }

    fn set_offset(&mut self, nanoseconds: i32) -> Result<i32, ThError> {
        // SAFETY: Plain integer argument; returns the applied offset.
        check(unsafe { TH_SetOffset(nanoseconds) })
    }

    fn set_stop_overflow(&mut self, stop: bool) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_SetStopOverflow(c_int::from(stop)) }).map(drop)
    }

    fn set_mmode(&mut self, mode: HistogramMode, acquisition_ms: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer arguments.
        check(unsafe { TH_SetMMode(mode.as_raw(), acquisition_ms) }).map(drop)
    }

    fn clear_hist_mem(&mut self, block: i32) -> Result<(), ThError> {
        // SAFETY: Plain integer argument.
        check(unsafe { TH_ClearHistMem(block) }).map(drop)
    }

    fn start_meas(&mut self) -> Result<(), ThError> {
        // SAFETY: No arguments.
        check(unsafe { TH_StartMeas() }).map(drop)
    }

    fn stop_meas(&mut self) -> Result<(), ThError> {
        // SAFETY: No arguments.
        check(unsafe { TH_StopMeas() }).map(drop)
    }

    fn ctc_status(&mut self) -> Result<bool, ThError> {
        // SAFETY: No arguments.
        check(unsafe { TH_CTCStatus() }).map(|s| s != 0)
    }

    fn resolution(&mut self) -> f32 {
        // SAFETY: No arguments.
        unsafe { TH_GetResolution() }
    }

    fn get_block(&mut self, counts: &mut [u32], block: i32) -> Result<(), ThError> {
        if counts.len() < BLOCKSIZE {
            return Err(ThError::new(
                -1,
                format!("Buffer holds {} bins, need {}", counts.len(), BLOCKSIZE),
            ));
        }
        // SAFETY: counts holds at least BLOCKSIZE elements, the amount the
        // library writes for one block.
        check(unsafe { TH_GetBlock(counts.as_mut_ptr(), block) }).map(drop)
    }

    fn flags(&mut self) -> Result<i32, ThError> {
        // SAFETY: No arguments.
        check(unsafe { TH_GetFlags() })
    }

    fn count_rate(&mut self) -> Result<i32, ThError> {
        // SAFETY: No arguments.
        check(unsafe { TH_GetCountRate() })
    }
}
