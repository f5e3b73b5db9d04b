//! PVCAM SDK seam.
//!
//! [`PvcamSdk`] lists the driver calls the script session needs, one method
//! per PVCAM function. The real SDK implements it in
//! [`ffi`](crate::components::ffi) (behind `pvcam_hardware`); the
//! [`SimulatedPvcam`](crate::components::mock::SimulatedPvcam) implements it
//! for tests and for machines without a camera.

use serde::Serialize;
use std::ffi::CStr;
use thiserror::Error;

/// Failure reported by a PVCAM call, with the SDK's error code and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error {code} - {message}")]
pub struct SdkError {
    /// `pl_error_code` at the time of failure.
    pub code: i16,
    /// `pl_error_message` text for `code`.
    pub message: String,
}

impl SdkError {
    /// Build an error from a code and message.
    pub fn new(code: i16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Sizes reported by `pl_exp_setup_script` after a script compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptSetup {
    /// Bytes needed to hold every image the script produces.
    pub stream_bytes: u32,
    /// Number of `PIXEL_DISPLAY` directives in the script.
    pub num_rects: u32,
}

impl ScriptSetup {
    /// Pixel buffer length in `u16` elements.
    pub fn buffer_len(&self) -> usize {
        self.stream_bytes as usize / std::mem::size_of::<u16>()
    }
}

/// Raw script error position from `pl_exp_listerr_script`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptErrorInfo {
    /// Offending character.
    pub character: char,
    /// Index of the character in the whole script.
    pub char_index: u32,
    /// 1-based line number, 0 when unknown.
    pub line: u32,
    /// 1-based character position within the line, 0 when unknown.
    pub column: u32,
}

/// Placement of one `PIXEL_DISPLAY` region inside the pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoiDescriptor {
    /// Region width in pixels.
    pub x: u16,
    /// Region height in pixels.
    pub y: u16,
    /// Element index in the pixel buffer where this region's data begins.
    pub offset: usize,
}

/// Driver-reported state of an in-flight readout (`pl_exp_check_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadoutStatus {
    /// No readout is running.
    NotActive,
    /// The sensor is exposing.
    ExposureInProgress,
    /// Pixels are being transferred.
    ReadoutInProgress,
    /// The buffer holds a full frame.
    Complete,
    /// The readout was aborted by the driver.
    Failed,
    /// Acquisition started, readout not yet begun.
    AcquisitionInProgress,
    /// Any code the SDK documents no meaning for.
    Unknown(i16),
}

impl ReadoutStatus {
    /// Decode a `pl_exp_check_status` code.
    pub fn from_raw(code: i16) -> Self {
        match code {
            0 => ReadoutStatus::NotActive,
            1 => ReadoutStatus::ExposureInProgress,
            2 => ReadoutStatus::ReadoutInProgress,
            3 => ReadoutStatus::Complete,
            4 => ReadoutStatus::Failed,
            5 => ReadoutStatus::AcquisitionInProgress,
            other => ReadoutStatus::Unknown(other),
        }
    }

    /// The SDK code for this status.
    pub fn as_raw(self) -> i16 {
        match self {
            ReadoutStatus::NotActive => 0,
            ReadoutStatus::ExposureInProgress => 1,
            ReadoutStatus::ReadoutInProgress => 2,
            ReadoutStatus::Complete => 3,
            ReadoutStatus::Failed => 4,
            ReadoutStatus::AcquisitionInProgress => 5,
            ReadoutStatus::Unknown(code) => code,
        }
    }

    /// Whether polling stops at this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReadoutStatus::Complete
                | ReadoutStatus::NotActive
                | ReadoutStatus::Failed
                | ReadoutStatus::Unknown(_)
        )
    }
}

/// Driver calls used by camera connection and ICL script acquisition.
///
/// Methods map one-to-one onto PVCAM functions. Errors carry the SDK's
/// own code and message; callers attach the step that failed.
///
/// # Buffer contract
///
/// After a successful [`start_seq`](PvcamSdk::start_seq) the driver may keep
/// writing into `buffer` until [`check_status`](PvcamSdk::check_status)
/// reports a terminal status or [`abort`](PvcamSdk::abort) returns. Callers
/// keep the buffer borrowed and in place for that whole window.
pub trait PvcamSdk: Send {
    /// Open a camera by name. Falls back to the first camera when `name` is unknown.
    fn open_camera(&mut self, name: &str) -> Result<i16, SdkError>;

    /// Close a camera opened with [`open_camera`](PvcamSdk::open_camera).
    fn close_camera(&mut self, hcam: i16) -> Result<(), SdkError>;

    /// Names of every camera the SDK can see.
    fn camera_names(&mut self) -> Result<Vec<String>, SdkError>;

    /// `pl_cam_check`: is `hcam` an open camera.
    fn cam_check(&mut self, hcam: i16) -> bool;

    fn exp_init_seq(&mut self) -> Result<(), SdkError>;

    fn exp_uninit_seq(&mut self) -> Result<(), SdkError>;

    fn exp_init_script(&mut self) -> Result<(), SdkError>;

    fn exp_uninit_script(&mut self) -> Result<(), SdkError>;

    /// Compile `script` and install it on `hcam`.
    fn setup_script(&mut self, hcam: i16, script: &CStr) -> Result<ScriptSetup, SdkError>;

    /// Position of the most recent script compile error.
    fn listerr_script(&mut self, hcam: i16) -> Result<ScriptErrorInfo, SdkError>;

    /// Region placements for the loaded script, relative to `buffer`.
    ///
    /// Returns `num_rects` descriptors whose offsets are element indices.
    fn display_script(
        &mut self,
        hcam: i16,
        buffer: &mut [u16],
        num_rects: u32,
    ) -> Result<Vec<RoiDescriptor>, SdkError>;

    /// Start the loaded script, streaming pixels into `buffer`.
    fn start_seq(&mut self, hcam: i16, buffer: &mut [u16]) -> Result<(), SdkError>;

    /// Current readout status and bytes transferred so far.
    fn check_status(&mut self, hcam: i16) -> Result<(ReadoutStatus, u32), SdkError>;

    /// Halt an in-flight acquisition.
    fn abort(&mut self, hcam: i16) -> Result<(), SdkError>;
}

impl<T: PvcamSdk + ?Sized> PvcamSdk for Box<T> {
    fn open_camera(&mut self, name: &str) -> Result<i16, SdkError> {
        (**self).open_camera(name)
    }
    fn close_camera(&mut self, hcam: i16) -> Result<(), SdkError> {
        (**self).close_camera(hcam)
    }
    fn camera_names(&mut self) -> Result<Vec<String>, SdkError> {
        (**self).camera_names()
    }
    fn cam_check(&mut self, hcam: i16) -> bool {
        (**self).cam_check(hcam)
    }
    fn exp_init_seq(&mut self) -> Result<(), SdkError> {
        (**self).exp_init_seq()
    }
    fn exp_uninit_seq(&mut self) -> Result<(), SdkError> {
        (**self).exp_uninit_seq()
    }
    fn exp_init_script(&mut self) -> Result<(), SdkError> {
        (**self).exp_init_script()
    }
    fn exp_uninit_script(&mut self) -> Result<(), SdkError> {
        (**self).exp_uninit_script()
    }
    fn setup_script(&mut self, hcam: i16, script: &CStr) -> Result<ScriptSetup, SdkError> {
        (**self).setup_script(hcam, script)
    }
    fn listerr_script(&mut self, hcam: i16) -> Result<ScriptErrorInfo, SdkError> {
        (**self).listerr_script(hcam)
    }
    fn display_script(
        &mut self,
        hcam: i16,
        buffer: &mut [u16],
        num_rects: u32,
    ) -> Result<Vec<RoiDescriptor>, SdkError> {
        (**self).display_script(hcam, buffer, num_rects)
    }
    fn start_seq(&mut self, hcam: i16, buffer: &mut [u16]) -> Result<(), SdkError> {
        (**self).start_seq(hcam, buffer)
    }
    fn check_status(&mut self, hcam: i16) -> Result<(ReadoutStatus, u32), SdkError> {
        (**self).check_status(hcam)
    }
    fn abort(&mut self, hcam: i16) -> Result<(), SdkError> {
        (**self).abort(hcam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_raw() {
        for code in -1..8 {
            assert_eq!(ReadoutStatus::from_raw(code).as_raw(), code);
        }
    }

    #[test]
    fn only_complete_not_active_failed_and_unknown_are_terminal() {
        assert!(ReadoutStatus::Complete.is_terminal());
        assert!(ReadoutStatus::NotActive.is_terminal());
        assert!(ReadoutStatus::Failed.is_terminal());
        assert!(ReadoutStatus::Unknown(42).is_terminal());
        assert!(!ReadoutStatus::ExposureInProgress.is_terminal());
        assert!(!ReadoutStatus::ReadoutInProgress.is_terminal());
        assert!(!ReadoutStatus::AcquisitionInProgress.is_terminal());
    }

    #[test]
    fn buffer_len_truncates_odd_byte_counts() {
        let setup = ScriptSetup {
            stream_bytes: 201,
            num_rects: 1,
        };
        assert_eq!(setup.buffer_len(), 100);
    }
}
