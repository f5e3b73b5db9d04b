//! ICL script acquisition.
//!
//! An ICL script is loaded once, run any number of times into the same pixel
//! buffer, then uninitialized:
//!
//! ```text
//! load   -> exp_init_seq, exp_init_script, setup_script, display_script
//! run    -> start_seq, check_status until terminal      (repeatable)
//! uninit -> exp_uninit_script, exp_uninit_seq
//! ```
//!
//! The free functions mirror those phases for callers that keep state
//! themselves (the host gateway). [`ScriptSession`] wraps the same phases
//! around an owned buffer for Rust callers.

use crate::components::acquisition::{wait_for_readout, PollPolicy};
use crate::components::sdk::{
    PvcamSdk, ReadoutStatus, RoiDescriptor, ScriptErrorInfo, ScriptSetup, SdkError,
};
use daq_core::error::{DriverError, DriverErrorKind};
use daq_core::limits::MAX_SCRIPT_SIZE;
use serde::Serialize;
use std::ffi::CString;
use std::time::Duration;
use thiserror::Error;

/// Name used when converting into [`DriverError`].
pub const DRIVER_TYPE: &str = "pvcam";

/// Location of a script compile error, when the driver can supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line of the offending token.
    pub line: u32,
    /// 1-based character position within the line.
    pub column: u32,
    /// The offending character.
    pub character: char,
}

impl std::fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error at line {} char {} ({})",
            self.line, self.column, self.character
        )
    }
}

/// What the driver could tell us about a compile failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptDiagnostic {
    /// Position of the offending character.
    Location(ScriptLocation),
    /// The listing call itself failed.
    ListingFailed(SdkError),
    /// The driver reported no usable line/column.
    Unavailable,
}

impl ScriptDiagnostic {
    fn from_listing(listing: Result<ScriptErrorInfo, SdkError>) -> Self {
        match listing {
            Ok(info) if info.line > 0 && info.column > 0 => {
                ScriptDiagnostic::Location(ScriptLocation {
                    line: info.line,
                    column: info.column,
                    character: info.character,
                })
            }
            Ok(_) => ScriptDiagnostic::Unavailable,
            Err(e) => ScriptDiagnostic::ListingFailed(e),
        }
    }

    /// Human-readable warning text, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            ScriptDiagnostic::Location(location) => Some(location.to_string()),
            ScriptDiagnostic::ListingFailed(e) => {
                Some(format!("Cannot obtain ICL error info: {}", e))
            }
            ScriptDiagnostic::Unavailable => None,
        }
    }
}

/// Failure of one step of the script lifecycle.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// `hcam` is not an open camera.
    #[error("HCAM is not a handle to an open camera")]
    InvalidHandle { hcam: i16 },

    /// The script text is empty.
    #[error("SCRIPT cannot be empty")]
    EmptyScript,

    /// The script exceeds the size limit.
    #[error("Script size {bytes} bytes exceeds maximum {max_bytes} bytes")]
    ScriptTooLarge { bytes: usize, max_bytes: usize },

    /// The script cannot be passed as a C string.
    #[error("SCRIPT contains a NUL character at position {position}")]
    InteriorNul { position: usize },

    /// `pl_exp_init_seq` failed.
    #[error("Cannot initialize exposure sequence: {0}")]
    InitSequence(#[source] SdkError),

    /// `pl_exp_init_script` failed.
    #[error("Cannot initialize ICL scripting: {0}")]
    InitScripting(#[source] SdkError),

    /// `pl_exp_setup_script` rejected the script.
    #[error("ICL script error: {source}")]
    Compile {
        source: SdkError,
        diagnostic: ScriptDiagnostic,
    },

    /// `pl_exp_display_script` failed.
    #[error("Cannot obtain ICL display info: {0}")]
    DisplayInfo(#[source] SdkError),

    /// A display region extends past the end of the pixel buffer.
    #[error("ICL display region {index} at element {offset} does not fit the {len}-element buffer")]
    RegionOutOfBounds {
        /// Position of the region in script order.
        index: usize,
        /// First buffer element of the region.
        offset: usize,
        /// Buffer length in elements.
        len: usize,
    },

    /// `pl_exp_start_seq` failed.
    #[error("Cannot start ICL script: {0}")]
    Start(#[source] SdkError),

    /// `pl_exp_check_status` failed while polling.
    #[error("Cannot check camera status during exposure: {0}")]
    StatusCheck(#[source] SdkError),

    /// The camera reported no active readout.
    #[error("Camera readout never started")]
    ReadoutNeverStarted,

    /// The camera reported a failed readout.
    #[error("Camera readout failed")]
    ReadoutFailed,

    /// Polling ended on a status code with no known meaning.
    #[error("Unknown camera readout termination (status {status})")]
    UnknownTermination { status: i16 },

    /// The poll timeout elapsed before the readout finished.
    #[error("Camera readout did not finish within {timeout:?}")]
    ReadoutTimeout { timeout: Duration },

    /// `pl_exp_uninit_script` failed.
    #[error("Cannot uninitialize ICL scripting: {0}")]
    UninitScripting(#[source] SdkError),

    /// `pl_exp_uninit_seq` failed.
    #[error("Cannot uninitialize exposure sequence: {0}")]
    UninitSequence(#[source] SdkError),
}

impl ScriptError {
    /// Coarse class used when converting into [`DriverError`].
    pub fn kind(&self) -> DriverErrorKind {
        match self {
            ScriptError::InvalidHandle { .. } => DriverErrorKind::InvalidHandle,
            ScriptError::EmptyScript
            | ScriptError::ScriptTooLarge { .. }
            | ScriptError::InteriorNul { .. }
            | ScriptError::Compile { .. } => DriverErrorKind::Configuration,
            ScriptError::InitSequence(_) | ScriptError::InitScripting(_) => {
                DriverErrorKind::Initialization
            }
            ScriptError::DisplayInfo(_)
            | ScriptError::Start(_)
            | ScriptError::StatusCheck(_) => DriverErrorKind::Communication,
            ScriptError::RegionOutOfBounds { .. }
            | ScriptError::ReadoutNeverStarted
            | ScriptError::ReadoutFailed => DriverErrorKind::Hardware,
            ScriptError::UnknownTermination { .. } => DriverErrorKind::Unknown,
            ScriptError::ReadoutTimeout { .. } => DriverErrorKind::Timeout,
            ScriptError::UninitScripting(_) | ScriptError::UninitSequence(_) => {
                DriverErrorKind::Shutdown
            }
        }
    }

    /// Compile diagnostic, for [`ScriptError::Compile`] only.
    pub fn diagnostic(&self) -> Option<&ScriptDiagnostic> {
        match self {
            ScriptError::Compile { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

impl From<ScriptError> for DriverError {
    fn from(err: ScriptError) -> Self {
        DriverError::new(DRIVER_TYPE, err.kind(), err.to_string())
    }
}

/// ROI output of a loaded script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptRois {
    /// The script declares no `PIXEL_DISPLAY` directive.
    NoImage,
    /// One entry per directive, in script order.
    Regions(Vec<RoiDescriptor>),
}

impl ScriptRois {
    /// Declared regions; empty for [`ScriptRois::NoImage`].
    pub fn regions(&self) -> &[RoiDescriptor] {
        match self {
            ScriptRois::NoImage => &[],
            ScriptRois::Regions(r) => r,
        }
    }
}

/// Result of a successful [`load_script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedScript {
    /// Sizes reported by the driver.
    pub setup: ScriptSetup,
    /// Zeroed pixel buffer sized for one run of the script.
    pub buffer: Vec<u16>,
    /// Display regions inside `buffer`.
    pub rois: ScriptRois,
}

/// Fail with [`ScriptError::InvalidHandle`] unless `hcam` is an open camera.
pub fn check_handle<S: PvcamSdk + ?Sized>(sdk: &mut S, hcam: i16) -> Result<(), ScriptError> {
    if sdk.cam_check(hcam) {
        Ok(())
    } else {
        Err(ScriptError::InvalidHandle { hcam })
    }
}

fn script_cstring(script: &str) -> Result<CString, ScriptError> {
    if script.is_empty() {
        return Err(ScriptError::EmptyScript);
    }
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptTooLarge {
            bytes: script.len(),
            max_bytes: MAX_SCRIPT_SIZE,
        });
    }
    CString::new(script).map_err(|e| ScriptError::InteriorNul {
        position: e.nul_position(),
    })
}

/// Initialize the exposure-sequence and scripting layers and install `script`.
///
/// On failure every layer this call brought up is torn down again, so the
/// camera is left without a script.
pub fn load_script<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    script: &str,
) -> Result<LoadedScript, ScriptError> {
    let script = script_cstring(script)?;

    sdk.exp_init_seq().map_err(ScriptError::InitSequence)?;

    if let Err(e) = sdk.exp_init_script() {
        rollback_sequence(sdk);
        return Err(ScriptError::InitScripting(e));
    }

    match install_script(sdk, hcam, &script) {
        Ok(loaded) => {
            tracing::info!(
                hcam,
                stream_bytes = loaded.setup.stream_bytes,
                num_rects = loaded.setup.num_rects,
                "ICL script loaded"
            );
            Ok(loaded)
        }
        Err(e) => {
            rollback_scripting(sdk);
            rollback_sequence(sdk);
            Err(e)
        }
    }
}

fn install_script<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    script: &CString,
) -> Result<LoadedScript, ScriptError> {
    let setup = match sdk.setup_script(hcam, script) {
        Ok(setup) => setup,
        Err(source) => {
            let diagnostic = ScriptDiagnostic::from_listing(sdk.listerr_script(hcam));
            if let Some(message) = diagnostic.message() {
                tracing::warn!(hcam, "{}", message);
            }
            return Err(ScriptError::Compile { source, diagnostic });
        }
    };

    let mut buffer = vec![0u16; setup.buffer_len()];

    let rois = if setup.num_rects == 0 {
        ScriptRois::NoImage
    } else {
        let regions = sdk
            .display_script(hcam, &mut buffer, setup.num_rects)
            .map_err(ScriptError::DisplayInfo)?;
        for (index, region) in regions.iter().enumerate() {
            if region_end(region).map_or(true, |end| end > buffer.len()) {
                return Err(ScriptError::RegionOutOfBounds {
                    index,
                    offset: region.offset,
                    len: buffer.len(),
                });
            }
        }
        ScriptRois::Regions(regions)
    };

    Ok(LoadedScript {
        setup,
        buffer,
        rois,
    })
}

/// One past the last buffer element of `region`, or `None` on overflow.
fn region_end(region: &RoiDescriptor) -> Option<usize> {
    usize::from(region.x)
        .checked_mul(usize::from(region.y))
        .and_then(|pixels| region.offset.checked_add(pixels))
}

fn rollback_scripting<S: PvcamSdk + ?Sized>(sdk: &mut S) {
    if let Err(e) = sdk.exp_uninit_script() {
        tracing::warn!("Rollback: cannot uninitialize ICL scripting: {}", e);
    }
}

fn rollback_sequence<S: PvcamSdk + ?Sized>(sdk: &mut S) {
    if let Err(e) = sdk.exp_uninit_seq() {
        tracing::warn!("Rollback: cannot uninitialize exposure sequence: {}", e);
    }
}

/// Run the loaded script once, writing pixels into `buffer` in place.
pub fn run_script<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    buffer: &mut [u16],
    policy: &PollPolicy,
) -> Result<(), ScriptError> {
    sdk.start_seq(hcam, buffer).map_err(ScriptError::Start)?;

    match wait_for_readout(sdk, hcam, policy)? {
        ReadoutStatus::Complete => {
            tracing::debug!(hcam, samples = buffer.len(), "ICL script run complete");
            Ok(())
        }
        ReadoutStatus::NotActive => Err(ScriptError::ReadoutNeverStarted),
        ReadoutStatus::Failed => Err(ScriptError::ReadoutFailed),
        other => Err(ScriptError::UnknownTermination {
            status: other.as_raw(),
        }),
    }
}

/// Tear down scripting, then the exposure sequence.
pub fn uninit_script<S: PvcamSdk + ?Sized>(sdk: &mut S, hcam: i16) -> Result<(), ScriptError> {
    sdk.exp_uninit_script()
        .map_err(ScriptError::UninitScripting)?;
    sdk.exp_uninit_seq().map_err(ScriptError::UninitSequence)?;
    tracing::info!(hcam, "ICL script uninitialized");
    Ok(())
}

/// Load, run once and uninitialize.
///
/// The first failing phase ends the call; later phases are skipped.
pub fn acquire_once<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    script: &str,
    policy: &PollPolicy,
) -> Result<LoadedScript, ScriptError> {
    check_handle(sdk, hcam)?;
    let mut loaded = load_script(sdk, hcam, script)?;
    run_script(sdk, hcam, &mut loaded.buffer, policy)?;
    uninit_script(sdk, hcam)?;
    Ok(loaded)
}

/// A loaded ICL script bound to a camera.
///
/// Dropping a session without calling [`uninit`](ScriptSession::uninit)
/// uninitializes it on a best-effort basis.
pub struct ScriptSession<'a, S: PvcamSdk + ?Sized> {
    sdk: &'a mut S,
    hcam: i16,
    policy: PollPolicy,
    setup: ScriptSetup,
    buffer: Vec<u16>,
    rois: ScriptRois,
    runs: u64,
    active: bool,
}

impl<'a, S: PvcamSdk + ?Sized> ScriptSession<'a, S> {
    /// Check `hcam` and load `script` into a new session.
    pub fn load(
        sdk: &'a mut S,
        hcam: i16,
        script: &str,
        policy: PollPolicy,
    ) -> Result<Self, ScriptError> {
        check_handle(sdk, hcam)?;
        let loaded = load_script(sdk, hcam, script)?;
        Ok(Self {
            sdk,
            hcam,
            policy,
            setup: loaded.setup,
            buffer: loaded.buffer,
            rois: loaded.rois,
            runs: 0,
            active: true,
        })
    }

    /// Acquire once into the session buffer.
    pub fn run(&mut self) -> Result<&[u16], ScriptError> {
        run_script(&mut *self.sdk, self.hcam, &mut self.buffer, &self.policy)?;
        self.runs += 1;
        Ok(&self.buffer)
    }

    /// Pixel data from the latest run.
    pub fn buffer(&self) -> &[u16] {
        &self.buffer
    }

    /// Display regions of the loaded script.
    pub fn rois(&self) -> &ScriptRois {
        &self.rois
    }

    /// Sizes reported when the script was loaded.
    pub fn setup(&self) -> ScriptSetup {
        self.setup
    }

    /// Number of successful runs so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Pixel data of region `index` from the latest run, given the region's
    /// element count.
    pub fn region_pixels(&self, index: usize) -> Option<&[u16]> {
        let regions = self.rois.regions();
        let region = regions.get(index)?;
        let end = regions
            .get(index + 1)
            .map_or(self.buffer.len(), |next| next.offset);
        self.buffer.get(region.offset..end)
    }

    /// Uninitialize the script and hand back the buffer.
    pub fn uninit(mut self) -> Result<Vec<u16>, ScriptError> {
        self.active = false;
        uninit_script(&mut *self.sdk, self.hcam)?;
        Ok(std::mem::take(&mut self.buffer))
    }
}

impl<S: PvcamSdk + ?Sized> Drop for ScriptSession<'_, S> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = uninit_script(&mut *self.sdk, self.hcam) {
                tracing::warn!(hcam = self.hcam, "Dropped script session failed to uninitialize: {}", e);
            }
        }
    }
}
