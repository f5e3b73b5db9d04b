//! Photometrics PVCAM ICL script acquisition
//!
//! Components:
//! - Sdk: the [`PvcamSdk`] seam over the driver calls
//! - Script: load / run / uninit of an ICL script
//! - Acquisition: readout-status polling
//! - Connection / Ffi: the real SDK (`pvcam_hardware`)
//! - Mock: a simulated driver (`mock`, on by default)
//!
//! [`runner::ScriptRunner`] drives the blocking lifecycle from async code.

pub mod components;
pub mod runner;

pub use crate::components::acquisition::{wait_for_readout, PollPolicy};
pub use crate::components::script::{
    acquire_once, check_handle, load_script, run_script, uninit_script, LoadedScript,
    ScriptDiagnostic, ScriptError, ScriptLocation, ScriptRois, ScriptSession, DRIVER_TYPE,
};
pub use crate::components::sdk::{
    PvcamSdk, ReadoutStatus, RoiDescriptor, ScriptErrorInfo, ScriptSetup, SdkError,
};
pub use crate::runner::{Acquisition, ScriptRunner};

#[cfg(feature = "pvcam_hardware")]
pub use crate::components::ffi::PvcamFfi;
#[cfg(feature = "mock")]
pub use crate::components::mock::{SdkCall, SimulatedPvcam, SimulatedScript};

/// The driver this build talks to: the real SDK with `pvcam_hardware`,
/// otherwise the simulated camera.
#[cfg(any(feature = "pvcam_hardware", feature = "mock"))]
pub fn default_sdk() -> Result<Box<dyn PvcamSdk>, SdkError> {
    tracing::info!(
        "pvcam_hardware feature enabled: {}",
        cfg!(feature = "pvcam_hardware")
    );

    #[cfg(feature = "pvcam_hardware")]
    {
        Ok(Box::new(PvcamFfi::new()?))
    }
    #[cfg(not(feature = "pvcam_hardware"))]
    {
        tracing::warn!("pvcam_hardware feature NOT enabled - using simulated camera");
        Ok(Box::new(SimulatedPvcam::new()))
    }
}
