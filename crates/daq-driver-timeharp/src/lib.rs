//! PicoQuant TimeHarp 200 standard-mode histogramming
//!
//! Components:
//! - Sdk: the [`TimeHarpSdk`] seam and the card's limits
//! - Standard: initialize / start / read of one histogram
//! - Ffi: the real `thlib` (`timeharp_hardware`)
//! - Mock: a simulated card (`mock`, on by default)

pub mod components;

pub use crate::components::sdk::{
    HistogramMode, MeasurementMode, ThError, TimeHarpSdk, BLOCKSIZE, FLAG_OVERFLOW, RANGES,
};
pub use crate::components::standard::{
    initialize_standard, read_standard, start_standard, wait_for_measurement, Histogram,
    StandardSettings, TimeHarpError, DRIVER_TYPE,
};

#[cfg(feature = "timeharp_hardware")]
pub use crate::components::ffi::TimeHarpFfi;
#[cfg(feature = "mock")]
pub use crate::components::mock::{SimulatedSignal, SimulatedTimeHarp, ThCall};

/// The card this build talks to: the real library with `timeharp_hardware`,
/// otherwise a simulated card.
#[cfg(any(feature = "timeharp_hardware", feature = "mock"))]
pub fn default_sdk() -> Box<dyn TimeHarpSdk> {
    #[cfg(feature = "timeharp_hardware")]
    {
        Box::new(TimeHarpFfi::new())
    }
    #[cfg(not(feature = "timeharp_hardware"))]
    {
        tracing::warn!("timeharp_hardware feature NOT enabled - using simulated card");
        Box::new(SimulatedTimeHarp::new(None))
    }
}
