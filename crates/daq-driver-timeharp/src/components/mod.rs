#[cfg(feature = "timeharp_hardware")]
pub mod ffi;
#[cfg(feature = "mock")]
pub mod mock;
pub mod sdk;
pub mod standard;
