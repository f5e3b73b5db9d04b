pub mod acquisition;
#[cfg(feature = "pvcam_hardware")]
pub mod connection;
#[cfg(feature = "pvcam_hardware")]
pub mod ffi;
#[cfg(feature = "mock")]
pub mod mock;
pub mod script;
pub mod sdk;
