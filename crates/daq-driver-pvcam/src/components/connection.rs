//! PVCAM Connection Management
//!
//! Handles SDK initialization and camera opening/closing for the real driver.
//!
//! ## SDK Reference Counting
//!
//! The PVCAM SDK uses global state: `pl_pvcam_init()` and `pl_pvcam_uninit()`
//! affect the entire process. Each [`SdkGuard`] holds one reference; the SDK
//! is initialized when the first guard is created and uninitialized when the
//! last one drops.

use crate::components::sdk::SdkError;
use pvcam_sys::*;
use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Number of live [`SdkGuard`]s.
static SDK_REF_COUNT: AtomicU32 = AtomicU32::new(0);

/// Makes increment + init and decrement + uninit atomic.
static SDK_INIT_MUTEX: Mutex<()> = Mutex::new(());

/// Buffer size for camera names and error messages.
const NAME_BUFFER_LEN: usize = 256;

/// Last PVCAM error as an [`SdkError`].
pub(crate) fn last_error() -> SdkError {
    unsafe {
        // SAFETY: Error query functions are callable at any time after load.
        let code = pl_error_code();
        let mut msg = vec![0 as std::os::raw::c_char; NAME_BUFFER_LEN];
        // SAFETY: Buffer is writable and sized per SDK requirement.
        pl_error_message(code, msg.as_mut_ptr());
        let text = CStr::from_ptr(msg.as_ptr()).to_string_lossy().into_owned();
        SdkError::new(code, text)
    }
}

fn lock_init() -> std::sync::MutexGuard<'static, ()> {
    match SDK_INIT_MUTEX.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("SDK init mutex poisoned - recovering");
            poisoned.into_inner()
        }
    }
}

/// One reference on the process-wide PVCAM initialization.
#[derive(Debug)]
pub struct SdkGuard {
    _private: (),
}

impl SdkGuard {
    /// Take a reference, initializing PVCAM on the first one.
    pub fn acquire() -> Result<Self, SdkError> {
        let _guard = lock_init();
        let prev = SDK_REF_COUNT.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            unsafe {
                // SAFETY: Global PVCAM init; serialized by SDK_INIT_MUTEX.
                if pl_pvcam_init() == 0 {
                    SDK_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
                    return Err(last_error());
                }
            }
            tracing::info!("PVCAM SDK initialized (ref count: 1)");
        } else {
            tracing::debug!("PVCAM SDK already initialized (ref count: {})", prev + 1);
        }
        Ok(Self { _private: () })
    }
}

impl Drop for SdkGuard {
    fn drop(&mut self) {
        let _guard = lock_init();
        let prev = SDK_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
        match prev {
            1 => {
                unsafe {
                    // SAFETY: Last reference; serialized by SDK_INIT_MUTEX.
                    pl_pvcam_uninit();
                }
                tracing::info!("PVCAM SDK uninitialized (last connection closed)");
            }
            0 => {
                tracing::error!("PVCAM SDK ref count underflow");
                SDK_REF_COUNT.store(0, Ordering::SeqCst);
            }
            n => tracing::debug!("PVCAM SDK still in use (ref count: {})", n - 1),
        }
    }
}

/// Names of all cameras visible to the SDK.
pub fn camera_names() -> Result<Vec<String>, SdkError> {
    let mut total: i16 = 0;
    unsafe {
        // SAFETY: total is a valid out pointer; SDK initialized by an SdkGuard.
        if pl_cam_get_total(&mut total) == 0 {
            return Err(last_error());
        }
    }

    let mut names = Vec::with_capacity(total.max(0) as usize);
    for i in 0..total {
        let mut buf = vec![0 as std::os::raw::c_char; NAME_BUFFER_LEN];
        unsafe {
            // SAFETY: buf is writable and sized per SDK requirement.
            if pl_cam_get_name(i, buf.as_mut_ptr()) != 0 {
                names.push(CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned());
            } else {
                tracing::warn!("Failed to get name for camera {}: {}", i, last_error());
            }
        }
    }
    Ok(names)
}

/// Open `name`, or the first camera if `name` cannot be opened.
pub fn open_camera(name: &str) -> Result<i16, SdkError> {
    let wanted = CString::new(name).map_err(|_| SdkError::new(-1, "Invalid camera name"))?;
    let mut hcam: i16 = -1;
    unsafe {
        // SAFETY: wanted is a valid C string; hcam is a valid out pointer.
        if pl_cam_open(wanted.as_ptr() as *mut _, &mut hcam, 0) != 0 {
            return Ok(hcam);
        }
    }

    let first = camera_names()?
        .into_iter()
        .next()
        .ok_or_else(|| SdkError::new(-1, "No PVCAM cameras detected"))?;
    tracing::warn!("Camera '{}' not found, opening '{}'", name, first);
    let first = CString::new(first).map_err(|_| SdkError::new(-1, "Invalid camera name"))?;
    unsafe {
        // SAFETY: first is a valid C string; hcam is a valid out pointer.
        if pl_cam_open(first.as_ptr() as *mut _, &mut hcam, 0) == 0 {
            return Err(last_error());
        }
    }
    Ok(hcam)
}

/// `pl_cam_close`.
pub fn close_camera(hcam: i16) -> Result<(), SdkError> {
    unsafe {
        // SAFETY: PVCAM validates the handle and reports failure for stale ones.
        if pl_cam_close(hcam) == 0 {
            return Err(last_error());
        }
    }
    Ok(())
}
