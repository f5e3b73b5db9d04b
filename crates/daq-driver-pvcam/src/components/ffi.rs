//! [`PvcamSdk`] backed by the real PVCAM library.

use crate::components::connection::{self, last_error, SdkGuard};
use crate::components::sdk::{
    PvcamSdk, ReadoutStatus, RoiDescriptor, ScriptErrorInfo, ScriptSetup, SdkError,
};
use pvcam_sys::*;
use std::collections::HashMap;
use std::ffi::CStr;

/// Live PVCAM driver.
///
/// Holds one SDK reference for its lifetime and remembers each handle's
/// script stream size so undersized buffers are refused before the driver
/// can write past them.
#[derive(Debug)]
pub struct PvcamFfi {
    _sdk: SdkGuard,
    stream_bytes: HashMap<i16, u32>,
}

impl PvcamFfi {
    /// Initialize PVCAM for this driver instance.
    pub fn new() -> Result<Self, SdkError> {
        Ok(Self {
            _sdk: SdkGuard::acquire()?,
            stream_bytes: HashMap::new(),
        })
    }
}

fn check(ok: rs_bool) -> Result<(), SdkError> {
    if ok == 0 {
        Err(last_error())
    } else {
        Ok(())
    }
}

impl PvcamSdk for PvcamFfi {
    fn open_camera(&mut self, name: &str) -> Result<i16, SdkError> {
        connection::open_camera(name)
    }

    fn close_camera(&mut self, hcam: i16) -> Result<(), SdkError> {
        self.stream_bytes.remove(&hcam);
        connection::close_camera(hcam)
    }

    fn camera_names(&mut self) -> Result<Vec<String>, SdkError> {
        connection::camera_names()
    }

    fn cam_check(&mut self, hcam: i16) -> bool {
        // SAFETY: pl_cam_check only inspects the handle value.
        unsafe { pl_cam_check(hcam) != 0 }
    }

    fn exp_init_seq(&mut self) -> Result<(), SdkError> {
        // SAFETY: No arguments; SDK initialized by the guard.
        check(unsafe { pl_exp_init_seq() })
    }

    fn exp_uninit_seq(&mut self) -> Result<(), SdkError> {
        // SAFETY: No arguments; SDK initialized by the guard.
        check(unsafe { pl_exp_uninit_seq() })
    }

    fn exp_init_script(&mut self) -> Result<(), SdkError> {
        // SAFETY: No arguments; SDK initialized by the guard.
        check(unsafe { pl_exp_init_script() })
    }

    fn exp_uninit_script(&mut self) -> Result<(), SdkError> {
        self.stream_bytes.clear();
        // SAFETY: No arguments; SDK initialized by the guard.
        check(unsafe { pl_exp_uninit_script() })
    }

    fn setup_script(&mut self, hcam: i16, script: &CStr) -> Result<ScriptSetup, SdkError> {
        let mut stream_bytes: uns32 = 0;
        let mut num_rects: uns32 = 0;
        // SAFETY: script is NUL-terminated and outlives the call; the SDK
        // copies it. Out pointers are valid locals.
        check(unsafe {
            pl_exp_setup_script(
                hcam,
                script.as_ptr() as *mut _,
                &mut stream_bytes,
                &mut num_rects,
            )
        })?;
        self.stream_bytes.insert(hcam, stream_bytes);
        Ok(ScriptSetup {
            stream_bytes,
            num_rects,
        })
    }

    fn listerr_script(&mut self, hcam: i16) -> Result<ScriptErrorInfo, SdkError> {
        let mut err_char: std::os::raw::c_char = 0;
        let mut char_index: uns32 = 0;
        let mut line: uns32 = 0;
        let mut column: uns32 = 0;
        // SAFETY: All out pointers are valid locals.
        check(unsafe {
            pl_exp_listerr_script(hcam, &mut err_char, &mut char_index, &mut line, &mut column)
        })?;
        Ok(ScriptErrorInfo {
            character: char::from(err_char as u8),
            char_index,
            line,
            column,
        })
    }

    fn display_script(
        &mut self,
        hcam: i16,
        buffer: &mut [u16],
        num_rects: u32,
    ) -> Result<Vec<RoiDescriptor>, SdkError> {
        // SAFETY: icl_disp_type is plain data; an all-zero value is valid.
        let mut info: Vec<icl_disp_type> =
            (0..num_rects).map(|_| unsafe { std::mem::zeroed() }).collect();
        let base = buffer.as_mut_ptr();
        // SAFETY: info has num_rects entries as the SDK expects; base points to
        // the pixel buffer whose size the script reported. The SDK only
        // computes addresses inside it here.
        check(unsafe { pl_exp_display_script(hcam, info.as_mut_ptr(), base as *mut _) })?;

        let elem = std::mem::size_of::<u16>();
        info.iter()
            .map(|d| {
                let byte_offset = (d.disp_addr as usize)
                    .checked_sub(base as usize)
                    .ok_or_else(|| {
                        SdkError::new(-1, "Display address precedes the pixel buffer")
                    })?;
                Ok(RoiDescriptor {
                    x: d.x,
                    y: d.y,
                    offset: byte_offset / elem,
                })
            })
            .collect()
    }

    fn start_seq(&mut self, hcam: i16, buffer: &mut [u16]) -> Result<(), SdkError> {
        let needed = self
            .stream_bytes
            .get(&hcam)
            .copied()
            .ok_or_else(|| SdkError::new(-1, "No ICL script loaded on this camera"))?;
        if buffer.len() * std::mem::size_of::<u16>() < needed as usize {
            return Err(SdkError::new(
                -1,
                format!(
                    "Pixel buffer holds {} bytes, script needs {}",
                    buffer.len() * std::mem::size_of::<u16>(),
                    needed
                ),
            ));
        }
        // SAFETY: buffer is at least stream_bytes long; the caller keeps it
        // borrowed until the readout terminates or is aborted (PvcamSdk contract).
        check(unsafe { pl_exp_start_seq(hcam, buffer.as_mut_ptr() as *mut _) })
    }

    fn check_status(&mut self, hcam: i16) -> Result<(ReadoutStatus, u32), SdkError> {
        let mut status: i16 = 0;
        let mut bytes_arrived: uns32 = 0;
        // SAFETY: Out pointers are valid locals.
        check(unsafe { pl_exp_check_status(hcam, &mut status, &mut bytes_arrived) })?;
        Ok((ReadoutStatus::from_raw(status), bytes_arrived))
    }

    fn abort(&mut self, hcam: i16) -> Result<(), SdkError> {
        // SAFETY: hcam is an open camera; halting an idle camera is harmless.
        check(unsafe { pl_exp_abort(hcam, CCS_HALT as i16) })
    }
}
