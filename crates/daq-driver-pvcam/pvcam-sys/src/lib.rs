//! Low-level FFI bindings for the Photometrics PVCAM SDK.
//!
//! Covers camera management (`pl_pvcam_*`, `pl_cam_*`), the exposure-sequence
//! calls (`pl_exp_init_seq`, `pl_exp_start_seq`, `pl_exp_check_status`, ...)
//! and the ICL scripting extension from `pv_icl.h` (`pl_exp_setup_script`,
//! `pl_exp_display_script`, `pl_exp_listerr_script`, ...).
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-pvcam` crate instead.
//!
//! # Features
//!
//! - `pvcam-sdk`: Generate bindings from the SDK headers under `PVCAM_SDK_DIR`
//!   and link against the PVCAM library. Without it this crate is empty.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
