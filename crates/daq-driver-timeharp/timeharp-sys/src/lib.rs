//! Low-level FFI bindings for the PicoQuant TimeHarp 200 library (`thlib`).
//!
//! Covers card setup (`TH_Initialize`, `TH_Calibrate`, `TH_SetCFD*`,
//! `TH_SetSyncLevel`, `TH_SetRange`, `TH_SetOffset`, `TH_SetMMode`) and
//! histogram acquisition (`TH_ClearHistMem`, `TH_StartMeas`, `TH_StopMeas`,
//! `TH_GetBlock`, `TH_GetResolution`, `TH_GetFlags`).
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-timeharp` crate instead.
//!
//! # Features
//!
//! - `timeharp-sdk`: Generate bindings from the headers under
//!   `TIMEHARP_SDK_DIR` and link against `thlib`. Without it this crate is empty.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
