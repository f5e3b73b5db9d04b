//! ICL script lifecycle against the simulated driver.
//!
//! ```bash
//! cargo test -p daq-driver-pvcam --test script_lifecycle
//! ```

#![cfg(feature = "mock")]

use daq_core::error::{DriverError, DriverErrorKind};
use daq_driver_pvcam::{
    acquire_once, load_script, run_script, uninit_script, PollPolicy, PvcamSdk, ReadoutStatus,
    RoiDescriptor, ScriptDiagnostic, ScriptError, ScriptErrorInfo, ScriptRois, ScriptSession,
    SdkCall, SimulatedPvcam, SimulatedScript,
};
use tracing_test::traced_test;

fn camera() -> (SimulatedPvcam, i16) {
    let mut sdk = SimulatedPvcam::new();
    let hcam = sdk.open_camera("SimCam").unwrap();
    (sdk, hcam)
}

fn camera_with(program: SimulatedScript) -> (SimulatedPvcam, i16) {
    let mut sdk = SimulatedPvcam::new().with_program(program);
    let hcam = sdk.open_camera("SimCam").unwrap();
    (sdk, hcam)
}

fn poll() -> PollPolicy {
    PollPolicy::busy_wait()
}

// =============================================================================
// load
// =============================================================================

#[test]
fn script_without_display_directives_has_no_image() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 200,
        ..SimulatedScript::default()
    });

    let loaded = load_script(&mut sdk, hcam, "SCRIPT_BEGIN(1);SCRIPT_END(1);").unwrap();

    assert_eq!(loaded.buffer.len(), 100);
    assert!(loaded.buffer.iter().all(|&px| px == 0));
    assert_eq!(loaded.rois, ScriptRois::NoImage);
    assert_eq!(sdk.count(SdkCall::DisplayScript), 0);
}

#[test]
fn zero_stream_size_gives_empty_buffer() {
    let (mut sdk, hcam) = camera();
    let loaded = load_script(&mut sdk, hcam, "SHUTTER_OPEN();").unwrap();
    assert!(loaded.buffer.is_empty());
    assert_eq!(loaded.rois, ScriptRois::NoImage);
}

#[test]
fn display_regions_are_ordered_and_inside_buffer() {
    let (mut sdk, hcam) = camera();
    let script = "SCRIPT_BEGIN(1);\n\
                  PIXEL_DISPLAY(0,0,10,10);\n\
                  PIXEL_DISPLAY(0,0,3,7);\n\
                  PIXEL_DISPLAY(0,0,1,1);\n\
                  SCRIPT_END(1);";

    let loaded = load_script(&mut sdk, hcam, script).unwrap();
    let regions = loaded.rois.regions();

    assert_eq!(regions.len(), 3);
    assert_eq!(loaded.buffer.len(), 100 + 21 + 1);
    assert!(regions.windows(2).all(|w| w[0].offset <= w[1].offset));
    assert!(regions.iter().all(|r| r.offset < loaded.buffer.len()));
    assert_eq!(regions[1], RoiDescriptor { x: 3, y: 7, offset: 100 });
}

#[test]
fn region_outside_buffer_is_rejected_and_rolled_back() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 8,
        regions: vec![RoiDescriptor { x: 2, y: 2, offset: 4 }],
        ..SimulatedScript::default()
    });

    let err = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2)").unwrap_err();

    assert!(matches!(
        err,
        ScriptError::RegionOutOfBounds { index: 0, offset: 4, len: 4 }
    ));
    assert!(!sdk.is_scripting_initialized());
    assert!(!sdk.is_sequence_initialized());
}

#[test]
fn empty_region_at_end_of_buffer_is_accepted() {
    let regions = vec![
        RoiDescriptor { x: 2, y: 2, offset: 0 },
        RoiDescriptor { x: 0, y: 0, offset: 4 },
    ];
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 8,
        regions: regions.clone(),
        ..SimulatedScript::default()
    });

    let loaded = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2) PIXEL_DISPLAY(0,0)").unwrap();

    assert_eq!(loaded.buffer.len(), 4);
    assert_eq!(loaded.rois, ScriptRois::Regions(regions));
    assert!(sdk.is_scripting_initialized());
}

#[test]
fn zero_size_display_loads_with_empty_buffer() {
    let (mut sdk, hcam) = camera();

    let loaded = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(0,0)").unwrap();

    assert!(loaded.buffer.is_empty());
    assert_eq!(
        loaded.rois,
        ScriptRois::Regions(vec![RoiDescriptor { x: 0, y: 0, offset: 0 }])
    );
}

#[test]
fn region_overrunning_buffer_end_is_rejected() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 8,
        regions: vec![RoiDescriptor { x: 3, y: 1, offset: 2 }],
        ..SimulatedScript::default()
    });

    let err = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(3,1)").unwrap_err();

    assert!(matches!(
        err,
        ScriptError::RegionOutOfBounds { index: 0, offset: 2, len: 4 }
    ));
    assert!(!sdk.is_sequence_initialized());
}

#[test]
fn empty_and_nul_scripts_make_no_driver_calls() {
    let (mut sdk, hcam) = camera();
    sdk.clear_calls();

    assert!(matches!(
        load_script(&mut sdk, hcam, ""),
        Err(ScriptError::EmptyScript)
    ));
    assert!(matches!(
        load_script(&mut sdk, hcam, "AB\0C"),
        Err(ScriptError::InteriorNul { position: 2 })
    ));
    assert!(sdk.calls().is_empty());
}

#[test]
fn sequence_init_failure_stops_before_scripting() {
    let (mut sdk, hcam) = camera();
    sdk.fail(SdkCall::InitSeq);

    let err = load_script(&mut sdk, hcam, "SCRIPT").unwrap_err();

    assert!(matches!(err, ScriptError::InitSequence(_)));
    assert_eq!(sdk.count(SdkCall::InitScript), 0);
    assert_eq!(sdk.count(SdkCall::UninitSeq), 0);
}

#[test]
fn scripting_init_failure_rolls_back_sequence() {
    let (mut sdk, hcam) = camera();
    sdk.fail(SdkCall::InitScript);

    let err = load_script(&mut sdk, hcam, "SCRIPT").unwrap_err();

    assert!(matches!(err, ScriptError::InitScripting(_)));
    assert_eq!(err.kind(), DriverErrorKind::Initialization);
    assert!(!sdk.is_sequence_initialized());
}

#[traced_test]
#[test]
fn compile_error_reports_location() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        compile_error: Some(ScriptErrorInfo {
            character: 'X',
            char_index: 4,
            line: 1,
            column: 5,
        }),
        ..SimulatedScript::default()
    });

    let err = load_script(&mut sdk, hcam, "PIXEX_DISPLAY(0,0,10,10)").unwrap_err();

    let message = err.diagnostic().and_then(ScriptDiagnostic::message).unwrap();
    assert_eq!(message, "Error at line 1 char 5 (X)");
    assert!(logs_contain("Error at line 1 char 5 (X)"));
    assert!(!sdk.has_script(hcam));
    assert!(!sdk.is_scripting_initialized());
    assert!(!sdk.is_sequence_initialized());
}

#[test]
fn compile_error_without_position_has_no_location() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        compile_error: Some(ScriptErrorInfo {
            character: ' ',
            char_index: 0,
            line: 0,
            column: 3,
        }),
        ..SimulatedScript::default()
    });

    let err = load_script(&mut sdk, hcam, "junk").unwrap_err();
    assert_eq!(err.diagnostic(), Some(&ScriptDiagnostic::Unavailable));
}

#[traced_test]
#[test]
fn failing_error_listing_is_reported() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        compile_error: Some(ScriptErrorInfo {
            character: 'X',
            char_index: 4,
            line: 1,
            column: 5,
        }),
        ..SimulatedScript::default()
    });
    sdk.fail(SdkCall::ListErr);

    let err = load_script(&mut sdk, hcam, "junk").unwrap_err();

    assert!(matches!(
        err.diagnostic(),
        Some(ScriptDiagnostic::ListingFailed(_))
    ));
    assert!(logs_contain("Cannot obtain ICL error info"));
}

#[test]
fn second_load_on_live_session_is_rejected_without_teardown() {
    let (mut sdk, hcam) = camera();
    load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2)").unwrap();

    let err = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2)").unwrap_err();

    assert!(matches!(err, ScriptError::InitSequence(_)));
    assert!(sdk.has_script(hcam));
    assert!(sdk.is_scripting_initialized());
}

// =============================================================================
// run
// =============================================================================

#[test]
fn run_without_load_fails() {
    let (mut sdk, hcam) = camera();
    let mut buffer = vec![0u16; 16];

    let err = run_script(&mut sdk, hcam, &mut buffer, &poll()).unwrap_err();

    assert!(matches!(err, ScriptError::Start(_)));
    assert_eq!(sdk.count(SdkCall::CheckStatus), 0);
}

#[test]
fn run_with_short_buffer_fails() {
    let (mut sdk, hcam) = camera();
    load_script(&mut sdk, hcam, "PIXEL_DISPLAY(4,4)").unwrap();
    let mut buffer = vec![0u16; 15];

    let err = run_script(&mut sdk, hcam, &mut buffer, &poll()).unwrap_err();
    assert!(matches!(err, ScriptError::Start(_)));
}

#[test]
fn repeated_runs_fill_the_same_buffer() {
    let (mut sdk, hcam) = camera();
    let mut loaded = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(0,0,8,8)").unwrap();

    for _ in 0..5 {
        run_script(&mut sdk, hcam, &mut loaded.buffer, &poll()).unwrap();
        assert!(loaded.buffer.iter().all(|&px| px >= 100));
    }
    assert_eq!(sdk.count(SdkCall::StartSeq), 5);
}

#[test]
fn terminal_statuses_map_to_errors() {
    let cases = [
        (ReadoutStatus::NotActive, "Camera readout never started"),
        (ReadoutStatus::Failed, "Camera readout failed"),
        (ReadoutStatus::Unknown(9), "Unknown camera readout termination"),
    ];

    for (status, expected) in cases {
        let (mut sdk, hcam) = camera_with(SimulatedScript {
            stream_bytes: 4,
            statuses: vec![ReadoutStatus::ExposureInProgress, status],
            ..SimulatedScript::default()
        });
        let mut loaded = load_script(&mut sdk, hcam, "SCRIPT").unwrap();

        let err = run_script(&mut sdk, hcam, &mut loaded.buffer, &poll()).unwrap_err();
        assert!(err.to_string().contains(expected), "{status:?}: {err}");
    }
}

#[test]
fn unknown_status_maps_to_unknown_kind() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 4,
        statuses: vec![ReadoutStatus::Unknown(42)],
        ..SimulatedScript::default()
    });
    let mut loaded = load_script(&mut sdk, hcam, "SCRIPT").unwrap();

    let err = run_script(&mut sdk, hcam, &mut loaded.buffer, &poll()).unwrap_err();
    assert!(matches!(err, ScriptError::UnknownTermination { status: 42 }));

    let driver: DriverError = err.into();
    assert_eq!(driver.kind, DriverErrorKind::Unknown);
    assert_eq!(driver.driver_type, "pvcam");
}

// =============================================================================
// uninit
// =============================================================================

#[test]
fn uninit_after_load_and_run_succeeds() {
    let (mut sdk, hcam) = camera();
    let mut loaded = load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2)").unwrap();
    run_script(&mut sdk, hcam, &mut loaded.buffer, &poll()).unwrap();

    uninit_script(&mut sdk, hcam).unwrap();

    assert!(!sdk.is_scripting_initialized());
    assert!(!sdk.is_sequence_initialized());
    // Fresh load works again.
    load_script(&mut sdk, hcam, "PIXEL_DISPLAY(2,2)").unwrap();
}

#[test]
fn uninit_without_session_fails() {
    let (mut sdk, hcam) = camera();
    let err = uninit_script(&mut sdk, hcam).unwrap_err();
    assert!(matches!(err, ScriptError::UninitScripting(_)));
    assert_eq!(sdk.count(SdkCall::UninitSeq), 0);
}

#[test]
fn uninit_sequence_failure_is_distinct() {
    let (mut sdk, hcam) = camera();
    load_script(&mut sdk, hcam, "SCRIPT").unwrap();
    sdk.fail(SdkCall::UninitSeq);

    let err = uninit_script(&mut sdk, hcam).unwrap_err();
    assert!(matches!(err, ScriptError::UninitSequence(_)));
    assert_eq!(err.kind(), DriverErrorKind::Shutdown);
}

// =============================================================================
// full / session
// =============================================================================

#[test]
fn acquire_once_rejects_closed_handle_before_any_phase() {
    let mut sdk = SimulatedPvcam::new();

    let err = acquire_once(&mut sdk, 5, "SCRIPT", &poll()).unwrap_err();

    assert!(matches!(err, ScriptError::InvalidHandle { hcam: 5 }));
    assert_eq!(sdk.calls(), &[SdkCall::CamCheck]);
}

#[test]
fn acquire_once_runs_every_phase_in_order() {
    let (mut sdk, hcam) = camera();
    sdk.clear_calls();

    let loaded = acquire_once(&mut sdk, hcam, "PIXEL_DISPLAY(0,0,10,10)", &poll()).unwrap();

    assert_eq!(loaded.buffer.len(), 100);
    assert_eq!(
        sdk.calls(),
        &[
            SdkCall::CamCheck,
            SdkCall::InitSeq,
            SdkCall::InitScript,
            SdkCall::SetupScript,
            SdkCall::DisplayScript,
            SdkCall::StartSeq,
            SdkCall::CheckStatus,
            SdkCall::CheckStatus,
            SdkCall::CheckStatus,
            SdkCall::UninitScript,
            SdkCall::UninitSeq,
        ]
    );
}

#[test]
fn acquire_once_stops_at_failed_run() {
    let (mut sdk, hcam) = camera_with(SimulatedScript {
        stream_bytes: 4,
        statuses: vec![ReadoutStatus::Failed],
        ..SimulatedScript::default()
    });

    let err = acquire_once(&mut sdk, hcam, "SCRIPT", &poll()).unwrap_err();

    assert!(matches!(err, ScriptError::ReadoutFailed));
    assert_eq!(sdk.count(SdkCall::UninitScript), 0);
    assert!(sdk.has_script(hcam));
}

#[test]
fn session_splits_buffer_by_region() {
    let (mut sdk, hcam) = camera();
    let mut session = ScriptSession::load(
        &mut sdk,
        hcam,
        "PIXEL_DISPLAY(0,0,2,3);\nPIXEL_DISPLAY(0,0,4,1);",
        poll(),
    )
    .unwrap();

    session.run().unwrap();
    session.run().unwrap();

    assert_eq!(session.runs(), 2);
    assert_eq!(session.region_pixels(0).map(<[u16]>::len), Some(6));
    assert_eq!(session.region_pixels(1).map(<[u16]>::len), Some(4));
    assert_eq!(session.region_pixels(2), None);

    let buffer = session.uninit().unwrap();
    assert_eq!(buffer.len(), 10);
    assert!(!sdk.is_scripting_initialized());
}

#[test]
fn dropped_session_uninitializes() {
    let (mut sdk, hcam) = camera();
    {
        let _session = ScriptSession::load(&mut sdk, hcam, "PIXEL_DISPLAY(1,1)", poll()).unwrap();
    }
    assert!(!sdk.is_scripting_initialized());
    assert!(!sdk.is_sequence_initialized());
    assert_eq!(sdk.count(SdkCall::UninitScript), 1);
}
