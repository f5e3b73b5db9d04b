//! Standard-mode workflow against the simulated card.
//!
//! ```bash
//! cargo test -p daq-driver-timeharp --test standard_mode
//! ```

#![cfg(feature = "mock")]

use daq_core::error::{DriverError, DriverErrorKind};
use daq_driver_timeharp::{
    initialize_standard, read_standard, start_standard, wait_for_measurement, HistogramMode,
    SimulatedSignal, SimulatedTimeHarp, StandardSettings, ThCall, TimeHarpError, TimeHarpSdk,
    BLOCKSIZE,
};
use std::time::Duration;
use tracing_test::traced_test;

fn settings() -> StandardSettings {
    StandardSettings {
        exp_time_ms: 5,
        ..StandardSettings::default()
    }
}

#[test]
fn initialize_applies_settings_in_order() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    let offset = initialize_standard(
        &mut th,
        &StandardSettings {
            offset_ns: 11,
            ..settings()
        },
    )
    .unwrap();

    assert_eq!(offset, 10);
    assert!(th.is_calibrated());
    assert!(th.stops_on_overflow());
    assert_eq!(th.histogram_mode(), Some((HistogramMode::OneShot, 5)));
    assert_eq!(
        th.calls(),
        &[
            ThCall::Initialize,
            ThCall::Calibrate,
            ThCall::SetCfdDiscrMin,
            ThCall::SetCfdZeroCross,
            ThCall::SetSyncLevel,
            ThCall::SetRange,
            ThCall::SetOffset,
            ThCall::SetStopOverflow,
            ThCall::SetMMode,
        ]
    );
}

#[test]
fn invalid_settings_make_no_calls() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    let err = initialize_standard(
        &mut th,
        &StandardSettings {
            cfd_zero_cross_mv: 100,
            ..settings()
        },
    )
    .unwrap_err();

    assert!(matches!(err, TimeHarpError::InvalidSettings(_)));
    assert!(th.calls().is_empty());
}

#[test]
fn each_setup_failure_is_reported_and_stops() {
    let cases: [(ThCall, fn(&TimeHarpError) -> bool); 6] = [
        (ThCall::Initialize, |e| matches!(e, TimeHarpError::Init(_))),
        (ThCall::Calibrate, |e| matches!(e, TimeHarpError::Calibration(_))),
        (ThCall::SetCfdDiscrMin, |e| {
            matches!(e, TimeHarpError::IllegalCfdDiscrMin(_))
        }),
        (ThCall::SetCfdZeroCross, |e| {
            matches!(e, TimeHarpError::IllegalCfdZeroCross(_))
        }),
        (ThCall::SetSyncLevel, |e| {
            matches!(e, TimeHarpError::IllegalSyncLevel(_))
        }),
        (ThCall::SetRange, |e| matches!(e, TimeHarpError::SetRange(_))),
    ];

    for (call, is_expected) in cases {
        let mut th = SimulatedTimeHarp::new(Some(1));
        th.fail(call);
        let err = initialize_standard(&mut th, &settings()).unwrap_err();
        assert!(is_expected(&err), "{:?}: {}", call, err);
        assert_eq!(th.calls().last(), Some(&call));
        assert_eq!(th.count(ThCall::SetMMode), 0);
    }
}

#[test]
fn init_failure_converts_to_driver_error() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    th.fail(ThCall::Initialize);
    let err: DriverError = initialize_standard(&mut th, &settings()).unwrap_err().into();
    assert_eq!(err.driver_type, "timeharp");
    assert_eq!(err.kind, DriverErrorKind::Initialization);
    assert!(err.message.starts_with("TH init error"));
}

#[test]
fn full_measurement_produces_decay_histogram() {
    let mut th = SimulatedTimeHarp::new(Some(42));
    initialize_standard(&mut th, &settings()).unwrap();
    start_standard(&mut th).unwrap();
    wait_for_measurement(&mut th, Duration::from_millis(1), Duration::from_secs(5)).unwrap();

    let histogram = read_standard(&mut th).unwrap();

    assert_eq!(histogram.counts.len(), BLOCKSIZE);
    assert!(histogram.resolution_ns > 0.0);
    assert!(!histogram.overflow);
    assert!(histogram.total_counts() > 0);
    let peak = histogram.peak_bin().unwrap();
    // Decay: the tail well past the peak holds fewer counts than the peak.
    assert!(histogram.counts[peak] > histogram.counts[(peak + 400).min(BLOCKSIZE - 1)]);
}

#[test]
fn start_clears_previous_histogram() {
    let mut th = SimulatedTimeHarp::new(Some(3));
    initialize_standard(&mut th, &settings()).unwrap();
    start_standard(&mut th).unwrap();
    let first = read_standard(&mut th).unwrap();
    start_standard(&mut th).unwrap();
    let second = read_standard(&mut th).unwrap();

    // One-shot measurements of equal length collect similar totals,
    // not a running sum.
    assert!(second.total_counts() < first.total_counts() * 3 / 2);
}

#[test]
fn start_failure_is_reported() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    initialize_standard(&mut th, &settings()).unwrap();
    th.fail(ThCall::StartMeas);
    assert!(matches!(
        start_standard(&mut th),
        Err(TimeHarpError::StartMeas(_))
    ));
}

#[test]
fn start_without_initialize_fails() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    assert!(start_standard(&mut th).is_err());
}

#[test]
fn stop_and_block_failures_are_distinct() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    initialize_standard(&mut th, &settings()).unwrap();
    start_standard(&mut th).unwrap();

    th.fail(ThCall::StopMeas);
    assert!(matches!(
        read_standard(&mut th),
        Err(TimeHarpError::StopMeas(_))
    ));

    th.recover(ThCall::StopMeas);
    th.fail(ThCall::GetBlock);
    assert!(matches!(
        read_standard(&mut th),
        Err(TimeHarpError::GetBlock(_))
    ));
}

#[traced_test]
#[test]
fn overflow_is_a_warning_not_an_error() {
    let mut th = SimulatedTimeHarp::new(Some(9)).with_signal(SimulatedSignal {
        count_rate: 20_000_000,
        lifetime_ns: 0.01,
        delay_ns: 10.0,
    });
    initialize_standard(
        &mut th,
        &StandardSettings {
            exp_time_ms: 50,
            ..settings()
        },
    )
    .unwrap();
    start_standard(&mut th).unwrap();

    let histogram = read_standard(&mut th).unwrap();

    assert!(histogram.overflow);
    assert!(histogram.counts.iter().all(|&c| c <= 65_535));
    assert!(logs_contain("TimeHarp histogram overflow"));
}

#[test]
fn measurement_wait_times_out() {
    let mut th = SimulatedTimeHarp::new(Some(1));
    initialize_standard(
        &mut th,
        &StandardSettings {
            exp_time_ms: 60_000,
            ..settings()
        },
    )
    .unwrap();
    start_standard(&mut th).unwrap();

    let err = wait_for_measurement(&mut th, Duration::from_millis(1), Duration::from_millis(10))
        .unwrap_err();
    assert!(matches!(err, TimeHarpError::MeasurementTimeout { .. }));
    assert_eq!(err.kind(), DriverErrorKind::Timeout);
}

#[test]
fn boxed_card_works_through_trait_object() {
    let mut th: Box<dyn TimeHarpSdk> = Box::new(SimulatedTimeHarp::new(Some(5)));
    initialize_standard(&mut th, &settings()).unwrap();
    start_standard(&mut th).unwrap();
    assert_eq!(read_standard(&mut th).unwrap().counts.len(), BLOCKSIZE);
}
