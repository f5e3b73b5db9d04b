//! PVCAM readout polling.
//!
//! After `pl_exp_start_seq` the camera exposes and reads out on its own; the
//! host learns about progress only by polling `pl_exp_check_status`. This
//! module owns that loop.

use crate::components::script::ScriptError;
use crate::components::sdk::{PvcamSdk, ReadoutStatus};
use daq_core::limits::{READOUT_POLL_INTERVAL, READOUT_TIMEOUT};
use std::time::{Duration, Instant};

/// How to wait for a readout to reach a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls. Zero spins without sleeping.
    pub interval: Duration,
    /// Give up (and abort the acquisition) after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: READOUT_POLL_INTERVAL,
            timeout: Some(READOUT_TIMEOUT),
        }
    }
}

impl PollPolicy {
    /// Poll as fast as possible with no timeout.
    pub fn busy_wait() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: None,
        }
    }

    /// Sleep `interval` between polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Give up after `timeout`, or never with `None`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Poll `hcam` until the readout reaches a terminal status.
///
/// Returns the terminal status without interpreting it. A failing poll or an
/// elapsed timeout aborts the acquisition before returning, so the driver no
/// longer writes into the caller's buffer.
pub fn wait_for_readout<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    policy: &PollPolicy,
) -> Result<ReadoutStatus, ScriptError> {
    let started = Instant::now();
    let mut polls: u64 = 0;

    loop {
        let (status, bytes_arrived) = match sdk.check_status(hcam) {
            Ok(reply) => reply,
            Err(e) => {
                abort_quietly(sdk, hcam);
                return Err(ScriptError::StatusCheck(e));
            }
        };
        polls += 1;

        if status.is_terminal() {
            tracing::debug!(
                hcam,
                ?status,
                bytes_arrived,
                polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Readout reached terminal status"
            );
            return Ok(status);
        }

        if let Some(timeout) = policy.timeout {
            if started.elapsed() >= timeout {
                tracing::warn!(hcam, ?status, polls, "Readout timed out, aborting acquisition");
                abort_quietly(sdk, hcam);
                return Err(ScriptError::ReadoutTimeout { timeout });
            }
        }

        if policy.interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(policy.interval);
        }
    }
}

fn abort_quietly<S: PvcamSdk + ?Sized>(sdk: &mut S, hcam: i16) {
    if let Err(e) = sdk.abort(hcam) {
        tracing::warn!(hcam, "Failed to abort acquisition: {}", e);
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::components::mock::{SdkCall, SimulatedPvcam, SimulatedScript};
    use std::ffi::CString;

    fn started(statuses: Vec<ReadoutStatus>) -> (SimulatedPvcam, i16, Vec<u16>) {
        let mut sdk = SimulatedPvcam::new().with_program(SimulatedScript {
            stream_bytes: 8,
            statuses,
            ..SimulatedScript::default()
        });
        let hcam = sdk.open_camera("SimCam").unwrap();
        sdk.exp_init_seq().unwrap();
        sdk.exp_init_script().unwrap();
        let script = CString::new("SCRIPT_BEGIN").unwrap();
        sdk.setup_script(hcam, &script).unwrap();
        let mut buffer = vec![0u16; 4];
        sdk.start_seq(hcam, &mut buffer).unwrap();
        (sdk, hcam, buffer)
    }

    #[test]
    fn returns_first_terminal_status() {
        let (mut sdk, hcam, _buffer) = started(vec![
            ReadoutStatus::ExposureInProgress,
            ReadoutStatus::ReadoutInProgress,
            ReadoutStatus::Failed,
        ]);
        let status = wait_for_readout(&mut sdk, hcam, &PollPolicy::busy_wait()).unwrap();
        assert_eq!(status, ReadoutStatus::Failed);
        assert_eq!(sdk.count(SdkCall::CheckStatus), 3);
    }

    #[test]
    fn timeout_aborts_acquisition() {
        let (mut sdk, hcam, _buffer) = started(vec![ReadoutStatus::ExposureInProgress]);
        let policy = PollPolicy::default()
            .with_interval(Duration::from_millis(1))
            .with_timeout(Some(Duration::from_millis(5)));

        let err = wait_for_readout(&mut sdk, hcam, &policy).unwrap_err();
        assert!(matches!(err, ScriptError::ReadoutTimeout { .. }));
        assert_eq!(sdk.count(SdkCall::Abort), 1);
    }

    #[test]
    fn failing_poll_is_reported_and_aborts() {
        let (mut sdk, hcam, _buffer) = started(vec![ReadoutStatus::Complete]);
        sdk.fail(SdkCall::CheckStatus);

        let err = wait_for_readout(&mut sdk, hcam, &PollPolicy::busy_wait()).unwrap_err();
        assert!(matches!(err, ScriptError::StatusCheck(_)));
        assert_eq!(sdk.count(SdkCall::Abort), 1);
    }
}
