//! Async front end for ICL script acquisition.
//!
//! Every PVCAM call blocks, so each lifecycle phase runs on
//! `tokio::task::spawn_blocking` with the SDK behind a `std::sync::Mutex`.
//! One lock is held for a whole load/run/uninit sequence so two callers never
//! interleave their sessions on the same driver.

use crate::components::acquisition::PollPolicy;
use crate::components::script::{ScriptRois, ScriptSession};
use crate::components::sdk::{PvcamSdk, ScriptSetup};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Frames from one [`ScriptRunner::acquire`] call.
#[derive(Debug, Clone, Serialize)]
pub struct Acquisition {
    /// Sizes reported when the script was loaded.
    pub setup: ScriptSetup,
    /// Display regions inside each frame.
    pub rois: ScriptRois,
    /// One pixel buffer per run, in run order.
    pub frames: Vec<Vec<u16>>,
}

/// Shares one driver and one open camera between async tasks.
pub struct ScriptRunner<S: PvcamSdk + 'static> {
    sdk: Arc<Mutex<S>>,
    hcam: i16,
    policy: PollPolicy,
}

impl<S: PvcamSdk + 'static> Clone for ScriptRunner<S> {
    fn clone(&self) -> Self {
        Self {
            sdk: Arc::clone(&self.sdk),
            hcam: self.hcam,
            policy: self.policy,
        }
    }
}

fn lock<S>(sdk: &Mutex<S>) -> MutexGuard<'_, S> {
    match sdk.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("PVCAM driver mutex poisoned - recovering");
            poisoned.into_inner()
        }
    }
}

impl<S: PvcamSdk + 'static> ScriptRunner<S> {
    /// Open `camera_name` on `sdk`.
    pub async fn open(sdk: S, camera_name: &str, policy: PollPolicy) -> Result<Self> {
        let sdk = Arc::new(Mutex::new(sdk));
        let name = camera_name.to_string();
        let hcam = tokio::task::spawn_blocking({
            let sdk = Arc::clone(&sdk);
            move || lock(&sdk).open_camera(&name)
        })
        .await
        .context("camera open task panicked")?
        .with_context(|| format!("Cannot open camera '{}'", camera_name))?;

        tracing::info!(hcam, camera = camera_name, "Camera opened");
        Ok(Self { sdk, hcam, policy })
    }

    /// Handle of the open camera.
    pub fn handle(&self) -> i16 {
        self.hcam
    }

    /// Readout polling used by every run.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Load `script`, run it `repeat` times and uninitialize.
    ///
    /// Each run's buffer is copied out before the next run overwrites it.
    pub async fn acquire(&self, script: String, repeat: u32) -> Result<Acquisition> {
        let sdk = Arc::clone(&self.sdk);
        let hcam = self.hcam;
        let policy = self.policy;

        tokio::task::spawn_blocking(move || -> Result<Acquisition> {
            let mut guard = lock(&sdk);
            let mut session = ScriptSession::load(&mut *guard, hcam, &script, policy)
                .context("Cannot load ICL script")?;

            let mut frames = Vec::with_capacity(repeat as usize);
            for run in 0..repeat {
                let data = session
                    .run()
                    .with_context(|| format!("ICL script run {} failed", run + 1))?;
                frames.push(data.to_vec());
            }

            let setup = session.setup();
            let rois = session.rois().clone();
            session.uninit().context("Cannot uninitialize ICL script")?;

            Ok(Acquisition {
                setup,
                rois,
                frames,
            })
        })
        .await
        .context("acquisition task panicked")?
    }

    /// Names of the cameras the driver can see.
    pub async fn camera_names(&self) -> Result<Vec<String>> {
        let sdk = Arc::clone(&self.sdk);
        Ok(tokio::task::spawn_blocking(move || lock(&sdk).camera_names())
            .await
            .context("camera list task panicked")??)
    }

    /// Close the camera.
    pub async fn close(self) -> Result<()> {
        let sdk = Arc::clone(&self.sdk);
        let hcam = self.hcam;
        tokio::task::spawn_blocking(move || lock(&sdk).close_camera(hcam))
            .await
            .context("camera close task panicked")?
            .with_context(|| format!("Cannot close camera {}", hcam))?;
        tracing::info!(hcam, "Camera closed");
        Ok(())
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::components::mock::{SimulatedPvcam, SimulatedScript};
    use crate::components::sdk::ReadoutStatus;

    #[tokio::test]
    async fn acquire_repeats_and_keeps_every_frame() {
        let runner = ScriptRunner::open(SimulatedPvcam::new(), "SimCam", PollPolicy::busy_wait())
            .await
            .unwrap();

        let acq = runner
            .acquire("PIXEL_DISPLAY(0,0,4,2);".to_string(), 3)
            .await
            .unwrap();

        assert_eq!(acq.frames.len(), 3);
        assert!(acq.frames.iter().all(|f| f.len() == 8));
        assert_ne!(acq.frames[0], acq.frames[1]);
        assert_eq!(acq.rois.regions().len(), 1);
    }

    #[tokio::test]
    async fn failed_run_is_reported_and_session_released() {
        let sdk = SimulatedPvcam::new().with_program(SimulatedScript {
            stream_bytes: 8,
            statuses: vec![ReadoutStatus::Failed],
            ..SimulatedScript::default()
        });
        let runner = ScriptRunner::open(sdk, "SimCam", PollPolicy::busy_wait())
            .await
            .unwrap();

        let err = runner.acquire("SCRIPT".to_string(), 1).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Camera readout failed"));

        // The dropped session uninitialized, so a new load succeeds.
        let sdk = runner.sdk.clone();
        lock(&sdk).set_program(SimulatedScript {
            stream_bytes: 8,
            ..SimulatedScript::default()
        });
        assert!(runner.acquire("SCRIPT".to_string(), 1).await.is_ok());
    }

    #[tokio::test]
    async fn close_releases_handle() {
        let runner = ScriptRunner::open(SimulatedPvcam::new(), "PrimeBSI", PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(
            runner.camera_names().await.unwrap(),
            vec!["SimCam".to_string(), "PrimeBSI".to_string()]
        );
        runner.close().await.unwrap();
    }
}
