//! CLI Entry Point for daq-bindings
//!
//! Drives the bindings without a host:
//! - `icl`: load an ICL script, run it one or more times, uninit
//! - `timeharp`: one standard-mode histogram
//! - `cameras`: list the cameras the PVCAM driver can see
//!
//! Results are printed to stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! daq-bindings icl scripts/full_frame.icl --repeat 3
//! daq-bindings icl "SCRIPT_BEGIN; ... SCRIPT_END;"
//! daq-bindings timeharp --exp-time 500 --range 2
//! ```
//!
//! Without the `pvcam_hardware` / `timeharp_hardware` features the simulated
//! drivers are used.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_bindings::config::{BindingsConfig, DEFAULT_CONFIG_PATH};
use daq_bindings::logging;
use daq_bindings::script_source::read_script_source;
use daq_driver_pvcam::{Acquisition, PvcamSdk, ScriptRunner};
use daq_driver_timeharp::{Histogram, StandardSettings};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Sleep between TimeHarp completion polls.
const TIMEHARP_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Grace period past the acquisition time before giving up.
const TIMEHARP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "daq-bindings")]
#[command(about = "PVCAM ICL script acquisition and TimeHarp histogramming", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an ICL script, run it and uninit
    Icl {
        /// Script file, or the script text itself
        script: String,

        /// Number of runs between load and uninit
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Camera name (overrides the configuration)
        #[arg(long)]
        camera: Option<String>,
    },

    /// Acquire one TimeHarp standard-mode histogram
    Timeharp {
        /// Acquisition time in ms
        #[arg(long)]
        exp_time: Option<i32>,
        /// CFD zero cross level in mV
        #[arg(long)]
        cfd_zero_cross: Option<i32>,
        /// CFD discriminator minimum in mV
        #[arg(long)]
        cfd_discr_min: Option<i32>,
        /// Sync level in mV
        #[arg(long, allow_hyphen_values = true)]
        sync_level: Option<i32>,
        /// Offset in ns
        #[arg(long)]
        offset: Option<i32>,
        /// Range code (bin width 2^range times the base resolution)
        #[arg(long)]
        range: Option<i32>,
    },

    /// List the cameras the PVCAM driver can see
    Cameras,
}

#[derive(Serialize)]
struct FrameSummary {
    min: u16,
    max: u16,
    mean: f64,
}

#[derive(Serialize)]
struct IclSummary<'a> {
    camera: &'a str,
    hcam: i16,
    acquisition: &'a Acquisition,
    frames: Vec<FrameSummary>,
}

#[derive(Serialize)]
struct HistogramSummary<'a> {
    offset_ns: i32,
    total_counts: u64,
    peak_bin: Option<usize>,
    histogram: &'a Histogram,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BindingsConfig::load_from(&cli.config)
        .with_context(|| format!("Cannot load configuration from {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
    tracing::debug!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Icl {
            script,
            repeat,
            camera,
        } => run_icl(&config, &script, repeat, camera).await,
        Commands::Timeharp {
            exp_time,
            cfd_zero_cross,
            cfd_discr_min,
            sync_level,
            offset,
            range,
        } => {
            let defaults = &config.timeharp.settings;
            let settings = StandardSettings {
                exp_time_ms: exp_time.unwrap_or(defaults.exp_time_ms),
                cfd_zero_cross_mv: cfd_zero_cross.unwrap_or(defaults.cfd_zero_cross_mv),
                cfd_discr_min_mv: cfd_discr_min.unwrap_or(defaults.cfd_discr_min_mv),
                sync_level_mv: sync_level.unwrap_or(defaults.sync_level_mv),
                offset_ns: offset.unwrap_or(defaults.offset_ns),
                range: range.unwrap_or(defaults.range),
            };
            run_timeharp(settings).await
        }
        Commands::Cameras => list_cameras().await,
    }
}

async fn run_icl(
    config: &BindingsConfig,
    script: &str,
    repeat: u32,
    camera: Option<String>,
) -> Result<()> {
    let script = read_script_source(script).await?;
    let camera = camera.unwrap_or_else(|| config.pvcam.camera_name.clone());

    let sdk = daq_driver_pvcam::default_sdk().context("Cannot initialize PVCAM")?;
    let runner = ScriptRunner::open(sdk, &camera, config.pvcam.poll_policy()).await?;

    let acquisition = runner.acquire(script, repeat).await;
    let hcam = runner.handle();
    runner.close().await?;
    let acquisition = acquisition?;

    let frames = acquisition
        .frames
        .iter()
        .map(|frame| FrameSummary {
            min: frame.iter().copied().min().unwrap_or(0),
            max: frame.iter().copied().max().unwrap_or(0),
            mean: if frame.is_empty() {
                0.0
            } else {
                frame.iter().map(|&p| f64::from(p)).sum::<f64>() / frame.len() as f64
            },
        })
        .collect();

    let summary = IclSummary {
        camera: &camera,
        hcam,
        acquisition: &acquisition,
        frames,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_timeharp(settings: StandardSettings) -> Result<()> {
    let timeout = settings.exposure() + TIMEHARP_GRACE;

    let (offset_ns, histogram) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut sdk = daq_driver_timeharp::default_sdk();
        let offset = daq_driver_timeharp::initialize_standard(&mut sdk, &settings)?;
        daq_driver_timeharp::start_standard(&mut sdk)?;
        daq_driver_timeharp::wait_for_measurement(&mut sdk, TIMEHARP_POLL_INTERVAL, timeout)?;
        let histogram = daq_driver_timeharp::read_standard(&mut sdk)?;
        Ok((offset, histogram))
    })
    .await
    .context("TimeHarp task panicked")??;

    let summary = HistogramSummary {
        offset_ns,
        total_counts: histogram.total_counts(),
        peak_bin: histogram.peak_bin(),
        histogram: &histogram,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn list_cameras() -> Result<()> {
    let names = tokio::task::spawn_blocking(|| -> Result<Vec<String>> {
        let mut sdk = daq_driver_pvcam::default_sdk()?;
        Ok(sdk.camera_names()?)
    })
    .await
    .context("camera list task panicked")??;

    println!("{}", serde_json::to_string_pretty(&names)?);
    Ok(())
}
