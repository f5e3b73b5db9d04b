//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/daq_bindings.toml` (base configuration)
//! 2. Environment variables prefixed with `DAQ_BINDINGS_`, nested keys split on `__`
//!
//! Every field has a default, so a missing file yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use daq_bindings::config::BindingsConfig;
//!
//! let config = BindingsConfig::load()?;
//! println!("Camera: {}", config.pvcam.camera_name);
//! # Ok::<(), figment::Error>(())
//! ```

use daq_core::error::DaqError;
use daq_driver_pvcam::PollPolicy;
use daq_driver_timeharp::StandardSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_bindings.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAQ_BINDINGS_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    /// Name and logging.
    pub application: ApplicationConfig,
    /// Camera selection and readout polling.
    pub pvcam: PvcamConfig,
    /// TimeHarp standard-mode defaults.
    pub timeharp: TimeHarpConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name used in logs.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "daq-bindings".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// PVCAM camera and readout polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcamConfig {
    /// Camera to open; the first camera is used when this one is absent.
    pub camera_name: String,
    /// Sleep between readout status polls (0 = busy-wait)
    pub poll_interval_us: u64,
    /// Abort a run after this long (0 = wait forever)
    pub readout_timeout_ms: u64,
}

impl Default for PvcamConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            camera_name: "SimCam".to_string(),
            poll_interval_us: policy.interval.as_micros() as u64,
            readout_timeout_ms: policy.timeout.map_or(0, |t| t.as_millis() as u64),
        }
    }
}

impl PvcamConfig {
    /// Readout polling built from the interval and timeout.
    pub fn poll_policy(&self) -> PollPolicy {
        let timeout = match self.readout_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        PollPolicy::default()
            .with_interval(Duration::from_micros(self.poll_interval_us))
            .with_timeout(timeout)
    }
}

/// TimeHarp standard-mode settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeHarpConfig {
    /// Settings used when the CLI does not override them.
    pub settings: StandardSettings,
}

impl BindingsConfig {
    /// Load configuration from `config/daq_bindings.toml` and environment variables
    ///
    /// Example: `DAQ_BINDINGS_PVCAM__CAMERA_NAME=PrimeBSI`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Defaults, then the TOML file, then the environment.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(BindingsConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Failures are [`DaqError::Configuration`].
    pub fn validate(&self) -> Result<(), DaqError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.pvcam.readout_timeout_ms != 0
            && self.pvcam.readout_timeout_ms.saturating_mul(1000) < self.pvcam.poll_interval_us
        {
            return Err(DaqError::Configuration(format!(
                "readout_timeout_ms {} is shorter than poll_interval_us {}",
                self.pvcam.readout_timeout_ms, self.pvcam.poll_interval_us
            )));
        }

        self.timeharp
            .settings
            .validate()
            .map_err(|e| DaqError::Configuration(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = BindingsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pvcam.poll_policy(), PollPolicy::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = BindingsConfig::load_from("does/not/exist.toml")?;
            assert_eq!(config, BindingsConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bindings.toml",
                r#"
                [application]
                log_level = "debug"

                [pvcam]
                camera_name = "PrimeBSI"
                readout_timeout_ms = 0

                [timeharp.settings]
                exp_time_ms = 250
                range = 3
                "#,
            )?;
            jail.set_env("DAQ_BINDINGS_PVCAM__POLL_INTERVAL_US", "0");
            jail.set_env("DAQ_BINDINGS_TIMEHARP__SETTINGS__OFFSET_NS", "20");

            let config = BindingsConfig::load_from("bindings.toml")?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.log_format, "pretty");
            assert_eq!(config.pvcam.camera_name, "PrimeBSI");
            assert_eq!(config.pvcam.poll_policy(), PollPolicy::busy_wait());
            assert_eq!(config.timeharp.settings.exp_time_ms, 250);
            assert_eq!(config.timeharp.settings.range, 3);
            assert_eq!(config.timeharp.settings.offset_ns, 20);
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level() {
        let mut config = BindingsConfig::default();
        config.application.log_level = "invalid".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)), "{:?}", err);
        assert_eq!(
            err.to_string(),
            "Configuration validation error: Invalid log_level 'invalid'. \
             Must be one of: trace, debug, info, warn, error"
        );
    }

    #[test]
    fn timeout_shorter_than_poll_interval() {
        let mut config = BindingsConfig::default();
        config.pvcam.poll_interval_us = 5_000;
        config.pvcam.readout_timeout_ms = 1;
        assert!(matches!(
            config.validate(),
            Err(DaqError::Configuration(message)) if message.contains("poll_interval_us")
        ));
    }

    #[test]
    fn invalid_timeharp_settings() {
        let mut config = BindingsConfig::default();
        config.timeharp.settings.range = 9;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)), "{:?}", err);
        assert!(err.to_string().contains("range"), "{}", err);
    }
}
