//! Configuration files on disk.

use daq_bindings::config::BindingsConfig;
use std::io::Write;

#[test]
fn shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/daq_bindings.toml");
    let config = BindingsConfig::load_from(path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.pvcam.camera_name, "SimCam");
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bindings.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "[application]\nlog_format = \"json\"\n\n[timeharp.settings]\nexp_time_ms = 20\nsync_level_mv = -200"
    )
    .unwrap();

    let config = BindingsConfig::load_from(&path).unwrap();

    assert_eq!(config.application.log_format, "json");
    assert_eq!(config.timeharp.settings.exp_time_ms, 20);
    assert_eq!(config.timeharp.settings.sync_level_mv, -200);
    assert_eq!(config.timeharp.settings.cfd_discr_min_mv, 50);
    config.validate().unwrap();
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[pvcam\ncamera_name = 3").unwrap();

    assert!(BindingsConfig::load_from(&path).is_err());
}
