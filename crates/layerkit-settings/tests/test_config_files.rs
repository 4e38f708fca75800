use layerkit_core::GateMode;
use layerkit_settings::{Config, ConfigError, SettingsError};
use std::io::Write;

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        r#"
        [device]
        all_axes_mask = 3

        [ramp]
        gate = "hysteresis"
        settle_on_completion = false

        [logging]
        level = "debug"
        json = true
        "#,
    );

    let config = Config::load_from_file(file.path()).unwrap();
    assert_eq!(config.device.all_axes_mask, 3);
    assert_eq!(config.ramp.gate, GateMode::Hysteresis);
    assert!(!config.ramp.settle_on_completion);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_load_json_file() {
    let file = write_config(
        ".json",
        r#"{"device": {"emulating": true}, "ramp": {"min_speed": 50, "max_speed": 166}}"#,
    );

    let config = Config::load_from_file(file.path()).unwrap();
    assert!(config.device.emulating);
    assert_eq!(config.ramp.min_speed, 50);
    assert_eq!(config.ramp.max_speed, 166);
    assert_eq!(config.ramp.fallback_speed, 100);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let file = write_config(".yaml", "device: {}");
    let err = Config::load_from_file(file.path()).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::UnsupportedFormat(ref ext)) if ext == "yaml"
    ));
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = write_config(".toml", "[ramp]\nfallback_speed = 10\n");
    let err = Config::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Config(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SettingsError::LoadError(_)));
}
