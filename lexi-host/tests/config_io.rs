//! # 配置文件读写集成测试

use lexi_host::{AppConfig, ConfigError};

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = AppConfig::default();
    config.timing.typing_speed_ms = 12;
    config.replay.realtime = true;
    config.log_level = "debug".to_string();
    config.save(&path).unwrap();

    let loaded = AppConfig::load(&path);
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = AppConfig::load(dir.path().join("absent.json"));
    assert_eq!(loaded, AppConfig::default());
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(AppConfig::load(&path), AppConfig::default());
}

#[test]
fn test_loaded_config_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"timing": {"percent_cap": 120.0}}"#).unwrap();

    let loaded = AppConfig::load(&path);
    assert_eq!(loaded.timing.percent_cap, 120.0);
    assert!(matches!(loaded.validate(), Err(ConfigError::Timing(_))));
}

#[test]
fn test_save_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    assert!(matches!(
        AppConfig::default().save(&path),
        Err(ConfigError::IoError(_))
    ));
}
