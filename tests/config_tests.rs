// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use snapreel::config::BackendKind;
use snapreel::{BitratePreset, Config, FilterType, PlaybackMode};
use std::path::PathBuf;
use std::time::Duration;

fn temp_config_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("snapreel-config-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.backend, BackendKind::Gpu);
    assert_eq!(config.default_filter, FilterType::Passthrough);
    assert_eq!(config.retained_buffer_count, 6);
    assert_eq!(config.playback_mode, PlaybackMode::Loop);
    assert_eq!(config.bitrate_preset, BitratePreset::Medium);
    assert!(config.still_interval().is_none());
}

#[test]
fn test_config_round_trips_through_file() {
    let path = temp_config_path();
    let config = Config {
        backend: BackendKind::Cpu,
        default_filter: FilterType::Manga,
        still_interval_ms: Some(250),
        output_dir: Some(PathBuf::from("/tmp/exports")),
        bitrate_preset: BitratePreset::High,
        retained_buffer_count: 3,
        playback_mode: PlaybackMode::Rebound,
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path);
    assert_eq!(loaded, config);
    assert_eq!(loaded.still_interval(), Some(Duration::from_millis(250)));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_missing_fields_use_defaults() {
    let path = temp_config_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "default_filter": "toon", "playback_mode": "reverse" }"#).unwrap();

    let loaded = Config::load_from(&path);
    assert_eq!(loaded.default_filter, FilterType::Toon);
    assert_eq!(loaded.playback_mode, PlaybackMode::Reverse);
    assert_eq!(loaded.retained_buffer_count, 6);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_corrupt_or_missing_file_falls_back_to_defaults() {
    let path = temp_config_path();
    assert_eq!(Config::load_from(&path), Config::default());

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();
    assert_eq!(Config::load_from(&path), Config::default());
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_cpu_backend_builds_cpu_factory() {
    let config = Config {
        backend: BackendKind::Cpu,
        ..Config::default()
    };
    assert_eq!(config.filter_factory().backend().name(), "cpu");
}
