//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Default configuration when the file is absent
//! - Partial files filling in defaults

use camino::Utf8PathBuf;
use gfxterm::config::{ConfigManager, TerminalConfig};
use gfxterm::protocol::Size;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
}

#[test]
fn test_manager_creates_missing_directory() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("settings").join("terminal");

    let manager = ConfigManager::new(&nested).unwrap();
    assert!(manager.config_dir().exists());
}

#[test]
fn test_load_missing_file_yields_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load().unwrap();
    assert_eq!(config, TerminalConfig::default());
    assert_eq!(config.title, "Graphics Terminal");
    assert_eq!(config.initial_size, Size::new(640, 480));
}

#[test]
fn test_save_then_load_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = TerminalConfig {
        title: "Plotter".to_string(),
        timer_interval_ms: 50,
        initial_size: Size::new(1280, 720),
        debug_logging: true,
    };
    manager.save(&config).unwrap();

    let loaded = manager.load().unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_file_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        config_path.join("Terminal Settings.yaml"),
        "title: [unterminated",
    )
    .unwrap();

    assert!(manager.load().is_err());
}
