//! Tests for configuration validation

use lab_sequencer::config::{BatchConfig, RunnerConfig, SequencerConfig};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = SequencerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.runner.default_timeout(), None);
    assert!(cfg.runner.capture_trace);
    assert_eq!(cfg.batch.pending_text, "Pending…");
}

#[test]
fn test_runner_config_invalid_timeout() {
    let invalid = RunnerConfig {
        default_timeout_ms: Some(0),
        ..RunnerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_batch_config_invalid_text() {
    let invalid = BatchConfig {
        pending_text: String::new(),
        ..BatchConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "runner": { "default_timeout_ms": 30000, "capture_trace": false, "warn_unobserved": true },
        "batch": { "pending_text": "Initializing", "success_text": "Ready", "cancelled_text": "Aborted" }
    }"#;

    let cfg = SequencerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.runner.default_timeout(), Some(Duration::from_secs(30)));
    assert!(!cfg.runner.capture_trace);
    assert_eq!(cfg.batch.success_text, "Ready");
}

#[test]
fn test_config_from_invalid_json() {
    let err = SequencerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_from_json_file() {
    let path = std::env::temp_dir().join(format!("lab_sequencer_{}.json", uuid::Uuid::new_v4()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(br#"{"batch": {"pending_text": "Initializing"}}"#).unwrap();
    drop(file);

    let cfg = SequencerConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.batch.pending_text, "Initializing");
    assert!(SequencerConfig::from_json_file(&path).unwrap_err().contains("cannot read"));
}
