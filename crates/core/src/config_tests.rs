// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_match_spec() {
    let config = SupervisorConfig::default();
    assert_eq!(config.heartbeat_secs, 180);
    assert_eq!(config.stall_secs, 30);
    assert_eq!(config.cooldown_ms, 5_000);
    assert_eq!(config.observer_port, 8080);
    assert!(config.auto_approve);
    assert!(config.max_workers >= 1);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = SupervisorConfig::from_toml_str("").unwrap();
    assert_eq!(config.observer_port, 8080);
    assert_eq!(
        config.auto_approve_patterns,
        vec![AutoApprovePattern::create_file_default()]
    );
}

#[test]
fn partial_toml_overrides() {
    let config = SupervisorConfig::from_toml_str(
        r#"
            max_workers = 2
            stall_secs = 10
            observer_port = 9001

            [[auto_approve_patterns]]
            contains = ["Do you want to overwrite", "1. Yes"]
            response = "1\n"
        "#,
    )
    .unwrap();
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.stall_secs, 10);
    assert_eq!(config.observer_port, 9001);
    assert_eq!(config.auto_approve_patterns.len(), 1);
    assert_eq!(
        config.auto_approve_patterns[0].contains[0],
        "Do you want to overwrite"
    );
    // Untouched knobs keep their defaults
    assert_eq!(config.heartbeat_secs, 180);
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let err = SupervisorConfig::from_toml_str("max_workers = \"lots\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SupervisorConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn state_paths_derive_from_state_dir() {
    let config = SupervisorConfig::from_toml_str("state_dir = \"/tmp/ov\"").unwrap();
    assert_eq!(config.ledger_path(), PathBuf::from("/tmp/ov/ledger.jsonl"));
    assert_eq!(config.db_path(), PathBuf::from("/tmp/ov/conversations.db"));
    assert_eq!(config.log_dir(), PathBuf::from("/tmp/ov/logs"));
}

#[test]
fn default_detector_matches_spec_phrases() {
    let pattern = AutoApprovePattern::create_file_default();
    assert!(pattern.contains.iter().any(|c| c == "Do you want to create"));
    assert!(pattern.contains.iter().any(|c| c == "1. Yes"));
    assert_eq!(pattern.response, "1\n");
}
