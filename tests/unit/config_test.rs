//! Tests for configuration parsing, validation and environment overrides

use std::collections::HashMap;
use std::time::Duration;

use sleepless_scheduler::config::{ConfigError, SchedulerConfig};
use sleepless_scheduler::core::RecoveryPolicy;

#[test]
fn test_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!((cfg.night_start_hour, cfg.night_end_hour), (20, 8));
    assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
    assert_eq!(cfg.subprocess_timeout(), Duration::from_secs(3600));
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.recovery_policy, RecoveryPolicy::Fail);
}

#[test]
fn test_partial_json_uses_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "night_start_hour": 22,
            "night_end_hour": 7,
            "fallback_profile": {"name": "fallback", "model": "sonnet"},
            "fallback_above_pct": 60,
            "recovery_policy": "cancel",
            "agent": {"program": "agent-cli"}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.window().start_hour, 22);
    assert!((cfg.night_threshold_pct - 80.0).abs() < f64::EPSILON);
    assert_eq!(cfg.recovery_policy, RecoveryPolicy::Cancel);
    assert_eq!(cfg.agent.program, "agent-cli");
    assert_eq!(cfg.agent.retryable_exit_codes, vec![75]);

    let policy = cfg.admission_policy();
    assert_eq!(policy.select_profile(70.0).name, "fallback");
    assert_eq!(policy.select_profile(10.0).name, "primary");
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        SchedulerConfig::from_json_str(r#"{"night_start_hour": 24}"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json_str(r#"{"night_threshold_pct": 120}"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json_str(r#"{"poll_interval_secs": 0}"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json_str(r#"{"fallback_above_pct": 50}"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json_str("{not json"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("NIGHT_START_HOUR", "23"),
        ("NIGHT_THRESHOLD_PCT", "65.5"),
        ("RECOVERY_POLICY", "Cancel"),
        ("DATA_DIR", "/var/lib/sleepless"),
        ("USAGE_PTY", "false"),
    ]
    .into_iter()
    .collect();

    let mut cfg = SchedulerConfig::default();
    cfg.apply_overrides(|key| vars.get(key).map(|v| (*v).to_owned()))
        .unwrap();
    assert_eq!(cfg.night_start_hour, 23);
    assert!((cfg.night_threshold_pct - 65.5).abs() < f64::EPSILON);
    assert_eq!(cfg.recovery_policy, RecoveryPolicy::Cancel);
    assert_eq!(cfg.data_dir.to_str(), Some("/var/lib/sleepless"));
    assert!(!cfg.agent.usage_pty);
}

#[test]
fn test_bad_env_override_names_variable() {
    let mut cfg = SchedulerConfig::default();
    let err = cfg
        .apply_overrides(|key| (key == "MAX_RETRIES").then(|| "many".to_owned()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "SLEEPLESS_MAX_RETRIES"));
}

#[test]
fn test_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"max_retries": 5}"#).unwrap();
    assert_eq!(SchedulerConfig::from_json_file(&path).unwrap().max_retries, 5);
    assert!(matches!(
        SchedulerConfig::from_json_file(dir.path().join("missing.json")),
        Err(ConfigError::Parse(_))
    ));
}
