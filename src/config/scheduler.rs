//! Scheduler configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    AdmissionPolicy, CliExecutorConfig, ExecutionProfile, ExecutionWindow, RecoveryPolicy,
};

/// Prefix of environment variables read by [`SchedulerConfig::apply_env_overrides`].
pub const ENV_PREFIX: &str = "SLEEPLESS_";

/// Configuration load or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The document could not be read or decoded.
    #[error("configuration parse error: {0}")]
    Parse(String),
    /// An environment override could not be applied.
    #[error("environment override {var}: {reason}")]
    Env {
        /// Offending variable.
        var: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// How to invoke the external execution agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent binary.
    pub program: String,
    /// Arguments placed before the profile arguments and task content.
    pub args: Vec<String>,
    /// Usage-report command: program followed by arguments.
    pub usage_command: Vec<String>,
    /// Run the usage command on a pseudo-terminal before trying plain pipes.
    pub usage_pty: bool,
    /// Exit codes treated as transient failures.
    pub retryable_exit_codes: Vec<i32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".into(),
            args: vec!["--print".into(), "--dangerously-skip-permissions".into()],
            usage_command: vec!["claude".into(), "/usage".into()],
            usage_pty: true,
            retryable_exit_codes: vec![75],
        }
    }
}

/// Root configuration of the scheduler daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// First hour of the execution window (0-23).
    pub night_start_hour: u8,
    /// First hour after the execution window (0-23).
    pub night_end_hour: u8,
    /// Usage ceiling outside the window.
    pub day_threshold_pct: f64,
    /// Usage ceiling inside the window.
    pub night_threshold_pct: f64,
    /// Profile used by default.
    pub primary_profile: ExecutionProfile,
    /// Profile used when usage is at or above `fallback_above_pct`.
    pub fallback_profile: Option<ExecutionProfile>,
    /// Usage at which the fallback profile takes over.
    pub fallback_above_pct: Option<f64>,
    /// Seconds between scheduler cycles.
    pub poll_interval_secs: u64,
    /// Wall-clock limit for one agent run.
    pub subprocess_timeout_secs: u64,
    /// Wall-clock limit for one usage query.
    pub usage_timeout_secs: u64,
    /// How long a successful usage reading is reused.
    pub usage_cache_secs: u64,
    /// Retryable failures tolerated before a task is marked failed.
    pub max_retries: u32,
    /// Treatment of tasks found running at startup.
    pub recovery_policy: RecoveryPolicy,
    /// Seconds to wait for the agent after a kill request.
    pub kill_grace_secs: u64,
    /// Transcript cap in bytes.
    pub max_transcript_bytes: usize,
    /// Agent invocation.
    pub agent: AgentConfig,
    /// Directory holding the task log.
    pub data_dir: PathBuf,
    /// Root for per-task and per-project working directories.
    pub workspace_root: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            night_start_hour: 20,
            night_end_hour: 8,
            day_threshold_pct: 20.0,
            night_threshold_pct: 80.0,
            primary_profile: ExecutionProfile::new("primary", "opus"),
            fallback_profile: None,
            fallback_above_pct: None,
            poll_interval_secs: 60,
            subprocess_timeout_secs: 3600,
            usage_timeout_secs: 10,
            usage_cache_secs: 60,
            max_retries: 3,
            recovery_policy: RecoveryPolicy::Fail,
            kill_grace_secs: 10,
            max_transcript_bytes: 1024 * 1024,
            agent: AgentConfig::default(),
            data_dir: PathBuf::from("data"),
            workspace_root: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate ranges and required values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(ConfigError::Invalid(
                "night_start_hour and night_end_hour must be within 0..=23".into(),
            ));
        }
        for (name, pct) in [
            ("day_threshold_pct", Some(self.day_threshold_pct)),
            ("night_threshold_pct", Some(self.night_threshold_pct)),
            ("fallback_above_pct", self.fallback_above_pct),
        ] {
            if let Some(pct) = pct {
                if !(0.0..=100.0).contains(&pct) {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must be within 0..=100, got {pct}"
                    )));
                }
            }
        }
        for (name, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("subprocess_timeout_secs", self.subprocess_timeout_secs),
            ("usage_timeout_secs", self.usage_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.primary_profile.name.trim().is_empty() {
            return Err(ConfigError::Invalid("primary_profile.name must not be empty".into()));
        }
        if self.fallback_above_pct.is_some() && self.fallback_profile.is_none() {
            return Err(ConfigError::Invalid(
                "fallback_above_pct is set but no fallback_profile is configured".into(),
            ));
        }
        if self.agent.program.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.program must not be empty".into()));
        }
        if self.agent.usage_command.is_empty() {
            return Err(ConfigError::Invalid("agent.usage_command must not be empty".into()));
        }
        if self.max_transcript_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_transcript_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&input)
    }

    /// Apply `SLEEPLESS_*` overrides from the process environment, then validate.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from an arbitrary lookup keyed by the unprefixed upper-case name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("NIGHT_START_HOUR") {
            self.night_start_hour = parse_env("NIGHT_START_HOUR", &v)?;
        }
        if let Some(v) = lookup("NIGHT_END_HOUR") {
            self.night_end_hour = parse_env("NIGHT_END_HOUR", &v)?;
        }
        if let Some(v) = lookup("DAY_THRESHOLD_PCT") {
            self.day_threshold_pct = parse_env("DAY_THRESHOLD_PCT", &v)?;
        }
        if let Some(v) = lookup("NIGHT_THRESHOLD_PCT") {
            self.night_threshold_pct = parse_env("NIGHT_THRESHOLD_PCT", &v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_env("POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SUBPROCESS_TIMEOUT_SECS") {
            self.subprocess_timeout_secs = parse_env("SUBPROCESS_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RECOVERY_POLICY") {
            self.recovery_policy = match v.trim().to_ascii_lowercase().as_str() {
                "fail" => RecoveryPolicy::Fail,
                "cancel" => RecoveryPolicy::Cancel,
                other => {
                    return Err(ConfigError::Env {
                        var: format!("{ENV_PREFIX}RECOVERY_POLICY"),
                        reason: format!("expected `fail` or `cancel`, got `{other}`"),
                    })
                }
            };
        }
        if let Some(v) = lookup("AGENT_PROGRAM") {
            self.agent.program = v;
        }
        if let Some(v) = lookup("USAGE_PTY") {
            self.agent.usage_pty = parse_env("USAGE_PTY", &v)?;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(v));
        }
        self.validate()
    }

    /// Execution window described by the hour and threshold fields.
    pub const fn window(&self) -> ExecutionWindow {
        ExecutionWindow {
            start_hour: self.night_start_hour,
            end_hour: self.night_end_hour,
            day_threshold_pct: self.day_threshold_pct,
            night_threshold_pct: self.night_threshold_pct,
        }
    }

    /// Admission policy described by the profile and retry fields.
    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            primary: self.primary_profile.clone(),
            fallback: self.fallback_profile.clone(),
            fallback_above_pct: self.fallback_above_pct,
            max_retries: self.max_retries,
        }
    }

    /// Settings for the CLI executor.
    pub fn executor_config(&self) -> CliExecutorConfig {
        CliExecutorConfig {
            program: self.agent.program.clone(),
            args: self.agent.args.clone(),
            timeout: self.subprocess_timeout(),
            kill_grace: Duration::from_secs(self.kill_grace_secs),
            retryable_exit_codes: self.agent.retryable_exit_codes.clone(),
            max_transcript_bytes: self.max_transcript_bytes,
        }
    }

    /// Interval between scheduler cycles.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Agent run limit.
    pub const fn subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.subprocess_timeout_secs)
    }

    /// Usage query limit.
    pub const fn usage_timeout(&self) -> Duration {
        Duration::from_secs(self.usage_timeout_secs)
    }

    /// Usage reading reuse period.
    pub const fn usage_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.usage_cache_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: format!("{ENV_PREFIX}{key}"),
        reason: e.to_string(),
    })
}
