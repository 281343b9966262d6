//! Configuration models for the window, thresholds, profiles and agent.

pub mod scheduler;

pub use scheduler::{AgentConfig, ConfigError, SchedulerConfig, ENV_PREFIX};
