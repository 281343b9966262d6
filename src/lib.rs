//! # Sleepless Scheduler
//!
//! An unattended task scheduler that spends a rate-limited external agent's
//! budget safely while nobody is watching.
//!
//! Users submit work at any time. A single polling loop decides *when* each
//! task may start: only inside a configured time-of-day window and only while
//! the agent's reported usage stays below the threshold in force. Exactly one
//! task runs at a time; everything else waits in a durable FIFO queue.
//!
//! ## Core Problem Solved
//!
//! - **Quota Safety**: a usage reading that cannot be obtained denies the start
//! - **Single Flight**: the agent is never invoked twice concurrently
//! - **Crash Recovery**: tasks left `running` by a crash are reconciled at startup
//! - **Many Writers**: submit, cancel, trash and restore race the loop without a global lock
//!
//! ## Task lifecycle
//!
//! ```text
//! pending ──start──▶ running ──▶ completed | failed
//!    │                  │
//!    └──cancel──▶ cancelled ◀──cancel──┘
//! pending|completed|failed|cancelled ──trash──▶ trashed ──restore──▶ pending
//! trashed ──empty──▶ purged (kept for audit, hidden from listings)
//! ```
//!
//! ## Wiring
//!
//! ```rust,ignore
//! use sleepless_scheduler::builders::build_runtime;
//! use sleepless_scheduler::config::SchedulerConfig;
//! use sleepless_scheduler::core::NewTask;
//! use tokio_util::sync::CancellationToken;
//!
//! let cfg = SchedulerConfig::default();
//! let runtime = build_runtime(&cfg)?;
//! runtime.lifecycle.submit(NewTask::for_project("site", "fix the footer links"))?;
//!
//! let shutdown = CancellationToken::new();
//! let handle = runtime.scheduler.clone().spawn(shutdown.clone());
//! // ...
//! shutdown.cancel();
//! handle.await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, gating, storage and the scheduler loop.
pub mod core;
/// Configuration models for the window, thresholds and agent.
pub mod config;
/// Builders to construct a runtime from configuration.
pub mod builders;
/// Persistence backends for the task store.
pub mod infra;
/// Lifecycle API and command dispatch.
pub mod api;
/// Shared utilities.
pub mod util;
