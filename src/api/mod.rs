//! Lifecycle API and command dispatch consumed by front ends.

pub mod command;
pub mod lifecycle;

pub use command::{Command, Reply, TrashCommand};
pub use lifecycle::{CancelTarget, Lifecycle, ReportQuery, StatusSnapshot};
