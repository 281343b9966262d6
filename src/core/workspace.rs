//! Per-task and per-project working directories handed to the executor.

use std::path::PathBuf;

use crate::core::task::Task;

/// Resolves where the agent may write files for a task.
pub trait Workspace: Send + Sync {
    /// Directory for `task`, created if needed. `None` leaves the agent in the
    /// daemon's working directory.
    fn task_dir(&self, task: &Task) -> std::io::Result<Option<PathBuf>>;
}

/// No dedicated directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWorkspace;

impl Workspace for NoWorkspace {
    fn task_dir(&self, _task: &Task) -> std::io::Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// `<root>/projects/<name>` for project-tasks, `<root>/tasks/<id>` otherwise.
#[derive(Debug, Clone)]
pub struct DirWorkspace {
    root: PathBuf,
}

impl DirWorkspace {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Workspace for DirWorkspace {
    fn task_dir(&self, task: &Task) -> std::io::Result<Option<PathBuf>> {
        let dir = match &task.project {
            Some(name) => self.root.join("projects").join(sanitize(name)),
            None => self.root.join("tasks").join(task.id.to_string()),
        };
        std::fs::create_dir_all(&dir)?;
        Ok(Some(dir))
    }
}

/// Directory name for a project. ASCII letters, digits and `-` pass through;
/// every other byte becomes `_xx` in hex, so distinct names never share a
/// directory.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_kept() {
        assert_eq!(sanitize("site-v2"), "site-v2");
    }

    #[test]
    fn distinct_names_get_distinct_dirs() {
        assert_eq!(sanitize("a/b"), "a_2fb");
        assert_eq!(sanitize("a_b"), "a_5fb");
        assert_eq!(sanitize(".."), "_2e_2e");
        assert_ne!(sanitize("a b"), sanitize("a_20b"));
    }
}
