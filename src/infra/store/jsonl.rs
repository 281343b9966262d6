//! File-backed store using an append-only JSON-lines log.
//!
//! Each mutation appends full snapshots of the records it touched; the log is
//! rewritten through a temporary file and rename on open and after a failed
//! write, so a crash leaves either the old or the new file in place.

use std::fs::{create_dir_all, rename, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::{StoreBackend, StoreError, StoreRecord};

const LOG_FILE: &str = "tasks.jsonl";

/// JSON-lines log under a data directory.
pub struct JsonlBackend {
    path: PathBuf,
}

impl JsonlBackend {
    /// Use `<dir>/tasks.jsonl`, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(LOG_FILE),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(records: &[StoreRecord]) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

impl StoreBackend for JsonlBackend {
    fn load(&mut self) -> Result<Vec<StoreRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        let last = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut records = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoreRecord>(line) {
                Ok(record) => records.push(record),
                // A torn final line is what an interrupted append leaves behind.
                Err(e) if Some(idx) == last => {
                    warn!(line = idx + 1, error = %e, "discarding torn final store record");
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(records)
    }

    fn append(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        let buf = Self::encode(records)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    fn compact(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        let buf = Self::encode(records)?;
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        rename(&tmp, &self.path)?;
        Ok(())
    }
}
