//! Write-Ahead Log implementation
//!
//! Admission and terminal completion are journaled before the in-memory
//! state changes, so a crash between the two leaves a record the scheduler
//! can recover and re-dispatch.

use crate::error::Result;
use chrono::{DateTime, Utc};
use prodline_types::Order;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A single journal record, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WalRecord {
    /// An order was admitted; carries the full snapshot.
    #[serde(rename = "TASK")]
    Task {
        task: Order,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// An order reached a terminal state; carries only the id.
    #[serde(rename = "COMPLETE")]
    Complete {
        task_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

struct WalFile {
    file: File,
    path: PathBuf,
}

/// Append-only durable journal of admitted and completed orders.
///
/// Writes are serialized by a mutex and fsynced before returning, so a
/// record is visible iff the whole line reached stable storage.
pub struct Wal {
    inner: Mutex<WalFile>,
}

impl Wal {
    /// Create or open the journal at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().read(true).create(true).append(true).open(&path)?;
        Ok(Self { inner: Mutex::new(WalFile { file, path }) })
    }

    /// Journal an admitted order. Returns only after the record is synced;
    /// on error the caller must treat the admission as failed.
    pub async fn append(&self, order: &Order) -> Result<()> {
        let record = WalRecord::Task { task: order.clone(), timestamp: Utc::now() };
        self.write_record(&record).await
    }

    /// Journal terminal completion of the order with the given id.
    pub async fn complete(&self, task_id: &str) -> Result<()> {
        let record =
            WalRecord::Complete { task_id: task_id.to_string(), timestamp: Utc::now() };
        self.write_record(&record).await
    }

    /// Replay the journal and return every order that was admitted but not
    /// completed, in first-admission order. Unparseable lines are skipped.
    /// Afterwards the file position is back at the end so appends continue.
    pub async fn recover(&self) -> Result<Vec<Order>> {
        let mut inner = self.inner.lock().await;

        inner.file.seek(SeekFrom::Start(0))?;

        let mut pending: Vec<Order> = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();

        let reader = BufReader::new(&inner.file);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalRecord>(&line) {
                Ok(WalRecord::Task { task, .. }) => {
                    // Duplicate admissions keep the newest snapshot in place.
                    if let Some(existing) = pending.iter_mut().find(|o| o.id == task.id) {
                        *existing = task;
                    } else {
                        pending.push(task);
                    }
                }
                Ok(WalRecord::Complete { task_id, .. }) => {
                    completed.insert(task_id);
                }
                Err(error) => {
                    tracing::warn!(path = %inner.path.display(), %error, "skipping corrupt WAL line");
                }
            }
        }

        inner.file.seek(SeekFrom::End(0))?;

        pending.retain(|order| !completed.contains(&order.id));
        Ok(pending)
    }

    /// Force any buffered data to stable storage.
    pub async fn flush(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.file.sync_all()?;
        Ok(())
    }

    async fn write_record(&self, record: &WalRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;

        let mut inner = self.inner.lock().await;
        inner.file.write_all(json.as_bytes())?;
        inner.file.write_all(b"\n")?;
        inner.file.sync_all()?;
        Ok(())
    }
}
