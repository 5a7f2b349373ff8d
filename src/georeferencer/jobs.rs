//! Per-record job bookkeeping (default ~/.georef/jobs.jsonl).
//!
//! One JSON line per finished record, appended as the batch runs. On open
//! the file is replayed and the last line for a record id wins, so an
//! interrupted batch resumes after its last written record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{FailureCause, FailureKind, ResolveError};
use crate::pipes::MatchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Matched,
    Exhausted,
    /// Filtered out by the batch policy.
    Skipped,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub record_id: String,
    /// Position of the record in its input batch.
    pub record_number: usize,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<MatchResult>,
    #[serde(default)]
    pub failure: Option<FailureCause>,
    /// Why a skipped record was filtered out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEntry {
    pub fn matched(record_id: &str, record_number: usize, result: MatchResult) -> Self {
        Self {
            record_id: record_id.to_string(),
            record_number,
            status: JobStatus::Matched,
            result: Some(result),
            failure: None,
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn exhausted(record_id: &str, record_number: usize, err: &ResolveError) -> Self {
        Self {
            record_id: record_id.to_string(),
            record_number,
            status: JobStatus::Exhausted,
            result: None,
            failure: Some(FailureCause::from(err)),
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(record_id: &str, record_number: usize, reason: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            record_number,
            status: JobStatus::Skipped,
            result: None,
            failure: None,
            note: Some(reason.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Finished for good. Records that failed only because a store was
    /// unreachable are retried on the next run.
    pub fn is_done(&self) -> bool {
        !matches!(
            &self.failure,
            Some(FailureCause {
                kind: FailureKind::GazetteerUnavailable,
                ..
            })
        )
    }
}

pub struct JobStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, JobEntry>,
}

impl JobStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
        }
    }

    /// Replay the job file at `path`. A missing file starts an empty batch.
    /// A torn final write is cut off the file so later appends start on a
    /// fresh line; other unparseable lines are logged and skipped.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let mut entries = BTreeMap::new();
        match fs::read(&path) {
            Ok(bytes) => {
                let complete = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
                if complete < bytes.len() {
                    warn!(
                        "{}: dropping torn final line ({} bytes)",
                        path.display(),
                        bytes.len() - complete
                    );
                    OpenOptions::new().write(true).open(&path)?.set_len(complete as u64)?;
                }
                for (n, line) in String::from_utf8_lossy(&bytes[..complete]).lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JobEntry>(line) {
                        Ok(entry) => {
                            entries.insert(entry.record_id.clone(), entry);
                        }
                        Err(e) => warn!("{}:{}: ignoring job line: {}", path.display(), n + 1, e),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".georef")
            .join("jobs.jsonl")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, record_id: &str) -> Option<&JobEntry> {
        self.entries.get(record_id)
    }

    pub fn is_done(&self, record_id: &str) -> bool {
        self.entries.get(record_id).is_some_and(JobEntry::is_done)
    }

    /// Append `entry` to the file, then make it visible.
    pub fn record(&mut self, entry: JobEntry) -> io::Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let line = serde_json::to_string(&entry).map_err(io::Error::other)?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", line)?;
        }
        self.entries.insert(entry.record_id.clone(), entry);
        Ok(())
    }

    pub fn entries(&self) -> &BTreeMap<String, JobEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }
}
