//! Batch orchestration: policy gates, the pipe chain and job bookkeeping.
//!
//! Each record moves PENDING → (pipes in order) → MATCHED | EXHAUSTED.
//! Records already finished in the job store are not processed again, so a
//! stopped batch picks up where it left off.

pub mod jobs;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, warn};

use crate::error::FailureKind;
use crate::gazetteer::StoreKind;
use crate::geometry::Shape;
use crate::pipes::{Citation, PipeChain, PipeKind};
use crate::record::LocalityRecord;

pub use jobs::{JobEntry, JobStatus, JobStore};
pub use policy::{Admission, BatchPolicy, CoordType, PlaceType, Preflight};

/// Run one record through the preflight gates and the chain.
pub fn process(chain: &PipeChain, policy: &BatchPolicy, record: &LocalityRecord, record_number: usize) -> JobEntry {
    match policy.preflight(record, |r| chain.context().admin_radius_km(r)) {
        Preflight::Fail(err) => JobEntry::exhausted(&record.id, record_number, &err),
        Preflight::Resolve(prepared) => match chain.resolve(&prepared) {
            Ok(result) => JobEntry::matched(&record.id, record_number, result),
            Err(err) => JobEntry::exhausted(&record.id, record_number, &err),
        },
    }
}

/// One record of the exported result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedResult {
    pub record_number: usize,
    /// GeoJSON geometry; null for failed records.
    pub geometry: Option<Shape>,
    pub radius_km: Option<f64>,
    pub description: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipe: Option<PipeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Citation>,
}

impl From<&JobEntry> for ExportedResult {
    fn from(entry: &JobEntry) -> Self {
        match &entry.result {
            Some(result) => Self {
                record_number: entry.record_number,
                geometry: Some(result.geometry.clone()),
                radius_km: Some(result.radius_km),
                description: result.description.clone(),
                status: entry.status,
                pipe: Some(result.pipe),
                failure: None,
                sources: result.sources.clone(),
            },
            None => Self {
                record_number: entry.record_number,
                geometry: None,
                radius_km: None,
                description: entry
                    .failure
                    .as_ref()
                    .map(|f| f.message.clone())
                    .or_else(|| entry.note.clone())
                    .unwrap_or_default(),
                status: entry.status,
                pipe: None,
                failure: entry.failure.as_ref().map(|f| f.kind),
                sources: Vec::new(),
            },
        }
    }
}

/// Counts for one `georeference` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub matched: usize,
    pub exhausted: usize,
    pub skipped: usize,
    /// Already finished in the job store.
    pub resumed: usize,
}

/// A record admitted to this run, with its batch position.
struct Task<'a> {
    number: usize,
    record: &'a LocalityRecord,
}

pub struct Georeferencer {
    chain: Arc<PipeChain>,
    policy: BatchPolicy,
    jobs: JobStore,
    succeeded: usize,
    attempted: usize,
}

impl Georeferencer {
    pub fn new(chain: Arc<PipeChain>, policy: BatchPolicy, jobs: JobStore) -> Self {
        Self {
            chain,
            policy,
            jobs,
            succeeded: 0,
            attempted: 0,
        }
    }

    pub fn chain(&self) -> &PipeChain {
        &self.chain
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Existing coordinates in open water, or a marine-looking record.
    fn is_marine(&self, record: &LocalityRecord) -> bool {
        if record.looks_marine() {
            return true;
        }
        let Some(coords) = &record.coordinates else {
            return false;
        };
        if coords.validate().is_err() {
            return false;
        }
        let point = geo::Point::new(coords.lon, coords.lat);
        match self.chain.context().index().containing(&point, StoreKind::Oceans) {
            Ok(found) => !found.is_empty(),
            Err(e) => {
                warn!("{}: ocean check failed, treating as terrestrial: {}", record.id, e);
                false
            }
        }
    }

    /// Apply the admission filters, skip/limit and resume state. Skipped
    /// records are written as they are met.
    fn admit<'a>(
        &mut self,
        records: &'a [LocalityRecord],
        summary: &mut BatchSummary,
    ) -> io::Result<Vec<Task<'a>>> {
        let mut tasks = Vec::new();
        let mut eligible = 0;
        for (number, record) in records.iter().enumerate() {
            if self.policy.limit.is_some_and(|limit| tasks.len() >= limit) {
                break;
            }
            match self.policy.admit(record, || self.is_marine(record)) {
                Admission::Excluded => continue,
                Admission::Ineligible(reason) => {
                    if !self.jobs.is_done(&record.id) {
                        self.jobs.record(JobEntry::skipped(&record.id, number, &reason))?;
                        summary.skipped += 1;
                    }
                    continue;
                }
                Admission::Eligible => {}
            }
            eligible += 1;
            if eligible <= self.policy.skip {
                continue;
            }
            if self.jobs.is_done(&record.id) {
                summary.resumed += 1;
                continue;
            }
            tasks.push(Task { number, record });
        }
        Ok(tasks)
    }

    fn finish(&mut self, entry: JobEntry, summary: &mut BatchSummary) -> io::Result<()> {
        self.attempted += 1;
        let outcome = match (&entry.result, &entry.failure) {
            (Some(result), _) => {
                self.succeeded += 1;
                summary.matched += 1;
                format!("matched by {} pipe", result.pipe)
            }
            (None, Some(failure)) => {
                summary.exhausted += 1;
                format!("exhausted ({})", failure)
            }
            (None, None) => {
                summary.exhausted += 1;
                "exhausted".into()
            }
        };
        info!("{}: {} ({}/{} succeeded)", entry.record_id, outcome, self.succeeded, self.attempted);
        self.jobs.record(entry)
    }

    /// Process `records` in input order.
    pub fn georeference(&mut self, records: &[LocalityRecord]) -> io::Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let tasks = self.admit(records, &mut summary)?;
        for task in tasks {
            let entry = process(&self.chain, &self.policy, task.record, task.number);
            self.finish(entry, &mut summary)?;
        }
        Ok(summary)
    }

    /// Same outcome as `georeference`, resolved on up to `workers` threads.
    ///
    /// Workers only resolve; the calling thread writes every job entry.
    pub fn georeference_parallel(&mut self, records: &[LocalityRecord], workers: usize) -> io::Result<BatchSummary> {
        if workers <= 1 {
            return self.georeference(records);
        }
        let mut summary = BatchSummary::default();
        let tasks = self.admit(records, &mut summary)?;
        let next = AtomicUsize::new(0);
        let chain = Arc::clone(&self.chain);
        let policy = self.policy.clone();

        thread::scope(|scope| -> io::Result<()> {
            let (tx, rx) = mpsc::channel::<JobEntry>();
            for _ in 0..workers.min(tasks.len().max(1)) {
                let tx = tx.clone();
                let (tasks, next, chain, policy) = (&tasks, &next, &chain, &policy);
                scope.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(task) = tasks.get(i) else { break };
                    let entry = process(chain, policy, task.record, task.number);
                    if tx.send(entry).is_err() {
                        break;
                    }
                });
            }
            drop(tx);
            for entry in rx {
                self.finish(entry, &mut summary)?;
            }
            Ok(())
        })?;
        Ok(summary)
    }

    /// Results keyed by record id. Failed records appear only with
    /// `include_failed`; skipped records never do.
    pub fn export(&self) -> BTreeMap<String, ExportedResult> {
        self.jobs
            .entries()
            .iter()
            .filter(|(_, e)| match e.status {
                JobStatus::Matched => true,
                JobStatus::Exhausted => self.policy.include_failed,
                JobStatus::Skipped => false,
            })
            .map(|(id, e)| (id.clone(), ExportedResult::from(e)))
            .collect()
    }
}
