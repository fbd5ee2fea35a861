//! Scan Store
//!
//! Where scan records live and where baselines come from.
//! Think of this as "git log" for a source's structure: every run appends
//! one record, and the newest completed one is the next run's baseline.

use crate::error::ScanError;
use crate::metadata::MetadataSnapshot;
use crate::pipeline::types::{ScanRecord, ScanResult, ScanStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// A stored snapshot usable as the "before" side of a diff
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub scan_id: Uuid,
    pub source_id: Uuid,
    pub snapshot: MetadataSnapshot,
}

/// Outcome of looking for a baseline. No baseline is not an error: the run
/// falls back to a full scan.
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineResolution {
    Found(Baseline),
    NoBaselineAvailable,
}

impl From<Option<Baseline>> for BaselineResolution {
    fn from(baseline: Option<Baseline>) -> Self {
        baseline.map_or(BaselineResolution::NoBaselineAvailable, BaselineResolution::Found)
    }
}

/// Persistence boundary of the scan engine
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Snapshot of the newest completed scan for a source
    async fn get_latest_snapshot(&self, source_id: Uuid) -> Result<Option<Baseline>, ScanError>;

    /// Snapshot of a specific completed scan
    async fn get_snapshot(&self, scan_id: Uuid) -> Result<Option<Baseline>, ScanError>;

    /// Persist the outcome of one run and return its record
    async fn persist_scan_result(&self, result: ScanResult) -> Result<ScanRecord, ScanError>;

    async fn get_record(&self, scan_id: Uuid) -> Result<Option<ScanRecord>, ScanError>;

    /// Records for a source, newest first
    async fn list_records(&self, source_id: Uuid) -> Result<Vec<ScanRecord>, ScanError>;
}

#[derive(Debug, Clone)]
struct StoredScan {
    record: ScanRecord,
    snapshot: Option<MetadataSnapshot>,
}

impl StoredScan {
    fn as_baseline(&self) -> Option<Baseline> {
        if self.record.status != ScanStatus::Completed {
            return None;
        }
        self.snapshot.as_ref().map(|snapshot| Baseline {
            scan_id: self.record.id,
            source_id: self.record.source_id,
            snapshot: snapshot.clone(),
        })
    }
}

/// In-memory store; records are kept per source in insertion order
pub struct InMemoryScanStore {
    /// Source ID -> scans, oldest first
    scans: RwLock<HashMap<Uuid, Vec<StoredScan>>>,
    /// Completed records kept per source (0 = unlimited)
    retention: usize,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::with_retention(0)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            scans: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Drop the oldest records beyond `keep`. The newest completed record is
    /// never dropped, so the baseline chain survives.
    fn prune_list(source_scans: &mut Vec<StoredScan>, keep: usize) -> usize {
        if keep == 0 || source_scans.len() <= keep {
            return 0;
        }

        let baseline_id = source_scans
            .iter()
            .rev()
            .find(|s| s.record.status == ScanStatus::Completed)
            .map(|s| s.record.id);

        let mut excess = source_scans.len() - keep;
        let before = source_scans.len();
        source_scans.retain(|s| {
            if excess > 0 && Some(s.record.id) != baseline_id {
                excess -= 1;
                false
            } else {
                true
            }
        });

        before - source_scans.len()
    }
}

impl Default for InMemoryScanStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanStore for InMemoryScanStore {
    async fn get_latest_snapshot(&self, source_id: Uuid) -> Result<Option<Baseline>, ScanError> {
        let scans = self.scans.read().await;
        Ok(scans
            .get(&source_id)
            .and_then(|list| list.iter().rev().find_map(StoredScan::as_baseline)))
    }

    async fn get_snapshot(&self, scan_id: Uuid) -> Result<Option<Baseline>, ScanError> {
        let scans = self.scans.read().await;
        Ok(scans
            .values()
            .flatten()
            .find(|s| s.record.id == scan_id)
            .and_then(StoredScan::as_baseline))
    }

    async fn persist_scan_result(&self, result: ScanResult) -> Result<ScanRecord, ScanError> {
        let (record, snapshot) = result.into_record(Utc::now());

        let mut scans = self.scans.write().await;
        let source_scans = scans.entry(record.source_id).or_insert_with(Vec::new);

        if source_scans.iter().any(|s| s.record.id == record.id) {
            return Err(ScanError::Store(format!("Scan {} already persisted", record.id)));
        }

        source_scans.push(StoredScan {
            record: record.clone(),
            snapshot,
        });

        debug!(
            "Stored scan {} for source {} ({}, {} records held)",
            record.id,
            record.source_id,
            record.status,
            source_scans.len()
        );

        let pruned = Self::prune_list(source_scans, self.retention);
        if pruned > 0 {
            info!("Pruned {} old scans for source {}", pruned, record.source_id);
        }

        Ok(record)
    }

    async fn get_record(&self, scan_id: Uuid) -> Result<Option<ScanRecord>, ScanError> {
        let scans = self.scans.read().await;
        Ok(scans
            .values()
            .flatten()
            .find(|s| s.record.id == scan_id)
            .map(|s| s.record.clone()))
    }

    async fn list_records(&self, source_id: Uuid) -> Result<Vec<ScanRecord>, ScanError> {
        let scans = self.scans.read().await;
        Ok(scans
            .get(&source_id)
            .map(|list| list.iter().rev().map(|s| s.record.clone()).collect())
            .unwrap_or_default())
    }
}
