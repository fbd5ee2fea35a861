//! Scan Orchestrator - Runs one scan from baseline lookup to persisted record
//!
//! A run moves `pending -> in_progress -> completed | failed`. Every call that
//! gets past validation persists exactly one record; extraction and diff
//! errors end up on that record instead of being returned.
//!
//! Runs for the same source are serialized behind a per-source lock so each
//! baseline is the previous run's snapshot. Runs for different sources don't
//! coordinate at all.

use crate::connector::{ConnectorRegistry, SourceType};
use crate::error::ScanError;
use crate::pipeline::store::{Baseline, BaselineResolution, ScanStore};
use crate::pipeline::types::{InFlightScan, ScanPhase, ScanRecord, ScanResult, ScanStatus, ScopeStats};
use crate::snapshot::{ChangeSet, ChangeSummary, DiffEngine, ScanLevel, ScopeFilter, ScopeRuleSet};
use crate::sources::RegisteredSource;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct InFlightEntry {
    info: InFlightScan,
    cancel: watch::Sender<bool>,
}

type InFlightMap = HashMap<Uuid, InFlightEntry>;

/// Removes a run from the in-flight map when the run ends or its future is
/// dropped
struct InFlightGuard<'a> {
    in_flight: &'a RwLock<InFlightMap>,
    scan_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if write_in_flight(self.in_flight).remove(&self.scan_id).is_some() {
            debug!("Scan {} left the in-flight map", self.scan_id);
        }
    }
}

pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    connectors: ConnectorRegistry,
    default_scan_level: ScanLevel,
    source_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    // Never held across an await
    in_flight: RwLock<InFlightMap>,
}

impl ScanOrchestrator {
    pub fn new(store: Arc<dyn ScanStore>, connectors: ConnectorRegistry, default_scan_level: ScanLevel) -> Self {
        Self {
            store,
            connectors,
            default_scan_level,
            source_locks: Mutex::new(HashMap::new()),
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    /// Whether sources of this type can be scanned at all
    pub fn supports(&self, source_type: SourceType) -> bool {
        self.connectors.supports(source_type)
    }

    /// Scan a source and persist the outcome.
    ///
    /// Bad patterns and bad baselines are rejected before any state exists.
    /// Past that point the caller always gets a record, failed or not.
    pub async fn run_incremental_scan(
        &self,
        source: &RegisteredSource,
        rule_set: Option<&ScopeRuleSet>,
        baseline_id: Option<Uuid>,
    ) -> Result<ScanRecord, ScanError> {
        let filter = match rule_set {
            Some(rules) => ScopeFilter::compile(rules)?,
            None => ScopeFilter::allow_all(self.default_scan_level),
        };

        let explicit_baseline = match baseline_id {
            Some(id) => Some(self.validate_baseline(source.id, id).await?),
            None => None,
        };

        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        let (tracked, mut cancel_rx) = self.track(scan_id, source.id, started_at);
        info!("🔍 Scan {} queued for source '{}' ({})", scan_id, source.name, source.id);

        // Held until the record is persisted
        let lock = self.source_lock(source.id).await;
        let guard = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => None,
            guard = lock.lock_owned() => Some(guard),
        };

        let outcome = match guard {
            Some(_) => {
                self.execute(scan_id, started_at, source, &filter, explicit_baseline, &mut cancel_rx)
                    .await
            }
            None => Err(ScanError::Cancelled),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!("❌ Scan {} for source {} failed: {}", scan_id, source.id, error);
                ScanResult::failed(scan_id, source.id, started_at, &error)
            }
        };

        self.finish(scan_id, result.status);
        let persisted = self.store.persist_scan_result(result).await;
        drop(tracked);

        let record = persisted?;
        info!(
            "✅ Scan {} finished: {} (incremental: {}, changes: {})",
            record.id,
            record.status,
            record.is_incremental,
            record.change_summary.as_ref().map_or(0, ChangeSummary::total)
        );
        Ok(record)
    }

    /// Request cancellation of a queued or extracting run
    pub async fn cancel(&self, scan_id: Uuid) -> Result<InFlightScan, ScanError> {
        let in_flight = read_in_flight(&self.in_flight);
        let entry = in_flight.get(&scan_id).ok_or(ScanError::ScanNotFound(scan_id))?;

        if !entry.info.phase.is_cancellable() {
            return Err(ScanError::NotCancellable {
                scan_id,
                phase: entry.info.phase,
            });
        }

        entry.cancel.send_replace(true);
        info!("🛑 Cancellation requested for scan {} ({})", scan_id, entry.info.phase);
        Ok(entry.info.clone())
    }

    /// Runs that have no persisted record yet, oldest first
    pub async fn active_scans(&self) -> Vec<InFlightScan> {
        let in_flight = read_in_flight(&self.in_flight);
        let mut scans: Vec<InFlightScan> = in_flight.values().map(|e| e.info.clone()).collect();
        scans.sort_by_key(|s| s.started_at);
        scans
    }

    async fn validate_baseline(&self, source_id: Uuid, baseline_id: Uuid) -> Result<Baseline, ScanError> {
        match self.store.get_snapshot(baseline_id).await? {
            Some(baseline) if baseline.source_id == source_id => Ok(baseline),
            _ => Err(ScanError::InvalidBaseline { baseline_id, source_id }),
        }
    }

    async fn execute(
        &self,
        scan_id: Uuid,
        started_at: DateTime<Utc>,
        source: &RegisteredSource,
        filter: &ScopeFilter,
        explicit_baseline: Option<Baseline>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<ScanResult, ScanError> {
        let baseline = match explicit_baseline {
            Some(baseline) => BaselineResolution::Found(baseline),
            None => self.store.get_latest_snapshot(source.id).await?.into(),
        };

        self.transition(scan_id, ScanStatus::InProgress)?;
        self.enter_phase(scan_id, ScanPhase::Extracting)?;

        let extracted = tokio::select! {
            biased;
            _ = cancelled(cancel_rx) => return Err(ScanError::Cancelled),
            extracted = self.connectors.extract(&source.connection) => extracted?,
        };

        self.enter_phase(scan_id, ScanPhase::Filtering)?;
        let stats = filter.apply(&extracted);
        let current = filter.retain(&extracted);
        debug!(
            "Scan {} scope: {} of {} entities included at {} level",
            scan_id,
            stats.included,
            stats.total,
            filter.scan_level()
        );

        self.enter_phase(scan_id, ScanPhase::Diffing)?;
        let (base_scan_id, change_set, change_summary) = match baseline {
            BaselineResolution::Found(baseline) => {
                let base = filter.retain(&baseline.snapshot);
                let changes = if base.checksum() == current.checksum() {
                    ChangeSet::empty(current.shape())
                } else {
                    DiffEngine::diff(&base, &current)?
                };
                if changes.is_empty() {
                    debug!("Scan {} has no changes since baseline {}", scan_id, baseline.scan_id);
                }
                let summary = ChangeSummary::summarize(&changes);
                (Some(baseline.scan_id), Some(changes), Some(summary))
            }
            BaselineResolution::NoBaselineAvailable => {
                info!("No baseline for source {}, running a full scan", source.id);
                (None, None, None)
            }
        };

        Ok(ScanResult {
            scan_id,
            source_id: source.id,
            status: ScanStatus::Completed,
            base_scan_id,
            snapshot: Some(current),
            change_set,
            change_summary,
            scope_stats: Some(ScopeStats::from(&stats)),
            error_message: None,
            started_at,
        })
    }

    fn track(
        &self,
        scan_id: Uuid,
        source_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> (InFlightGuard<'_>, watch::Receiver<bool>) {
        let (cancel, cancel_rx) = watch::channel(false);
        let info = InFlightScan {
            scan_id,
            source_id,
            status: ScanStatus::Pending,
            phase: ScanPhase::Queued,
            started_at,
        };
        write_in_flight(&self.in_flight).insert(scan_id, InFlightEntry { info, cancel });
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            scan_id,
        };
        (guard, cancel_rx)
    }

    async fn source_lock(&self, source_id: Uuid) -> Arc<Mutex<()>> {
        self.source_locks
            .lock()
            .await
            .entry(source_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn transition(&self, scan_id: Uuid, next: ScanStatus) -> Result<(), ScanError> {
        let mut in_flight = write_in_flight(&self.in_flight);
        if let Some(entry) = in_flight.get_mut(&scan_id) {
            entry.info.status = entry.info.status.transition(next)?;
        }
        Ok(())
    }

    /// Leaving the cancellable phases honours a cancellation that was
    /// already accepted
    fn enter_phase(&self, scan_id: Uuid, phase: ScanPhase) -> Result<(), ScanError> {
        let mut in_flight = write_in_flight(&self.in_flight);
        if let Some(entry) = in_flight.get_mut(&scan_id) {
            if !phase.is_cancellable() && *entry.cancel.borrow() {
                return Err(ScanError::Cancelled);
            }
            entry.info.phase = phase;
        }
        Ok(())
    }

    fn finish(&self, scan_id: Uuid, status: ScanStatus) {
        let mut in_flight = write_in_flight(&self.in_flight);
        if let Some(entry) = in_flight.get_mut(&scan_id) {
            match entry.info.status.transition(status) {
                Ok(next) => entry.info.status = next,
                Err(e) => warn!("Scan {}: {}", scan_id, e),
            }
            entry.info.phase = ScanPhase::Persisting;
        }
    }
}

// A panic elsewhere leaves the map itself consistent
fn read_in_flight(lock: &RwLock<InFlightMap>) -> RwLockReadGuard<'_, InFlightMap> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_in_flight(lock: &RwLock<InFlightMap>) -> RwLockWriteGuard<'_, InFlightMap> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once cancellation is requested; never if the sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
