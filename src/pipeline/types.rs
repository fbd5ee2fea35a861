//! Scan types for the incremental scan pipeline

use crate::error::ScanError;
use crate::metadata::MetadataSnapshot;
use crate::snapshot::{ChangeSet, ChangeSummary, FilterStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    /// `pending -> in_progress -> completed | failed`, plus `pending -> failed`
    /// for a run cancelled before it started
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (ScanStatus::Pending, ScanStatus::InProgress)
                | (ScanStatus::Pending, ScanStatus::Failed)
                | (ScanStatus::InProgress, ScanStatus::Completed)
                | (ScanStatus::InProgress, ScanStatus::Failed)
        )
    }

    pub fn transition(self, next: ScanStatus) -> Result<ScanStatus, ScanError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ScanError::IllegalTransition { from: self, to: next })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::InProgress => "in_progress",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "in_progress" => Ok(ScanStatus::InProgress),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(ScanError::Store(format!("unknown scan status '{}'", other))),
        }
    }
}

/// Finer-grained position of an in-flight run; decides whether it can
/// still be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Waiting for the per-source lock
    Queued,
    Extracting,
    Filtering,
    Diffing,
    Persisting,
}

impl ScanPhase {
    pub fn is_cancellable(&self) -> bool {
        matches!(self, ScanPhase::Queued | ScanPhase::Extracting)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Queued => "queued",
            ScanPhase::Extracting => "extracting",
            ScanPhase::Filtering => "filtering",
            ScanPhase::Diffing => "diffing",
            ScanPhase::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Filter statistics without the per-entity list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStats {
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
}

impl From<&FilterStats> for ScopeStats {
    fn from(stats: &FilterStats) -> Self {
        Self {
            total: stats.total,
            included: stats.included,
            excluded: stats.excluded,
        }
    }
}

/// What a record exposes as `metadata`: the full snapshot for a full scan,
/// the change set for an incremental one
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanMetadata {
    Snapshot(MetadataSnapshot),
    Changes(ChangeSet),
}

/// The persisted outcome of exactly one scan run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub status: ScanStatus,
    pub is_incremental: bool,
    pub base_scan_id: Option<Uuid>,
    pub metadata: Option<ScanMetadata>,
    pub change_summary: Option<ChangeSummary>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_stats: Option<ScopeStats>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Everything the orchestrator hands to the store at the end of a run
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub source_id: Uuid,
    pub status: ScanStatus,
    pub base_scan_id: Option<Uuid>,
    pub snapshot: Option<MetadataSnapshot>,
    pub change_set: Option<ChangeSet>,
    pub change_summary: Option<ChangeSummary>,
    pub scope_stats: Option<ScopeStats>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn failed(scan_id: Uuid, source_id: Uuid, started_at: DateTime<Utc>, error: &ScanError) -> Self {
        Self {
            scan_id,
            source_id,
            status: ScanStatus::Failed,
            base_scan_id: None,
            snapshot: None,
            change_set: None,
            change_summary: None,
            scope_stats: None,
            error_message: Some(error.to_string()),
            started_at,
        }
    }

    /// Split into the public record and the snapshot kept for future baselines
    pub fn into_record(self, completed_at: DateTime<Utc>) -> (ScanRecord, Option<MetadataSnapshot>) {
        let is_incremental = self.change_set.is_some();
        let checksum = self.snapshot.as_ref().map(MetadataSnapshot::checksum);
        let metadata = match (self.change_set, &self.snapshot) {
            (Some(changes), _) => Some(ScanMetadata::Changes(changes)),
            (None, Some(snapshot)) => Some(ScanMetadata::Snapshot(snapshot.clone())),
            (None, None) => None,
        };

        let record = ScanRecord {
            id: self.scan_id,
            source_id: self.source_id,
            status: self.status,
            is_incremental,
            base_scan_id: self.base_scan_id,
            metadata,
            change_summary: self.change_summary,
            error_message: self.error_message,
            checksum,
            scope_stats: self.scope_stats,
            started_at: self.started_at,
            completed_at,
        };
        (record, self.snapshot)
    }
}

/// A run that has not reached a terminal state yet
#[derive(Debug, Clone, Serialize)]
pub struct InFlightScan {
    pub scan_id: Uuid,
    pub source_id: Uuid,
    pub status: ScanStatus,
    pub phase: ScanPhase,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RelationalSnapshot;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(ScanStatus::Pending.can_transition_to(ScanStatus::InProgress));
        assert!(ScanStatus::InProgress.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::InProgress.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Pending.can_transition_to(ScanStatus::Completed));
        assert!(!ScanStatus::Completed.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Failed.can_transition_to(ScanStatus::Completed));

        let err = ScanStatus::Completed.transition(ScanStatus::InProgress).unwrap_err();
        assert_eq!(err.to_string(), "Illegal scan transition: completed -> in_progress");
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [ScanStatus::Pending, ScanStatus::InProgress, ScanStatus::Completed, ScanStatus::Failed] {
            assert_eq!(status.as_str().parse::<ScanStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_full_scan_record_json_shape() {
        let snapshot = MetadataSnapshot::Relational(RelationalSnapshot::default());
        let now = Utc::now();
        let result = ScanResult {
            scan_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            status: ScanStatus::Completed,
            base_scan_id: None,
            snapshot: Some(snapshot.clone()),
            change_set: None,
            change_summary: None,
            scope_stats: None,
            error_message: None,
            started_at: now,
        };

        let (record, kept) = result.into_record(now);
        assert_eq!(kept, Some(snapshot.clone()));
        assert!(!record.is_incremental);
        assert_eq!(record.checksum, Some(snapshot.checksum()));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["is_incremental"], false);
        assert_eq!(json["base_scan_id"], serde_json::Value::Null);
        assert_eq!(json["metadata"], serde_json::json!({"schemas": {}}));
        assert_eq!(json["change_summary"], serde_json::Value::Null);
        assert_eq!(json["error_message"], serde_json::Value::Null);
    }

    #[test]
    fn test_failed_result_has_no_metadata() {
        let (record, kept) = ScanResult::failed(Uuid::new_v4(), Uuid::new_v4(), Utc::now(), &ScanError::Cancelled)
            .into_record(Utc::now());
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.metadata, None);
        assert_eq!(record.error_message.as_deref(), Some("scan cancelled"));
        assert!(kept.is_none());
    }
}
