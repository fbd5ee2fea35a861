// PostgreSQL-backed scan store
//
// One row per scan run. Snapshots, change sets and summaries are kept as JSONB.

use crate::error::ScanError;
use crate::metadata::MetadataSnapshot;
use crate::pipeline::store::{Baseline, ScanStore};
use crate::pipeline::types::{ScanMetadata, ScanRecord, ScanResult, ScopeStats};
use crate::snapshot::{ChangeSet, ChangeSummary};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::Pool;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, source_id, status, is_incremental, base_scan_id, snapshot, \
     change_set, change_summary, scope_stats, checksum, error_message, started_at, completed_at";

pub struct PostgresScanStore {
    pool: Pool,
}

impl PostgresScanStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    // Create the scan_records table if it doesn't exist
    pub async fn ensure_schema(&self) -> Result<(), ScanError> {
        let client = self.pool.get().await?;

        client.execute(
            "CREATE TABLE IF NOT EXISTS scan_records (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL,
                status VARCHAR(20) NOT NULL,
                is_incremental BOOLEAN NOT NULL DEFAULT false,
                base_scan_id UUID,
                snapshot JSONB,
                change_set JSONB,
                change_summary JSONB,
                scope_stats JSONB,
                checksum VARCHAR(64),
                error_message TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ NOT NULL
            )",
            &[],
        ).await?;

        client.execute(
            "CREATE INDEX IF NOT EXISTS idx_scan_records_source_completed
             ON scan_records(source_id, completed_at DESC)",
            &[],
        ).await?;

        info!("✅ Scan store tables initialized");
        Ok(())
    }

    fn row_to_baseline(row: &Row) -> Result<Baseline, ScanError> {
        let snapshot: Value = row.try_get("snapshot")?;
        Ok(Baseline {
            scan_id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            snapshot: serde_json::from_value(snapshot)?,
        })
    }

    fn row_to_record(row: &Row) -> Result<ScanRecord, ScanError> {
        let status: String = row.try_get("status")?;
        let is_incremental: bool = row.try_get("is_incremental")?;
        let change_summary: Option<Value> = row.try_get("change_summary")?;
        let scope_stats: Option<Value> = row.try_get("scope_stats")?;

        Ok(ScanRecord {
            id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            status: status.parse()?,
            is_incremental,
            base_scan_id: row.try_get("base_scan_id")?,
            metadata: decode_metadata(
                is_incremental,
                row.try_get("snapshot")?,
                row.try_get("change_set")?,
            )?,
            change_summary: change_summary
                .map(serde_json::from_value::<ChangeSummary>)
                .transpose()?,
            error_message: row.try_get("error_message")?,
            checksum: row.try_get("checksum")?,
            scope_stats: scope_stats.map(serde_json::from_value::<ScopeStats>).transpose()?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

/// Incremental records expose their change set, full scans their snapshot.
/// The two JSON forms overlap, so the flag decides which column is read.
fn decode_metadata(
    is_incremental: bool,
    snapshot: Option<Value>,
    change_set: Option<Value>,
) -> Result<Option<ScanMetadata>, ScanError> {
    if is_incremental {
        Ok(change_set
            .map(serde_json::from_value::<ChangeSet>)
            .transpose()?
            .map(ScanMetadata::Changes))
    } else {
        Ok(snapshot
            .map(serde_json::from_value::<MetadataSnapshot>)
            .transpose()?
            .map(ScanMetadata::Snapshot))
    }
}

#[async_trait]
impl ScanStore for PostgresScanStore {
    async fn get_latest_snapshot(&self, source_id: Uuid) -> Result<Option<Baseline>, ScanError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            "SELECT id, source_id, snapshot FROM scan_records
             WHERE source_id = $1 AND status = 'completed' AND snapshot IS NOT NULL
             ORDER BY completed_at DESC
             LIMIT 1",
            &[&source_id],
        ).await?;

        row.as_ref().map(Self::row_to_baseline).transpose()
    }

    async fn get_snapshot(&self, scan_id: Uuid) -> Result<Option<Baseline>, ScanError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            "SELECT id, source_id, snapshot FROM scan_records
             WHERE id = $1 AND status = 'completed' AND snapshot IS NOT NULL",
            &[&scan_id],
        ).await?;

        row.as_ref().map(Self::row_to_baseline).transpose()
    }

    async fn persist_scan_result(&self, result: ScanResult) -> Result<ScanRecord, ScanError> {
        let (record, snapshot) = result.into_record(Utc::now());

        let snapshot_json = snapshot.as_ref().map(serde_json::to_value).transpose()?;
        let change_set_json = match &record.metadata {
            Some(ScanMetadata::Changes(changes)) => Some(serde_json::to_value(changes)?),
            _ => None,
        };
        let summary_json = record.change_summary.as_ref().map(serde_json::to_value).transpose()?;
        let stats_json = record.scope_stats.as_ref().map(serde_json::to_value).transpose()?;

        let client = self.pool.get().await?;
        client.execute(
            "INSERT INTO scan_records (id, source_id, status, is_incremental, base_scan_id, snapshot,
                change_set, change_summary, scope_stats, checksum, error_message, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            &[
                &record.id,
                &record.source_id,
                &record.status.as_str(),
                &record.is_incremental,
                &record.base_scan_id,
                &snapshot_json,
                &change_set_json,
                &summary_json,
                &stats_json,
                &record.checksum,
                &record.error_message,
                &record.started_at,
                &record.completed_at,
            ],
        ).await?;

        debug!("Persisted scan {} for source {} ({})", record.id, record.source_id, record.status);
        Ok(record)
    }

    async fn get_record(&self, scan_id: Uuid) -> Result<Option<ScanRecord>, ScanError> {
        let client = self.pool.get().await?;

        let query = format!("SELECT {} FROM scan_records WHERE id = $1", RECORD_COLUMNS);
        let row = client.query_opt(query.as_str(), &[&scan_id]).await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list_records(&self, source_id: Uuid) -> Result<Vec<ScanRecord>, ScanError> {
        let client = self.pool.get().await?;

        let query = format!(
            "SELECT {} FROM scan_records WHERE source_id = $1 ORDER BY completed_at DESC",
            RECORD_COLUMNS
        );
        let rows = client.query(query.as_str(), &[&source_id]).await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
