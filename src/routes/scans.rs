//! Scan route handlers
//!
//! Starting, inspecting and cancelling scans.

use crate::error::{not_found_error, ApiResult, AppError};
use crate::models::{StartScanRequest, SuccessResponse};
use crate::pipeline::{InFlightScan, ScanRecord};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;
use uuid::Uuid;

/// Run a scan for a source and return its record.
/// The body is optional; without it the latest baseline and the default
/// scan level are used.
pub async fn start_scan(
    State(state): State<SharedState>,
    Path(source_id): Path<Uuid>,
    payload: Option<Json<StartScanRequest>>,
) -> ApiResult<Json<SuccessResponse<ScanRecord>>> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let source = state.sources.require(source_id).await?;

    // The run outlives a disconnected client so its record still lands
    let run = {
        let state = state.clone();
        let source = source.clone();
        tokio::spawn(async move {
            state
                .orchestrator
                .run_incremental_scan(&source, request.rule_set.as_ref(), request.baseline_scan_id)
                .await
        })
    };
    let record = run
        .await
        .map_err(|e| AppError::Internal(format!("Scan task for source {} failed: {}", source_id, e)))??;

    info!("Scan {} for '{}' ended as {}", record.id, source.name, record.status);

    Ok(Json(SuccessResponse::with_data(
        format!("Scan {}.", record.status),
        record,
    )))
}

/// Scan history of a source, newest first
pub async fn list_scans(
    State(state): State<SharedState>,
    Path(source_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<ScanRecord>>>> {
    state.sources.require(source_id).await?;
    let records = state.store().list_records(source_id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} scans.", records.len()),
        records,
    )))
}

/// Get a single scan record
pub async fn get_scan(
    State(state): State<SharedState>,
    Path(scan_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ScanRecord>>> {
    let record = state
        .store()
        .get_record(scan_id)
        .await?
        .ok_or_else(|| not_found_error(format!("Scan {} not found", scan_id)))?;

    Ok(Json(SuccessResponse::with_data("Scan retrieved.", record)))
}

/// Scans that are still running
pub async fn active_scans(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<InFlightScan>>>> {
    let scans = state.orchestrator.active_scans().await;

    Ok(Json(SuccessResponse::with_data(
        format!("{} scans in flight.", scans.len()),
        scans,
    )))
}

/// Cancel a queued or extracting scan
pub async fn cancel_scan(
    State(state): State<SharedState>,
    Path(scan_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<InFlightScan>>> {
    let scan = state.orchestrator.cancel(scan_id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Cancellation requested for scan {}.", scan_id),
        scan,
    )))
}
