//! Scope preview route handler

use crate::error::ApiResult;
use crate::models::{ScopePreviewRequest, ScopePreviewResponse, SuccessResponse};
use crate::snapshot::ScopeFilter;
use axum::Json;

/// Evaluate a rule set against a caller-supplied snapshot
pub async fn preview_scope(
    Json(payload): Json<ScopePreviewRequest>,
) -> ApiResult<Json<SuccessResponse<ScopePreviewResponse>>> {
    let filter = ScopeFilter::compile(&payload.rule_set)?;
    let stats = filter.apply(&payload.snapshot);
    let snapshot = filter.retain(&payload.snapshot);

    Ok(Json(SuccessResponse::with_data(
        format!("{} of {} entities in scope.", stats.included, stats.total),
        ScopePreviewResponse { stats, snapshot },
    )))
}
