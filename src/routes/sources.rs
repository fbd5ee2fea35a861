//! Source registration route handlers

use crate::connector::SourceConnection;
use crate::error::{validation_error, ApiResult};
use crate::models::{RegisterSourceRequest, SuccessResponse};
use crate::sources::SourceInfo;
use crate::state::SharedState;
use axum::{extract::State, Json};
use tracing::debug;
use validator::Validate;

/// Register a data source
pub async fn register_source(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterSourceRequest>,
) -> ApiResult<Json<SuccessResponse<SourceInfo>>> {
    // Validate input
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    if !state.orchestrator.supports(payload.source_type) {
        return Err(validation_error(format!(
            "No connector available for source type '{}'",
            payload.source_type
        )));
    }

    debug!("Registering {} source '{}'", payload.source_type, payload.name);

    let connection = SourceConnection::new(payload.source_type, payload.uri);
    let source = state.sources.register(payload.name, connection).await;

    Ok(Json(SuccessResponse::with_data(
        format!("Source '{}' registered.", source.name),
        SourceInfo::from(source.as_ref()),
    )))
}

/// List registered sources
pub async fn list_sources(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<SourceInfo>>>> {
    let sources = state.sources.list().await;

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} sources.", sources.len()),
        sources,
    )))
}
