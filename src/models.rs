//! Data models and DTOs (Data Transfer Objects)
//!
//! Request/response structures used by the API.

use crate::connector::SourceType;
use crate::metadata::MetadataSnapshot;
use crate::snapshot::{FilterStats, ScopeRuleSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Request to register a data source
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterSourceRequest {
    #[validate(length(min = 1, max = 255, message = "Source name is required"))]
    pub name: String,

    pub source_type: SourceType,

    /// Connection string or snapshot file path, depending on `source_type`
    #[validate(length(min = 1, message = "Source URI is required"))]
    pub uri: String,
}

/// Request to start a scan. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    pub rule_set: Option<ScopeRuleSet>,
    /// Diff against this scan instead of the latest completed one
    pub baseline_scan_id: Option<Uuid>,
}

/// Dry-run a rule set against a snapshot without scanning anything
#[derive(Debug, Deserialize)]
pub struct ScopePreviewRequest {
    #[serde(default)]
    pub rule_set: ScopeRuleSet,
    pub snapshot: MetadataSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ScopePreviewResponse {
    pub stats: FilterStats,
    pub snapshot: MetadataSnapshot,
}
