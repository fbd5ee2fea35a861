//! Source Registry
//!
//! Keeps the data sources the service can scan. A source is registered once
//! and scanned many times; its ID keys every scan record.

use crate::connector::{SourceConnection, SourceType};
use crate::error::ScanError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// A registered data source
#[derive(Debug)]
pub struct RegisteredSource {
    pub id: Uuid,
    pub name: String,
    pub connection: SourceConnection,
    pub registered_at: DateTime<Utc>,
}

/// Public source info (safe to expose to clients)
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub uri: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&RegisteredSource> for SourceInfo {
    fn from(source: &RegisteredSource) -> Self {
        Self {
            id: source.id,
            name: source.name.clone(),
            source_type: source.connection.source_type,
            uri: source.connection.display_uri(),
            registered_at: source.registered_at,
        }
    }
}

/// Registered sources indexed by ID
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<Uuid, Arc<RegisteredSource>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, connection: SourceConnection) -> Arc<RegisteredSource> {
        let source = Arc::new(RegisteredSource {
            id: Uuid::new_v4(),
            name: name.into(),
            connection,
            registered_at: Utc::now(),
        });

        self.sources.write().await.insert(source.id, source.clone());
        info!(
            "📥 Registered {} source '{}' ({})",
            source.connection.source_type, source.name, source.id
        );
        source
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<RegisteredSource>> {
        self.sources.read().await.get(&id).cloned()
    }

    /// Like `get`, but an unknown ID is an error
    pub async fn require(&self, id: Uuid) -> Result<Arc<RegisteredSource>, ScanError> {
        self.get(id).await.ok_or(ScanError::UnknownSource(id))
    }

    /// Sources ordered by registration time
    pub async fn list(&self) -> Vec<SourceInfo> {
        let sources = self.sources.read().await;
        let mut list: Vec<SourceInfo> = sources.values().map(|s| SourceInfo::from(s.as_ref())).collect();
        list.sort_by_key(|s| s.registered_at);
        list
    }
}
