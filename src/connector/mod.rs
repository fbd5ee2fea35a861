//! Source Connectors
//!
//! Connectors are the only code that talks to a data source. Each one turns a
//! `SourceConnection` into a `MetadataSnapshot`; the scan engine never parses
//! connection strings or credentials itself.

pub mod file;
pub mod postgres;

use crate::error::ScanError;
use crate::metadata::{MetadataSnapshot, SnapshotShape};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use file::SnapshotFileConnector;
pub use postgres::PostgresConnector;

/// Kind of data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Postgres,
    Mysql,
    Mongodb,
    /// A snapshot exported to a JSON file by an external tool
    SnapshotFile,
}

impl SourceType {
    /// Expected tree shape, when the source type fixes it
    pub fn shape(&self) -> Option<SnapshotShape> {
        match self {
            SourceType::Postgres | SourceType::Mysql => Some(SnapshotShape::Relational),
            SourceType::Mongodb => Some(SnapshotShape::Document),
            SourceType::SnapshotFile => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::Postgres => "postgres",
            SourceType::Mysql => "mysql",
            SourceType::Mongodb => "mongodb",
            SourceType::SnapshotFile => "snapshot_file",
        };
        f.write_str(name)
    }
}

/// Where a source lives. Opaque to the engine; only connectors read `uri`.
#[derive(Clone)]
pub struct SourceConnection {
    pub source_type: SourceType,
    pub uri: String,
}

impl SourceConnection {
    pub fn new(source_type: SourceType, uri: impl Into<String>) -> Self {
        Self {
            source_type,
            uri: uri.into(),
        }
    }

    /// URI with any password masked, safe for logs and API responses
    pub fn display_uri(&self) -> String {
        match url::Url::parse(&self.uri) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => self.uri.clone(),
        }
    }
}

impl fmt::Debug for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnection")
            .field("source_type", &self.source_type)
            .field("uri", &self.display_uri())
            .finish()
    }
}

/// Extracts a structural snapshot from one kind of source
#[async_trait]
pub trait Connector: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Failures surface as `ScanError::Connection`
    async fn extract(&self, connection: &SourceConnection) -> Result<MetadataSnapshot, ScanError>;
}

/// Dispatches extraction to the connector registered for a source type
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<SourceType, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The connectors this service ships with
    pub fn with_defaults(pool_size: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresConnector::new(pool_size)));
        registry.register(Arc::new(SnapshotFileConnector));
        registry
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.source_type(), connector);
    }

    pub fn supports(&self, source_type: SourceType) -> bool {
        self.connectors.contains_key(&source_type)
    }

    pub async fn extract(&self, connection: &SourceConnection) -> Result<MetadataSnapshot, ScanError> {
        let connector = self.connectors.get(&connection.source_type).ok_or_else(|| {
            ScanError::UnsupportedShape(format!(
                "no connector registered for source type '{}'",
                connection.source_type
            ))
        })?;

        debug!("Extracting metadata from {}", connection.display_uri());
        let snapshot = connector.extract(connection).await?;

        if let Some(expected) = connection.source_type.shape() {
            if snapshot.shape() != expected {
                return Err(ScanError::UnsupportedShape(format!(
                    "{} source produced a {} snapshot",
                    connection.source_type,
                    snapshot.shape()
                )));
            }
        }

        Ok(snapshot)
    }
}
