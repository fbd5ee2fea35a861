//! Snapshot file connector
//!
//! Loads a snapshot that an external exporter wrote as JSON. Useful for
//! sources without a native connector and for replaying captured metadata.

use super::{Connector, SourceConnection, SourceType};
use crate::error::ScanError;
use crate::metadata::MetadataSnapshot;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

pub struct SnapshotFileConnector;

impl SnapshotFileConnector {
    fn path_of(uri: &str) -> &Path {
        Path::new(uri.strip_prefix("file://").unwrap_or(uri))
    }
}

#[async_trait]
impl Connector for SnapshotFileConnector {
    fn source_type(&self) -> SourceType {
        SourceType::SnapshotFile
    }

    async fn extract(&self, connection: &SourceConnection) -> Result<MetadataSnapshot, ScanError> {
        let path = Self::path_of(&connection.uri);

        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScanError::Connection(format!("Failed to read snapshot file {}: {}", path.display(), e))
        })?;

        let snapshot: MetadataSnapshot = serde_json::from_str(&contents).map_err(|e| {
            ScanError::Connection(format!("Malformed snapshot file {}: {}", path.display(), e))
        })?;

        debug!("Loaded {} snapshot from {}", snapshot.shape(), path.display());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SnapshotShape;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_loads_document_snapshot() {
        let path = temp_file(
            "doc",
            r#"{"databases": {"app": {"collections": {"users": {"fields": {"email": {"data_type": "string"}}, "document_count": 12}}}}}"#,
        );
        let conn = SourceConnection::new(SourceType::SnapshotFile, format!("file://{}", path.display()));

        let snapshot = SnapshotFileConnector.extract(&conn).await.unwrap();
        assert_eq!(snapshot.shape(), SnapshotShape::Document);
        assert_eq!(snapshot.counts().leaves, 1);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let conn = SourceConnection::new(SourceType::SnapshotFile, "/definitely/not/here.json");
        let err = SnapshotFileConnector.extract(&conn).await.unwrap_err();
        assert!(matches!(err, ScanError::Connection(_)));
    }

    #[tokio::test]
    async fn test_malformed_file_is_connection_error() {
        let path = temp_file("bad", r#"{"tables": []}"#);
        let conn = SourceConnection::new(SourceType::SnapshotFile, path.display().to_string());

        let err = SnapshotFileConnector.extract(&conn).await.unwrap_err();
        assert!(err.to_string().contains("Malformed snapshot file"));

        std::fs::remove_file(path).ok();
    }
}
