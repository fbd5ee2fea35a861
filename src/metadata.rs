//! Metadata Snapshot Model
//!
//! The point-in-time structure of a data source as handed over by a connector.
//! Two tree shapes exist:
//! - relational: schemas -> tables -> columns
//! - document: databases -> collections -> fields (fields may nest)
//!
//! Siblings are keyed by name, so a name is unique at every level and sibling
//! order never matters. `BTreeMap` keeps iteration (and serialized output)
//! deterministic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Which tree shape a snapshot (or change set) has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotShape {
    Relational,
    Document,
}

impl fmt::Display for SnapshotShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotShape::Relational => write!(f, "relational"),
            SnapshotShape::Document => write!(f, "document"),
        }
    }
}

/// Complete structural snapshot of one source
///
/// Serialized untagged: a relational snapshot is `{"schemas": {...}}`, a
/// document snapshot is `{"databases": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataSnapshot {
    Relational(RelationalSnapshot),
    Document(DocumentSnapshot),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalSnapshot {
    pub schemas: BTreeMap<String, Schema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub columns: BTreeMap<String, Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// Column attributes. Every attribute is optional: connectors only report
/// what their source exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_foreign_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_maximum_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub databases: BTreeMap<String, Database>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub collections: BTreeMap<String, Collection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_count: Option<i64>,
}

/// Document field. `name` is only needed inside `nested_fields`, where fields
/// are listed rather than keyed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_array: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nested: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_fields: Option<Vec<Field>>,
}

/// Node counts per level, used for logging and scan records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    /// Schemas or databases
    pub containers: usize,
    /// Tables or collections
    pub entities: usize,
    /// Columns or top-level fields
    pub leaves: usize,
}

impl MetadataSnapshot {
    pub fn shape(&self) -> SnapshotShape {
        match self {
            MetadataSnapshot::Relational(_) => SnapshotShape::Relational,
            MetadataSnapshot::Document(_) => SnapshotShape::Document,
        }
    }

    pub fn counts(&self) -> SnapshotCounts {
        match self {
            MetadataSnapshot::Relational(snapshot) => SnapshotCounts {
                containers: snapshot.schemas.len(),
                entities: snapshot.schemas.values().map(|s| s.tables.len()).sum(),
                leaves: snapshot
                    .schemas
                    .values()
                    .flat_map(|s| s.tables.values())
                    .map(|t| t.columns.len())
                    .sum(),
            },
            MetadataSnapshot::Document(snapshot) => SnapshotCounts {
                containers: snapshot.databases.len(),
                entities: snapshot.databases.values().map(|d| d.collections.len()).sum(),
                leaves: snapshot
                    .databases
                    .values()
                    .flat_map(|d| d.collections.values())
                    .map(|c| c.fields.len())
                    .sum(),
            },
        }
    }

    /// SHA-256 over the canonical JSON form (map keys are already sorted)
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(&bytes),
            // Plain data with string keys always serializes
            Err(_) => hasher.update(format!("{:?}", self).as_bytes()),
        }
        format!("{:x}", hasher.finalize())
    }
}

impl From<RelationalSnapshot> for MetadataSnapshot {
    fn from(snapshot: RelationalSnapshot) -> Self {
        MetadataSnapshot::Relational(snapshot)
    }
}

impl From<DocumentSnapshot> for MetadataSnapshot {
    fn from(snapshot: DocumentSnapshot) -> Self {
        MetadataSnapshot::Document(snapshot)
    }
}

#[cfg(test)]
impl RelationalSnapshot {
    /// Insert (or replace) a table, creating its schema on demand
    pub fn with_table(mut self, schema: &str, name: &str, table: Table) -> Self {
        self.schemas
            .entry(schema.to_string())
            .or_default()
            .tables
            .insert(name.to_string(), table);
        self
    }
}

#[cfg(test)]
impl Table {
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(|(n, c)| (n.into(), c)).collect(),
            row_count: None,
        }
    }
}

#[cfg(test)]
impl Column {
    pub fn typed(data_type: &str, is_nullable: bool) -> Self {
        Self {
            data_type: Some(data_type.to_string()),
            is_nullable: Some(is_nullable),
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl DocumentSnapshot {
    /// Insert (or replace) a collection, creating its database on demand
    pub fn with_collection(mut self, database: &str, name: &str, collection: Collection) -> Self {
        self.databases
            .entry(database.to_string())
            .or_default()
            .collections
            .insert(name.to_string(), collection);
        self
    }
}

#[cfg(test)]
impl Collection {
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Field)>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(n, f)| (n.into(), f)).collect(),
            document_count: None,
        }
    }
}

#[cfg(test)]
impl Field {
    pub fn typed(data_type: &str) -> Self {
        Self {
            data_type: Some(data_type.to_string()),
            ..Default::default()
        }
    }

    /// A named field for use inside `nested_fields`
    pub fn named(name: &str, data_type: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::typed(data_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> MetadataSnapshot {
        RelationalSnapshot::default()
            .with_table(
                "public",
                "users",
                Table::with_columns([
                    ("id", Column::typed("integer", false)),
                    ("email", Column::typed("text", true)),
                ]),
            )
            .with_table("public", "orders", Table::default())
            .into()
    }

    #[test]
    fn test_relational_json_round_trips_to_relational_shape() {
        let json = r#"{"schemas":{"s":{"tables":{"t":{"columns":{"id":{"data_type":"int","is_nullable":false}},"row_count":3}}}}}"#;
        let snapshot: MetadataSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.shape(), SnapshotShape::Relational);
        assert_eq!(serde_json::to_string(&snapshot).unwrap(), json);
    }

    #[test]
    fn test_document_json_parses_as_document_shape() {
        let json = r#"{"databases":{"app":{"collections":{"events":{"fields":{"payload":{"data_type":"object","is_nested":true,"nested_fields":[{"name":"kind","data_type":"string"}]}},"document_count":10}}}}}"#;
        let snapshot: MetadataSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.shape(), SnapshotShape::Document);
        let counts = snapshot.counts();
        assert_eq!(counts, SnapshotCounts { containers: 1, entities: 1, leaves: 1 });
    }

    #[test]
    fn test_counts() {
        assert_eq!(
            sample().counts(),
            SnapshotCounts { containers: 1, entities: 2, leaves: 2 }
        );
    }

    #[test]
    fn test_checksum_consistency() {
        assert_eq!(sample().checksum(), sample().checksum());

        let mut other = sample();
        if let MetadataSnapshot::Relational(ref mut s) = other {
            s.schemas.get_mut("public").unwrap().tables.get_mut("orders").unwrap().row_count = Some(1);
        }
        assert_ne!(sample().checksum(), other.checksum());
    }
}
