//! Change Set Types
//!
//! A change set mirrors the snapshot tree but keeps only nodes that changed,
//! plus the unchanged ancestors needed to reach them. A node without a
//! `change_type` is such an ancestor.

use crate::metadata::{Collection, Column, Field, Schema, SnapshotShape, Table, Database};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Classification of a changed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeSet {
    Relational(RelationalChangeSet),
    Document(DocumentChangeSet),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalChangeSet {
    pub schemas: BTreeMap<String, SchemaChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TableChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableChange {
    #[serde(default)]
    pub change_type: Option<ChangeType>,
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub previous_row_count: Option<i64>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnChange>,
}

#[derive(Serialize)]
struct TableChangeWire<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    change_type: Option<ChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<&'a BTreeMap<String, ColumnChange>>,
}

/// A deleted table is a bare marker; any other table lists its columns,
/// even when none of them changed.
impl Serialize for TableChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TableChangeWire {
            change_type: self.change_type,
            row_count: self.row_count,
            previous_row_count: self.previous_row_count,
            columns: (self.change_type != Some(ChangeType::Deleted)).then_some(&self.columns),
        }
        .serialize(serializer)
    }
}

/// A changed column. Added and modified columns carry their current
/// attributes; deleted columns carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub change_type: ChangeType,
    #[serde(flatten)]
    pub column: Column,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentChangeSet {
    pub databases: BTreeMap<String, DatabaseChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, CollectionChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CollectionChange {
    #[serde(default)]
    pub change_type: Option<ChangeType>,
    #[serde(default)]
    pub document_count: Option<i64>,
    #[serde(default)]
    pub previous_document_count: Option<i64>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldChange>,
}

#[derive(Serialize)]
struct CollectionChangeWire<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    change_type: Option<ChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_document_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a BTreeMap<String, FieldChange>>,
}

impl Serialize for CollectionChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CollectionChangeWire {
            change_type: self.change_type,
            document_count: self.document_count,
            previous_document_count: self.previous_document_count,
            fields: (self.change_type != Some(ChangeType::Deleted)).then_some(&self.fields),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub change_type: ChangeType,
    #[serde(flatten)]
    pub field: Field,
}

impl ChangeSet {
    /// A change set with nothing in it
    pub fn empty(shape: SnapshotShape) -> Self {
        match shape {
            SnapshotShape::Relational => ChangeSet::Relational(RelationalChangeSet::default()),
            SnapshotShape::Document => ChangeSet::Document(DocumentChangeSet::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChangeSet::Relational(changes) => changes.schemas.is_empty(),
            ChangeSet::Document(changes) => changes.databases.is_empty(),
        }
    }
}

// Whole-subtree constructors: every descendant of an added node is added too.

impl SchemaChange {
    pub fn added(schema: &Schema) -> Self {
        Self {
            change_type: Some(ChangeType::Added),
            tables: schema
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), TableChange::added(table)))
                .collect(),
        }
    }

    pub fn deleted() -> Self {
        Self {
            change_type: Some(ChangeType::Deleted),
            tables: BTreeMap::new(),
        }
    }
}

impl TableChange {
    pub fn added(table: &Table) -> Self {
        Self {
            change_type: Some(ChangeType::Added),
            row_count: table.row_count,
            previous_row_count: None,
            columns: table
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), ColumnChange::new(ChangeType::Added, column.clone())))
                .collect(),
        }
    }

    pub fn deleted() -> Self {
        Self {
            change_type: Some(ChangeType::Deleted),
            ..Default::default()
        }
    }

    pub fn row_count_changed(&self) -> bool {
        self.change_type == Some(ChangeType::Modified)
    }
}

impl ColumnChange {
    pub fn new(change_type: ChangeType, column: Column) -> Self {
        Self { change_type, column }
    }

    pub fn deleted() -> Self {
        Self::new(ChangeType::Deleted, Column::default())
    }
}

impl DatabaseChange {
    pub fn added(database: &Database) -> Self {
        Self {
            change_type: Some(ChangeType::Added),
            collections: database
                .collections
                .iter()
                .map(|(name, collection)| (name.clone(), CollectionChange::added(collection)))
                .collect(),
        }
    }

    pub fn deleted() -> Self {
        Self {
            change_type: Some(ChangeType::Deleted),
            collections: BTreeMap::new(),
        }
    }
}

impl CollectionChange {
    pub fn added(collection: &Collection) -> Self {
        Self {
            change_type: Some(ChangeType::Added),
            document_count: collection.document_count,
            previous_document_count: None,
            fields: collection
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), FieldChange::new(ChangeType::Added, field.clone())))
                .collect(),
        }
    }

    pub fn deleted() -> Self {
        Self {
            change_type: Some(ChangeType::Deleted),
            ..Default::default()
        }
    }

    pub fn document_count_changed(&self) -> bool {
        self.change_type == Some(ChangeType::Modified)
    }
}

impl FieldChange {
    pub fn new(change_type: ChangeType, field: Field) -> Self {
        Self { change_type, field }
    }

    pub fn deleted() -> Self {
        Self::new(ChangeType::Deleted, Field::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deleted_nodes_serialize_as_bare_markers() {
        let mut tables = BTreeMap::new();
        let mut table = TableChange::default();
        table.columns.insert("legacy".to_string(), ColumnChange::deleted());
        tables.insert("users".to_string(), table);
        tables.insert("old".to_string(), TableChange::deleted());

        let changes = ChangeSet::Relational(RelationalChangeSet {
            schemas: BTreeMap::from([("public".to_string(), SchemaChange { change_type: None, tables })]),
        });

        assert_eq!(
            serde_json::to_string(&changes).unwrap(),
            r#"{"schemas":{"public":{"tables":{"old":{"change_type":"deleted"},"users":{"columns":{"legacy":{"change_type":"deleted"}}}}}}}"#
        );
    }

    #[test]
    fn test_count_only_changes_keep_empty_children() {
        let table = TableChange {
            change_type: Some(ChangeType::Modified),
            row_count: Some(12),
            previous_row_count: Some(10),
            columns: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            serde_json::json!({"change_type": "modified", "row_count": 12, "previous_row_count": 10, "columns": {}})
        );

        let collection = CollectionChange {
            change_type: Some(ChangeType::Modified),
            document_count: Some(7),
            previous_document_count: Some(5),
            fields: BTreeMap::new(),
        };
        assert_eq!(serde_json::to_value(&collection).unwrap()["fields"], serde_json::json!({}));
        assert_eq!(
            serde_json::to_value(CollectionChange::deleted()).unwrap(),
            serde_json::json!({"change_type": "deleted"})
        );
    }

    #[test]
    fn test_added_table_marks_every_column_added() {
        let table = Table::with_columns([
            ("a", Column::typed("int", false)),
            ("b", Column::typed("text", true)),
        ]);
        let change = TableChange::added(&table);

        assert_eq!(change.change_type, Some(ChangeType::Added));
        assert!(change.columns.values().all(|c| c.change_type == ChangeType::Added));
        assert_eq!(change.columns["b"].column, Column::typed("text", true));
    }

    #[test]
    fn test_change_set_deserializes_by_shape() {
        let json = r#"{"databases":{"app":{"change_type":"deleted"}}}"#;
        let changes: ChangeSet = serde_json::from_str(json).unwrap();
        assert!(matches!(changes, ChangeSet::Document(_)));
        assert!(!changes.is_empty());
        assert!(ChangeSet::empty(SnapshotShape::Relational).is_empty());
    }
}
