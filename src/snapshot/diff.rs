//! Schema Diff Engine
//!
//! Compares a baseline snapshot with a current one and keeps only what
//! changed. The engine is pure: no clock, no randomness, no I/O, so the same
//! two inputs always give the same change set and `diff(s, s)` is empty.

use crate::error::ScanError;
use crate::metadata::{
    Collection, Column, Database, DocumentSnapshot, Field, MetadataSnapshot, RelationalSnapshot,
    Schema, Table,
};
use crate::snapshot::changes::{
    ChangeSet, ChangeType, CollectionChange, ColumnChange, DatabaseChange, DocumentChangeSet,
    FieldChange, RelationalChangeSet, SchemaChange, TableChange,
};
use std::collections::{BTreeMap, BTreeSet};

/// How a name lines up across the two sides of a diff
enum Pairing<'a, T> {
    Added(&'a T),
    Deleted,
    Both(&'a T, &'a T),
}

/// Walk the union of sibling names in sorted order
fn pair_up<'a, T>(
    base: &'a BTreeMap<String, T>,
    current: &'a BTreeMap<String, T>,
) -> impl Iterator<Item = (&'a String, Pairing<'a, T>)> {
    let names: BTreeSet<&'a String> = base.keys().chain(current.keys()).collect();
    names.into_iter().filter_map(move |name| {
        let pairing = match (base.get(name), current.get(name)) {
            (None, Some(added)) => Pairing::Added(added),
            (Some(_), None) => Pairing::Deleted,
            (Some(before), Some(after)) => Pairing::Both(before, after),
            (None, None) => return None,
        };
        Some((name, pairing))
    })
}

/// The diff engine that compares metadata snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two snapshots of the same shape
    pub fn diff(base: &MetadataSnapshot, current: &MetadataSnapshot) -> Result<ChangeSet, ScanError> {
        match (base, current) {
            (MetadataSnapshot::Relational(base), MetadataSnapshot::Relational(current)) => {
                Ok(ChangeSet::Relational(Self::diff_relational(base, current)))
            }
            (MetadataSnapshot::Document(base), MetadataSnapshot::Document(current)) => {
                Ok(ChangeSet::Document(Self::diff_document(base, current)))
            }
            _ => Err(ScanError::UnsupportedShape(format!(
                "cannot diff a {} baseline against a {} snapshot",
                base.shape(),
                current.shape()
            ))),
        }
    }

    // ==================== Relational ====================

    fn diff_relational(base: &RelationalSnapshot, current: &RelationalSnapshot) -> RelationalChangeSet {
        let mut schemas = BTreeMap::new();

        for (name, pairing) in pair_up(&base.schemas, &current.schemas) {
            let change = match pairing {
                Pairing::Added(schema) => Some(SchemaChange::added(schema)),
                Pairing::Deleted => Some(SchemaChange::deleted()),
                Pairing::Both(before, after) => Self::diff_schema(before, after),
            };
            if let Some(change) = change {
                schemas.insert(name.clone(), change);
            }
        }

        RelationalChangeSet { schemas }
    }

    fn diff_schema(before: &Schema, after: &Schema) -> Option<SchemaChange> {
        let mut tables = BTreeMap::new();

        for (name, pairing) in pair_up(&before.tables, &after.tables) {
            let change = match pairing {
                Pairing::Added(table) => Some(TableChange::added(table)),
                Pairing::Deleted => Some(TableChange::deleted()),
                Pairing::Both(before, after) => Self::diff_table(before, after),
            };
            if let Some(change) = change {
                tables.insert(name.clone(), change);
            }
        }

        (!tables.is_empty()).then(|| SchemaChange {
            change_type: None,
            tables,
        })
    }

    /// A table shows up when its columns changed, its row count changed, or
    /// both. Only a row count change makes the table itself `modified`.
    fn diff_table(before: &Table, after: &Table) -> Option<TableChange> {
        let mut columns = BTreeMap::new();

        for (name, pairing) in pair_up(&before.columns, &after.columns) {
            let change = match pairing {
                Pairing::Added(column) => Some(ColumnChange::new(ChangeType::Added, column.clone())),
                Pairing::Deleted => Some(ColumnChange::deleted()),
                Pairing::Both(before, after) => Self::has_column_changed(before, after)
                    .then(|| ColumnChange::new(ChangeType::Modified, after.clone())),
            };
            if let Some(change) = change {
                columns.insert(name.clone(), change);
            }
        }

        let row_count_changed = before.row_count != after.row_count;
        if columns.is_empty() && !row_count_changed {
            return None;
        }

        Some(if row_count_changed {
            TableChange {
                change_type: Some(ChangeType::Modified),
                row_count: after.row_count,
                previous_row_count: before.row_count,
                columns,
            }
        } else {
            TableChange {
                columns,
                ..Default::default()
            }
        })
    }

    /// Any compared attribute that differs between the two sides
    pub fn has_column_changed(before: &Column, after: &Column) -> bool {
        before.data_type != after.data_type
            || before.is_nullable != after.is_nullable
            || before.is_primary_key != after.is_primary_key
            || before.is_foreign_key != after.is_foreign_key
            || before.character_maximum_length != after.character_maximum_length
            || before.numeric_precision != after.numeric_precision
            || before.numeric_scale != after.numeric_scale
    }

    // ==================== Document ====================

    fn diff_document(base: &DocumentSnapshot, current: &DocumentSnapshot) -> DocumentChangeSet {
        let mut databases = BTreeMap::new();

        for (name, pairing) in pair_up(&base.databases, &current.databases) {
            let change = match pairing {
                Pairing::Added(database) => Some(DatabaseChange::added(database)),
                Pairing::Deleted => Some(DatabaseChange::deleted()),
                Pairing::Both(before, after) => Self::diff_database(before, after),
            };
            if let Some(change) = change {
                databases.insert(name.clone(), change);
            }
        }

        DocumentChangeSet { databases }
    }

    fn diff_database(before: &Database, after: &Database) -> Option<DatabaseChange> {
        let mut collections = BTreeMap::new();

        for (name, pairing) in pair_up(&before.collections, &after.collections) {
            let change = match pairing {
                Pairing::Added(collection) => Some(CollectionChange::added(collection)),
                Pairing::Deleted => Some(CollectionChange::deleted()),
                Pairing::Both(before, after) => Self::diff_collection(before, after),
            };
            if let Some(change) = change {
                collections.insert(name.clone(), change);
            }
        }

        (!collections.is_empty()).then(|| DatabaseChange {
            change_type: None,
            collections,
        })
    }

    fn diff_collection(before: &Collection, after: &Collection) -> Option<CollectionChange> {
        let mut fields = BTreeMap::new();

        for (name, pairing) in pair_up(&before.fields, &after.fields) {
            let change = match pairing {
                Pairing::Added(field) => Some(FieldChange::new(ChangeType::Added, field.clone())),
                Pairing::Deleted => Some(FieldChange::deleted()),
                Pairing::Both(before, after) => Self::has_field_changed(before, after)
                    .then(|| FieldChange::new(ChangeType::Modified, after.clone())),
            };
            if let Some(change) = change {
                fields.insert(name.clone(), change);
            }
        }

        let count_changed = before.document_count != after.document_count;
        if fields.is_empty() && !count_changed {
            return None;
        }

        Some(if count_changed {
            CollectionChange {
                change_type: Some(ChangeType::Modified),
                document_count: after.document_count,
                previous_document_count: before.document_count,
                fields,
            }
        } else {
            CollectionChange {
                fields,
                ..Default::default()
            }
        })
    }

    /// Scalar attributes first, then the nested field lists by structure
    pub fn has_field_changed(before: &Field, after: &Field) -> bool {
        before.data_type != after.data_type
            || before.is_array != after.is_array
            || before.is_nested != after.is_nested
            || Self::nested_fields_changed(
                before.nested_fields.as_deref().unwrap_or_default(),
                after.nested_fields.as_deref().unwrap_or_default(),
            )
    }

    /// Name sets must match, then every pair is compared recursively.
    /// A missing list and an empty list are the same thing.
    fn nested_fields_changed(before: &[Field], after: &[Field]) -> bool {
        let before = Self::index_by_name(before);
        let after = Self::index_by_name(after);

        if !before.keys().eq(after.keys()) {
            return true;
        }

        before.iter().any(|(name, field)| match after.get(name) {
            Some(other) => Self::has_field_changed(field, other),
            None => true,
        })
    }

    fn index_by_name(fields: &[Field]) -> BTreeMap<&str, &Field> {
        fields
            .iter()
            .map(|f| (f.name.as_deref().unwrap_or_default(), f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id_column(nullable: bool) -> Column {
        Column {
            data_type: Some("integer".to_string()),
            is_nullable: Some(nullable),
            is_primary_key: Some(true),
            ..Default::default()
        }
    }

    fn relational(tables: Vec<(&str, &str, Table)>) -> MetadataSnapshot {
        tables
            .into_iter()
            .fold(RelationalSnapshot::default(), |s, (schema, name, table)| {
                s.with_table(schema, name, table)
            })
            .into()
    }

    fn relational_changes(changes: ChangeSet) -> RelationalChangeSet {
        match changes {
            ChangeSet::Relational(changes) => changes,
            other => panic!("expected relational change set, got {:?}", other),
        }
    }

    fn document_changes(changes: ChangeSet) -> DocumentChangeSet {
        match changes {
            ChangeSet::Document(changes) => changes,
            other => panic!("expected document change set, got {:?}", other),
        }
    }

    fn events(fields: Vec<(&str, Field)>, count: Option<i64>) -> MetadataSnapshot {
        let mut collection = Collection::with_fields(fields);
        collection.document_count = count;
        DocumentSnapshot::default()
            .with_collection("app", "events", collection)
            .into()
    }

    #[test]
    fn test_identical_snapshots_yield_empty_change_set() {
        let snapshot = relational(vec![
            ("s", "t", Table::with_columns([("id", id_column(false))])),
            ("s", "u", Table::default()),
        ]);
        assert!(DiffEngine::diff(&snapshot, &snapshot).unwrap().is_empty());

        let document = events(vec![("kind", Field::typed("string"))], Some(4));
        assert!(DiffEngine::diff(&document, &document).unwrap().is_empty());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let base = relational(vec![("s", "t", Table::with_columns([("id", id_column(false))]))]);
        let current = relational(vec![
            ("s", "t", Table::with_columns([("id", id_column(true))])),
            ("s", "new", Table::with_columns([("a", id_column(true))])),
            ("x", "y", Table::default()),
        ]);

        let first = serde_json::to_vec(&DiffEngine::diff(&base, &current).unwrap()).unwrap();
        let second = serde_json::to_vec(&DiffEngine::diff(&base, &current).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_nullable_flip_is_one_modified_column() {
        let base = relational(vec![("s", "t", Table::with_columns([("id", id_column(false))]))]);
        let current = relational(vec![("s", "t", Table::with_columns([("id", id_column(true))]))]);

        let changes = relational_changes(DiffEngine::diff(&base, &current).unwrap());
        let table = &changes.schemas["s"].tables["t"];

        assert_eq!(changes.schemas["s"].change_type, None);
        assert_eq!(table.change_type, None);
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.columns["id"], ColumnChange::new(ChangeType::Modified, id_column(true)));
    }

    #[test]
    fn test_added_table_is_added_with_its_columns() {
        let base = relational(vec![("s", "orders", Table::default())]);
        let current = relational(vec![
            ("s", "orders", Table::default()),
            (
                "s",
                "T",
                Table::with_columns([("a", id_column(false)), ("b", id_column(true))]),
            ),
        ]);

        let changes = relational_changes(DiffEngine::diff(&base, &current).unwrap());
        let tables = &changes.schemas["s"].tables;

        assert_eq!(tables.len(), 1);
        assert_eq!(tables["T"].change_type, Some(ChangeType::Added));
        assert_eq!(tables["T"].columns.len(), 2);
    }

    #[test]
    fn test_row_count_only_change_keeps_table_with_no_columns() {
        let mut before = Table::with_columns([("id", id_column(false))]);
        before.row_count = Some(10);
        let mut after = before.clone();
        after.row_count = Some(12);

        let changes = relational_changes(
            DiffEngine::diff(&relational(vec![("s", "t", before)]), &relational(vec![("s", "t", after)]))
                .unwrap(),
        );
        let table = &changes.schemas["s"].tables["t"];

        assert_eq!(table.change_type, Some(ChangeType::Modified));
        assert_eq!(table.row_count, Some(12));
        assert_eq!(table.previous_row_count, Some(10));
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_deleted_schema_is_a_leaf_marker() {
        let base = relational(vec![("gone", "t", Table::with_columns([("id", id_column(false))]))]);
        let current = MetadataSnapshot::Relational(RelationalSnapshot::default());

        let changes = relational_changes(DiffEngine::diff(&base, &current).unwrap());
        assert_eq!(changes.schemas["gone"], SchemaChange::deleted());
        assert!(changes.schemas["gone"].tables.is_empty());
    }

    #[test]
    fn test_added_schema_marks_whole_subtree() {
        let base = MetadataSnapshot::Relational(RelationalSnapshot::default());
        let current = relational(vec![("fresh", "t", Table::with_columns([("id", id_column(false))]))]);

        let changes = relational_changes(DiffEngine::diff(&base, &current).unwrap());
        let schema = &changes.schemas["fresh"];
        assert_eq!(schema.change_type, Some(ChangeType::Added));
        assert_eq!(schema.tables["t"].change_type, Some(ChangeType::Added));
        assert_eq!(schema.tables["t"].columns["id"].change_type, ChangeType::Added);
    }

    #[test]
    fn test_columns_without_attributes_are_unchanged() {
        assert!(!DiffEngine::has_column_changed(&Column::default(), &Column::default()));

        let with_scale = Column {
            numeric_scale: Some(2),
            ..Default::default()
        };
        assert!(DiffEngine::has_column_changed(&Column::default(), &with_scale));
    }

    #[test]
    fn test_shape_mismatch_is_unsupported() {
        let relational = MetadataSnapshot::Relational(RelationalSnapshot::default());
        let document = MetadataSnapshot::Document(DocumentSnapshot::default());

        let err = DiffEngine::diff(&relational, &document).unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedShape(_)));
    }

    #[test]
    fn test_nested_field_addition_modifies_parent() {
        let nested = |children: Vec<Field>| Field {
            data_type: Some("object".to_string()),
            is_nested: Some(true),
            nested_fields: Some(children),
            ..Default::default()
        };
        let base = events(vec![("payload", nested(vec![Field::named("kind", "string")]))], None);
        let current = events(
            vec![(
                "payload",
                nested(vec![Field::named("kind", "string"), Field::named("at", "date")]),
            )],
            None,
        );

        let changes = document_changes(DiffEngine::diff(&base, &current).unwrap());
        let fields = &changes.databases["app"].collections["events"].fields;
        assert_eq!(fields["payload"].change_type, ChangeType::Modified);
    }

    #[test]
    fn test_deep_nested_type_change_is_detected() {
        let tree = |leaf_type: &str| Field {
            is_nested: Some(true),
            nested_fields: Some(vec![Field {
                name: Some("inner".to_string()),
                is_nested: Some(true),
                nested_fields: Some(vec![Field::named("leaf", leaf_type)]),
                ..Default::default()
            }]),
            ..Default::default()
        };

        assert!(!DiffEngine::has_field_changed(&tree("int"), &tree("int")));
        assert!(DiffEngine::has_field_changed(&tree("int"), &tree("string")));
    }

    #[test]
    fn test_nested_field_order_is_irrelevant() {
        let with = |fields: Vec<Field>| Field {
            nested_fields: Some(fields),
            ..Default::default()
        };
        let a = with(vec![Field::named("x", "int"), Field::named("y", "int")]);
        let b = with(vec![Field::named("y", "int"), Field::named("x", "int")]);
        assert!(!DiffEngine::has_field_changed(&a, &b));

        let empty = with(vec![]);
        assert!(!DiffEngine::has_field_changed(&empty, &Field::default()));
    }

    #[test]
    fn test_document_count_change_records_previous() {
        let base = events(vec![("kind", Field::typed("string"))], Some(5));
        let current = events(vec![("kind", Field::typed("string"))], Some(7));

        let changes = document_changes(DiffEngine::diff(&base, &current).unwrap());
        let collection = &changes.databases["app"].collections["events"];
        assert_eq!(collection.change_type, Some(ChangeType::Modified));
        assert_eq!(collection.document_count, Some(7));
        assert_eq!(collection.previous_document_count, Some(5));
        assert!(collection.fields.is_empty());
    }
}
