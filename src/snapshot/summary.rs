//! Change Summary
//!
//! Flattens a change set into human-readable dotted paths, bucketed by
//! change type. Each bucket lists at most `MAX_SUMMARY_ITEMS` paths; anything
//! past that collapses into a single "... and N more" line.

use crate::snapshot::changes::{
    ChangeSet, ChangeType, CollectionChange, DocumentChangeSet, RelationalChangeSet, TableChange,
};
use serde::{Deserialize, Serialize};

pub const MAX_SUMMARY_ITEMS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBucket {
    pub count: usize,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: SummaryBucket,
    pub modified: SummaryBucket,
    pub deleted: SummaryBucket,
}

impl SummaryBucket {
    fn from_paths(paths: Vec<String>) -> Self {
        let count = paths.len();
        let mut items = paths;
        if count > MAX_SUMMARY_ITEMS {
            items.truncate(MAX_SUMMARY_ITEMS);
            items.push(format!("... and {} more", count - MAX_SUMMARY_ITEMS));
        }
        Self { count, items }
    }
}

/// Uncapped paths, collected in change set order
#[derive(Default)]
struct PathCollector {
    added: Vec<String>,
    modified: Vec<String>,
    deleted: Vec<String>,
}

impl PathCollector {
    fn push(&mut self, change_type: ChangeType, path: String) {
        match change_type {
            ChangeType::Added => self.added.push(path),
            ChangeType::Modified => self.modified.push(path),
            ChangeType::Deleted => self.deleted.push(path),
        }
    }

    fn finish(self) -> ChangeSummary {
        ChangeSummary {
            added: SummaryBucket::from_paths(self.added),
            modified: SummaryBucket::from_paths(self.modified),
            deleted: SummaryBucket::from_paths(self.deleted),
        }
    }
}

impl ChangeSummary {
    pub fn summarize(changes: &ChangeSet) -> Self {
        let mut paths = PathCollector::default();
        match changes {
            ChangeSet::Relational(changes) => Self::collect_relational(changes, &mut paths),
            ChangeSet::Document(changes) => Self::collect_document(changes, &mut paths),
        }
        paths.finish()
    }

    pub fn total(&self) -> usize {
        self.added.count + self.modified.count + self.deleted.count
    }

    fn collect_relational(changes: &RelationalChangeSet, paths: &mut PathCollector) {
        for (schema_name, schema) in &changes.schemas {
            if let Some(change_type) = schema.change_type {
                paths.push(change_type, format!("Schema: {}", schema_name));
                continue;
            }

            for (table_name, table) in &schema.tables {
                let table_path = format!("{}.{}", schema_name, table_name);
                Self::collect_table(&table_path, table, paths);
            }
        }
    }

    fn collect_table(table_path: &str, table: &TableChange, paths: &mut PathCollector) {
        if table.change_type == Some(ChangeType::Deleted) {
            paths.push(ChangeType::Deleted, format!("Table: {}", table_path));
            return;
        }

        // A table whose every column record is an addition is reported once
        let all_added = !table.columns.is_empty()
            && table.columns.values().all(|c| c.change_type == ChangeType::Added);

        if all_added {
            paths.push(ChangeType::Added, format!("Table: {}", table_path));
        } else {
            for (column_name, column) in &table.columns {
                paths.push(column.change_type, format!("Column: {}.{}", table_path, column_name));
            }
        }

        if table.row_count_changed() {
            paths.push(ChangeType::Modified, format!("Table: {}", table_path));
        }
    }

    fn collect_document(changes: &DocumentChangeSet, paths: &mut PathCollector) {
        for (database_name, database) in &changes.databases {
            if let Some(change_type) = database.change_type {
                paths.push(change_type, format!("Database: {}", database_name));
                continue;
            }

            for (collection_name, collection) in &database.collections {
                let collection_path = format!("{}.{}", database_name, collection_name);
                Self::collect_collection(&collection_path, collection, paths);
            }
        }
    }

    fn collect_collection(collection_path: &str, collection: &CollectionChange, paths: &mut PathCollector) {
        if collection.change_type == Some(ChangeType::Deleted) {
            paths.push(ChangeType::Deleted, format!("Collection: {}", collection_path));
            return;
        }

        let all_added = !collection.fields.is_empty()
            && collection.fields.values().all(|f| f.change_type == ChangeType::Added);

        if all_added {
            paths.push(ChangeType::Added, format!("Collection: {}", collection_path));
        } else {
            for (field_name, field) in &collection.fields {
                paths.push(field.change_type, format!("Field: {}.{}", collection_path, field_name));
            }
        }

        if collection.document_count_changed() {
            paths.push(ChangeType::Modified, format!("Collection: {}", collection_path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        Collection, Column, DocumentSnapshot, Field, MetadataSnapshot, RelationalSnapshot, Table,
    };
    use crate::snapshot::diff::DiffEngine;
    use pretty_assertions::assert_eq;

    fn relational(tables: Vec<(&str, Table)>) -> MetadataSnapshot {
        tables
            .into_iter()
            .fold(RelationalSnapshot::default(), |s, (name, table)| s.with_table("s", name, table))
            .into()
    }

    #[test]
    fn test_nullable_flip_reports_single_column() {
        let base = relational(vec![("t", Table::with_columns([("id", Column::typed("int", false))]))]);
        let current = relational(vec![("t", Table::with_columns([("id", Column::typed("int", true))]))]);

        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());

        assert_eq!(summary.modified.count, 1);
        assert_eq!(summary.modified.items, vec!["Column: s.t.id".to_string()]);
        assert_eq!(summary.added, SummaryBucket::default());
        assert_eq!(summary.deleted, SummaryBucket::default());
    }

    #[test]
    fn test_new_table_is_reported_once() {
        let base = relational(vec![]);
        let current = relational(vec![(
            "T",
            Table::with_columns([("a", Column::typed("int", false)), ("b", Column::typed("int", true))]),
        )]);

        // Base has no "s" schema, so the whole schema is new
        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());
        assert_eq!(summary.added.items, vec!["Schema: s".to_string()]);

        let base = relational(vec![("other", Table::default())]);
        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());
        assert_eq!(summary.added.items, vec!["Table: s.T".to_string()]);
        assert_eq!(summary.deleted.items, vec!["Table: s.other".to_string()]);
    }

    #[test]
    fn test_mixed_column_changes_listed_individually() {
        let base = relational(vec![(
            "t",
            Table::with_columns([("a", Column::typed("int", false)), ("b", Column::typed("int", false))]),
        )]);
        let current = relational(vec![(
            "t",
            Table::with_columns([("a", Column::typed("bigint", false)), ("c", Column::typed("int", true))]),
        )]);

        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());
        assert_eq!(summary.added.items, vec!["Column: s.t.c".to_string()]);
        assert_eq!(summary.modified.items, vec!["Column: s.t.a".to_string()]);
        assert_eq!(summary.deleted.items, vec!["Column: s.t.b".to_string()]);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_row_count_change_reported_as_modified_table() {
        let mut before = Table::default();
        before.row_count = Some(1);
        let mut after = Table::default();
        after.row_count = Some(2);

        let summary = ChangeSummary::summarize(
            &DiffEngine::diff(&relational(vec![("t", before)]), &relational(vec![("t", after)])).unwrap(),
        );
        assert_eq!(summary.modified.items, vec!["Table: s.t".to_string()]);
    }

    #[test]
    fn test_bucket_is_capped_with_trailer() {
        let base = relational(vec![("t", Table::with_columns([("keep", Column::typed("int", false))]))]);
        // The retyped column keeps the table from collapsing into "Table: s.t"
        let mut wide = Table::with_columns([("keep", Column::typed("bigint", false))]);
        for i in 0..150 {
            wide.columns.insert(format!("c{:03}", i), Column::typed("int", true));
        }
        let current = relational(vec![("t", wide)]);

        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());

        assert_eq!(summary.added.count, 150);
        assert_eq!(summary.added.items.len(), MAX_SUMMARY_ITEMS + 1);
        assert_eq!(summary.added.items[0], "Column: s.t.c000");
        assert_eq!(summary.added.items.last().unwrap(), "... and 50 more");
        assert_eq!(summary.modified.items, vec!["Column: s.t.keep".to_string()]);
    }

    #[test]
    fn test_bucket_at_exact_cap_has_no_trailer() {
        let paths: Vec<String> = (0..MAX_SUMMARY_ITEMS).map(|i| i.to_string()).collect();
        let bucket = SummaryBucket::from_paths(paths);
        assert_eq!(bucket.count, MAX_SUMMARY_ITEMS);
        assert_eq!(bucket.items.len(), MAX_SUMMARY_ITEMS);
    }

    #[test]
    fn test_document_summary_labels() {
        let base: MetadataSnapshot = DocumentSnapshot::default()
            .with_collection("app", "events", Collection::with_fields([("kind", Field::typed("string"))]))
            .with_collection("app", "old", Collection::default())
            .into();
        let current: MetadataSnapshot = DocumentSnapshot::default()
            .with_collection("app", "events", Collection::with_fields([("kind", Field::typed("int"))]))
            .with_collection(
                "app",
                "users",
                Collection::with_fields([("name", Field::typed("string"))]),
            )
            .with_collection("logs", "raw", Collection::default())
            .into();

        let summary = ChangeSummary::summarize(&DiffEngine::diff(&base, &current).unwrap());
        assert_eq!(
            summary.added.items,
            vec!["Collection: app.users".to_string(), "Database: logs".to_string()]
        );
        assert_eq!(summary.modified.items, vec!["Field: app.events.kind".to_string()]);
        assert_eq!(summary.deleted.items, vec!["Collection: app.old".to_string()]);
    }
}
