//! Scope Filter
//!
//! Include/exclude rules over fully-qualified dotted paths
//! (`schema.table.column` or `database.collection.field`).
//!
//! Matching is a regex *search* within the path, not a full-path match.
//! An empty include list admits everything; any exclude match wins.

use crate::error::ScanError;
use crate::metadata::{
    Collection, Database, DocumentSnapshot, MetadataSnapshot, RelationalSnapshot, Schema, Table,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deepest granularity evaluated by the filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanLevel {
    Source,
    Table,
    #[default]
    Column,
}

impl FromStr for ScanLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(ScanLevel::Source),
            "table" => Ok(ScanLevel::Table),
            "column" => Ok(ScanLevel::Column),
            other => Err(format!("unknown scan level '{}'", other)),
        }
    }
}

impl fmt::Display for ScanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLevel::Source => write!(f, "source"),
            ScanLevel::Table => write!(f, "table"),
            ScanLevel::Column => write!(f, "column"),
        }
    }
}

/// Rule set as supplied by callers (JSON-compatible)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRuleSet {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub scan_level: ScanLevel,
}

/// Kind of node an inclusion decision was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Schema,
    Table,
    Column,
    Database,
    Collection,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityScope {
    #[serde(rename = "type")]
    pub entity_type: EntityKind,
    pub name: String,
    pub included: bool,
}

/// Result of evaluating a whole snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
    pub entity_types: Vec<EntityScope>,
}

impl FilterStats {
    fn record(&mut self, entity_type: EntityKind, name: String, included: bool) {
        self.total += 1;
        if included {
            self.included += 1;
        } else {
            self.excluded += 1;
        }
        self.entity_types.push(EntityScope {
            entity_type,
            name,
            included,
        });
    }
}

/// A rule set with every pattern compiled
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    scan_level: ScanLevel,
}

impl ScopeFilter {
    /// Compile every pattern, or none: the first bad pattern rejects the set
    pub fn compile(rules: &ScopeRuleSet) -> Result<Self, ScanError> {
        Ok(Self {
            include: Self::compile_patterns(&rules.include_patterns)?,
            exclude: Self::compile_patterns(&rules.exclude_patterns)?,
            scan_level: rules.scan_level,
        })
    }

    /// A filter that admits every path
    pub fn allow_all(scan_level: ScanLevel) -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            scan_level,
        }
    }

    fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ScanError> {
        patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ScanError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }

    pub fn scan_level(&self) -> ScanLevel {
        self.scan_level
    }

    pub fn is_included(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(path));
        included && !self.exclude.iter().any(|re| re.is_match(path))
    }

    /// Evaluate every node down to the scan level.
    ///
    /// Each level is judged on its own path: a table is evaluated (and may be
    /// included) even when its schema was excluded.
    pub fn apply(&self, snapshot: &MetadataSnapshot) -> FilterStats {
        let mut stats = FilterStats::default();
        match snapshot {
            MetadataSnapshot::Relational(snapshot) => self.apply_relational(snapshot, &mut stats),
            MetadataSnapshot::Document(snapshot) => self.apply_document(snapshot, &mut stats),
        }
        stats
    }

    fn apply_relational(&self, snapshot: &RelationalSnapshot, stats: &mut FilterStats) {
        for (schema_name, schema) in &snapshot.schemas {
            stats.record(EntityKind::Schema, schema_name.clone(), self.is_included(schema_name));
            if self.scan_level < ScanLevel::Table {
                continue;
            }

            for (table_name, table) in &schema.tables {
                let table_path = format!("{}.{}", schema_name, table_name);
                stats.record(EntityKind::Table, table_path.clone(), self.is_included(&table_path));
                if self.scan_level < ScanLevel::Column {
                    continue;
                }

                for column_name in table.columns.keys() {
                    let column_path = format!("{}.{}", table_path, column_name);
                    let included = self.is_included(&column_path);
                    stats.record(EntityKind::Column, column_path, included);
                }
            }
        }
    }

    fn apply_document(&self, snapshot: &DocumentSnapshot, stats: &mut FilterStats) {
        for (database_name, database) in &snapshot.databases {
            stats.record(EntityKind::Database, database_name.clone(), self.is_included(database_name));
            if self.scan_level < ScanLevel::Table {
                continue;
            }

            for (collection_name, collection) in &database.collections {
                let collection_path = format!("{}.{}", database_name, collection_name);
                stats.record(
                    EntityKind::Collection,
                    collection_path.clone(),
                    self.is_included(&collection_path),
                );
                if self.scan_level < ScanLevel::Column {
                    continue;
                }

                for field_name in collection.fields.keys() {
                    let field_path = format!("{}.{}", collection_path, field_name);
                    let included = self.is_included(&field_path);
                    stats.record(EntityKind::Field, field_path, included);
                }
            }
        }
    }

    /// Copy of the snapshot with out-of-scope nodes removed.
    ///
    /// Removing a node removes its subtree. Levels below the scan level are
    /// kept as they are.
    pub fn retain(&self, snapshot: &MetadataSnapshot) -> MetadataSnapshot {
        match snapshot {
            MetadataSnapshot::Relational(snapshot) => {
                MetadataSnapshot::Relational(RelationalSnapshot {
                    schemas: snapshot
                        .schemas
                        .iter()
                        .filter(|(name, _)| self.is_included(name))
                        .map(|(name, schema)| (name.clone(), self.retain_schema(name, schema)))
                        .collect(),
                })
            }
            MetadataSnapshot::Document(snapshot) => MetadataSnapshot::Document(DocumentSnapshot {
                databases: snapshot
                    .databases
                    .iter()
                    .filter(|(name, _)| self.is_included(name))
                    .map(|(name, database)| (name.clone(), self.retain_database(name, database)))
                    .collect(),
            }),
        }
    }

    fn retain_schema(&self, schema_name: &str, schema: &Schema) -> Schema {
        if self.scan_level < ScanLevel::Table {
            return schema.clone();
        }

        let tables = schema
            .tables
            .iter()
            .filter_map(|(table_name, table)| {
                let table_path = format!("{}.{}", schema_name, table_name);
                self.is_included(&table_path)
                    .then(|| (table_name.clone(), self.retain_table(&table_path, table)))
            })
            .collect();

        Schema { tables }
    }

    fn retain_table(&self, table_path: &str, table: &Table) -> Table {
        if self.scan_level < ScanLevel::Column {
            return table.clone();
        }

        Table {
            columns: table
                .columns
                .iter()
                .filter(|(name, _)| self.is_included(&format!("{}.{}", table_path, name)))
                .map(|(name, column)| (name.clone(), column.clone()))
                .collect(),
            row_count: table.row_count,
        }
    }

    fn retain_database(&self, database_name: &str, database: &Database) -> Database {
        if self.scan_level < ScanLevel::Table {
            return database.clone();
        }

        let collections = database
            .collections
            .iter()
            .filter_map(|(collection_name, collection)| {
                let collection_path = format!("{}.{}", database_name, collection_name);
                self.is_included(&collection_path).then(|| {
                    (
                        collection_name.clone(),
                        self.retain_collection(&collection_path, collection),
                    )
                })
            })
            .collect();

        Database { collections }
    }

    fn retain_collection(&self, collection_path: &str, collection: &Collection) -> Collection {
        if self.scan_level < ScanLevel::Column {
            return collection.clone();
        }

        Collection {
            fields: collection
                .fields
                .iter()
                .filter(|(name, _)| self.is_included(&format!("{}.{}", collection_path, name)))
                .map(|(name, field)| (name.clone(), field.clone()))
                .collect(),
            document_count: collection.document_count,
        }
    }
}
