//! Schema Change Detection Module
//!
//! The heart of incremental scanning - deciding what is in scope and what
//! changed since the last successful scan.
//! This module provides:
//! - Scope filtering (include/exclude patterns per scan level)
//! - Change sets (the changed subtree of a snapshot)
//! - Diff engine (comparing a baseline with a fresh snapshot)
//! - Change summaries (capped, human-readable change lists)

pub mod changes;
pub mod diff;
pub mod scope;
pub mod summary;

pub use changes::ChangeSet;
pub use diff::DiffEngine;
pub use scope::{FilterStats, ScanLevel, ScopeFilter, ScopeRuleSet};
pub use summary::ChangeSummary;
