//! Incremental Scan Pipeline
//!
//! Everything between "scan this source" and a persisted scan record:
//!
//! 1. **Baseline**: find the last completed snapshot for the source
//! 2. **Extract**: pull a fresh snapshot through the source's connector
//! 3. **Scope**: apply include/exclude rules at the requested level
//! 4. **Diff**: compare against the baseline and summarize
//! 5. **Persist**: write exactly one record, completed or failed

pub mod orchestrator;
pub mod postgres_store;
pub mod store;
pub mod types;

// Re-export main types for convenient access
pub use orchestrator::ScanOrchestrator;
pub use postgres_store::PostgresScanStore;
pub use store::{InMemoryScanStore, ScanStore};
pub use types::{InFlightScan, ScanRecord};
