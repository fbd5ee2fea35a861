//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::ScanConfig;
use crate::connector::ConnectorRegistry;
use crate::pipeline::{ScanOrchestrator, ScanStore};
use crate::sources::SourceRegistry;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Data sources that can be scanned
    pub sources: SourceRegistry,

    /// Runs scans and owns the scan store
    pub orchestrator: ScanOrchestrator,

    pub scan_config: ScanConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn ScanStore>, connectors: ConnectorRegistry, scan_config: ScanConfig) -> Self {
        Self {
            sources: SourceRegistry::new(),
            orchestrator: ScanOrchestrator::new(store, connectors, scan_config.default_scan_level),
            scan_config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        self.orchestrator.store()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
