//! SchemaFlow Scanner - Incremental metadata scanning
//!
//! Registers data sources, extracts their structural metadata and compares
//! each scan with the previous one:
//! - Scope rules decide which schemas, tables and columns a scan considers
//! - The diff engine turns two snapshots into a change set and summary
//! - The orchestrator keeps one baseline chain per source
//!
//! Scan records go to PostgreSQL when DATABASE_URL is set and stay in
//! memory otherwise.

mod config;
mod connector;
mod db;
mod error;
mod metadata;
mod models;
mod pipeline;
mod routes;
mod snapshot;
mod sources;
mod state;

use crate::config::Settings;
use crate::connector::ConnectorRegistry;
use crate::pipeline::{InMemoryScanStore, PostgresScanStore, ScanStore};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SchemaFlow Scanner...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let store: Arc<dyn ScanStore> = match &settings.database {
        Some(database) => {
            let pool = db::init_pool(database).await?;
            let store = PostgresScanStore::new(pool);
            store.ensure_schema().await?;
            info!("✅ Scan records stored in PostgreSQL");
            Arc::new(store)
        }
        None => {
            warn!("⚠️  DATABASE_URL not set, scan records are kept in memory only");
            Arc::new(InMemoryScanStore::with_retention(settings.scan.retention))
        }
    };

    let connectors = ConnectorRegistry::with_defaults(settings.scan.connector_pool_size);
    let state = Arc::new(AppState::new(store, connectors, settings.scan.clone()));
    info!(
        "🔧 Default scan level: {}, retention: {}",
        state.scan_config.default_scan_level, state.scan_config.retention
    );

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   POST /api/sources                    - Register a data source");
    info!("   GET  /api/sources                    - List sources");
    info!("   POST /api/sources/{{id}}/scans         - Run a scan");
    info!("   GET  /api/sources/{{id}}/scans         - Scan history");
    info!("   GET  /api/scans/active               - Scans in flight");
    info!("   GET  /api/scans/{{id}}                 - Get a scan record");
    info!("   POST /api/scans/{{id}}/cancel          - Cancel a scan");
    info!("   POST /api/scope/preview              - Preview scope rules");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemaflow_scanner=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
