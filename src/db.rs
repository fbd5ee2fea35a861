//! Database connection management
//!
//! Pool construction for the scan store, with rustls when the server asks for it.

use crate::config::DatabaseConfig;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

/// Hosted Postgres providers such as Neon only accept TLS connections
pub fn requires_tls(host: &str, connection_string: &str) -> bool {
    host.contains("neon.tech") || connection_string.contains("sslmode=require")
}

/// TLS connector backed by the platform's root certificates
pub fn rustls_connect() -> MakeRustlsConnect {
    let certs = rustls_native_certs::load_native_certs();
    if !certs.errors.is_empty() {
        warn!("⚠️  Some native certificates could not be loaded: {:?}", certs.errors);
    }

    let mut root_store = rustls::RootCertStore::empty();
    for cert in certs.certs {
        root_store.add(cert).ok();
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(tls_config)
}

/// Create and verify the scan store pool
pub async fn init_pool(config: &DatabaseConfig) -> anyhow::Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = if config.use_tls {
        cfg.create_pool(Some(Runtime::Tokio1), rustls_connect())
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Test the connection
    let client = pool.get().await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;
    client.query_one("SELECT 1 as ok", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!("✅ Database connection successful (TLS: {})", config.use_tls);
    Ok(pool)
}
