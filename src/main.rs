// Main entry point for the GameSpace server

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use gamespace::api::{create_router, AppState};
use gamespace::auth::audit_logger::AuditLogger;
use gamespace::auth::password::PasswordHasher;
use gamespace::config::Config;
use gamespace::core::clock::{Clock, SystemClock};
use gamespace::loader::seed_loader::SeedLoader;
use gamespace::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Tracing can only be installed once
    init_tracing(&config);

    info!("Starting GameSpace");
    info!(
        bind_address = %config.bind_address,
        port = config.port,
        "Configuration loaded"
    );

    // 3. Storage backend: Postgres when configured, memory otherwise
    let (store, db_pool): (Arc<dyn Store>, Option<Arc<sqlx::PgPool>>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let pg = PgStore::connect(url, config.database_max_connections)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Failed to connect to database");
                        e
                    })?;
                let pool = Arc::new(pg.pool().clone());
                info!("Database store initialized");
                (Arc::new(pg), Some(pool))
            }
            None => {
                warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
                (Arc::new(MemoryStore::new()), None)
            }
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 4. Seed roles, admins and catalogue data
    if let Some(ref seed_path) = config.seed_yaml_path {
        let loader = SeedLoader::from_file(seed_path).map_err(|e| {
            error!(error = %e, path = ?seed_path, "Failed to load seed file");
            e
        })?;
        let hasher = PasswordHasher::new(config.argon2_memory_kib, config.argon2_iterations)?;
        let report = loader.apply(store.as_ref(), clock.as_ref(), &hasher).await?;
        info!(
            roles = report.roles,
            admins = report.admins,
            products = report.products,
            forums = report.forums,
            "Seed data loaded"
        );
    }

    // 5. Audit logger writes to the database when there is one
    let audit_logger = Arc::new(AuditLogger::new(db_pool));
    info!("Audit logger initialized");

    // 6. Services and router
    let bind_address = config.bind_address.clone();
    let port = config.port;
    let app_state = AppState::new(config, store, clock, audit_logger)?;
    let router = create_router(app_state);
    info!("Router created");

    // 7. Start HTTP server
    let addr = format!("{}:{}", bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(addr = %addr, "Server listening");

    // Peer addresses feed the per-IP rate limiter
    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber based on configuration
///
/// `RUST_LOG` wins over `LOG_LEVEL` when both are set.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
