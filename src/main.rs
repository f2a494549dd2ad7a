//! Merlyn Bills - points economy backend
//!
//! Serves the ledger, auction and exchange workflow over HTTP. The whole
//! economy is one versioned document; every mutation is a compare-and-set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merlyn_bills::api::{ApiKeys, AppState};
use merlyn_bills::config::StoreBackend;
use merlyn_bills::jobs::{JobScheduler, JobSchedulerConfig};
use merlyn_bills::store::{
    AggregateStore, EconomyRepository, MemoryAggregateStore, PgAggregateStore,
};
use merlyn_bills::{build_router, db, Config};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "merlyn_bills=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    init_tracing(log_json);

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting Merlyn Bills server");

    let mut pool = None;
    let backend: Arc<dyn AggregateStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is required for the postgres backend")
            })?;

            tracing::info!("Connecting to database...");
            let pg = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;

            db::verify_connection(&pg).await?;
            if !db::check_schema(&pg).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            pool = Some(pg.clone());
            Arc::new(PgAggregateStore::new(pg))
        }
        StoreBackend::Memory => {
            if config.is_production() {
                tracing::warn!("In-memory store selected in production; state is lost on restart");
            }
            Arc::new(MemoryAggregateStore::new())
        }
    };

    let repository = EconomyRepository::new(backend, config.seed.clone());

    let scheduler = if config.scheduler_enabled {
        let schedule = JobSchedulerConfig {
            auction_close_interval: Duration::from_secs(config.scheduler_interval_secs),
            ..JobSchedulerConfig::default()
        };
        Some(JobScheduler::with_config(repository.clone(), schedule).start())
    } else {
        tracing::info!("Job scheduler disabled");
        None
    };

    let state = AppState::new(repository, ApiKeys::from_config(&config));
    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed. Goodbye!");
    }

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
