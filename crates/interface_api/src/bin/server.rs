//! Expense Workflow - API Server Binary
//!
//! Starts the HTTP API and the background ledger sync loop.
//!
//! # Usage
//!
//! ```bash
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin expense-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Listen address (default: 0.0.0.0:8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `API_POLICY_MAX_AMOUNT` - Amount above which claims are flagged (default: 1000)
//! * `API_EMPTY_TEAM_POLICY` - `all_pending` or `none_visible`
//! * `API_SYNC_INTERVAL_SECS` - Seconds between ledger sync passes (default: 900)
//! * `API_LEDGER_CLIENT_ID` / `API_LEDGER_CLIENT_SECRET` - OAuth client credentials
//! * `API_LEDGER_REDIRECT_URI` - OAuth redirect, served at `/ledger/callback`
//! * `API_LEDGER_ENVIRONMENT` - `sandbox` or `production`
//! * `API_LEDGER_TOKEN_PATH` - Where ledger tokens are persisted

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_expense::{
    ApprovalAuthority, ExpenseService, ExpenseStore, PolicyEvaluator, UserDirectory,
};
use domain_export::{ExportReconciler, LedgerPort, SyncScheduler};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgExpenseStore, PgUserDirectory};
use infra_ledger::{FileTokenStore, HttpOAuthProvider, QuickBooksLedgerClient, TokenManager};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API configuration")?;
    init_tracing(&config.log_level);

    tracing::info!(host = %config.host, port = config.port, "Starting expense API server");

    let pool = create_pool(DatabaseConfig::new(&config.database_url)).await?;
    run_migrations(&pool).await?;

    let store: Arc<dyn ExpenseStore> = Arc::new(PgExpenseStore::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool));

    let ledger_config = config.ledger_config().context("invalid ledger configuration")?;
    if !ledger_config.is_configured() {
        tracing::warn!("Ledger client credentials are not set; exports will fail until configured");
    }
    let provider = Arc::new(HttpOAuthProvider::new(ledger_config.clone())?);
    let token_store = Arc::new(FileTokenStore::new(&config.ledger_token_path));
    let tokens = Arc::new(TokenManager::load(provider, token_store, ledger_config.clone()).await?);
    let ledger = Arc::new(QuickBooksLedgerClient::new(ledger_config, tokens)?);

    let reconciler = Arc::new(ExportReconciler::new(
        store.clone(),
        users.clone(),
        ledger.clone() as Arc<dyn LedgerPort>,
        config.reconciler_config(),
    ));
    let scheduler = Arc::new(SyncScheduler::new(reconciler, config.sync_interval()));

    let shutdown = CancellationToken::new();
    let sync_task = scheduler.clone().spawn(shutdown.clone());

    let state = AppState {
        expenses: Arc::new(ExpenseService::new(
            store.clone(),
            PolicyEvaluator::new(config.policy_config()),
        )),
        approvals: Arc::new(ApprovalAuthority::new(
            store.clone(),
            users.clone(),
            config.approval_config(),
        )),
        config: Arc::new(config.clone()),
        store,
        users,
        scheduler,
        ledger,
    };

    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    sync_task.await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
