//! # Mailsync API Server
//!
//! Startup wiring: configuration, database, provider gateway, engine
//! components, periodic sweeps and the Axum HTTP server with graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mailsync_api::{router, AppConfig, AppState};
use mailsync_db::{Database, DbConfig};
use mailsync_engine::{
    DeltaSyncEngine, MailboxOrchestrator, NotificationProcessor, ProviderClient, ProviderGateway,
    SubscriptionManager, SweepScheduler,
};
use mailsync_graph::GraphClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Mailsync API server...");

    // Load configuration
    let config = AppConfig::load()?;
    info!(
        port = config.http_port,
        database = %config.database_path,
        mailboxes = config.mailboxes.len(),
        "Configuration loaded"
    );

    // Connect to the mirror store (runs migrations)
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Connected to mirror store");

    // Provider gateway: Graph adapter behind retry + circuit breaker
    let graph = GraphClient::new(config.graph_config())?;
    let provider: Arc<dyn ProviderClient> = Arc::new(ProviderGateway::new(
        Arc::new(graph),
        config.retry_settings(),
        config.circuit_settings(),
    ));

    // Engine components
    let engine = DeltaSyncEngine::new(db.clone(), provider.clone(), config.sync_settings());
    let subscriptions =
        SubscriptionManager::new(db.clone(), provider, config.subscription_settings());
    let notifications =
        NotificationProcessor::new(db.clone(), engine.clone(), config.webhook_settings());
    let orchestrator =
        MailboxOrchestrator::new(db.clone(), engine.clone(), subscriptions.clone());

    // Initialize configured mailboxes off the startup path so the webhook
    // surface comes up immediately.
    {
        let orchestrator = orchestrator.clone();
        let mailboxes = config.mailboxes.clone();
        tokio::spawn(async move {
            orchestrator.initialize_configured(&mailboxes).await;
        });
    }

    // Periodic sweeps
    let sweeps = SweepScheduler::new(
        subscriptions.clone(),
        notifications.clone(),
        config.sweep_settings(),
    )
    .start();

    // HTTP server
    let state = Arc::new(AppState {
        db: db.clone(),
        engine,
        subscriptions,
        notifications,
        orchestrator,
    });
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeps.shutdown();
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
