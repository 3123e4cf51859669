use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use sdr_backend::{api, config, db, eth, notifier, services, watcher, AppError, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let cfg = config::Config::from_file(&cli.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = db::connect(&cfg.database).await?;
    tracing::info!("database connected and migrated");

    let eth_client = Arc::new(eth::EthClient::new(&cfg.ethereum.node_url)?);
    let token_address = eth::utils::parse_address(&cfg.ethereum.token_address)
        .map_err(|_| AppError::Config("ethereum.tokenAddress is not a valid address".into()))?;
    let token = Arc::new(eth::Token::new(token_address, &eth_client)?);
    tracing::info!("connected to the node");

    let wallets = Arc::new(db::WalletRepository::new(db.clone()));
    let transactions = Arc::new(db::TransactionRepository::new(db.clone()));
    let transfers = Arc::new(db::TransferRepository::new(db.clone()));

    let auth = Arc::new(services::AuthService::new(&cfg.secrets.token));
    let rate: Arc<dyn services::RateOracle> =
        Arc::new(services::RateService::new(&cfg.sdr_backend));

    let transfer_service = Arc::new(services::TransferService::new(
        transfers.clone(),
        transactions.clone(),
        eth_client.clone(),
        token.clone(),
        rate,
        cfg.transaction.clone(),
        cfg.ethereum.clone(),
    ));

    let wallet_cache = Arc::new(watcher::WalletCache::new());
    wallet_cache.clone().spawn_sweeper();

    let wallet_service = Arc::new(services::WalletService::new(
        wallets.clone(),
        auth.clone(),
        token.clone(),
        wallet_cache.clone(),
        cfg.secrets.api.clone(),
    ));

    // Background task: notifier hub
    let (notifier, hub) = notifier::Notifier::new();
    tokio::spawn(hub.run());

    // Background tasks: chain watchers (backfills + reconciliation loops)
    let watcher_core = Arc::new(watcher::Watcher::new(
        wallets,
        transactions,
        transfers,
        transfer_service.clone(),
        notifier.clone(),
        token.clone(),
        wallet_cache,
    ));

    let event_watcher = Arc::new(watcher::EventWatcher::new(
        eth_client.clone(),
        token,
        watcher_core.clone(),
        cfg.ethereum.packet_size,
    ));
    event_watcher.clone().start().await?;

    let header_watcher = Arc::new(watcher::HeaderWatcher::new(
        eth_client,
        watcher_core,
        token_address,
    ));
    header_watcher.clone().start().await?;

    // Background task: live subscription supervisor; a fatal dial failure
    // shuts the process down
    let (conn_closed_tx, conn_closed_rx) = mpsc::channel::<()>(1);
    tokio::spawn(watcher::supervisor::run(
        cfg.ethereum.ws_node_url.clone(),
        event_watcher,
        header_watcher,
        conn_closed_tx,
    ));

    let state = api::AppState::new(wallet_service, transfer_service, auth, notifier);

    let public = Router::new()
        .route("/api/v1/wallet", post(api::wallet::create_wallet))
        .route("/api/v1/wallet/:address", get(api::wallet::get_wallet));

    let private = Router::new()
        .route("/api/v1/subscribe", get(api::subscribe::subscribe))
        .route("/api/v1/estimatetax", post(api::transfer::estimate_tax))
        .route("/api/v1/transfer", post(api::transfer::create_transfer))
        .route("/api/v1/transfer/confirm", post(api::transfer::confirm_transfer))
        .route("/api/v1/transactions", get(api::transaction::transaction_history))
        .route("/api/v1/transactions/:hash", get(api::transaction::get_transaction))
        .route("/api/v1/balance", get(api::wallet::get_balance))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::require_auth,
        ));

    let app = public
        .merge(private)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("REST API listening on {}", cfg.rest_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.rest_addr)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    shutdown_signal(conn_closed_rx).await;
    tracing::info!("shutting down, draining connections");

    let _ = drain_tx.send(());
    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server).await {
        Ok(Ok(result)) => result.map_err(|e| AppError::Internal(e.to_string()))?,
        Ok(Err(e)) => return Err(AppError::Internal(e.to_string())),
        Err(_) => tracing::warn!("graceful shutdown timed out"),
    }

    Ok(())
}

fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    tracing::error!("request handler panicked");
    axum::response::IntoResponse::into_response(AppError::Internal(
        "internal server error".to_string(),
    ))
}

async fn shutdown_signal(mut conn_closed: mpsc::Receiver<()>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = conn_closed.recv() => {
            tracing::error!("streaming connection lost for good, exiting");
        },
    }
}
