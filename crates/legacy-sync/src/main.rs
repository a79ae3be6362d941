//! Service entry point: consume the sync queues and serve the order lookup until signalled.

use anyhow::{Context, Result};
use legacy_sync::api;
use legacy_sync::config::{SyncConfig, PREFETCH, RECONNECT_DELAY, REQUEUE_DELAY};
use legacy_sync::lifecycle::{setup_tracing, SyncSystem};
use legacy_sync::queue::amqp::AmqpTransport;
use legacy_sync::queue::{ConnectionManager, Dispatcher, RetryPolicy};
use legacy_sync::store::mysql::MySqlStore;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    setup_tracing();
    install_panic_hook();

    match run().await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            error!(error = ?err, "Fatal error");
            std::process::exit(1);
        }
    }
}

/// A panic on the main thread is fatal. Panics in spawned tasks surface through their join
/// handles and the process keeps running.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let on_main = std::thread::current().name() == Some("main");
        error!(%panic, on_main, "Uncaught panic");
        default_hook(panic);
        if on_main {
            std::process::exit(1);
        }
    }));
}

async fn run() -> Result<()> {
    let config = SyncConfig::from_env().context("load configuration")?;
    debug!(config = %config.redacted(), "Configuration loaded");

    let store = MySqlStore::connect(&config.database, &config.options)
        .await
        .context("connect to MySQL")?;
    store.verify().await.context("verify MySQL connection")?;
    info!("Database connection verified");

    let mut system = SyncSystem::new(store.clone());

    let manager = ConnectionManager::new(
        AmqpTransport::new(&config.broker),
        config.queues.all(),
        PREFETCH,
        RECONNECT_DELAY,
    );
    let retry = RetryPolicy {
        max_attempts: config.options.max_delivery_attempts,
    };
    let dispatcher = Dispatcher::new(manager.clone(), retry, REQUEUE_DELAY);
    system.start(&dispatcher, &config.queues);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind API port {}", config.api_port))?;
    info!(%addr, "API listening");
    let app = api::router(Arc::new(store.clone()));

    tokio::select! {
        served = axum::serve(listener, app).into_future() => {
            served.context("serve API")?;
        }
        signalled = shutdown_signal() => {
            signalled?;
        }
    }

    info!("Shutting down");
    manager.close().await;
    system.shutdown().await?;
    store.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::select! {
        _ = interrupt.recv() => info!("SIGINT received"),
        _ = terminate.recv() => info!("SIGTERM received"),
    }
    Ok(())
}
