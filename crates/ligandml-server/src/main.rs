//! ligandml — per-job potency model worker.
//! Entry point for the server binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{watch, OnceCell};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ligandml_model::{WeightCache, WeightStore};
use ligandml_server::{build_connector, config::Config};
use ligandml_web::{build_router, AppState};
use ligandml_worker::{ExperimentLedger, ServiceSettings, StatusHandle, WorkerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ligandml=debug,info")),
        )
        .init();

    info!("🧬 ligandml starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!(
        "Configuration loaded. Broker: {:?} ({}), weights: {}",
        config.broker.kind,
        config.broker.servers,
        config.model.weights_path.display()
    );

    // Weight store
    let cache = WeightCache::new(config.model.cache_size);
    let store = WeightStore::open(&config.model.weights_path, config.model.input_dim, cache)
        .context("opening weights directory")?;
    if config.model.create_base_if_missing {
        if store.ensure_base()? {
            info!("✅ Base weights created at {}", store.base_path().display());
        }
    } else if !store.base_path().exists() {
        warn!(
            "Base weights missing at {}; requests for new jobs will fail",
            store.base_path().display()
        );
    }
    let store = Arc::new(store);

    let status = StatusHandle::new();
    let ledger = Arc::new(ExperimentLedger::with_capacity(config.server.experiment_capacity));
    let producer = Arc::new(OnceCell::new());
    let connector = build_connector(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Broker connection and dispatch loop
    let service = WorkerService {
        connector,
        settings: ServiceSettings {
            group_id: config.broker.group_id.clone(),
            retry: config.broker.retry_policy(),
            worker: config.worker_config(),
        },
        store: Arc::clone(&store),
        status: status.clone(),
        ledger: Arc::clone(&ledger),
        producer: Arc::clone(&producer),
    };
    let fatal_tx = Arc::clone(&shutdown_tx);
    let worker_rx = shutdown_rx.clone();
    let worker_task = tokio::spawn(async move {
        let result = service.run(worker_rx).await;
        if result.is_err() {
            let _ = fatal_tx.send(true);
        }
        result
    });

    // Ctrl-C
    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = signal_tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    // HTTP surface
    let router = build_router(AppState::new(store, status, ledger, producer));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("🌐 HTTP listening on http://{}", config.server.bind);
    info!("   Worker status: /worker-status");
    info!("   Weight cache:  /weight-cache-status");

    let mut server_rx = shutdown_rx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    match worker_task.await {
        Ok(Ok(())) => {
            info!("ligandml stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("model worker aborted"),
        Err(e) => Err(e).context("model worker task panicked"),
    }
}
