use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use replaybox::api::{self, state::AppState};
use replaybox::config::{Config, StoreBackend};
use replaybox::executor::HttpExecutor;
use replaybox::ledger::Ledger;
use replaybox::observability::Metrics;
use replaybox::probe::{HttpProbe, ManualProbe, OnlineProbe};
use replaybox::replay::{ProcessOptions, ProcessOutcome};
use replaybox::store::{EntryStore, FjallStore, MemoryStore};

pub type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything wired from configuration
pub struct Runtime {
    pub ledger: Ledger,
    pub metrics: Arc<Metrics>,
    pub probe: Arc<dyn OnlineProbe>,
    pub disk: Option<Arc<FjallStore>>,
}

impl Runtime {
    pub fn build(config: &Config) -> Result<Self, AnyError> {
        let (store, disk): (Arc<dyn EntryStore>, Option<Arc<FjallStore>>) = match config.store.backend {
            StoreBackend::Fjall => {
                info!(path = %config.store.path.display(), "Opening fjall store");
                let disk = Arc::new(
                    FjallStore::open_with_capacity(&config.store.path, config.store.capacity)
                        .map_err(|e| format!("Failed to open fjall store: {}", e))?,
                );
                (disk.clone() as Arc<dyn EntryStore>, Some(disk))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store, entries will not survive a restart");
                (
                    Arc::new(MemoryStore::with_capacity(config.store.capacity)) as Arc<dyn EntryStore>,
                    None,
                )
            }
        };

        let executor = Arc::new(
            HttpExecutor::new(config.executor.http_config())
                .map_err(|e| format!("Failed to build executor: {}", e))?,
        );

        let probe: Arc<dyn OnlineProbe> = match &config.probe.health_url {
            Some(url) => Arc::new(
                HttpProbe::new(url.clone(), config.probe.timeout.as_duration())?
                    .with_override(config.probe.force_online),
            ),
            None => Arc::new(ManualProbe::new(config.probe.force_online.unwrap_or(true))),
        };

        let metrics = Arc::new(Metrics::new());

        let ledger = Ledger::builder(store, executor)
            .probe(probe.clone())
            .hooks(metrics.clone())
            .config(config.replay.engine_config())
            .build();

        Ok(Self {
            ledger,
            metrics,
            probe,
            disk,
        })
    }

    /// Destroy the ledger and flush the journal
    pub fn shutdown(&self) {
        self.ledger.destroy();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.flush() {
                error!(error = %e, "Failed to flush store on shutdown");
            }
        }
    }
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let runtime = Runtime::build(&config)?;

    let mut background = Vec::new();

    // Feed probe results into the ledger's connectivity subscription
    let (online_tx, online_rx) = watch::channel(runtime.probe.is_online().await);
    runtime.ledger.attach_connectivity(online_rx)?;
    background.push(spawn_connectivity_watcher(
        runtime.probe.clone(),
        online_tx,
        config.replay.offline_poll_interval.as_duration(),
    ));

    let interval = config.server.replay_interval.as_duration();
    if interval.is_zero() {
        info!("Periodic replay disabled");
    } else {
        background.push(spawn_replay_ticker(runtime.ledger.clone(), interval));
    }

    let mut state = AppState::new(runtime.ledger.clone(), runtime.metrics.clone());
    if let Some(disk) = &runtime.disk {
        state = state.with_disk(disk.clone());
    }
    let app = api::router(state);

    let address = config.server.bind_addr;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "replaybox operator API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in background {
        task.abort();
    }
    runtime.shutdown();
    info!("replaybox stopped");

    Ok(())
}

fn spawn_connectivity_watcher(
    probe: Arc<dyn OnlineProbe>,
    online: watch::Sender<bool>,
    poll: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now_online = probe.is_online().await;
            let changed = online.send_if_modified(|current| {
                let changed = *current != now_online;
                *current = now_online;
                changed
            });
            if changed {
                info!(online = now_online, "Connectivity changed");
            }
        }
    })
}

fn spawn_replay_ticker(ledger: Ledger, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; drain whatever survived a restart
        loop {
            ticker.tick().await;
            match ledger.process(ProcessOptions::new()).await {
                Ok(ProcessOutcome::Completed(summary)) if summary.batches > 0 => info!(
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    rearmed = summary.rearmed,
                    "Periodic replay finished"
                ),
                Ok(_) => debug!("Periodic replay had nothing to do"),
                Err(e) => error!(error = %e, "Periodic replay failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
