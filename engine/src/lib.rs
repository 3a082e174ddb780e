mod notify;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use common::constant::{BINANCE_EXCHANGE, DEFAULT_CONNECTOR_POLL_INTERVAL_SECS, FAKE_EXCHANGE};
use common::{AppConfig, AppStatus};
use connector::{BinanceConnector, BinanceCredentials, Connector, MockConnector};
use metrics::Metrics;
use store::Ledger;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};
use trader::{Worker, WorkerConfig};

pub use notify::SlackNotifier;

pub struct SupervisorConfig {
    pub interval: Duration,
    pub slack_hook: Option<String>,
    pub ledger: Ledger,
    pub metrics: Arc<Metrics>,
}

struct RunningApp {
    config: AppConfig,
    worker: Worker,
}

/// Process-level owner of every trader worker and exchange adapter.
///
/// Each supervisor tick reconciles the running worker set against the `apps`
/// table: new ACTIVE rows get a worker, edited rows get a restart with the
/// fresh parameters, INACTIVE rows get drained. Adapters are created on first
/// use per exchange and shared by all of its apps.
pub struct Supervisor {
    interval: Duration,
    ledger: Ledger,
    metrics: Arc<Metrics>,
    notifier: Option<SlackNotifier>,
    connectors: HashMap<String, Arc<dyn Connector>>,
    running: HashMap<i32, RunningApp>,
}

impl Supervisor {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Supervisor {
            interval: cfg.interval,
            ledger: cfg.ledger,
            metrics: cfg.metrics,
            notifier: cfg.slack_hook.map(SlackNotifier::new),
            connectors: HashMap::new(),
            running: HashMap::new(),
        }
    }

    /// Reconcile until shutdown is requested, then drain every worker and
    /// stop the adapters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("supervisor started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.interval) => {}
            }
        }
        self.shutdown().await;
        info!("supervisor stopped");
    }

    /// One reconciliation pass. A ledger read failure skips the pass; running
    /// workers keep their last known configuration.
    pub async fn tick(&mut self) {
        let apps = match self.ledger.apps().await {
            Ok(apps) => apps,
            Err(err) => {
                warn!(?err, "supervisor: loading apps failed, skipping tick");
                return;
            }
        };

        for app in apps {
            match app.status {
                AppStatus::Active => {
                    let restart = match self.running.get(&app.id) {
                        Some(running) => running.config != app,
                        None => false,
                    };
                    if restart {
                        info!(app_id = app.id, "app parameters changed, restarting worker");
                        self.stop_app(app.id).await;
                    }
                    if !self.running.contains_key(&app.id) {
                        self.start_app(app).await;
                    }
                }
                AppStatus::Inactive => {
                    if self.running.contains_key(&app.id) {
                        self.stop_app(app.id).await;
                        self.notify(format!("app {} deactivated", app.id)).await;
                    }
                }
                AppStatus::Unknown(ref raw) => {
                    warn!(app_id = app.id, status = %raw, "unknown app status, ignoring");
                }
            }
        }
    }

    async fn start_app(&mut self, app: AppConfig) {
        let connector = match self.ensure_connector(&app.exchange).await {
            Ok(connector) => connector,
            Err(err) => {
                error!(app_id = app.id, exchange = %app.exchange, ?err, "connector init failed");
                return;
            }
        };

        let worker = Worker::start(WorkerConfig {
            app: app.clone(),
            ledger: self.ledger.clone(),
            connector,
            metrics: self.metrics.app(app.id),
        })
        .await;

        match worker {
            Ok(worker) => {
                info!(app_id = app.id, "app started");
                self.notify(format!(
                    "app {} started ({} {}/{})",
                    app.id, app.exchange, app.base, app.quote
                ))
                .await;
                self.running.insert(app.id, RunningApp { config: app, worker });
            }
            Err(err) => {
                error!(app_id = app.id, ?err, "app failed to start");
                self.notify(format!("app {} failed to start: {err:#}", app.id))
                    .await;
            }
        }
    }

    async fn stop_app(&mut self, app_id: i32) {
        if let Some(running) = self.running.remove(&app_id) {
            running.worker.stop().await;
            info!(app_id, "app stopped");
        }
    }

    async fn ensure_connector(&mut self, exchange: &str) -> Result<Arc<dyn Connector>> {
        if let Some(existing) = self.connectors.get(exchange) {
            return Ok(Arc::clone(existing));
        }

        let connector: Arc<dyn Connector> = match exchange {
            BINANCE_EXCHANGE => {
                let credentials = binance_credentials_from_env();
                if credentials.is_none() {
                    warn!("BINANCE_API_KEY/BINANCE_API_SECRET not set, orders will be refused");
                }
                Arc::new(BinanceConnector::new(
                    credentials,
                    Duration::from_secs(DEFAULT_CONNECTOR_POLL_INTERVAL_SECS),
                ))
            }
            FAKE_EXCHANGE => Arc::new(MockConnector::new()),
            other => bail!("unknown exchange: {other}"),
        };

        connector.start().await?;
        info!(exchange, "connector started");
        self.connectors
            .insert(exchange.to_string(), Arc::clone(&connector));
        Ok(connector)
    }

    async fn shutdown(mut self) {
        let app_ids: Vec<i32> = self.running.keys().copied().collect();
        for app_id in app_ids {
            self.stop_app(app_id).await;
        }
        for (exchange, connector) in self.connectors.drain() {
            connector.stop().await;
            info!(%exchange, "connector stopped");
        }
    }

    async fn notify(&self, text: String) {
        if let Some(notifier) = &self.notifier {
            notifier.send(&text).await;
        }
    }

    /// Apps with a live worker, for tests and status logging.
    pub fn running_app_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.running.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The configuration a running worker was built from.
    pub fn running_config(&self, app_id: i32) -> Option<&AppConfig> {
        self.running.get(&app_id).map(|running| &running.config)
    }
}

fn binance_credentials_from_env() -> Option<BinanceCredentials> {
    let api_key = env::var("BINANCE_API_KEY").ok()?;
    let api_secret = env::var("BINANCE_API_SECRET").ok()?;
    Some(BinanceCredentials {
        api_key,
        api_secret,
    })
}
