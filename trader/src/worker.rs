use std::sync::Arc;

use anyhow::{bail, Context, Result};
use common::constant::{COMPOUND_TYPE_NONE, COMPOUND_TYPE_PROFIT_PERCENT, STEPS_TYPE_FIX_INTERVAL};
use common::{AppConfig, PairInfo};
use connector::Connector;
use metrics::AppMetrics;
use store::Ledger;
use strategy::{
    CompoundNone, CompoundProfitPercent, Compounder, FixedIntervalConfig, FixedIntervalSteps,
    Stepper,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

use crate::{Trader, TraderConfig};

pub struct WorkerConfig {
    pub app: AppConfig,
    pub ledger: Ledger,
    pub connector: Arc<dyn Connector>,
    pub metrics: Arc<AppMetrics>,
}

/// Background loop running one app's trader at the app's own interval.
///
/// Construction is where all the synchronous failures live: pair metadata is
/// fetched once, the operator config is validated against it, and the stepper
/// and compounder are built. After `start` returns Ok the loop only ever
/// exits through `stop`, which lets an in-flight tick finish.
pub struct Worker {
    app_id: i32,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub async fn start(cfg: WorkerConfig) -> Result<Worker> {
        let WorkerConfig {
            app,
            ledger,
            connector,
            metrics,
        } = cfg;

        let pair_info = connector
            .pair_info(&app.base, &app.quote)
            .await
            .with_context(|| format!("pair info for {}/{}", app.base, app.quote))?;

        validate(&app, &pair_info)?;

        let stepper = build_stepper(&app, &pair_info)?;
        let compounder = build_compounder(&app, &pair_info, &ledger)?;

        let trader = Trader::new(TraderConfig {
            app_id: app.id,
            base: app.base.clone(),
            quote: app.quote.clone(),
            market_order_fees: app.market_order_fees,
            limit_order_fees: app.limit_order_fees,
            ledger,
            connector,
            stepper,
            compounder,
            metrics,
        });

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let app_id = app.id;
        let interval = app.interval;
        let handle = tokio::spawn(async move {
            info!(app_id, "app worker started");
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                trader.run().await;
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = sleep(interval) => {}
                }
            }
            info!(app_id, "app worker drained");
        });

        Ok(Worker {
            app_id,
            shutdown,
            handle,
        })
    }

    /// Signal the loop and wait for the in-flight tick to finish.
    pub async fn stop(self) {
        info!(app_id = self.app_id, "app worker stopping");
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

fn validate(app: &AppConfig, pair_info: &PairInfo) -> Result<()> {
    if app.id < 1 {
        bail!("app id must be positive, got {}", app.id);
    }
    if app.base.is_empty() || app.quote.is_empty() {
        bail!("base and quote must not be empty");
    }
    if app.market_order_fees < 0.0 || app.limit_order_fees < 0.0 {
        bail!("order fees must not be negative");
    }
    if app.min_base_price < pair_info.price.min {
        bail!(
            "min base price {} below exchange minimum {}",
            app.min_base_price,
            pair_info.price.min
        );
    }
    if app.max_base_price > pair_info.price.max {
        bail!(
            "max base price {} above exchange maximum {}",
            app.max_base_price,
            pair_info.price.max
        );
    }
    if app.max_base_price < app.min_base_price {
        bail!(
            "max base price {} below min base price {}",
            app.max_base_price,
            app.min_base_price
        );
    }
    if app.step_quote_volume < pair_info.min_quote_volume {
        bail!(
            "step quote volume {} below pair minimum {}",
            app.step_quote_volume,
            pair_info.min_quote_volume
        );
    }
    if app.publish_orders_number < 1 {
        bail!("publish orders number must be at least 1");
    }
    Ok(())
}

fn build_stepper(app: &AppConfig, pair_info: &PairInfo) -> Result<Stepper> {
    match app.steps_type.as_str() {
        STEPS_TYPE_FIX_INTERVAL => {
            let interval: f64 = app
                .steps_details
                .trim()
                .parse()
                .with_context(|| format!("steps details {:?} is not a number", app.steps_details))?;
            let fixed = FixedIntervalSteps::new(FixedIntervalConfig {
                min: app.min_base_price,
                max: app.max_base_price,
                interval,
                min_price_allowed: pair_info.price.min,
                max_price_allowed: pair_info.price.max,
                price_tick: pair_info.price.tick,
            })?;
            Ok(Stepper::FixedInterval(fixed))
        }
        other => bail!("unknown steps type: {other}"),
    }
}

fn build_compounder(app: &AppConfig, pair_info: &PairInfo, ledger: &Ledger) -> Result<Compounder> {
    match app.compound_type.as_str() {
        COMPOUND_TYPE_NONE => Ok(Compounder::None(CompoundNone {
            initial_step_quote_volume: app.step_quote_volume,
            lot: pair_info.lot,
        })),
        COMPOUND_TYPE_PROFIT_PERCENT => Ok(Compounder::ProfitPercent(CompoundProfitPercent {
            app_id: app.id,
            ledger: ledger.clone(),
            initial_step_quote_volume: app.step_quote_volume,
            lot: pair_info.lot,
        })),
        other => bail!("unknown compound type: {other}"),
    }
}
