mod worker;

use std::sync::Arc;

use chrono::Utc;
use common::{
    BalanceAction, BalanceHistory, Order, OrderSide, OrderStatus, OrderType, Trade, TradeStatus,
};
use connector::Connector;
use metrics::{AppMetrics, Phase};
use store::Ledger;
use strategy::{Compounder, Stepper};
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub use worker::{Worker, WorkerConfig};

pub struct TraderConfig {
    pub app_id: i32,
    pub base: String,
    pub quote: String,
    pub market_order_fees: f64,
    pub limit_order_fees: f64,
    pub ledger: Ledger,
    pub connector: Arc<dyn Connector>,
    pub stepper: Stepper,
    pub compounder: Compounder,
    pub metrics: Arc<AppMetrics>,
}

/// Per-app reconciliation loop.
///
/// Each tick runs five phases in strict order, reconciling the authoritative
/// exchange view into the ledger and then the ledger back out to the
/// exchange. Every phase is idempotent: a failed tick leaves the ledger in a
/// state the next tick picks up from scratch, so there are no in-memory
/// retries anywhere.
pub struct Trader {
    app_id: i32,
    base: String,
    quote: String,
    market_order_fees: f64,
    limit_order_fees: f64,
    ledger: Ledger,
    connector: Arc<dyn Connector>,
    stepper: Stepper,
    compounder: Compounder,
    metrics: Arc<AppMetrics>,
}

impl Trader {
    pub fn new(cfg: TraderConfig) -> Self {
        Trader {
            app_id: cfg.app_id,
            base: cfg.base,
            quote: cfg.quote,
            market_order_fees: cfg.market_order_fees,
            limit_order_fees: cfg.limit_order_fees,
            ledger: cfg.ledger,
            connector: cfg.connector,
            stepper: cfg.stepper,
            compounder: cfg.compounder,
            metrics: cfg.metrics,
        }
    }

    /// One tick. A failing phase aborts the tick; the next tick retries from
    /// phase one.
    pub async fn run(&self) {
        let tick_started = Instant::now();
        let ok = self.run_phases().await;
        self.metrics
            .observe_phase(Phase::Tick, elapsed_ms(tick_started));
        self.metrics.record_tick(ok);
    }

    async fn run_phases(&self) -> bool {
        debug!(app_id = self.app_id, "run trader");

        let started = Instant::now();
        let ok = self.reconcile_exchange_executions().await;
        self.metrics
            .observe_phase(Phase::Reconcile, elapsed_ms(started));
        if !ok {
            return false;
        }

        let started = Instant::now();
        let ok = self.advance_executed_trades().await;
        self.metrics
            .observe_phase(Phase::Advance, elapsed_ms(started));
        if !ok {
            return false;
        }

        let started = Instant::now();
        let ok = self.add_missing_trades().await;
        self.metrics
            .observe_phase(Phase::AddMissing, elapsed_ms(started));
        if !ok {
            return false;
        }

        let started = Instant::now();
        let ok = self.mark_for_publish().await;
        self.metrics
            .observe_phase(Phase::MarkPublish, elapsed_ms(started));
        if !ok {
            return false;
        }

        let started = Instant::now();
        let ok = self.publish_orders().await;
        self.metrics
            .observe_phase(Phase::Publish, elapsed_ms(started));

        ok
    }

    /// Phase 1: pull order statuses for published trades and advance the ones
    /// whose order executed. Transient order states are skipped; anything
    /// unrecognized degrades the tick without stopping other trades.
    async fn reconcile_exchange_executions(&self) -> bool {
        let trades = match self.active_trades().await {
            Ok(trades) => trades,
            Err(err) => {
                error!(app_id = self.app_id, ?err, "reconcile: fetch active trades failed");
                return false;
            }
        };

        let mut is_ok = true;
        for mut trade in trades {
            let order_id = match trade.status {
                TradeStatus::BuyLimitPublished => trade.buy_order_id.clone(),
                TradeStatus::SellLimitPublished => trade.sell_order_id.clone(),
                _ => continue,
            };

            let lookup = Order::lookup(order_id, &self.base, &self.quote);
            let order = match self.connector.order_details(self.app_id, &lookup).await {
                Ok(order) => order,
                Err(err) => {
                    error!(
                        app_id = self.app_id,
                        trade_id = trade.id,
                        order_id = %lookup.id,
                        ?err,
                        "reconcile: order details failed"
                    );
                    is_ok = false;
                    continue;
                }
            };

            match order.status {
                OrderStatus::New | OrderStatus::PartiallyFilled => continue,
                OrderStatus::Executed => {
                    if trade.status == TradeStatus::BuyLimitPublished {
                        trade.open_type = Some(order.order_type);
                        trade.status = TradeStatus::BuyLimitExecuted;
                    } else {
                        trade.close_type = Some(order.order_type);
                        trade.status = TradeStatus::SellLimitExecuted;
                    }
                    if let Err(err) = self.ledger.update_trade(&trade).await {
                        error!(
                            app_id = self.app_id,
                            trade_id = trade.id,
                            ?err,
                            "reconcile: trade update failed"
                        );
                        is_ok = false;
                        continue;
                    }
                    debug!(app_id = self.app_id, trade_id = trade.id, "trade reconciled");
                }
                other => {
                    error!(
                        app_id = self.app_id,
                        trade_id = trade.id,
                        status = %other,
                        "reconcile: unexpected order status"
                    );
                    is_ok = false;
                }
            }
        }

        is_ok
    }

    /// Phase 2: executed buys become pending sells; executed sells cash in
    /// and close. The cash-in is guarded by the balance-history idempotency
    /// key so a crash between the two writes cannot double-book profit.
    async fn advance_executed_trades(&self) -> bool {
        let trades = match self.active_trades().await {
            Ok(trades) => trades,
            Err(err) => {
                error!(app_id = self.app_id, ?err, "advance: fetch active trades failed");
                return false;
            }
        };

        let mut is_ok = true;
        for trade in trades {
            match trade.status {
                TradeStatus::BuyLimitExecuted => {
                    if !self.convert_trade_to_sell(trade).await {
                        is_ok = false;
                    }
                }
                TradeStatus::SellLimitExecuted => {
                    if !self.close_trade(trade).await {
                        is_ok = false;
                    }
                }
                _ => continue,
            }
        }

        is_ok
    }

    async fn convert_trade_to_sell(&self, mut trade: Trade) -> bool {
        trade.converted_sell_limit_at = Some(Utc::now());
        trade.status = TradeStatus::SellLimit;
        if let Err(err) = self.ledger.update_trade(&trade).await {
            error!(
                app_id = self.app_id,
                trade_id = trade.id,
                ?err,
                "advance: buy->sell update failed"
            );
            return false;
        }
        true
    }

    async fn close_trade(&self, mut trade: Trade) -> bool {
        if let Err(err) = self.cash_in_if_missing(&trade).await {
            error!(
                app_id = self.app_id,
                trade_id = trade.id,
                ?err,
                "advance: cash-in failed"
            );
            return false;
        }

        trade.closed_at = Some(Utc::now());
        trade.status = TradeStatus::Closed;
        if let Err(err) = self.ledger.update_trade(&trade).await {
            error!(
                app_id = self.app_id,
                trade_id = trade.id,
                ?err,
                "advance: close update failed"
            );
            return false;
        }
        true
    }

    /// Append the CASHED_IN row unless one already exists for this trade.
    /// Re-entry after a crash between the append and the trade update lands
    /// here again and becomes a no-op.
    async fn cash_in_if_missing(&self, trade: &Trade) -> anyhow::Result<()> {
        if let Some(existing) = self
            .ledger
            .latest_trade_balance_history(self.app_id, trade.id)
            .await?
        {
            if existing.action == Some(BalanceAction::CashedIn) {
                return Ok(());
            }
        }

        let prev = self.ledger.latest_balance_history(self.app_id).await?;
        let net_profit = self.trade_net_profit(trade);
        self.ledger
            .add_balance_history(&BalanceHistory {
                app_id: self.app_id,
                action: Some(BalanceAction::CashedIn),
                quote_volume: net_profit,
                total_net_income: prev.total_net_income + net_profit,
                total_reinvested: prev.total_reinvested,
                trade_id: trade.id,
                created_at: Some(Utc::now()),
            })
            .await
    }

    fn trade_net_profit(&self, trade: &Trade) -> f64 {
        net_profit(self.market_order_fees, self.limit_order_fees, trade)
    }

    /// Phase 3: create a BUY_LIMIT trade for every grid step not covered by a
    /// live trade. A compounder failure skips only its step.
    async fn add_missing_trades(&self) -> bool {
        let steps = self.stepper.steps();
        let trades = match self.active_trades().await {
            Ok(trades) => trades,
            Err(err) => {
                error!(app_id = self.app_id, ?err, "add missing: fetch active trades failed");
                return false;
            }
        };

        let mut is_ok = true;
        for step in steps {
            if trades.iter().any(|trade| trade.open_base_price == step) {
                continue;
            }

            let compounded = match self.compounder.volume(step).await {
                Ok(compounded) => compounded,
                Err(err) => {
                    error!(app_id = self.app_id, step, ?err, "add missing: volume failed");
                    is_ok = false;
                    continue;
                }
            };

            let trade = Trade::open(
                self.app_id,
                step,
                self.stepper.close_price(step),
                compounded.base_volume,
            );
            match self
                .ledger
                .add_trade_with_reinvest(&trade, compounded.quote_reinvested)
                .await
            {
                Ok(trade_id) => {
                    debug!(
                        app_id = self.app_id,
                        trade_id,
                        step,
                        volume = compounded.base_volume,
                        reinvested = compounded.quote_reinvested,
                        "trade created"
                    );
                }
                Err(err) => {
                    error!(app_id = self.app_id, step, ?err, "add missing: insert failed");
                    is_ok = false;
                }
            }
        }

        is_ok
    }

    /// Phase 4: every resting trade gets queued for publication. A throttling
    /// policy would live here.
    async fn mark_for_publish(&self) -> bool {
        let trades = match self.active_trades().await {
            Ok(trades) => trades,
            Err(err) => {
                error!(app_id = self.app_id, ?err, "mark publish: fetch active trades failed");
                return false;
            }
        };

        let mut is_ok = true;
        for mut trade in trades {
            match trade.status {
                TradeStatus::BuyLimit => trade.status = TradeStatus::BuyLimitWantsPublish,
                TradeStatus::SellLimit => trade.status = TradeStatus::SellLimitWantsPublish,
                _ => continue,
            }
            if let Err(err) = self.ledger.update_trade(&trade).await {
                error!(
                    app_id = self.app_id,
                    trade_id = trade.id,
                    ?err,
                    "mark publish: trade update failed"
                );
                is_ok = false;
            }
        }

        is_ok
    }

    /// Phase 5: place the limit order for every trade queued in phase 4. On
    /// failure the trade stays queued and the next tick retries with a fresh
    /// client-order-id nonce.
    async fn publish_orders(&self) -> bool {
        let trades = match self.active_trades().await {
            Ok(trades) => trades,
            Err(err) => {
                error!(app_id = self.app_id, ?err, "publish: fetch active trades failed");
                return false;
            }
        };

        let mut is_ok = true;
        for trade in trades {
            let published = match trade.status {
                TradeStatus::BuyLimitWantsPublish => self.publish_order(trade, OrderSide::Buy).await,
                TradeStatus::SellLimitWantsPublish => {
                    self.publish_order(trade, OrderSide::Sell).await
                }
                _ => continue,
            };
            if !published {
                is_ok = false;
            }
        }

        is_ok
    }

    async fn publish_order(&self, mut trade: Trade, side: OrderSide) -> bool {
        let price = match side {
            OrderSide::Buy => trade.open_base_price,
            OrderSide::Sell => trade.close_base_price,
        };
        let order = Order {
            id: String::new(),
            base: self.base.clone(),
            quote: self.quote.clone(),
            order_type: OrderType::Limit,
            side,
            price,
            volume: trade.base_volume,
            status: OrderStatus::New,
        };

        let order_id = match self.connector.add_order(self.app_id, &order).await {
            Ok(order_id) => order_id,
            Err(err) if err.is_rejection() => {
                warn!(
                    app_id = self.app_id,
                    trade_id = trade.id,
                    %side,
                    price,
                    %err,
                    "publish: exchange rejected order"
                );
                return false;
            }
            Err(err) => {
                error!(
                    app_id = self.app_id,
                    trade_id = trade.id,
                    %side,
                    price,
                    ?err,
                    "publish: add order failed"
                );
                return false;
            }
        };

        match side {
            OrderSide::Buy => {
                trade.buy_order_id = order_id;
                trade.status = TradeStatus::BuyLimitPublished;
            }
            OrderSide::Sell => {
                trade.sell_order_id = order_id;
                trade.status = TradeStatus::SellLimitPublished;
            }
        }

        if let Err(err) = self.ledger.update_trade(&trade).await {
            error!(
                app_id = self.app_id,
                trade_id = trade.id,
                ?err,
                "publish: trade update failed"
            );
            return false;
        }
        true
    }

    async fn active_trades(&self) -> anyhow::Result<Vec<Trade>> {
        self.ledger.active_trades(self.app_id).await
    }
}

/// `close·vol − open·vol − openFee − closeFee`; each side's fee rate is
/// chosen by the order type the exchange reported for that side, falling back
/// to the market rate when the side never executed.
fn net_profit(market_order_fees: f64, limit_order_fees: f64, trade: &Trade) -> f64 {
    let rate = |order_type: Option<OrderType>| match order_type {
        Some(OrderType::Limit) => limit_order_fees,
        _ => market_order_fees,
    };

    let open_volume = trade.open_base_price * trade.base_volume;
    let close_volume = trade.close_base_price * trade.base_volume;

    let open_fee = rate(trade.open_type) / 100.0 * open_volume;
    let close_fee = rate(trade.close_type) / 100.0 * close_volume;

    close_volume - open_volume - open_fee - close_fee
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}
