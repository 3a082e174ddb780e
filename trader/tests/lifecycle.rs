//! End-to-end trade lifecycle runs against an in-memory ledger and the mock
//! exchange, driving the trader tick by tick the way the worker loop would.

use std::sync::Arc;

use common::{BalanceAction, BalanceHistory, OrderStatus, OrderType, RangeFilter, TradeStatus};
use connector::{Connector, MockConnector};
use metrics::AppMetrics;
use store::Ledger;
use strategy::{
    CompoundNone, CompoundProfitPercent, Compounder, FixedIntervalConfig, FixedIntervalSteps,
    Stepper,
};
use trader::{Trader, TraderConfig};

const APP_ID: i32 = 1;

struct Harness {
    ledger: Ledger,
    mock: Arc<MockConnector>,
    metrics: Arc<AppMetrics>,
    trader: Trader,
}

fn lot() -> RangeFilter {
    RangeFilter {
        min: 0.00000001,
        max: 9_000.0,
        tick: 0.00000001,
    }
}

/// One-step grid at 20000 with a 100 interval, BTC/USDT, zero fees.
async fn harness(reinvest_profit: bool) -> Harness {
    let ledger = Ledger::connect("sqlite::memory:").await.unwrap();
    let mock = Arc::new(MockConnector::new());
    let metrics = Arc::new(AppMetrics::default());

    let stepper = Stepper::FixedInterval(
        FixedIntervalSteps::new(FixedIntervalConfig {
            min: 20000.0,
            max: 20000.0,
            interval: 100.0,
            min_price_allowed: 0.01,
            max_price_allowed: 1_000_000.0,
            price_tick: 0.01,
        })
        .unwrap(),
    );
    let compounder = if reinvest_profit {
        Compounder::ProfitPercent(CompoundProfitPercent {
            app_id: APP_ID,
            ledger: ledger.clone(),
            initial_step_quote_volume: 10.0,
            lot: lot(),
        })
    } else {
        Compounder::None(CompoundNone {
            initial_step_quote_volume: 10.0,
            lot: lot(),
        })
    };

    let trader = Trader::new(TraderConfig {
        app_id: APP_ID,
        base: "BTC".into(),
        quote: "USDT".into(),
        market_order_fees: 0.0,
        limit_order_fees: 0.0,
        ledger: ledger.clone(),
        connector: mock.clone() as Arc<dyn Connector>,
        stepper,
        compounder,
        metrics: Arc::clone(&metrics),
    });

    Harness {
        ledger,
        mock,
        metrics,
        trader,
    }
}

#[tokio::test]
async fn happy_cycle_closes_with_one_cashed_in_row() {
    let h = harness(false).await;

    // tick 1: the missing step becomes a published buy
    h.trader.run().await;
    let trades = h.ledger.active_trades(APP_ID).await.unwrap();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.status, TradeStatus::BuyLimitPublished);
    assert_eq!(trade.open_base_price, 20000.0);
    assert_eq!(trade.close_base_price, 20100.0);
    assert!((trade.base_volume - 0.0005).abs() < 1e-12);
    assert!(!trade.buy_order_id.is_empty());
    let first_trade_id = trade.id;
    let buy_order_id = trade.buy_order_id.clone();

    // tick 2 after the buy fills: converted to a published sell
    h.mock.fill_order(APP_ID, &buy_order_id).await;
    h.trader.run().await;
    let trades = h.ledger.active_trades(APP_ID).await.unwrap();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.id, first_trade_id);
    assert_eq!(trade.status, TradeStatus::SellLimitPublished);
    assert_eq!(trade.open_type, Some(OrderType::Limit));
    assert!(trade.converted_sell_limit_at.is_some());
    assert!(!trade.sell_order_id.is_empty());
    let sell_order_id = trade.sell_order_id.clone();

    // tick 3 after the sell fills: closed, cashed in, and the freed step
    // immediately grows a fresh trade
    h.mock.fill_order(APP_ID, &sell_order_id).await;
    h.trader.run().await;

    let closed = h
        .ledger
        .latest_closed_trade_by_open_price(APP_ID, 20000.0)
        .await
        .unwrap()
        .expect("first trade should be closed");
    assert_eq!(closed.id, first_trade_id);
    assert_eq!(closed.close_type, Some(OrderType::Limit));
    assert!(closed.closed_at.is_some());

    let history = h.ledger.balance_history(APP_ID).await.unwrap();
    assert_eq!(history.len(), 1);
    let cashed_in = &history[0];
    assert_eq!(cashed_in.action, Some(BalanceAction::CashedIn));
    assert_eq!(cashed_in.trade_id, first_trade_id);
    assert!((cashed_in.quote_volume - 0.05).abs() < 1e-9);
    assert!((cashed_in.total_net_income - 0.05).abs() < 1e-9);
    assert_eq!(cashed_in.total_reinvested, 0.0);

    let actives = h.ledger.active_trades(APP_ID).await.unwrap();
    assert_eq!(actives.len(), 1);
    assert_ne!(actives[0].id, first_trade_id);
    assert_eq!(actives[0].open_base_price, 20000.0);
    assert_eq!(h.metrics.tick_errors_total(), 0);
}

#[tokio::test]
async fn tick_without_external_change_writes_nothing() {
    let h = harness(false).await;

    h.trader.run().await;
    let before_trades = h.ledger.active_trades(APP_ID).await.unwrap();
    let before_calls = h.mock.add_order_calls();
    let before_history = h.ledger.balance_history(APP_ID).await.unwrap();

    h.trader.run().await;
    assert_eq!(h.ledger.active_trades(APP_ID).await.unwrap(), before_trades);
    assert_eq!(h.mock.add_order_calls(), before_calls);
    assert_eq!(
        h.ledger.balance_history(APP_ID).await.unwrap().len(),
        before_history.len()
    );
    assert_eq!(h.mock.order_count().await, 1);
}

#[tokio::test]
async fn crash_between_cash_in_and_close_stays_idempotent() {
    let h = harness(false).await;

    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    h.mock.fill_order(APP_ID, &trade.buy_order_id).await;
    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    h.mock.fill_order(APP_ID, &trade.sell_order_id).await;

    // simulate the crash: the CASHED_IN row landed but the trade update never
    // ran, so the trade is still at SELL_LIMIT_PUBLISHED on restart
    h.ledger
        .add_balance_history(&BalanceHistory {
            app_id: APP_ID,
            action: Some(BalanceAction::CashedIn),
            quote_volume: 0.05,
            total_net_income: 0.05,
            total_reinvested: 0.0,
            trade_id: trade.id,
            created_at: Some(chrono::Utc::now()),
        })
        .await
        .unwrap();

    h.trader.run().await;

    let closed = h
        .ledger
        .latest_closed_trade_by_open_price(APP_ID, 20000.0)
        .await
        .unwrap()
        .expect("trade should close on the re-run");
    assert_eq!(closed.id, trade.id);

    let cash_ins: Vec<_> = h
        .ledger
        .balance_history(APP_ID)
        .await
        .unwrap()
        .into_iter()
        .filter(|row| row.trade_id == trade.id && row.action == Some(BalanceAction::CashedIn))
        .collect();
    assert_eq!(cash_ins.len(), 1, "exactly one CASHED_IN row must exist");
}

#[tokio::test]
async fn lost_publish_response_keeps_retrying_from_wants_publish() {
    let h = harness(false).await;

    // the exchange accepts the buy but the response is lost
    h.mock.lose_next_add_order_response().await;
    h.trader.run().await;

    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert_eq!(trade.status, TradeStatus::BuyLimitWantsPublish);
    assert!(trade.buy_order_id.is_empty());
    assert_eq!(h.mock.order_count().await, 1);
    assert_eq!(h.metrics.tick_errors_total(), 1);

    // the retry collides with the exchange-side idempotency key
    h.mock.reject_next_add_order().await;
    h.trader.run().await;

    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert_eq!(trade.status, TradeStatus::BuyLimitWantsPublish);
    assert_eq!(h.mock.order_count().await, 1);
    assert_eq!(h.mock.add_order_calls(), 2);
}

#[tokio::test]
async fn reinvested_profit_grows_the_next_lot() {
    let h = harness(true).await;

    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert!((trade.base_volume - 0.0005).abs() < 1e-12);
    h.mock.fill_order(APP_ID, &trade.buy_order_id).await;
    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    h.mock.fill_order(APP_ID, &trade.sell_order_id).await;
    h.trader.run().await;

    // the freed step was refilled with the profit folded into the lot
    let fresh = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert_ne!(fresh.id, trade.id);
    assert!((fresh.base_volume - (10.0 + 0.05) / 20000.0).abs() < 1e-9);

    let history = h.ledger.balance_history(APP_ID).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, Some(BalanceAction::CashedIn));
    let reinvest = &history[1];
    assert_eq!(reinvest.action, Some(BalanceAction::Reinvest));
    assert_eq!(reinvest.trade_id, fresh.id);
    assert!((reinvest.quote_volume - 0.05).abs() < 1e-9);
    assert!((reinvest.total_net_income - 0.05).abs() < 1e-9);
    assert!((reinvest.total_reinvested - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn partial_fills_leave_the_trade_published() {
    let h = harness(false).await;

    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    h.mock
        .set_order_status(APP_ID, &trade.buy_order_id, OrderStatus::PartiallyFilled)
        .await;

    h.trader.run().await;
    let after = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert_eq!(after.status, TradeStatus::BuyLimitPublished);
    assert!(after.sell_order_id.is_empty());
    assert_eq!(h.metrics.tick_errors_total(), 0);
}

#[tokio::test]
async fn unexpected_order_status_degrades_the_tick_only() {
    let h = harness(false).await;

    h.trader.run().await;
    let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    h.mock
        .set_order_status(APP_ID, &trade.buy_order_id, OrderStatus::Canceled)
        .await;

    h.trader.run().await;
    let after = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
    assert_eq!(after.status, TradeStatus::BuyLimitPublished);
    assert_eq!(h.metrics.tick_errors_total(), 1);
}

#[tokio::test]
async fn balance_totals_are_prefix_sums() {
    let h = harness(true).await;

    // run two full cycles
    for _ in 0..2 {
        h.trader.run().await;
        let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
        if trade.status == TradeStatus::BuyLimitPublished {
            h.mock.fill_order(APP_ID, &trade.buy_order_id).await;
            h.trader.run().await;
        }
        let trade = h.ledger.active_trades(APP_ID).await.unwrap().remove(0);
        h.mock.fill_order(APP_ID, &trade.sell_order_id).await;
        h.trader.run().await;
    }

    let history = h.ledger.balance_history(APP_ID).await.unwrap();
    assert!(history.len() >= 2);

    let mut net = 0.0;
    let mut reinvested = 0.0;
    for row in &history {
        match row.action {
            Some(BalanceAction::CashedIn) => net += row.quote_volume,
            Some(BalanceAction::Reinvest) => reinvested += row.quote_volume,
            None => panic!("row without action"),
        }
        assert!((row.total_net_income - net).abs() < 1e-9);
        assert!((row.total_reinvested - reinvested).abs() < 1e-9);
    }
}
