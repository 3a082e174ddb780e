use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use common::{AppConfig, AppStatus, BalanceAction, BalanceHistory, Trade, TradeStatus};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};

pub mod entities;
pub mod migration;

use entities::{apps, balance_history, trades};

/// Durable home of apps, trades and balance history.
///
/// Thin wrapper over a sea-orm connection pool; every method is one coarse
/// query so callers never hold connections across awaits of their own.
#[derive(Clone)]
pub struct Ledger {
    db: DatabaseConnection,
}

impl Ledger {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self> {
        let mut opts = ConnectOptions::new(url.to_string());
        if url.contains(":memory:") {
            // each pooled connection to an in-memory sqlite gets its own
            // database, so the pool must stay at one
            opts.max_connections(1);
        }
        let db = Database::connect(opts)
            .await
            .with_context(|| format!("ledger connect failed: {url}"))?;
        migration::run_migrations(&db).await?;
        Ok(Ledger { db })
    }

    pub async fn apps(&self) -> Result<Vec<AppConfig>> {
        let rows = apps::Entity::find()
            .order_by_asc(apps::Column::AppId)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(app_from_model).collect())
    }

    /// Every trade of the app that has not reached CLOSED.
    pub async fn active_trades(&self, app_id: i32) -> Result<Vec<Trade>> {
        let rows = trades::Entity::find()
            .filter(trades::Column::AppId.eq(app_id))
            .filter(trades::Column::Status.ne(TradeStatus::Closed.as_str()))
            .order_by_asc(trades::Column::Id)
            .all(&self.db)
            .await?;
        rows.into_iter().map(trade_from_model).collect()
    }

    pub async fn add_trade(&self, trade: &Trade) -> Result<i32> {
        insert_trade(&self.db, trade).await
    }

    /// Insert a trade and, when `quote_reinvested` is positive, the matching
    /// REINVEST balance row, as one transaction. A crash can therefore never
    /// leave a reinvested trade without its accounting row (which would
    /// double-count the profit on the next tick).
    pub async fn add_trade_with_reinvest(
        &self,
        trade: &Trade,
        quote_reinvested: f64,
    ) -> Result<i32> {
        if quote_reinvested <= 0.0 {
            return self.add_trade(trade).await;
        }

        let txn = self.db.begin().await?;
        let trade_id = insert_trade(&txn, trade).await?;
        let prev = latest_balance(&txn, trade.app_id).await?;
        let row = BalanceHistory {
            app_id: trade.app_id,
            action: Some(BalanceAction::Reinvest),
            quote_volume: quote_reinvested,
            total_net_income: prev.total_net_income,
            total_reinvested: prev.total_reinvested + quote_reinvested,
            trade_id,
            created_at: Some(Utc::now()),
        };
        insert_balance(&txn, &row).await?;
        txn.commit().await?;

        Ok(trade_id)
    }

    /// Persist the mutable side of a trade. Prices, volume and ownership are
    /// fixed at insert time and deliberately not part of the update.
    pub async fn update_trade(&self, trade: &Trade) -> Result<()> {
        let model = trades::ActiveModel {
            id: Set(trade.id),
            open_type: Set(order_type_to_column(trade.open_type)),
            close_type: Set(order_type_to_column(trade.close_type)),
            buy_order_id: Set(trade.buy_order_id.clone()),
            sell_order_id: Set(trade.sell_order_id.clone()),
            status: Set(trade.status.as_str().to_string()),
            converted_sell_limit_at: Set(trade.converted_sell_limit_at),
            closed_at: Set(trade.closed_at),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        model.update(&self.db).await?;
        Ok(())
    }

    /// Most recently closed trade at a given grid step, if any. Feeds the
    /// sticky-lot rule of the profit compounder.
    pub async fn latest_closed_trade_by_open_price(
        &self,
        app_id: i32,
        open_price: f64,
    ) -> Result<Option<Trade>> {
        let row = trades::Entity::find()
            .filter(trades::Column::AppId.eq(app_id))
            .filter(trades::Column::OpenBasePrice.eq(open_price))
            .filter(trades::Column::Status.eq(TradeStatus::Closed.as_str()))
            .order_by_desc(trades::Column::Id)
            .one(&self.db)
            .await?;
        row.map(trade_from_model).transpose()
    }

    /// Latest balance row of the app, or an all-zero row when the app has no
    /// history yet.
    pub async fn latest_balance_history(&self, app_id: i32) -> Result<BalanceHistory> {
        latest_balance(&self.db, app_id).await
    }

    /// Latest balance row referencing one specific trade, if any. This is the
    /// idempotency probe for close accounting.
    pub async fn latest_trade_balance_history(
        &self,
        app_id: i32,
        trade_id: i32,
    ) -> Result<Option<BalanceHistory>> {
        let row = balance_history::Entity::find()
            .filter(balance_history::Column::AppId.eq(app_id))
            .filter(balance_history::Column::TradeId.eq(trade_id))
            .order_by_desc(balance_history::Column::Id)
            .one(&self.db)
            .await?;
        row.map(balance_from_model).transpose()
    }

    pub async fn add_balance_history(&self, row: &BalanceHistory) -> Result<()> {
        insert_balance(&self.db, row).await
    }

    /// Raw connection handle for seeding and admin tooling.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Full balance log of an app in insertion order.
    pub async fn balance_history(&self, app_id: i32) -> Result<Vec<BalanceHistory>> {
        let rows = balance_history::Entity::find()
            .filter(balance_history::Column::AppId.eq(app_id))
            .order_by_asc(balance_history::Column::Id)
            .all(&self.db)
            .await?;
        rows.into_iter().map(balance_from_model).collect()
    }
}

async fn insert_trade<C: ConnectionTrait>(conn: &C, trade: &Trade) -> Result<i32> {
    let model = trades::ActiveModel {
        id: NotSet,
        app_id: Set(trade.app_id),
        open_base_price: Set(trade.open_base_price),
        close_base_price: Set(trade.close_base_price),
        open_type: Set(order_type_to_column(trade.open_type)),
        close_type: Set(order_type_to_column(trade.close_type)),
        base_volume: Set(trade.base_volume),
        buy_order_id: Set(trade.buy_order_id.clone()),
        sell_order_id: Set(trade.sell_order_id.clone()),
        status: Set(trade.status.as_str().to_string()),
        converted_sell_limit_at: Set(trade.converted_sell_limit_at),
        closed_at: Set(trade.closed_at),
        updated_at: Set(trade.updated_at),
        created_at: Set(trade.created_at),
    };
    let res = trades::Entity::insert(model).exec(conn).await?;
    Ok(res.last_insert_id)
}

async fn latest_balance<C: ConnectionTrait>(conn: &C, app_id: i32) -> Result<BalanceHistory> {
    let row = balance_history::Entity::find()
        .filter(balance_history::Column::AppId.eq(app_id))
        .order_by_desc(balance_history::Column::Id)
        .one(conn)
        .await?;
    match row {
        Some(model) => balance_from_model(model),
        None => Ok(BalanceHistory {
            app_id,
            ..BalanceHistory::default()
        }),
    }
}

async fn insert_balance<C: ConnectionTrait>(conn: &C, row: &BalanceHistory) -> Result<()> {
    let action = row
        .action
        .context("balance history row without an action")?;
    let model = balance_history::ActiveModel {
        id: NotSet,
        app_id: Set(row.app_id),
        action: Set(action.as_str().to_string()),
        quote_volume: Set(row.quote_volume),
        total_quote_net_income: Set(row.total_net_income),
        total_quote_reinvested: Set(row.total_reinvested),
        trade_id: Set(row.trade_id),
        created_at: Set(row.created_at),
    };
    balance_history::Entity::insert(model).exec(conn).await?;
    Ok(())
}

fn app_from_model(model: apps::Model) -> AppConfig {
    AppConfig {
        id: model.app_id,
        interval: Duration::from_millis(model.run_interval_ms.max(0) as u64),
        exchange: model.exchange,
        market_order_fees: model.market_order_fees,
        limit_order_fees: model.limit_order_fees,
        base: model.base,
        quote: model.quote,
        min_base_price: model.min_base_price,
        max_base_price: model.max_base_price,
        step_quote_volume: model.step_quote_volume,
        steps_type: model.steps_type,
        steps_details: model.steps_details,
        compound_type: model.compound_type,
        compound_details: model.compound_details,
        publish_orders_number: model.publish_orders_number,
        status: AppStatus::parse(&model.status),
    }
}

fn trade_from_model(model: trades::Model) -> Result<Trade> {
    let status = model
        .status
        .parse::<TradeStatus>()
        .with_context(|| format!("trade {} has a corrupt status", model.id))?;
    Ok(Trade {
        id: model.id,
        app_id: model.app_id,
        open_base_price: model.open_base_price,
        close_base_price: model.close_base_price,
        open_type: order_type_from_column(&model.open_type)?,
        close_type: order_type_from_column(&model.close_type)?,
        base_volume: model.base_volume,
        buy_order_id: model.buy_order_id,
        sell_order_id: model.sell_order_id,
        status,
        converted_sell_limit_at: model.converted_sell_limit_at,
        closed_at: model.closed_at,
        updated_at: model.updated_at,
        created_at: model.created_at,
    })
}

fn balance_from_model(model: balance_history::Model) -> Result<BalanceHistory> {
    let action = model
        .action
        .parse::<BalanceAction>()
        .with_context(|| format!("balance row {} has a corrupt action", model.id))?;
    Ok(BalanceHistory {
        app_id: model.app_id,
        action: Some(action),
        quote_volume: model.quote_volume,
        total_net_income: model.total_quote_net_income,
        total_reinvested: model.total_quote_reinvested,
        trade_id: model.trade_id,
        created_at: model.created_at,
    })
}

fn order_type_to_column(value: Option<common::OrderType>) -> String {
    value.map(|t| t.as_str().to_string()).unwrap_or_default()
}

fn order_type_from_column(raw: &str) -> Result<Option<common::OrderType>> {
    if raw.is_empty() {
        return Ok(None);
    }
    Ok(Some(raw.parse::<common::OrderType>()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderType;

    async fn memory_ledger() -> Ledger {
        Ledger::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_trade(app_id: i32, open: f64) -> Trade {
        Trade::open(app_id, open, open + 100.0, 0.0005)
    }

    #[tokio::test]
    async fn trade_round_trip_and_active_filter() {
        let ledger = memory_ledger().await;

        let id = ledger.add_trade(&sample_trade(7, 20000.0)).await.unwrap();
        assert!(id > 0);

        let mut active = ledger.active_trades(7).await.unwrap();
        assert_eq!(active.len(), 1);
        let mut trade = active.pop().unwrap();
        assert_eq!(trade.status, TradeStatus::BuyLimit);
        assert_eq!(trade.open_base_price, 20000.0);
        assert_eq!(trade.open_type, None);

        trade.status = TradeStatus::Closed;
        trade.open_type = Some(OrderType::Limit);
        trade.closed_at = Some(Utc::now());
        ledger.update_trade(&trade).await.unwrap();

        assert!(ledger.active_trades(7).await.unwrap().is_empty());
        let closed = ledger
            .latest_closed_trade_by_open_price(7, 20000.0)
            .await
            .unwrap()
            .expect("closed trade should be found");
        assert_eq!(closed.id, trade.id);
        assert_eq!(closed.open_type, Some(OrderType::Limit));
        assert!(closed.updated_at.is_some());
    }

    #[tokio::test]
    async fn latest_closed_trade_prefers_newest() {
        let ledger = memory_ledger().await;
        for volume in [0.0005, 0.0007] {
            let mut trade = sample_trade(3, 20000.0);
            trade.base_volume = volume;
            let id = ledger.add_trade(&trade).await.unwrap();
            trade.id = id;
            trade.status = TradeStatus::Closed;
            ledger.update_trade(&trade).await.unwrap();
        }
        let latest = ledger
            .latest_closed_trade_by_open_price(3, 20000.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.base_volume, 0.0007);
        assert!(ledger
            .latest_closed_trade_by_open_price(3, 21000.0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn balance_history_defaults_and_ordering() {
        let ledger = memory_ledger().await;

        let empty = ledger.latest_balance_history(5).await.unwrap();
        assert_eq!(empty.total_net_income, 0.0);
        assert_eq!(empty.total_reinvested, 0.0);
        assert_eq!(empty.action, None);

        for (trade_id, income) in [(1, 0.05), (2, 0.11)] {
            ledger
                .add_balance_history(&BalanceHistory {
                    app_id: 5,
                    action: Some(BalanceAction::CashedIn),
                    quote_volume: income,
                    total_net_income: income,
                    total_reinvested: 0.0,
                    trade_id,
                    created_at: Some(Utc::now()),
                })
                .await
                .unwrap();
        }

        let latest = ledger.latest_balance_history(5).await.unwrap();
        assert_eq!(latest.trade_id, 2);
        assert_eq!(latest.quote_volume, 0.11);

        let by_trade = ledger
            .latest_trade_balance_history(5, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_trade.quote_volume, 0.05);
        assert!(ledger
            .latest_trade_balance_history(5, 99)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let ledger = memory_ledger().await;
        let row = BalanceHistory {
            app_id: 9,
            action: Some(BalanceAction::CashedIn),
            quote_volume: 0.05,
            total_net_income: 0.05,
            total_reinvested: 0.0,
            trade_id: 42,
            created_at: Some(Utc::now()),
        };
        ledger.add_balance_history(&row).await.unwrap();
        assert!(ledger.add_balance_history(&row).await.is_err());
    }

    #[tokio::test]
    async fn reinvested_trade_writes_both_rows() {
        let ledger = memory_ledger().await;
        ledger
            .add_balance_history(&BalanceHistory {
                app_id: 2,
                action: Some(BalanceAction::CashedIn),
                quote_volume: 0.05,
                total_net_income: 0.05,
                total_reinvested: 0.0,
                trade_id: 1,
                created_at: Some(Utc::now()),
            })
            .await
            .unwrap();

        let id = ledger
            .add_trade_with_reinvest(&sample_trade(2, 20000.0), 0.05)
            .await
            .unwrap();

        let latest = ledger.latest_balance_history(2).await.unwrap();
        assert_eq!(latest.action, Some(BalanceAction::Reinvest));
        assert_eq!(latest.trade_id, id);
        assert_eq!(latest.quote_volume, 0.05);
        assert_eq!(latest.total_net_income, 0.05);
        assert_eq!(latest.total_reinvested, 0.05);
    }

    #[tokio::test]
    async fn apps_parse_interval_and_status() {
        let ledger = memory_ledger().await;
        let model = apps::ActiveModel {
            id: NotSet,
            app_id: Set(11),
            run_interval_ms: Set(1500),
            exchange: Set("FAKE".into()),
            market_order_fees: Set(0.1),
            limit_order_fees: Set(0.2),
            base: Set("BTC".into()),
            quote: Set("USDT".into()),
            min_base_price: Set(20000.0),
            max_base_price: Set(21000.0),
            step_quote_volume: Set(10.0),
            steps_type: Set("FIX_INTERVAL".into()),
            steps_details: Set("100".into()),
            compound_type: Set("NONE".into()),
            compound_details: Set(String::new()),
            publish_orders_number: Set(10),
            status: Set("ACTIVE".into()),
        };
        apps::Entity::insert(model).exec(&ledger.db).await.unwrap();

        let apps = ledger.apps().await.unwrap();
        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert_eq!(app.id, 11);
        assert_eq!(app.interval, Duration::from_millis(1500));
        assert_eq!(app.status, AppStatus::Active);
    }
}
