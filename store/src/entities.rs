use sea_orm::entity::prelude::*;

pub mod apps {
    use super::*;

    /// One configured trading application. Rows are created and edited by the
    /// operator; this system only ever reads them.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "apps")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        /// Operator-assigned application id, unique across the table.
        #[sea_orm(unique)]
        pub app_id: i32,
        /// Trader tick interval in milliseconds.
        pub run_interval_ms: i64,
        /// Exchange routing key (e.g. BINANCE, FAKE).
        pub exchange: String,
        /// Fee percentage applied to market orders.
        pub market_order_fees: f64,
        /// Fee percentage applied to limit orders.
        pub limit_order_fees: f64,
        pub base: String,
        pub quote: String,
        /// Lower bound of the price grid.
        pub min_base_price: f64,
        /// Upper bound of the price grid.
        pub max_base_price: f64,
        /// Quote volume committed per grid step before compounding.
        pub step_quote_volume: f64,
        /// Step generator kind, e.g. FIX_INTERVAL.
        pub steps_type: String,
        /// Generator-specific settings (FIX_INTERVAL: the grid interval).
        pub steps_details: String,
        /// Sizing policy kind, e.g. NONE or PROFIT_PERCENT.
        pub compound_type: String,
        pub compound_details: String,
        pub publish_orders_number: i32,
        /// ACTIVE or INACTIVE; anything else is ignored with a warning.
        pub status: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod trades {
    use super::*;

    /// One grid cell and its order lifecycle.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "trades")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub app_id: i32,
        /// Grid step this trade buys at.
        pub open_base_price: f64,
        /// Price the paired sell is placed at (step + grid interval).
        pub close_base_price: f64,
        /// Order type reported for the executed buy, empty until then.
        pub open_type: String,
        /// Order type reported for the executed sell, empty until then.
        pub close_type: String,
        /// Base lot size fixed at creation time.
        pub base_volume: f64,
        /// Exchange id of the published buy order; never cleared once set.
        pub buy_order_id: String,
        /// Exchange id of the published sell order; never cleared once set.
        pub sell_order_id: String,
        /// Serialized trade lifecycle state.
        pub status: String,
        pub converted_sell_limit_at: Option<DateTimeUtc>,
        pub closed_at: Option<DateTimeUtc>,
        pub updated_at: Option<DateTimeUtc>,
        pub created_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod balance_history {
    use super::*;

    /// Append-only accounting log. `id` ordering is the authoritative "latest"
    /// order; the running totals are snapshots taken after applying the row's
    /// delta. A unique index over (app_id, trade_id, action) enforces the
    /// idempotency key the trader relies on.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "balance_history")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub app_id: i32,
        /// CASHED_IN or REINVEST.
        pub action: String,
        /// Quote delta recorded by this row.
        pub quote_volume: f64,
        /// Running net income after this row.
        pub total_quote_net_income: f64,
        /// Running reinvested total after this row.
        pub total_quote_reinvested: f64,
        /// Trade this row accounts for.
        pub trade_id: i32,
        pub created_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
