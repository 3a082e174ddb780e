use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether the supervisor should keep a worker running for an app.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum AppStatus {
    Active,
    Inactive,
    /// Anything else found in the ledger; logged and left alone.
    Unknown(String),
}

impl AppStatus {
    pub fn parse(raw: &str) -> AppStatus {
        match raw {
            "ACTIVE" => AppStatus::Active,
            "INACTIVE" => AppStatus::Inactive,
            other => AppStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AppStatus::Active => "ACTIVE",
            AppStatus::Inactive => "INACTIVE",
            AppStatus::Unknown(raw) => raw.as_str(),
        }
    }
}

/// One configured trading instance as stored in the `apps` table.
///
/// The identity fields (exchange, pair, fees, steps type) are immutable after
/// creation; the rest may be edited by the operator, and any edit makes the
/// supervisor restart the app's worker with the fresh row.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub id: i32,
    pub interval: Duration,
    pub exchange: String,
    pub market_order_fees: f64,
    pub limit_order_fees: f64,
    pub base: String,
    pub quote: String,
    pub min_base_price: f64,
    pub max_base_price: f64,
    pub step_quote_volume: f64,
    pub steps_type: String,
    pub steps_details: String,
    pub compound_type: String,
    pub compound_details: String,
    pub publish_orders_number: i32,
    pub status: AppStatus,
}

impl AppConfig {
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}
