use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::OrderType;

/// Lifecycle state of one grid cell.
///
/// A trade walks the chain buy -> sell -> closed; the `WantsPublish` and
/// `Published` stages track whether a live order backs the current side.
/// Transitions only ever move forward along the chain.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum TradeStatus {
    BuyLimit,
    BuyLimitWantsPublish,
    BuyLimitPublished,
    BuyLimitExecuted,
    SellLimit,
    SellLimitWantsPublish,
    SellLimitPublished,
    SellLimitExecuted,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::BuyLimit => "BUY_LIMIT",
            TradeStatus::BuyLimitWantsPublish => "BUY_LIMIT_WANTS_PUBLISH",
            TradeStatus::BuyLimitPublished => "BUY_LIMIT_PUBLISHED",
            TradeStatus::BuyLimitExecuted => "BUY_LIMIT_EXECUTED",
            TradeStatus::SellLimit => "SELL_LIMIT",
            TradeStatus::SellLimitWantsPublish => "SELL_LIMIT_WANTS_PUBLISH",
            TradeStatus::SellLimitPublished => "SELL_LIMIT_PUBLISHED",
            TradeStatus::SellLimitExecuted => "SELL_LIMIT_EXECUTED",
            TradeStatus::Closed => "CLOSED",
        }
    }

    /// True while an exchange order for the current side is live.
    pub fn is_published(&self) -> bool {
        matches!(
            self,
            TradeStatus::BuyLimitPublished | TradeStatus::SellLimitPublished
        )
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown trade status: {0}")]
pub struct ParseTradeStatusError(String);

impl FromStr for TradeStatus {
    type Err = ParseTradeStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY_LIMIT" => Ok(TradeStatus::BuyLimit),
            "BUY_LIMIT_WANTS_PUBLISH" => Ok(TradeStatus::BuyLimitWantsPublish),
            "BUY_LIMIT_PUBLISHED" => Ok(TradeStatus::BuyLimitPublished),
            "BUY_LIMIT_EXECUTED" => Ok(TradeStatus::BuyLimitExecuted),
            "SELL_LIMIT" => Ok(TradeStatus::SellLimit),
            "SELL_LIMIT_WANTS_PUBLISH" => Ok(TradeStatus::SellLimitWantsPublish),
            "SELL_LIMIT_PUBLISHED" => Ok(TradeStatus::SellLimitPublished),
            "SELL_LIMIT_EXECUTED" => Ok(TradeStatus::SellLimitExecuted),
            "CLOSED" => Ok(TradeStatus::Closed),
            other => Err(ParseTradeStatusError(other.to_string())),
        }
    }
}

/// One grid cell: a buy at `open_base_price` paired with a sell at
/// `close_base_price`, cycling through [`TradeStatus`] until closed.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    pub id: i32,
    pub app_id: i32,
    pub open_base_price: f64,
    pub close_base_price: f64,
    /// Order type the exchange reported for the executed open order.
    pub open_type: Option<OrderType>,
    /// Order type the exchange reported for the executed close order.
    pub close_type: Option<OrderType>,
    pub base_volume: f64,
    /// Exchange order id of the published buy order, empty until published.
    /// Never cleared once set.
    pub buy_order_id: String,
    /// Exchange order id of the published sell order, empty until published.
    /// Never cleared once set.
    pub sell_order_id: String,
    pub status: TradeStatus,
    pub converted_sell_limit_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Fresh grid cell ready for insertion.
    pub fn open(app_id: i32, open_base_price: f64, close_base_price: f64, base_volume: f64) -> Self {
        Trade {
            id: 0,
            app_id,
            open_base_price,
            close_base_price,
            open_type: None,
            close_type: None,
            base_volume,
            buy_order_id: String::new(),
            sell_order_id: String::new(),
            status: TradeStatus::BuyLimit,
            converted_sell_limit_at: None,
            closed_at: None,
            updated_at: None,
            created_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        let all = [
            TradeStatus::BuyLimit,
            TradeStatus::BuyLimitWantsPublish,
            TradeStatus::BuyLimitPublished,
            TradeStatus::BuyLimitExecuted,
            TradeStatus::SellLimit,
            TradeStatus::SellLimitWantsPublish,
            TradeStatus::SellLimitPublished,
            TradeStatus::SellLimitExecuted,
            TradeStatus::Closed,
        ];
        for status in all {
            assert_eq!(status.as_str().parse::<TradeStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<TradeStatus>().is_err());
    }

    #[test]
    fn published_states() {
        assert!(TradeStatus::BuyLimitPublished.is_published());
        assert!(TradeStatus::SellLimitPublished.is_published());
        assert!(!TradeStatus::BuyLimit.is_published());
        assert!(!TradeStatus::Closed.is_published());
    }
}
