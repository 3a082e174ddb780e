use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown order type: {0}")]
pub struct ParseOrderTypeError(String);

impl FromStr for OrderType {
    type Err = ParseOrderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            other => Err(ParseOrderTypeError(other.to_string())),
        }
    }
}

/// Exchange-side order state as mirrored by the adapter cache.
///
/// `New` and `PartiallyFilled` are transient and leave the owning trade
/// untouched; `Executed` and `Canceled` are terminal; `NotFound` is what the
/// adapter reports for ids the exchange no longer knows.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Executed,
    Canceled,
    NotFound,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter view of one exchange order.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub id: String,
    pub base: String,
    pub quote: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
    pub status: OrderStatus,
}

impl Order {
    /// Partial order carrying just enough to look the real one up.
    pub fn lookup(id: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Order {
            id: id.into(),
            base: base.into(),
            quote: quote.into(),
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            price: 0.0,
            volume: 0.0,
            status: OrderStatus::NotFound,
        }
    }

    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}
