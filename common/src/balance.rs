use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum BalanceAction {
    /// Net profit realized when a trade closed.
    CashedIn,
    /// Previously cashed-in profit committed to a larger lot on a new trade.
    Reinvest,
}

impl BalanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceAction::CashedIn => "CASHED_IN",
            BalanceAction::Reinvest => "REINVEST",
        }
    }
}

impl fmt::Display for BalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown balance action: {0}")]
pub struct ParseBalanceActionError(String);

impl FromStr for BalanceAction {
    type Err = ParseBalanceActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASHED_IN" => Ok(BalanceAction::CashedIn),
            "REINVEST" => Ok(BalanceAction::Reinvest),
            other => Err(ParseBalanceActionError(other.to_string())),
        }
    }
}

/// Append-only accounting row.
///
/// `total_net_income` and `total_reinvested` are running totals snapshotted
/// after applying `quote_volume`, so the latest row per app is the current
/// balance. At most one row may exist per (app, trade, action); that unique
/// key is what makes close and reinvest accounting idempotent across crashes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BalanceHistory {
    pub app_id: i32,
    pub action: Option<BalanceAction>,
    pub quote_volume: f64,
    pub total_net_income: f64,
    pub total_reinvested: f64,
    pub trade_id: i32,
    pub created_at: Option<DateTime<Utc>>,
}

impl BalanceHistory {
    /// Quote profit not yet committed to a larger lot.
    pub fn available_quote(&self) -> f64 {
        self.total_net_income - self.total_reinvested
    }
}
