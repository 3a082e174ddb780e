use serde::{Deserialize, Serialize};

/// min/max plus the smallest permitted increment.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeFilter {
    pub min: f64,
    pub max: f64,
    pub tick: f64,
}

impl RangeFilter {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Immutable per-pair exchange metadata, fetched once when an app starts.
///
/// Used to validate operator-supplied price ranges and to round prices and
/// lot sizes to something the exchange will accept.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PairInfo {
    pub base_price_precision: u32,
    pub quote_price_precision: u32,
    pub price: RangeFilter,
    pub lot: RangeFilter,
    /// Minimum order notional in quote units.
    pub min_quote_volume: f64,
}
