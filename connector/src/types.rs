use common::{OrderSide, OrderStatus, OrderType};
use serde::Deserialize;

/// Acknowledgement returned by the order-placement endpoint.
#[derive(Debug, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderId")]
    pub order_id: i64,
}

/// Subset of the Binance order payload the adapter cares about, shared by the
/// single-order lookup and the open-orders listing.
#[derive(Debug, Deserialize)]
pub struct BinanceOrder {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub price: String,
    #[serde(rename = "origQty")]
    pub orig_qty: String,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfoSymbol {
    pub symbol: String,
    #[serde(rename = "baseAssetPrecision")]
    pub base_asset_precision: u32,
    #[serde(rename = "quoteAssetPrecision", alias = "quotePrecision")]
    pub quote_asset_precision: u32,
    pub filters: Vec<ExchangeInfoFilter>,
}

/// One entry of the per-symbol filter list. Binance keys every numeric field
/// as a string and varies the set per `filterType`, hence all the options.
#[derive(Debug, Deserialize)]
pub struct ExchangeInfoFilter {
    #[serde(rename = "filterType")]
    pub filter_type: String,
    #[serde(rename = "minPrice")]
    pub min_price: Option<String>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<String>,
    #[serde(rename = "tickSize")]
    pub tick_size: Option<String>,
    #[serde(rename = "minQty")]
    pub min_qty: Option<String>,
    #[serde(rename = "maxQty")]
    pub max_qty: Option<String>,
    #[serde(rename = "stepSize")]
    pub step_size: Option<String>,
    #[serde(rename = "minNotional", alias = "notional")]
    pub min_notional: Option<String>,
}

/// Map an exchange order status string onto the cache vocabulary. `None`
/// means the exchange introduced something we do not understand; callers log
/// and skip rather than guess.
pub fn map_order_status(raw: &str) -> Option<OrderStatus> {
    match raw {
        "NEW" => Some(OrderStatus::New),
        "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
        "FILLED" => Some(OrderStatus::Executed),
        "CANCELED" | "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => Some(OrderStatus::Canceled),
        _ => None,
    }
}

pub fn map_order_type(raw: &str) -> Option<OrderType> {
    match raw {
        "LIMIT" | "LIMIT_MAKER" => Some(OrderType::Limit),
        "MARKET" => Some(OrderType::Market),
        _ => None,
    }
}

pub fn map_order_side(raw: &str) -> Option<OrderSide> {
    match raw {
        "BUY" => Some(OrderSide::Buy),
        "SELL" => Some(OrderSide::Sell),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_terminal_states() {
        assert_eq!(map_order_status("FILLED"), Some(OrderStatus::Executed));
        assert_eq!(map_order_status("CANCELED"), Some(OrderStatus::Canceled));
        assert_eq!(map_order_status("EXPIRED"), Some(OrderStatus::Canceled));
        assert_eq!(map_order_status("PENDING_CANCEL"), None);
    }
}
