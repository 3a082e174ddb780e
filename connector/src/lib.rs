mod binance;
mod cache;
mod mock;
mod rest;
mod types;

use async_trait::async_trait;
use chrono::Utc;
use common::{Order, PairInfo};

pub use binance::BinanceConnector;
pub use cache::OrderCache;
pub use mock::MockConnector;
pub use rest::RestClient;
pub use types::{BinanceOrder, OrderAck};

#[derive(Clone, Debug)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {code}: {body}")]
    HttpStatus { code: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unknown pair: {0}")]
    UnknownPair(String),
    #[error("unexpected response: {0}")]
    InvalidPayload(&'static str),
    #[error("missing api credentials for signed request")]
    MissingCredentials,
}

impl ConnectorError {
    /// True when the exchange understood and refused the request, e.g. a
    /// duplicate client order id or insufficient balance. Everything else is
    /// treated as transient and retried on a later tick.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ConnectorError::HttpStatus { code, .. } if (400..500).contains(code))
    }
}

/// Sole owner of exchange I/O for one exchange.
///
/// Callers get a synchronous-feeling contract; the adapter keeps an
/// order-status cache fresh with its own background poller so `order_details`
/// rarely touches the network.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Spawn the background poller. Must be called once before trading.
    async fn start(&self) -> Result<(), ConnectorError>;
    /// Stop the poller and wait for it to drain.
    async fn stop(&self);
    async fn pair_info(&self, base: &str, quote: &str) -> Result<PairInfo, ConnectorError>;
    /// Submit the order; returns the exchange order id. The generated client
    /// order id embeds the app id and a nanosecond clock so a lost-response
    /// retry collides with the exchange-side idempotency key instead of
    /// producing a second order.
    async fn add_order(&self, app_id: i32, order: &Order) -> Result<String, ConnectorError>;
    async fn cancel_order(&self, app_id: i32, order: &Order) -> Result<(), ConnectorError>;
    /// Cached view when present; otherwise a one-shot fetch that also fills
    /// the cache.
    async fn order_details(&self, app_id: i32, order: &Order) -> Result<Order, ConnectorError>;
    /// Snapshot of every cached order for the app.
    async fn orders_details(&self, app_id: i32) -> Vec<Order>;
}

/// Client order id carried to the exchange: `<app_id>_<unix_nanos>`.
pub fn make_client_order_id(app_id: i32) -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_millis() * 1_000_000);
    format!("{app_id}_{nanos}")
}

/// App id prefix of a client order id, when it is one of ours.
pub fn parse_client_order_id(client_order_id: &str) -> Option<i32> {
    let (app, nanos) = client_order_id.split_once('_')?;
    nanos.parse::<i64>().ok()?;
    app.parse::<i32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_id_round_trip() {
        let id = make_client_order_id(42);
        assert_eq!(parse_client_order_id(&id), Some(42));
    }

    #[test]
    fn foreign_client_order_ids_are_ignored() {
        assert_eq!(parse_client_order_id("web_1234"), None);
        assert_eq!(parse_client_order_id("17"), None);
        assert_eq!(parse_client_order_id("17_abc"), None);
        assert_eq!(parse_client_order_id(""), None);
    }

    #[test]
    fn rejection_classification() {
        let rejected = ConnectorError::HttpStatus {
            code: 400,
            body: "Duplicate order sent.".into(),
        };
        assert!(rejected.is_rejection());

        let transient = ConnectorError::HttpStatus {
            code: 503,
            body: "service unavailable".into(),
        };
        assert!(!transient.is_rejection());
        assert!(!ConnectorError::Network("timeout".into()).is_rejection());
    }
}
