use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{constant::BINANCE_SPOT_API_BASE, Order, OrderStatus, OrderType, PairInfo};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::OrderCache;
use crate::rest::RestClient;
use crate::types::{map_order_side, map_order_status, map_order_type, BinanceOrder};
use crate::{make_client_order_id, parse_client_order_id, BinanceCredentials, Connector, ConnectorError};

/// Binance spot adapter: REST calls plus one background poller that keeps the
/// shared order cache in sync with the exchange.
pub struct BinanceConnector {
    rest: Arc<RestClient>,
    cache: Arc<OrderCache>,
    /// symbol -> (base, quote), registered by `pair_info`/`add_order` so the
    /// poller can rebuild domain orders from wire symbols.
    symbols: Arc<Mutex<HashMap<String, (String, String)>>>,
    poll_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl BinanceConnector {
    pub fn new(credentials: Option<BinanceCredentials>, poll_interval: Duration) -> Self {
        Self::with_endpoint(BINANCE_SPOT_API_BASE, credentials, poll_interval)
    }

    pub fn with_endpoint(
        endpoint: &str,
        credentials: Option<BinanceCredentials>,
        poll_interval: Duration,
    ) -> Self {
        BinanceConnector {
            rest: Arc::new(RestClient::new(endpoint, credentials)),
            cache: Arc::new(OrderCache::new()),
            symbols: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
            shutdown: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    async fn register_symbol(&self, base: &str, quote: &str) {
        let mut symbols = self.symbols.lock().await;
        symbols.insert(format!("{base}{quote}"), (base.to_string(), quote.to_string()));
    }
}

#[async_trait]
impl Connector for BinanceConnector {
    async fn start(&self) -> Result<(), ConnectorError> {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return Ok(());
        }
        let (tx, mut rx) = watch::channel(false);
        let rest = Arc::clone(&self.rest);
        let cache = Arc::clone(&self.cache);
        let symbols = Arc::clone(&self.symbols);
        let interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            loop {
                if *rx.borrow() {
                    break;
                }
                if let Err(err) = poll_once(&rest, &cache, &symbols).await {
                    warn!(?err, "order poll failed");
                }
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = sleep(interval) => {}
                }
            }
            debug!("binance poller drained");
        });
        *poller = Some(handle);
        *self.shutdown.lock().await = Some(tx);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.poller.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn pair_info(&self, base: &str, quote: &str) -> Result<PairInfo, ConnectorError> {
        let info = self.rest.fetch_pair_info(base, quote).await?;
        self.register_symbol(base, quote).await;
        Ok(info)
    }

    async fn add_order(&self, app_id: i32, order: &Order) -> Result<String, ConnectorError> {
        self.register_symbol(&order.base, &order.quote).await;
        let price = match order.order_type {
            OrderType::Limit => Some(order.price),
            OrderType::Market => None,
        };
        let ack = self
            .rest
            .place_order(
                &order.symbol(),
                order.side.as_str(),
                order.order_type.as_str(),
                order.volume,
                price,
                &make_client_order_id(app_id),
            )
            .await?;
        Ok(ack.order_id.to_string())
    }

    async fn cancel_order(&self, _app_id: i32, order: &Order) -> Result<(), ConnectorError> {
        self.rest.cancel_order(&order.symbol(), &order.id).await
    }

    async fn order_details(&self, app_id: i32, order: &Order) -> Result<Order, ConnectorError> {
        if let Some(cached) = self.cache.get(app_id, &order.id).await {
            return Ok(cached);
        }
        match self.rest.query_order(&order.symbol(), &order.id).await {
            Ok(wire) => {
                let fetched = order_from_wire(&wire, &order.base, &order.quote)
                    .ok_or(ConnectorError::InvalidPayload("unmapped order fields"))?;
                self.cache.insert(app_id, fetched.clone()).await;
                Ok(fetched)
            }
            Err(err) if err.is_rejection() => {
                // the exchange no longer knows the id; remember that
                let mut missing = order.clone();
                missing.status = OrderStatus::NotFound;
                self.cache.insert(app_id, missing.clone()).await;
                Ok(missing)
            }
            Err(err) => Err(err),
        }
    }

    async fn orders_details(&self, app_id: i32) -> Vec<Order> {
        self.cache.snapshot(app_id).await
    }
}

/// One poll cycle: learn open orders we have not seen, then re-fetch cached
/// orders that fell out of the open list so terminal statuses land in the
/// cache.
async fn poll_once(
    rest: &RestClient,
    cache: &OrderCache,
    symbols: &Mutex<HashMap<String, (String, String)>>,
) -> Result<(), ConnectorError> {
    let open = rest.open_orders().await?;
    let pairs = symbols.lock().await.clone();

    let mut open_ids: HashSet<(i32, String)> = HashSet::new();
    for wire in &open {
        let Some(app_id) = parse_client_order_id(&wire.client_order_id) else {
            continue;
        };
        let Some((base, quote)) = pairs.get(&wire.symbol) else {
            debug!(symbol = %wire.symbol, "open order for unregistered symbol");
            continue;
        };
        open_ids.insert((app_id, wire.order_id.to_string()));
        if let Some(order) = order_from_wire(wire, base, quote) {
            cache.insert_if_absent(app_id, order).await;
        }
    }

    for (app_id, cached) in cache.entries().await {
        if matches!(
            cached.status,
            OrderStatus::Executed | OrderStatus::Canceled | OrderStatus::NotFound
        ) {
            continue;
        }
        if open_ids.contains(&(app_id, cached.id.clone())) {
            continue;
        }
        match rest.query_order(&cached.symbol(), &cached.id).await {
            Ok(wire) => {
                if let Some(order) = order_from_wire(&wire, &cached.base, &cached.quote) {
                    cache.insert(app_id, order).await;
                }
            }
            Err(err) if err.is_rejection() => {
                let mut missing = cached.clone();
                missing.status = OrderStatus::NotFound;
                cache.insert(app_id, missing).await;
            }
            Err(err) => {
                warn!(?err, order_id = %cached.id, "failed to refresh disappeared order");
            }
        }
    }

    Ok(())
}

fn order_from_wire(wire: &BinanceOrder, base: &str, quote: &str) -> Option<Order> {
    let status = match map_order_status(&wire.status) {
        Some(status) => status,
        None => {
            warn!(status = %wire.status, order_id = wire.order_id, "unknown exchange order status");
            return None;
        }
    };
    Some(Order {
        id: wire.order_id.to_string(),
        base: base.to_string(),
        quote: quote.to_string(),
        order_type: map_order_type(&wire.order_type)?,
        side: map_order_side(&wire.side)?,
        price: wire.price.parse().ok()?,
        volume: wire.orig_qty.parse().ok()?,
        status,
    })
}
