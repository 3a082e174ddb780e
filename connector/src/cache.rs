use std::collections::HashMap;

use common::Order;
use tokio::sync::Mutex;

/// Mirror of exchange order state keyed by (app id, exchange order id).
///
/// The adapter's poller is the writer; traders read snapshots. A reader may
/// promote itself to a writer on a cache miss, which is why the map sits
/// behind an async mutex rather than a read-write lock.
#[derive(Default)]
pub struct OrderCache {
    orders: Mutex<HashMap<(i32, String), Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, app_id: i32, order_id: &str) -> Option<Order> {
        let orders = self.orders.lock().await;
        orders.get(&(app_id, order_id.to_string())).cloned()
    }

    /// Insert or overwrite; overwriting is how terminal statuses propagate.
    pub async fn insert(&self, app_id: i32, order: Order) {
        let mut orders = self.orders.lock().await;
        orders.insert((app_id, order.id.clone()), order);
    }

    /// Insert only when unseen, preserving a terminal status already cached.
    pub async fn insert_if_absent(&self, app_id: i32, order: Order) {
        let mut orders = self.orders.lock().await;
        orders.entry((app_id, order.id.clone())).or_insert(order);
    }

    pub async fn snapshot(&self, app_id: i32) -> Vec<Order> {
        let orders = self.orders.lock().await;
        orders
            .iter()
            .filter(|((owner, _), _)| *owner == app_id)
            .map(|(_, order)| order.clone())
            .collect()
    }

    /// Every cached entry, for the poller's disappeared-order sweep.
    pub async fn entries(&self) -> Vec<(i32, Order)> {
        let orders = self.orders.lock().await;
        orders
            .iter()
            .map(|((app_id, _), order)| (*app_id, order.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderSide, OrderStatus, OrderType};

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.to_string(),
            base: "BTC".into(),
            quote: "USDT".into(),
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            price: 20000.0,
            volume: 0.0005,
            status,
        }
    }

    #[tokio::test]
    async fn snapshot_is_scoped_per_app() {
        let cache = OrderCache::new();
        cache.insert(1, order("a", OrderStatus::New)).await;
        cache.insert(2, order("b", OrderStatus::New)).await;

        assert_eq!(cache.snapshot(1).await.len(), 1);
        assert_eq!(cache.snapshot(2).await.len(), 1);
        assert!(cache.get(1, "b").await.is_none());
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_terminal_status() {
        let cache = OrderCache::new();
        cache.insert(1, order("a", OrderStatus::Executed)).await;
        cache.insert_if_absent(1, order("a", OrderStatus::New)).await;

        let cached = cache.get(1, "a").await.unwrap();
        assert_eq!(cached.status, OrderStatus::Executed);

        cache.insert(1, order("a", OrderStatus::New)).await;
        assert_eq!(cache.get(1, "a").await.unwrap().status, OrderStatus::New);
    }
}
