use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use common::{Order, OrderStatus, PairInfo, RangeFilter};
use tokio::sync::Mutex;

use crate::{Connector, ConnectorError};

/// In-memory exchange used by the FAKE exchange routing and by the test
/// suites. Orders accumulate in a map and stay NEW until something flips
/// them, which lets a test script exactly the exchange behavior it needs.
pub struct MockConnector {
    pair_info: PairInfo,
    orders: Mutex<HashMap<(i32, String), Order>>,
    next_id: AtomicI64,
    add_order_calls: AtomicU64,
    /// When set, the next add still records the order but the response is
    /// "lost": the caller gets a network error.
    lose_next_add_response: Mutex<bool>,
    /// When set, the next add is refused outright, as the exchange does for
    /// a duplicate client order id.
    reject_next_add: Mutex<bool>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        MockConnector {
            pair_info: PairInfo {
                base_price_precision: 8,
                quote_price_precision: 8,
                price: RangeFilter {
                    min: 0.01,
                    max: 1_000_000.0,
                    tick: 0.01,
                },
                lot: RangeFilter {
                    min: 0.00000001,
                    max: 9_000.0,
                    tick: 0.00000001,
                },
                min_quote_volume: 10.0,
            },
            orders: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            add_order_calls: AtomicU64::new(0),
            lose_next_add_response: Mutex::new(false),
            reject_next_add: Mutex::new(false),
        }
    }

    /// Mark an order executed, as the exchange would after a fill.
    pub async fn fill_order(&self, app_id: i32, order_id: &str) {
        self.set_order_status(app_id, order_id, OrderStatus::Executed)
            .await;
    }

    pub async fn set_order_status(&self, app_id: i32, order_id: &str, status: OrderStatus) {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders.get_mut(&(app_id, order_id.to_string())) {
            order.status = status;
        }
    }

    /// Simulate an accepted order whose response never reached us.
    pub async fn lose_next_add_order_response(&self) {
        *self.lose_next_add_response.lock().await = true;
    }

    /// Simulate an outright exchange rejection of the next order.
    pub async fn reject_next_add_order(&self) {
        *self.reject_next_add.lock().await = true;
    }

    pub fn add_order_calls(&self) -> u64 {
        self.add_order_calls.load(Ordering::Relaxed)
    }

    pub async fn order_count(&self) -> usize {
        self.orders.lock().await.len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn start(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn pair_info(&self, _base: &str, _quote: &str) -> Result<PairInfo, ConnectorError> {
        Ok(self.pair_info.clone())
    }

    async fn add_order(&self, app_id: i32, order: &Order) -> Result<String, ConnectorError> {
        self.add_order_calls.fetch_add(1, Ordering::Relaxed);

        if std::mem::take(&mut *self.reject_next_add.lock().await) {
            return Err(ConnectorError::HttpStatus {
                code: 400,
                body: "Duplicate order sent.".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut accepted = order.clone();
        accepted.id = id.clone();
        accepted.status = OrderStatus::New;
        self.orders
            .lock()
            .await
            .insert((app_id, id.clone()), accepted);

        if std::mem::take(&mut *self.lose_next_add_response.lock().await) {
            return Err(ConnectorError::Network("response lost".to_string()));
        }

        Ok(id)
    }

    async fn cancel_order(&self, app_id: i32, order: &Order) -> Result<(), ConnectorError> {
        self.set_order_status(app_id, &order.id, OrderStatus::Canceled)
            .await;
        Ok(())
    }

    async fn order_details(&self, app_id: i32, order: &Order) -> Result<Order, ConnectorError> {
        let orders = self.orders.lock().await;
        match orders.get(&(app_id, order.id.clone())) {
            Some(found) => Ok(found.clone()),
            None => {
                let mut missing = order.clone();
                missing.status = OrderStatus::NotFound;
                Ok(missing)
            }
        }
    }

    async fn orders_details(&self, app_id: i32) -> Vec<Order> {
        let orders = self.orders.lock().await;
        orders
            .iter()
            .filter(|((owner, _), _)| *owner == app_id)
            .map(|(_, order)| order.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderSide, OrderType};

    fn buy_limit(price: f64) -> Order {
        Order {
            id: String::new(),
            base: "BTC".into(),
            quote: "USDT".into(),
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            price,
            volume: 0.0005,
            status: OrderStatus::New,
        }
    }

    #[tokio::test]
    async fn orders_cycle_through_fill() {
        let mock = MockConnector::new();
        let id = mock.add_order(1, &buy_limit(20000.0)).await.unwrap();

        let lookup = Order::lookup(id.clone(), "BTC", "USDT");
        assert_eq!(
            mock.order_details(1, &lookup).await.unwrap().status,
            OrderStatus::New
        );

        mock.fill_order(1, &id).await;
        assert_eq!(
            mock.order_details(1, &lookup).await.unwrap().status,
            OrderStatus::Executed
        );
    }

    #[tokio::test]
    async fn unknown_orders_report_not_found() {
        let mock = MockConnector::new();
        let lookup = Order::lookup("999", "BTC", "USDT");
        assert_eq!(
            mock.order_details(1, &lookup).await.unwrap().status,
            OrderStatus::NotFound
        );
    }

    #[tokio::test]
    async fn lost_response_still_records_the_order() {
        let mock = MockConnector::new();
        mock.lose_next_add_order_response().await;
        let err = mock.add_order(1, &buy_limit(20000.0)).await.unwrap_err();
        assert!(!err.is_rejection());
        assert_eq!(mock.order_count().await, 1);

        mock.reject_next_add_order().await;
        let err = mock.add_order(1, &buy_limit(20000.0)).await.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(mock.order_count().await, 1);
    }
}
