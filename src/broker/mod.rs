// Order broker: admission gate between the strategy engine and the account
// adapter, with pull-based lifecycle notifications.

use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::exchange::ExchangeError;
use crate::feed::WarmupState;
use crate::models::{Order, OrderSide, OrderStatus, Position};
use crate::store::Store;

/// Routes the strategy engine's orders to the account adapter, rejecting
/// everything while warm-up is still pending.
///
/// Observers pull state-change notifications at their own cadence via
/// [`get_notification`](OrderBroker::get_notification); every notification is
/// a clone, broker-internal orders are never handed out by reference.
pub struct OrderBroker<S: Store> {
    store: S,
    warmup_state: WarmupState,
    orders: HashMap<Uuid, Order>,
    notifications: VecDeque<Order>,
}

impl<S: Store> OrderBroker<S> {
    pub fn new(store: S, warmup_state: WarmupState) -> Self {
        Self {
            store,
            warmup_state,
            orders: HashMap::new(),
            notifications: VecDeque::new(),
        }
    }

    pub async fn buy(&mut self, symbol: &str, size: f64, limit_price: Option<f64>) -> Order {
        self.submit(Order::new(symbol, OrderSide::Buy, size, limit_price))
            .await
    }

    pub async fn sell(&mut self, symbol: &str, size: f64, limit_price: Option<f64>) -> Order {
        self.submit(Order::new(symbol, OrderSide::Sell, size, limit_price))
            .await
    }

    async fn submit(&mut self, mut order: Order) -> Order {
        order.status = OrderStatus::Submitted;
        self.notify(&order);

        if !self.warmup_state.is_ready() {
            tracing::info!(id = %order.id, "Order rejected: warm-up still pending");
            order.status = OrderStatus::Rejected;
            self.notify(&order);
            self.orders.insert(order.id, order.clone());
            return order;
        }

        match self.store.create_order(&mut order).await {
            Ok(()) => {
                order.status = OrderStatus::Accepted;
                tracing::debug!(id = %order.id, "Order submitted to store");
            }
            Err(e) => {
                // placement is attempted once; failures surface as rejection,
                // a blind retry here could duplicate the order
                tracing::warn!(id = %order.id, "Order placement failed: {e}");
                order.status = OrderStatus::Rejected;
            }
        }

        self.notify(&order);
        self.orders.insert(order.id, order.clone());
        order
    }

    /// Cancel by reference id; `Ok(None)` for an unknown id. Cancelling an
    /// already-canceled order is a no-op and does not touch the store again.
    /// A store failure propagates and leaves the order status untouched.
    pub async fn cancel(&mut self, id: Uuid) -> Result<Option<Order>, ExchangeError> {
        let Some(order) = self.orders.get(&id).cloned() else {
            return Ok(None);
        };
        if order.status == OrderStatus::Canceled {
            return Ok(Some(order));
        }

        if let Err(e) = self.store.cancel_order(&order).await {
            tracing::warn!(id = %order.id, "Order cancel failed: {e}");
            return Err(e);
        }

        let Some(order) = self.orders.get_mut(&id) else {
            return Ok(None);
        };
        order.status = OrderStatus::Canceled;
        let snapshot = order.clone();
        self.notify(&snapshot);
        Ok(Some(snapshot))
    }

    fn notify(&mut self, order: &Order) {
        self.notifications.push_back(order.clone());
    }

    /// Oldest pending state-change notification, or None when caught up
    pub fn get_notification(&mut self) -> Option<Order> {
        self.notifications.pop_front()
    }

    // Account queries answer from the store's last snapshot; call
    // refresh_account_state first when freshness matters.

    pub fn get_cash(&self) -> f64 {
        self.store.get_cash()
    }

    pub fn get_value(&self) -> f64 {
        self.store.get_value()
    }

    pub fn get_positions(&self) -> Vec<Position> {
        self.store.get_positions()
    }

    pub async fn refresh_account_state(&mut self) -> Result<(), ExchangeError> {
        self.store.refresh_account_state().await
    }
}
