use async_trait::async_trait;
use std::sync::Arc;

use super::{AccountSnapshot, Store, DEFAULT_QUOTE};
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::models::{Order, Position};

/// Account adapter calling the exchange API in the same execution context.
/// Used when no process split is needed (single-context backtests or
/// co-located live trading).
pub struct DirectStore {
    client: Arc<dyn ExchangeClient>,
    quote: String,
    snapshot: AccountSnapshot,
}

impl DirectStore {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self::with_quote(client, DEFAULT_QUOTE)
    }

    pub fn with_quote(client: Arc<dyn ExchangeClient>, quote: &str) -> Self {
        Self {
            client,
            quote: quote.to_string(),
            snapshot: AccountSnapshot::default(),
        }
    }
}

#[async_trait]
impl Store for DirectStore {
    fn get_cash(&self) -> f64 {
        self.snapshot.cash
    }

    fn get_value(&self) -> f64 {
        self.snapshot.value
    }

    fn get_positions(&self) -> Vec<Position> {
        self.snapshot.positions.clone()
    }

    async fn create_order(&mut self, order: &mut Order) -> Result<(), ExchangeError> {
        if order.size == 0.0 {
            return Ok(());
        }

        let exchange_id = self.client.create_order(&order.request()).await?;
        order.exchange_id = Some(exchange_id);
        Ok(())
    }

    async fn cancel_order(&mut self, order: &Order) -> Result<(), ExchangeError> {
        match &order.exchange_id {
            Some(exchange_id) => self.client.cancel_order(exchange_id, &order.symbol).await,
            // never reached the exchange, nothing to cancel there
            None => Ok(()),
        }
    }

    async fn refresh_account_state(&mut self) -> Result<(), ExchangeError> {
        let balance = self.client.fetch_balance().await?;
        self.snapshot = AccountSnapshot::from_spot_balance(&balance, &self.quote);
        Ok(())
    }
}
