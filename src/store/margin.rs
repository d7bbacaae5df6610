use async_trait::async_trait;
use std::sync::Arc;

use super::{AccountSnapshot, Store};
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::models::{Balance, Order, Position};

/// Account adapter for forex-style brokers that think in signed long/short
/// units and margin rather than buy/sell spot sizes.
///
/// The side+size order contract is unchanged on the wire; the margin view
/// lives in the account snapshot, where a short position shows up as a
/// negative-size [`Position`].
pub struct MarginStore {
    client: Arc<dyn ExchangeClient>,
    /// Account (margin) currency
    currency: String,
    snapshot: AccountSnapshot,
}

impl MarginStore {
    pub fn new(client: Arc<dyn ExchangeClient>, currency: &str) -> Self {
        Self {
            client,
            currency: currency.to_string(),
            snapshot: AccountSnapshot::default(),
        }
    }

    /// Margin mapping: cash is the free margin, value the account equity,
    /// and every non-currency entry is a signed net position (shorts carry
    /// negative totals).
    fn snapshot_from_balance(&self, balance: &Balance) -> AccountSnapshot {
        let mut positions: Vec<Position> = balance
            .assets
            .iter()
            .filter(|(asset, held)| asset.as_str() != self.currency && held.total != 0.0)
            .map(|(asset, held)| Position {
                symbol: asset.clone(),
                size: held.total,
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        AccountSnapshot {
            cash: balance.get(&self.currency).free,
            value: balance.get(&self.currency).total,
            positions,
        }
    }
}

#[async_trait]
impl Store for MarginStore {
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

        tracing::debug!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            size = order.size,
            "Placing margin order"
        );
        let exchange_id = self.client.create_order(&order.request()).await?;
        order.exchange_id = Some(exchange_id);
        Ok(())
    }

    async fn cancel_order(&mut self, order: &Order) -> Result<(), ExchangeError> {
        match &order.exchange_id {
            Some(exchange_id) => self.client.cancel_order(exchange_id, &order.symbol).await,
            None => Ok(()),
        }
    }

    async fn refresh_account_state(&mut self) -> Result<(), ExchangeError> {
        let balance = self.client.fetch_balance().await?;
        self.snapshot = self.snapshot_from_balance(&balance);
        Ok(())
    }
}
