// Account adapter (store): translates generic order/account operations into
// exchange-specific calls.

pub mod direct;
pub mod margin;
#[cfg(test)]
pub(crate) mod mock;
pub mod proxied;

use async_trait::async_trait;

use crate::exchange::ExchangeError;
use crate::models::{Balance, Order, Position};

pub use direct::DirectStore;
pub use margin::MarginStore;
pub use proxied::ProxiedStore;

/// Quote asset cash and value are denominated in unless configured otherwise
pub const DEFAULT_QUOTE: &str = "USDT";

/// One capability interface, independent variant implementations selected at
/// construction time: direct spot calls, channel-proxied spot calls, or the
/// margin/forex flavor.
///
/// Cash, value and positions answer from the last refreshed snapshot; callers
/// needing freshness trigger `refresh_account_state` explicitly first.
#[async_trait]
pub trait Store: Send + Sync {
    fn get_cash(&self) -> f64;

    fn get_value(&self) -> f64;

    fn get_positions(&self) -> Vec<Position>;

    /// Place the order on the exchange, filling in `order.exchange_id` on
    /// success. A zero-size order is a no-op that never reaches the exchange.
    async fn create_order(&mut self, order: &mut Order) -> Result<(), ExchangeError>;

    async fn cancel_order(&mut self, order: &Order) -> Result<(), ExchangeError>;

    /// Re-fetch balances and recompute cash/value/positions wholesale
    async fn refresh_account_state(&mut self) -> Result<(), ExchangeError>;
}

/// Cash/value/position view derived from one balance snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountSnapshot {
    pub cash: f64,
    pub value: f64,
    pub positions: Vec<Position>,
}

impl AccountSnapshot {
    /// Spot mapping: cash is the free quote balance, value the total quote
    /// balance, and every non-quote asset with a positive total is a position.
    /// Positions are rebuilt wholesale, never incrementally updated.
    pub fn from_spot_balance(balance: &Balance, quote: &str) -> Self {
        let mut positions: Vec<Position> = balance
            .assets
            .iter()
            .filter(|(asset, held)| asset.as_str() != quote && held.total > 0.0)
            .map(|(asset, held)| Position {
                symbol: asset.clone(),
                size: held.total,
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        Self {
            cash: balance.get(quote).free,
            value: balance.get(quote).total,
            positions,
        }
    }
}
