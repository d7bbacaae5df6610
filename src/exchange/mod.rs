// Exchange access layer
pub mod bybit;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::{Balance, Candle, OrderRequest, Timeframe};

pub use bybit::BybitClient;
pub use registry::{Credentials, ExchangeRegistry};

/// Errors crossing the exchange boundary
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange api error ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("malformed exchange response: {0}")]
    BadResponse(String),

    #[error("fetch failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ExchangeError>,
    },

    #[error("exchange worker unavailable")]
    WorkerUnavailable,

    #[error("timed out waiting for exchange worker")]
    WorkerTimeout,

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
}

/// Client for one remote exchange: a transactional, rate-limited,
/// occasionally-flaky network service.
///
/// Implementations are not assumed safe for concurrent use; the
/// [`ExchangeWorker`](crate::worker::ExchangeWorker) serializes all calls on
/// the live connection.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Advertised minimum interval between successive API requests.
    /// Violating it gets requests rejected, so pagination must honor it.
    fn rate_limit(&self) -> Duration;

    /// Fetch up to `limit` candles at `timeframe` starting at or after
    /// `since`, oldest first, timestamps normalized to UTC.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Place an order, returning the exchange-assigned order id
    async fn create_order(&self, request: &OrderRequest) -> Result<String, ExchangeError>;

    async fn cancel_order(&self, exchange_id: &str, symbol: &str) -> Result<(), ExchangeError>;

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError>;
}
