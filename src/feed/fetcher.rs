use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::exchange::{ExchangeClient, ExchangeError};
use crate::models::{Candle, Timeframe};

/// Candles requested per page, the usual exchange maximum
pub const PAGE_LIMIT: usize = 1000;
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Paginated history fetch over an exchange client
///
/// Owns its cursor and retry state: each page is retried up to 3 times with a
/// short fixed delay, then the error propagates and the stream terminates.
/// Pages are requested from the timestamp of the previous page's last candle
/// plus one timeframe unit, so batches neither overlap nor gap. An empty page
/// means the exchange has no more history.
pub struct CandleStream {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
    timeframe: Timeframe,
    cursor: DateTime<Utc>,
    started: bool,
    done: bool,
}

impl CandleStream {
    /// Stream candles strictly after `since`, ending at the current wall clock
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            symbol: symbol.to_string(),
            timeframe,
            cursor: since + timeframe.duration(),
            started: false,
            done: false,
        }
    }

    /// Next batch of candles, oldest first, or None once history is exhausted
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Candle>>, ExchangeError> {
        if self.done || self.cursor >= Utc::now() {
            self.done = true;
            return Ok(None);
        }

        // The exchange rejects requests arriving faster than its advertised
        // interval, so pacing between pages is a correctness requirement.
        if self.started {
            tokio::time::sleep(self.client.rate_limit()).await;
        }
        self.started = true;

        let batch = match self.fetch_page().await {
            Ok(batch) => batch,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if batch.is_empty() {
            self.done = true;
            return Ok(None);
        }

        tracing::info!(
            symbol = %self.symbol,
            source = self.client.name(),
            from = %batch[0].time,
            to = %batch[batch.len() - 1].time,
            "Fetched candle batch"
        );

        self.cursor = batch[batch.len() - 1].time + self.timeframe.duration();
        Ok(Some(batch))
    }

    async fn fetch_page(&self) -> Result<Vec<Candle>, ExchangeError> {
        let mut attempt = 1;
        loop {
            match self
                .client
                .fetch_ohlcv(&self.symbol, self.timeframe, self.cursor, PAGE_LIMIT)
                .await
            {
                Ok(batch) => return Ok(batch),
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        symbol = %self.symbol,
                        attempt,
                        "Retry fetch due to error: {e}"
                    );
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(ExchangeError::RetriesExhausted {
                        attempts: MAX_RETRIES,
                        source: Box::new(e),
                    })
                }
            }
        }
    }
}
