use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::exchange::{ExchangeClient, ExchangeError};
use crate::feed::fetcher::CandleStream;
use crate::models::{Candle, Timeframe};

/// Default number of historical candles delivered before trading is enabled
pub const DEFAULT_WARMUP_LIMIT: usize = 1000;

/// Shared Pending/Ready flag gating order admission until warm-up finishes
///
/// Single writer (the feed), many readers (the broker checks it on every
/// submission). There is exactly one pending-to-ready transition per feed
/// lifetime; a feed that must re-warm is recreated.
#[derive(Clone)]
pub struct WarmupState {
    ready: Arc<AtomicBool>,
}

impl WarmupState {
    pub fn pending() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ready() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn mark_ready(&self) {
        // Release pairs with the Acquire in is_ready: a reader that observes
        // the flag also observes every candle delivered before it was set.
        self.ready.store(true, Ordering::Release);
    }

    pub fn mark_pending(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// No warm-up configured means trading is enabled from the start
impl Default for WarmupState {
    fn default() -> Self {
        Self::ready()
    }
}

/// Pull up to `limit` most-recent historical candles ending at "now" and mark
/// the readiness gate accordingly.
///
/// A zero limit or an exchange with no history marks the gate Ready at once
/// with nothing buffered: a degraded mode, not an error. Candles stamped at
/// or after "now" (the still-forming bar) are discarded.
pub async fn prepare_warmup(
    client: Arc<dyn ExchangeClient>,
    symbol: &str,
    timeframe: Timeframe,
    limit: usize,
    state: &WarmupState,
) -> Result<VecDeque<Candle>, ExchangeError> {
    prepare_warmup_until(client, symbol, timeframe, limit, state, Utc::now()).await
}

/// [`prepare_warmup`] with an explicit cutoff instead of the wall clock;
/// candles stamped at or after `now` are discarded.
async fn prepare_warmup_until(
    client: Arc<dyn ExchangeClient>,
    symbol: &str,
    timeframe: Timeframe,
    limit: usize,
    state: &WarmupState,
    now: DateTime<Utc>,
) -> Result<VecDeque<Candle>, ExchangeError> {
    if limit == 0 {
        state.mark_ready();
        return Ok(VecDeque::new());
    }

    state.mark_pending();

    let since = now - timeframe.duration() * limit as i32;
    let mut history: Vec<Candle> = Vec::new();

    let mut stream = CandleStream::new(client, symbol, timeframe, since);
    while let Some(batch) = stream.next_batch().await? {
        history.extend(batch.into_iter().filter(|c| c.time < now));
    }

    if history.is_empty() {
        tracing::info!(symbol, "No warm-up history available, trading enabled immediately");
        state.mark_ready();
        return Ok(VecDeque::new());
    }

    let skip = history.len().saturating_sub(limit);
    let buffer: VecDeque<Candle> = history.into_iter().skip(skip).collect();

    tracing::info!(
        symbol,
        candles = buffer.len(),
        %timeframe,
        "Warm-up buffer prepared"
    );

    Ok(buffer)
}
