use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

use super::warmup::WarmupState;
use crate::models::Candle;

/// How long one poll blocks on the live channel before reporting no data
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one feed poll
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPoll {
    Data(Candle),
    /// No tick arrived within the poll timeout; re-poll later. Normal, not an
    /// error and not end-of-stream.
    Empty,
    /// The live channel is closed; the feed is finished.
    Disconnected,
}

enum Phase {
    /// Serving buffered warm-up candles, one per poll
    Draining,
    /// Buffer just emptied; the gate flips Ready on the next poll
    Transitioning,
    /// Serving ticks from the live channel
    Live,
}

/// Merges the warm-up backlog with the live tick channel into one
/// chronologically-ordered stream.
///
/// Consumers see the full warm-up history strictly before any live tick, and
/// the readiness gate flips only on the poll after the last historical candle
/// was emitted, so history is always observed before trading is enabled.
pub struct LiveFeed {
    buffer: VecDeque<Candle>,
    live_rx: mpsc::Receiver<Candle>,
    warmup_state: WarmupState,
    phase: Phase,
    last_emitted: Option<DateTime<Utc>>,
    poll_timeout: Duration,
}

impl LiveFeed {
    pub fn new(
        buffer: VecDeque<Candle>,
        live_rx: mpsc::Receiver<Candle>,
        warmup_state: WarmupState,
    ) -> Self {
        let phase = if buffer.is_empty() {
            // warm-up skipped entirely: enable trading and go straight live
            warmup_state.mark_ready();
            Phase::Live
        } else {
            Phase::Draining
        };

        Self {
            buffer,
            live_rx,
            warmup_state,
            phase,
            last_emitted: None,
            poll_timeout: POLL_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn warmup_state(&self) -> &WarmupState {
        &self.warmup_state
    }

    /// Next candle, one per call
    pub async fn poll(&mut self) -> FeedPoll {
        match self.phase {
            Phase::Draining | Phase::Transitioning => {
                if let Some(candle) = self.buffer.pop_front() {
                    if self.buffer.is_empty() {
                        self.phase = Phase::Transitioning;
                    }
                    self.last_emitted = Some(candle.time);
                    return FeedPoll::Data(candle);
                }

                // Buffer drained on the previous poll: the consumer has seen
                // all history, trading may begin.
                self.warmup_state.mark_ready();
                self.phase = Phase::Live;
                self.poll_live().await
            }
            Phase::Live => self.poll_live().await,
        }
    }

    async fn poll_live(&mut self) -> FeedPoll {
        match tokio::time::timeout(self.poll_timeout, self.live_rx.recv()).await {
            Err(_) => FeedPoll::Empty,
            Ok(None) => FeedPoll::Disconnected,
            Ok(Some(candle)) => {
                // A tick at or before the last emitted candle is a producer
                // protocol violation; dropping it keeps the consumer's view of
                // time monotonic.
                if let Some(last) = self.last_emitted {
                    if candle.time <= last {
                        tracing::warn!(
                            time = %candle.time,
                            last = %last,
                            "Dropping out-of-order live candle"
                        );
                        return FeedPoll::Empty;
                    }
                }
                self.last_emitted = Some(candle.time);
                FeedPoll::Data(candle)
            }
        }
    }
}
