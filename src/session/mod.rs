//! Trading session: wires one exchange, one symbol and one strategy into a
//! running feed/broker pair and drives the bar-by-bar loop.

use std::sync::Arc;
use uuid::Uuid;

use crate::broker::OrderBroker;
use crate::exchange::{Credentials, ExchangeClient, ExchangeRegistry};
use crate::feed::{prepare_warmup, FeedPoll, LiveFeed, WarmupState, DEFAULT_WARMUP_LIMIT};
use crate::models::{Candle, OrderStatus, Signal, Timeframe};
use crate::store::proxied::ProxiedStore;
use crate::strategy::Strategy;
use crate::worker::{self, WorkerHandle};

/// Everything needed to run one session against one market
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub warmup_limit: usize,
    /// Order size submitted per buy/sell signal, in base units
    pub order_size: f64,
    pub credentials: Credentials,
}

impl SessionConfig {
    pub fn new(exchange: &str, symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe,
            warmup_limit: DEFAULT_WARMUP_LIMIT,
            order_size: 0.0,
            credentials: Credentials::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Stopped,
    Failed,
}

/// Sink for bot-run lifecycle transitions, one record per status change
pub trait RunRecorder: Send + Sync {
    fn record(&self, run_id: Uuid, status: RunStatus);
}

/// Default recorder, writes run transitions to the log
pub struct LogRecorder;

impl RunRecorder for LogRecorder {
    fn record(&self, run_id: Uuid, status: RunStatus) {
        tracing::info!(%run_id, ?status, "Run status changed");
    }
}

pub struct TradingSession {
    run_id: Uuid,
    config: SessionConfig,
    feed: LiveFeed,
    broker: OrderBroker<ProxiedStore>,
    worker: WorkerHandle,
    recorder: Arc<dyn RunRecorder>,
}

impl TradingSession {
    /// Resolve the configured exchange and bring the session up: warm-up
    /// history is fetched first, then the exchange worker starts relaying
    /// live bars.
    pub async fn start(
        config: SessionConfig,
        registry: &ExchangeRegistry,
        recorder: Arc<dyn RunRecorder>,
    ) -> crate::Result<Self> {
        let client = registry.resolve(&config.exchange, &config.credentials)?;
        Self::with_client(config, client, recorder).await
    }

    /// Session bring-up with an already-constructed client, for callers
    /// that bypass the registry.
    pub async fn with_client(
        config: SessionConfig,
        client: Arc<dyn ExchangeClient>,
        recorder: Arc<dyn RunRecorder>,
    ) -> crate::Result<Self> {
        let run_id = Uuid::new_v4();
        let warmup_state = WarmupState::pending();

        let buffer = match prepare_warmup(
            client.clone(),
            &config.symbol,
            config.timeframe,
            config.warmup_limit,
            &warmup_state,
        )
        .await
        {
            Ok(buffer) => buffer,
            Err(e) => {
                recorder.record(run_id, RunStatus::Failed);
                return Err(e.into());
            }
        };

        let (worker, candle_rx) = worker::spawn(client, &config.symbol, config.timeframe);
        let feed = LiveFeed::new(buffer, candle_rx, warmup_state.clone());
        let broker = OrderBroker::new(ProxiedStore::new(worker.request_sender()), warmup_state);

        tracing::info!(
            %run_id,
            exchange = %config.exchange,
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            "Trading session started"
        );
        recorder.record(run_id, RunStatus::Running);

        Ok(Self {
            run_id,
            config,
            feed,
            broker,
            worker,
            recorder,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn feed_mut(&mut self) -> &mut LiveFeed {
        &mut self.feed
    }

    pub fn broker_mut(&mut self) -> &mut OrderBroker<ProxiedStore> {
        &mut self.broker
    }

    /// Drive the strategy until the feed ends. Returns when the live
    /// channel disconnects; cancel the returned future to stop earlier.
    pub async fn run(&mut self, strategy: &mut dyn Strategy) -> crate::Result<()> {
        tracing::info!(strategy = strategy.name(), "Session loop running");

        loop {
            match self.feed.poll().await {
                FeedPoll::Empty => continue,
                FeedPoll::Disconnected => {
                    tracing::info!(symbol = %self.config.symbol, "Live feed disconnected");
                    return Ok(());
                }
                FeedPoll::Data(candle) => self.step(strategy, &candle).await,
            }
        }
    }

    /// One bar: refresh the account view, hand the candle to the strategy,
    /// place whatever it signals and drain the resulting notifications.
    pub async fn step(&mut self, strategy: &mut dyn Strategy, candle: &Candle) {
        // Historical bars are replayed dry; account refresh and order
        // placement only make sense once the feed has gone live.
        if self.feed.warmup_state().is_ready() {
            if let Err(e) = self.broker.refresh_account_state().await {
                tracing::warn!("Account refresh failed, keeping last snapshot: {e}");
            }
        }

        let symbol = self.config.symbol.clone();
        match strategy.on_candle(candle) {
            Signal::Hold => {}
            Signal::Buy => {
                self.broker.buy(&symbol, self.config.order_size, None).await;
            }
            Signal::Sell => {
                self.broker
                    .sell(&symbol, self.config.order_size, None)
                    .await;
            }
        }

        while let Some(order) = self.broker.get_notification() {
            match order.status {
                OrderStatus::Rejected => {
                    tracing::warn!(id = %order.id, side = %order.side.as_str(), "Order rejected")
                }
                status => {
                    tracing::debug!(id = %order.id, ?status, "Order update")
                }
            }
        }
    }

    /// Stop the exchange worker and record the run as stopped.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
        self.recorder.record(self.run_id, RunStatus::Stopped);
        tracing::info!(run_id = %self.run_id, "Trading session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    struct RecordingRecorder {
        seen: Mutex<Vec<(Uuid, RunStatus)>>,
    }

    impl RecordingRecorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn statuses(&self) -> Vec<RunStatus> {
            self.seen.lock().unwrap().iter().map(|(_, s)| *s).collect()
        }
    }

    impl RunRecorder for RecordingRecorder {
        fn record(&self, run_id: Uuid, status: RunStatus) {
            self.seen.lock().unwrap().push((run_id, status));
        }
    }

    struct AlwaysBuy;

    impl Strategy for AlwaysBuy {
        fn name(&self) -> &str {
            "always_buy"
        }

        fn on_candle(&mut self, _candle: &Candle) -> Signal {
            Signal::Buy
        }
    }

    fn history(count: usize) -> Vec<Candle> {
        let now = Utc::now();
        let start = now - ChronoDuration::minutes(count as i64);
        (0..count)
            .map(|i| {
                let close = (i + 1) as f64;
                Candle {
                    time: start + ChronoDuration::minutes(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new("bybit", "BTC/USDT", Timeframe::OneMinute);
        config.warmup_limit = 10;
        config.order_size = 0.5;
        config
    }

    #[tokio::test]
    async fn test_start_records_running_and_gate_is_pending() {
        let client = Arc::new(MockExchange::new());
        client.push_fetch(Ok(history(2)));
        let recorder = RecordingRecorder::new();

        let mut session = TradingSession::with_client(config(), client, recorder.clone())
            .await
            .unwrap();

        assert_eq!(recorder.statuses(), vec![RunStatus::Running]);
        assert!(!session.feed_mut().warmup_state().is_ready());

        session.shutdown().await;
        assert_eq!(recorder.statuses(), vec![RunStatus::Running, RunStatus::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orders_rejected_during_drain_and_accepted_after() {
        let client = Arc::new(MockExchange::new());
        client.push_fetch(Ok(history(2)));
        let recorder = RecordingRecorder::new();

        let mut session = TradingSession::with_client(config(), client.clone(), recorder)
            .await
            .unwrap();

        // drain both historical bars
        assert!(matches!(session.feed_mut().poll().await, FeedPoll::Data(_)));
        assert!(matches!(session.feed_mut().poll().await, FeedPoll::Data(_)));

        let rejected = session.broker_mut().buy("BTC/USDT", 0.5, None).await;
        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert!(client.created_orders.lock().unwrap().is_empty());

        // transition poll flips the gate even without a live tick
        assert_eq!(session.feed_mut().poll().await, FeedPoll::Empty);
        assert!(session.feed_mut().warmup_state().is_ready());

        let accepted = session.broker_mut().buy("BTC/USDT", 0.5, None).await;
        assert_eq!(accepted.status, OrderStatus::Accepted);
        assert_eq!(accepted.exchange_id.as_deref(), Some("mock-1"));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_replays_history_dry() {
        let client = Arc::new(MockExchange::new());
        client.push_fetch(Ok(history(1)));
        let recorder = RecordingRecorder::new();

        let mut session = TradingSession::with_client(config(), client.clone(), recorder)
            .await
            .unwrap();
        let mut strategy = AlwaysBuy;

        let FeedPoll::Data(candle) = session.feed_mut().poll().await else {
            panic!("expected a historical bar");
        };
        session.step(&mut strategy, &candle).await;

        // gate pending: the buy was rejected before reaching the exchange
        assert!(client.created_orders.lock().unwrap().is_empty());
        // notifications drained inside step
        assert!(session.broker_mut().get_notification().is_none());

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_failure_records_failed_run() {
        let client = Arc::new(MockExchange::new());
        client.push_failures(3);
        let recorder = RecordingRecorder::new();

        let result = TradingSession::with_client(config(), client, recorder.clone()).await;

        assert!(result.is_err());
        assert_eq!(recorder.statuses(), vec![RunStatus::Failed]);
    }
}
