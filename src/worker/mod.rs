// Exchange worker: the isolated execution context owning the live exchange
// connection. Everything crosses its boundary through channels.

use chrono::{DateTime, DurationRound, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::exchange::{ExchangeClient, ExchangeError};
use crate::feed::CandleStream;
use crate::models::{Balance, Candle, OrderRequest, Timeframe};

/// Capacity of the outbound candle channel
pub const CANDLE_CHANNEL_CAPACITY: usize = 128;
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Message envelope sent to the worker; consumed exactly once, answered on
/// the paired oneshot. A dropped responder tells the caller the worker died
/// mid-request.
pub enum ExchangeRequest {
    CreateOrder {
        request: OrderRequest,
        respond: oneshot::Sender<Result<String, ExchangeError>>,
    },
    CancelOrder {
        exchange_id: String,
        symbol: String,
        respond: oneshot::Sender<Result<(), ExchangeError>>,
    },
    RefreshAccount {
        respond: oneshot::Sender<Result<Balance, ExchangeError>>,
    },
}

/// Consumer-side handle to a spawned worker
pub struct WorkerHandle {
    request_tx: mpsc::Sender<ExchangeRequest>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn request_sender(&self) -> mpsc::Sender<ExchangeRequest> {
        self.request_tx.clone()
    }

    /// Signal termination and wait for in-flight work to finish. Requests
    /// still queued are dropped, which fails their callers instead of
    /// leaving them hanging.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.request_tx);
        if let Err(e) = self.join.await {
            tracing::error!("Exchange worker task panicked: {e}");
        }
    }
}

/// Owns the only live connection to the exchange and serializes all API
/// calls through one dispatch loop: candle relay on the timeframe schedule,
/// order resolution and account refresh on request.
pub struct ExchangeWorker {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
    timeframe: Timeframe,
    candle_tx: mpsc::Sender<Candle>,
    request_rx: mpsc::Receiver<ExchangeRequest>,
    shutdown_rx: watch::Receiver<bool>,
    last_relayed: Option<DateTime<Utc>>,
}

/// Spawn a worker task for one symbol, returning its handle and the live
/// candle channel.
pub fn spawn(
    client: Arc<dyn ExchangeClient>,
    symbol: &str,
    timeframe: Timeframe,
) -> (WorkerHandle, mpsc::Receiver<Candle>) {
    let (candle_tx, candle_rx) = mpsc::channel(CANDLE_CHANNEL_CAPACITY);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ExchangeWorker {
        client,
        symbol: symbol.to_string(),
        timeframe,
        candle_tx,
        request_rx,
        shutdown_rx,
        last_relayed: None,
    };

    let join = tokio::spawn(worker.run());

    (
        WorkerHandle {
            request_tx,
            shutdown_tx,
            join,
        },
        candle_rx,
    )
}

impl ExchangeWorker {
    async fn run(mut self) {
        tracing::info!(
            symbol = %self.symbol,
            source = self.client.name(),
            timeframe = %self.timeframe,
            "Exchange worker started"
        );

        loop {
            let wait = duration_until_boundary(Utc::now(), self.timeframe);

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                request = self.request_rx.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                _ = tokio::time::sleep(wait) => self.relay_candles().await,
            }
        }

        tracing::info!(symbol = %self.symbol, "Exchange worker stopped");
    }

    async fn handle_request(&self, request: ExchangeRequest) {
        match request {
            ExchangeRequest::CreateOrder { request, respond } => {
                let result = self.client.create_order(&request).await;
                let _ = respond.send(result);
            }
            ExchangeRequest::CancelOrder {
                exchange_id,
                symbol,
                respond,
            } => {
                let result = self.client.cancel_order(&exchange_id, &symbol).await;
                let _ = respond.send(result);
            }
            ExchangeRequest::RefreshAccount { respond } => {
                let result = self.client.fetch_balance().await;
                let _ = respond.send(result);
            }
        }
    }

    /// Fetch candles since two timeframe units back (the exchange may not
    /// have finalized the just-closed bar yet) and forward everything new.
    async fn relay_candles(&mut self) {
        let now = Utc::now();
        let since = now - self.timeframe.duration() * 2;

        let mut stream =
            CandleStream::new(self.client.clone(), &self.symbol, self.timeframe, since);

        loop {
            match stream.next_batch().await {
                Ok(Some(batch)) => {
                    for candle in batch {
                        if candle.time > now {
                            continue;
                        }
                        if matches!(self.last_relayed, Some(last) if candle.time <= last) {
                            continue;
                        }
                        let time = candle.time;
                        if self.candle_tx.send(candle).await.is_err() {
                            // consumer went away, nothing left to relay to
                            return;
                        }
                        self.last_relayed = Some(time);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, "Candle relay fetch failed: {e}");
                    break;
                }
            }
        }
    }
}

/// Time left until the next timeframe boundary (e.g. minute rollover for a
/// one-minute feed).
pub fn duration_until_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> std::time::Duration {
    let bucket = now
        .duration_trunc(timeframe.duration())
        .expect("timeframe durations divide a day");
    let next = bucket + timeframe.duration();
    (next - now).to_std().unwrap_or_default()
}
