use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{AccountSnapshot, Store, DEFAULT_QUOTE};
use crate::exchange::ExchangeError;
use crate::models::{Order, Position};
use crate::worker::ExchangeRequest;

/// Account adapter proxying every exchange call to the exchange worker over
/// its request channel and blocking on the paired response.
///
/// Each round trip carries an explicit deadline: an unreachable or wedged
/// worker surfaces as a failure to the caller instead of hanging the
/// strategy engine forever.
pub struct ProxiedStore {
    request_tx: mpsc::Sender<ExchangeRequest>,
    quote: String,
    timeout: Duration,
    snapshot: AccountSnapshot,
}

impl ProxiedStore {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(request_tx: mpsc::Sender<ExchangeRequest>) -> Self {
        Self::with_timeout(request_tx, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(request_tx: mpsc::Sender<ExchangeRequest>, timeout: Duration) -> Self {
        Self {
            request_tx,
            quote: DEFAULT_QUOTE.to_string(),
            timeout,
            snapshot: AccountSnapshot::default(),
        }
    }

    async fn round_trip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ExchangeError>>) -> ExchangeRequest,
    ) -> Result<T, ExchangeError> {
        let (respond, response_rx) = oneshot::channel();

        self.request_tx
            .send(build(respond))
            .await
            .map_err(|_| ExchangeError::WorkerUnavailable)?;

        match tokio::time::timeout(self.timeout, response_rx).await {
            Err(_) => Err(ExchangeError::WorkerTimeout),
            // worker dropped the responder mid-request (shutdown)
            Ok(Err(_)) => Err(ExchangeError::WorkerUnavailable),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl Store for ProxiedStore {
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

        let request = order.request();
        let exchange_id = self
            .round_trip(|respond| ExchangeRequest::CreateOrder { request, respond })
            .await?;
        order.exchange_id = Some(exchange_id);
        Ok(())
    }

    async fn cancel_order(&mut self, order: &Order) -> Result<(), ExchangeError> {
        let Some(exchange_id) = order.exchange_id.clone() else {
            return Ok(());
        };
        let symbol = order.symbol.clone();

        self.round_trip(|respond| ExchangeRequest::CancelOrder {
            exchange_id,
            symbol,
            respond,
        })
        .await
    }

    async fn refresh_account_state(&mut self) -> Result<(), ExchangeError> {
        let balance = self
            .round_trip(|respond| ExchangeRequest::RefreshAccount { respond })
            .await?;
        self.snapshot = AccountSnapshot::from_spot_balance(&balance, &self.quote);
        Ok(())
    }
}
