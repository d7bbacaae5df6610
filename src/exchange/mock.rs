//! Scripted in-memory exchange for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{ExchangeClient, ExchangeError};
use crate::models::{Balance, Candle, OrderRequest, Timeframe};

#[derive(Default)]
pub(crate) struct MockExchange {
    /// Responses handed out to successive fetch_ohlcv calls; once exhausted,
    /// further calls return an empty page.
    fetch_script: Mutex<VecDeque<Result<Vec<Candle>, ExchangeError>>>,
    pub fetch_since: Mutex<Vec<DateTime<Utc>>>,
    pub created_orders: Mutex<Vec<OrderRequest>>,
    pub canceled_orders: Mutex<Vec<(String, String)>>,
    balance: Mutex<Balance>,
    order_seq: Mutex<u64>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fetch(&self, result: Result<Vec<Candle>, ExchangeError>) {
        self.fetch_script.lock().unwrap().push_back(result);
    }

    pub fn set_balance(&self, balance: Balance) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_since.lock().unwrap().len()
    }

    fn api_error() -> ExchangeError {
        ExchangeError::Api {
            code: 10006,
            message: "too many visits".to_string(),
        }
    }

    /// Script `n` failing pages
    pub fn push_failures(&self, n: usize) {
        for _ in 0..n {
            self.push_fetch(Err(Self::api_error()));
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn name(&self) -> &str {
        "mock"
    }

    fn rate_limit(&self) -> Duration {
        Duration::ZERO
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.fetch_since.lock().unwrap().push(since);
        match self.fetch_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<String, ExchangeError> {
        self.created_orders.lock().unwrap().push(request.clone());
        let mut seq = self.order_seq.lock().unwrap();
        *seq += 1;
        Ok(format!("mock-{}", *seq))
    }

    async fn cancel_order(&self, exchange_id: &str, symbol: &str) -> Result<(), ExchangeError> {
        self.canceled_orders
            .lock()
            .unwrap()
            .push((exchange_id.to_string(), symbol.to_string()));
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        Ok(self.balance.lock().unwrap().clone())
    }
}
