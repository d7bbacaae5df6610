//! Recording store stand-in for broker tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::Store;
use crate::exchange::ExchangeError;
use crate::models::{Order, Position};

type ErrorFactory = Box<dyn Fn() -> ExchangeError + Send + Sync>;

#[derive(Default)]
pub(crate) struct MockStore {
    pub created: Mutex<Vec<Order>>,
    pub canceled: Mutex<Vec<Order>>,
    create_failure: Option<ErrorFactory>,
    cancel_failure: Option<ErrorFactory>,
    attempts: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_with(&mut self, factory: impl Fn() -> ExchangeError + Send + Sync + 'static) {
        self.create_failure = Some(Box::new(factory));
    }

    pub fn fail_cancel_with(&mut self, factory: impl Fn() -> ExchangeError + Send + Sync + 'static) {
        self.cancel_failure = Some(Box::new(factory));
    }

    pub fn create_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MockStore {
    fn get_cash(&self) -> f64 {
        0.0
    }

    fn get_value(&self) -> f64 {
        0.0
    }

    fn get_positions(&self) -> Vec<Position> {
        Vec::new()
    }

    async fn create_order(&mut self, order: &mut Order) -> Result<(), ExchangeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = &self.create_failure {
            return Err(factory());
        }
        order.exchange_id = Some(format!("mock-{}", self.attempts.load(Ordering::SeqCst)));
        self.created.lock().unwrap().push(order.clone());
        Ok(())
    }

    async fn cancel_order(&mut self, order: &Order) -> Result<(), ExchangeError> {
        if let Some(factory) = &self.cancel_failure {
            return Err(factory());
        }
        self.canceled.lock().unwrap().push(order.clone());
        Ok(())
    }

    async fn refresh_account_state(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }
}
