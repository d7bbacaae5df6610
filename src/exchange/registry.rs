use std::collections::HashMap;
use std::sync::Arc;

use super::{BybitClient, ExchangeClient, ExchangeError};

/// API credentials for one exchange account
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

type Factory = fn(&Credentials) -> Arc<dyn ExchangeClient>;

/// Explicit exchange-id -> client factory table, resolved once at
/// configuration time. Unknown ids are a configuration error.
pub struct ExchangeRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    pub fn known_exchanges(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(
        &self,
        name: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ExchangeError::UnknownExchange(name.to_string()))?;
        Ok(factory(credentials))
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("bybit", |creds| {
            Arc::new(BybitClient::new(
                creds.api_key.clone(),
                creds.api_secret.clone(),
                creds.testnet,
            ))
        });
        registry
    }
}
