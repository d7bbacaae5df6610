use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ExchangeClient, ExchangeError};
use crate::models::{AssetBalance, Balance, Candle, OrderRequest, Timeframe};

const BYBIT_API_BASE: &str = "https://api.bybit.com";
const BYBIT_TESTNET_API_BASE: &str = "https://api-testnet.bybit.com";
const RATE_LIMIT_RPS: u32 = 10;
/// Minimum interval between paged history requests, advertised to callers
const MIN_REQUEST_INTERVAL_MS: u64 = 100;
const RECV_WINDOW_MS: i64 = 5000;

type HmacSha256 = Hmac<Sha256>;
type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bybit v5 REST client
///
/// This struct is cloneable to allow sharing across async tasks. All clones
/// share the same rate limiter.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    rate_limiter: Arc<BybitRateLimiter>,
}

/// Envelope every v5 endpoint wraps its payload in
#[derive(Debug, Deserialize)]
struct V5Response<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    /// Rows of [startMs, open, high, low, close, volume, turnover], newest first
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OrderResult {
    #[serde(rename = "orderId")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
struct WalletCoin {
    coin: String,
    #[serde(rename = "walletBalance")]
    wallet_balance: String,
    #[serde(rename = "availableToWithdraw")]
    available_to_withdraw: String,
}

impl BybitClient {
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> Self {
        let base = if testnet {
            BYBIT_TESTNET_API_BASE
        } else {
            BYBIT_API_BASE
        };
        Self::with_base_url(api_key, api_secret, base.to_string())
    }

    /// Construct against an explicit base url (tests point this at a mock server)
    pub fn with_base_url(api_key: String, api_secret: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("default reqwest client");

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap());

        Self {
            client,
            base_url,
            api_key,
            api_secret,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// "BTC/USDT" -> "BTCUSDT"
    fn market_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    fn interval_code(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneMinute => "1",
            Timeframe::FiveMinute => "5",
            Timeframe::FifteenMinute => "15",
            Timeframe::ThirtyMinute => "30",
            Timeframe::OneHour => "60",
            Timeframe::FourHour => "240",
            Timeframe::OneDay => "D",
        }
    }

    /// Bybit signature: HMAC-SHA256 over timestamp + api_key + recv_window + payload
    fn sign(&self, timestamp: i64, payload: &str) -> String {
        let sign_str = format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW_MS, payload);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(sign_str.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        Self::unwrap_envelope(response.json::<V5Response<T>>().await?)
    }

    async fn get_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let timestamp = Utc::now().timestamp_millis();
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(timestamp, &query_string);

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .send()
            .await?;
        Self::unwrap_envelope(response.json::<V5Response<T>>().await?)
    }

    async fn post_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let timestamp = Utc::now().timestamp_millis();
        let payload = body.to_string();
        let signature = self.sign(timestamp, &payload);

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await?;
        Self::unwrap_envelope(response.json::<V5Response<T>>().await?)
    }

    fn unwrap_envelope<T>(envelope: V5Response<T>) -> Result<T, ExchangeError> {
        if envelope.ret_code != 0 {
            return Err(ExchangeError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }
        envelope
            .result
            .ok_or_else(|| ExchangeError::BadResponse("missing result field".to_string()))
    }

    fn parse_kline_row(row: &[String]) -> Result<Candle, ExchangeError> {
        if row.len() < 6 {
            return Err(ExchangeError::BadResponse(format!(
                "kline row with {} fields",
                row.len()
            )));
        }

        let field = |i: usize| -> Result<f64, ExchangeError> {
            row[i]
                .parse::<f64>()
                .map_err(|_| ExchangeError::BadResponse(format!("non-numeric kline field: {}", row[i])))
        };

        let millis = row[0]
            .parse::<i64>()
            .map_err(|_| ExchangeError::BadResponse(format!("bad kline timestamp: {}", row[0])))?;
        let time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| ExchangeError::BadResponse(format!("bad kline timestamp: {}", millis)))?;

        Ok(Candle {
            time,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        })
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn name(&self) -> &str {
        "bybit"
    }

    fn rate_limit(&self) -> Duration {
        Duration::from_millis(MIN_REQUEST_INTERVAL_MS)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let query = [
            ("category", "spot".to_string()),
            ("symbol", Self::market_symbol(symbol)),
            ("interval", Self::interval_code(timeframe).to_string()),
            ("start", since.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
        ];

        let result: KlineResult = self.get_public("/v5/market/kline", &query).await?;

        let mut candles = result
            .list
            .iter()
            .map(|row| Self::parse_kline_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        // Bybit returns klines newest first
        candles.sort_by_key(|c| c.time);

        tracing::debug!(
            symbol,
            count = candles.len(),
            since = %since,
            "Fetched klines from bybit"
        );

        Ok(candles)
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<String, ExchangeError> {
        let side = match request.side {
            crate::models::OrderSide::Buy => "Buy",
            crate::models::OrderSide::Sell => "Sell",
        };

        let mut body = serde_json::json!({
            "category": "spot",
            "symbol": Self::market_symbol(&request.symbol),
            "side": side,
            "orderType": if request.limit_price.is_some() { "Limit" } else { "Market" },
            "qty": format!("{}", request.size),
        });
        if let Some(price) = request.limit_price {
            body["price"] = serde_json::json!(format!("{}", price));
        }

        let result: OrderResult = self.post_signed("/v5/order/create", &body).await?;

        tracing::info!(
            symbol = %request.symbol,
            side,
            size = request.size,
            order_id = %result.order_id,
            "Placed order on bybit"
        );

        Ok(result.order_id)
    }

    async fn cancel_order(&self, exchange_id: &str, symbol: &str) -> Result<(), ExchangeError> {
        let body = serde_json::json!({
            "category": "spot",
            "symbol": Self::market_symbol(symbol),
            "orderId": exchange_id,
        });

        let _: OrderResult = self.post_signed("/v5/order/cancel", &body).await?;

        tracing::info!(symbol, order_id = exchange_id, "Canceled order on bybit");
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        let query = [("accountType", "UNIFIED".to_string())];
        let result: WalletResult = self.get_signed("/v5/account/wallet-balance", &query).await?;

        let mut balance = Balance::default();
        for account in &result.list {
            for coin in &account.coin {
                let total = coin.wallet_balance.parse::<f64>().unwrap_or(0.0);
                let free = coin.available_to_withdraw.parse::<f64>().unwrap_or(total);
                balance
                    .assets
                    .insert(coin.coin.clone(), AssetBalance { free, total });
            }
        }

        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;

    fn test_client(base_url: String) -> BybitClient {
        BybitClient::with_base_url("test-key".to_string(), "test-secret".to_string(), base_url)
    }

    #[test]
    fn test_market_symbol() {
        assert_eq!(BybitClient::market_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(BybitClient::market_symbol("ethusdt"), "ETHUSDT");
    }

    #[test]
    fn test_interval_codes() {
        assert_eq!(BybitClient::interval_code(Timeframe::OneMinute), "1");
        assert_eq!(BybitClient::interval_code(Timeframe::FourHour), "240");
        assert_eq!(BybitClient::interval_code(Timeframe::OneDay), "D");
    }

    #[tokio::test]
    async fn test_fetch_ohlcv_parses_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/market/kline")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": {
                        "list": [
                            ["1700000120000", "2.0", "3.0", "1.0", "2.5", "20", "50"],
                            ["1700000060000", "1.0", "2.0", "0.5", "1.5", "10", "15"]
                        ]
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let candles = client
            .fetch_ohlcv(
                "BTC/USDT",
                Timeframe::OneMinute,
                Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
                1000,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        // newest-first input comes back oldest first
        assert!(candles[0].time < candles[1].time);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[1].volume, 20.0);
    }

    #[tokio::test]
    async fn test_fetch_ohlcv_surfaces_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v5/market/kline")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"retCode": 10001, "retMsg": "params error", "result": null}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client
            .fetch_ohlcv("BTC/USDT", Timeframe::OneMinute, Utc::now(), 1000)
            .await
            .unwrap_err();

        match err {
            ExchangeError::Api { code, message } => {
                assert_eq!(code, 10001);
                assert!(message.contains("params"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_order_returns_exchange_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v5/order/create")
            .match_header("X-BAPI-API-KEY", "test-key")
            .with_status(200)
            .with_body(r#"{"retCode": 0, "retMsg": "OK", "result": {"orderId": "abc-123"}}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let request = OrderRequest {
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            size: 0.25,
            limit_price: None,
        };

        let id = client.create_order(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(id, "abc-123");
    }

    #[tokio::test]
    async fn test_fetch_balance_maps_coins() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v5/account/wallet-balance")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": {
                        "list": [{
                            "coin": [
                                {"coin": "USDT", "walletBalance": "1000.5", "availableToWithdraw": "900.25"},
                                {"coin": "BTC", "walletBalance": "0.5", "availableToWithdraw": "0.5"}
                            ]
                        }]
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let balance = client.fetch_balance().await.unwrap();

        assert_eq!(balance.get("USDT").total, 1000.5);
        assert_eq!(balance.get("USDT").free, 900.25);
        assert_eq!(balance.get("BTC").total, 0.5);
        assert_eq!(balance.get("XRP").total, 0.0);
    }
}
