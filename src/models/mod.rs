use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV bar for a fixed time bucket
///
/// `time` is normalized UTC; within one stream candles are strictly
/// increasing in time with no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bucket size a feed operates at, in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    OneMinute = 1,
    FiveMinute = 5,
    FifteenMinute = 15,
    ThirtyMinute = 30,
    OneHour = 60,
    FourHour = 240,
    OneDay = 1440,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        self as i64
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Exchange interval string ("1m", "5m", ...)
    pub fn as_interval(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinute => "5m",
            Timeframe::FifteenMinute => "15m",
            Timeframe::ThirtyMinute => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "1m" => Some(Timeframe::OneMinute),
            "5m" => Some(Timeframe::FiveMinute),
            "15m" => Some(Timeframe::FifteenMinute),
            "30m" => Some(Timeframe::ThirtyMinute),
            "1h" | "60m" => Some(Timeframe::OneHour),
            "4h" => Some(Timeframe::FourHour),
            "1d" => Some(Timeframe::OneDay),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_interval())
    }
}

/// Aggregate raw minute candles into larger timeframe buckets
///
/// Input must be sorted by time. Each bucket takes the first open, max high,
/// min low, last close and summed volume, stamped with the bucket start.
pub fn aggregate(candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();

    for candle in candles {
        let bucket = candle
            .time
            .duration_trunc(timeframe.duration())
            .expect("timeframe durations divide a day");

        match out.last_mut() {
            Some(last) if last.time == bucket => {
                last.high = last.high.max(candle.high);
                last.low = last.low.min(candle.low);
                last.close = candle.close;
                last.volume += candle.volume;
            }
            _ => out.push(Candle {
                time: bucket,
                ..candle.clone()
            }),
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Order lifecycle: Created -> Submitted -> (Rejected | Accepted) -> [Canceled]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    Rejected,
    Canceled,
}

/// An order owned by the broker
///
/// Notifications carry clones of this, so consumers never see (or mutate)
/// broker-internal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub limit_price: Option<f64>,
    pub status: OrderStatus,
    /// Id assigned by the exchange once the order is placed
    pub exchange_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(symbol: &str, side: OrderSide, size: f64, limit_price: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            size,
            limit_price,
            status: OrderStatus::Created,
            exchange_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            size: self.size,
            limit_price: self.limit_price,
        }
    }
}

/// Side+size wire form of an order, general enough for spot (buy/sell size)
/// and margin (signed units) exchanges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub limit_price: Option<f64>,
}

/// Holding in one asset, recomputed wholesale on each account refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub size: f64,
}

/// Per-asset balance entry from the exchange
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: f64,
    pub total: f64,
}

/// One account snapshot as returned by the exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub assets: std::collections::HashMap<String, AssetBalance>,
}

impl Balance {
    pub fn get(&self, asset: &str) -> AssetBalance {
        self.assets.get(asset).copied().unwrap_or_default()
    }
}

/// Trading signal produced by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}
