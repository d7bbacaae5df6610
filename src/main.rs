use clap::Parser;
use std::sync::Arc;

use tradebot::exchange::{Credentials, ExchangeRegistry};
use tradebot::feed::DEFAULT_WARMUP_LIMIT;
use tradebot::models::Timeframe;
use tradebot::session::{LogRecorder, SessionConfig, TradingSession};
use tradebot::strategy::SmaCrossStrategy;
use tradebot::Result;

#[derive(Parser, Debug)]
#[command(name = "tradebot", about = "Live market-data and order-execution bridge")]
struct Args {
    /// Exchange id
    #[arg(long, default_value = "bybit")]
    exchange: String,

    /// Market symbol, base/quote
    #[arg(long, default_value = "BTC/USDT")]
    symbol: String,

    /// Candle timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d)
    #[arg(long, default_value = "1m")]
    timeframe: String,

    /// Historical candles replayed before trading is enabled
    #[arg(long, default_value_t = DEFAULT_WARMUP_LIMIT)]
    warmup: usize,

    /// Order size per signal, in base units
    #[arg(long, default_value_t = 0.001)]
    order_size: f64,

    /// Use the exchange testnet endpoints
    #[arg(long)]
    testnet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let registry = ExchangeRegistry::default();

    let timeframe = Timeframe::parse(&args.timeframe)
        .ok_or_else(|| format!("unknown timeframe: {}", args.timeframe))?;

    let config = SessionConfig {
        exchange: args.exchange,
        symbol: args.symbol,
        timeframe,
        warmup_limit: args.warmup,
        order_size: args.order_size,
        credentials: credentials_from_env(args.testnet),
    };

    let mut session = TradingSession::start(config, &registry, Arc::new(LogRecorder)).await?;
    let mut strategy = SmaCrossStrategy::new(9, 21);

    tokio::select! {
        result = session.run(&mut strategy) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    session.shutdown().await;
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradebot=info".into()),
        )
        .init();
}

fn credentials_from_env(testnet: bool) -> Credentials {
    let api_key = std::env::var("BYBIT_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("BYBIT_API_SECRET").unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("BYBIT_API_KEY not set, private endpoints will fail");
    }
    Credentials {
        api_key,
        api_secret,
        testnet,
    }
}
