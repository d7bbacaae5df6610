// Market data feed: history fetch, warm-up, live bridge
pub mod fetcher;
pub mod live;
pub mod warmup;

pub use fetcher::CandleStream;
pub use live::{FeedPoll, LiveFeed};
pub use warmup::{prepare_warmup, WarmupState, DEFAULT_WARMUP_LIMIT};
