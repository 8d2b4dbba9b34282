//! Upstream Market-Data Feed
//! Mission: Sub-second contract quotes with zero missed messages

pub mod auth;
pub mod kalshi_ws;

pub use auth::RequestSigner;
pub use kalshi_ws::{
    run_feed, BookSide, FeedEvent, FeedMessage, OrderbookDeltaMsg, OrderbookSnapshotMsg,
    TickerMsg, TradeMsg,
};
