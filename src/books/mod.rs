//! Per-Market Book & History State
//! Mission: Fold the feed into exact, queryable in-memory state

pub mod rings;
pub mod store;

pub use rings::{MarketHistory, MidPoint, TradeRecord, TradeSide};
pub use store::{BookState, MarketBook, TopOfBook};
