//! Cross-Ladder Arbitrage
//! Mission: Find paired contracts whose bids add up to more than a dollar

pub mod engine;

pub use engine::ArbitrageDetector;
