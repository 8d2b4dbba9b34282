//! Stats Engine
//!
//! Pure, idempotent computation over one market's book and history. Price
//! fields are reported only when both quotes exist and are uncrossed; every
//! other field degrades independently to `None` rather than guessing.

use serde::{Deserialize, Serialize};

use crate::books::{MarketBook, TradeSide};
use crate::models::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Fresh,
    Stale,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStats {
    pub ticker: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<i64>,
    pub bid_size: i64,
    pub ask_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_cents: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_bps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microprice: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imbalance_top: Option<f64>,
    pub sum_bid_top5: f64,
    pub sum_ask_top5: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_imbalance_top5: Option<f64>,
    pub wall_bid_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_bid_ratio: Option<f64>,
    pub wall_ask_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_ask_ratio: Option<f64>,
    pub trades_per_min: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap_60s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol_mid_60s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_delta_1m: Option<f64>,
    pub jump_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ticker_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_orderbook_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trade_age_ms: Option<i64>,
    pub feed_status: FeedStatus,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct StatsEngine {
    top_n: usize,
    stale_threshold_ms: i64,
    jump_threshold_cents: f64,
    window_ms: i64,
}

impl StatsEngine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            top_n: cfg.top_n_levels,
            stale_threshold_ms: cfg.stale_threshold_ms,
            jump_threshold_cents: cfg.jump_threshold_cents,
            window_ms: cfg.ring_buffer_window_ms,
        }
    }

    pub fn compute(&self, ticker: &str, book: &MarketBook, now: i64) -> MarketStats {
        let top = book.top_of_book();
        let uncrossed = matches!((top.bid, top.ask), (Some(b), Some(a)) if b <= a);
        let (best_bid, best_ask) = if uncrossed || top.bid.is_none() || top.ask.is_none() {
            (top.bid, top.ask)
        } else {
            // Crossed quotes: price fields are not reported.
            (None, None)
        };

        let mid = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((b + a) as f64 / 2.0),
            _ => None,
        };
        let spread_cents = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((a - b) as f64),
            _ => None,
        };
        let spread_bps = match (spread_cents, mid) {
            (Some(s), Some(m)) if m > 0.0 => Some(s / m * 10_000.0),
            _ => None,
        };
        let implied_prob = mid.map(|m| m / 100.0);

        let (bid_size, ask_size) = (top.bid_size as f64, top.ask_size as f64);
        let microprice = match (best_bid, best_ask) {
            (Some(b), Some(a)) if bid_size + ask_size > 0.0 => {
                Some((a as f64 * bid_size + b as f64 * ask_size) / (bid_size + ask_size))
            }
            _ => None,
        };
        let imbalance_top = if bid_size + ask_size > 0.0 {
            Some((bid_size - ask_size) / (bid_size + ask_size))
        } else {
            None
        };

        let (sum_bid, wall_bid) = book.bid_depth(self.top_n);
        let (sum_ask, wall_ask) = book.ask_depth(self.top_n);
        let (sum_bid, wall_bid) = (sum_bid as f64, wall_bid as f64);
        let (sum_ask, wall_ask) = (sum_ask as f64, wall_ask as f64);
        let book_imbalance_top5 = if sum_bid + sum_ask > 0.0 {
            Some((sum_bid - sum_ask) / (sum_bid + sum_ask))
        } else {
            None
        };
        let wall_bid_ratio = (sum_bid > 0.0).then(|| wall_bid / sum_bid);
        let wall_ask_ratio = (sum_ask > 0.0).then(|| wall_ask / sum_ask);

        // Trade-window aggregates.
        let cutoff = now - self.window_ms;
        let mut prints = 0usize;
        let mut notional = 0.0;
        let mut contracts = 0i64;
        let mut buys = 0usize;
        let mut sells = 0usize;
        for t in book.history.trades_since(cutoff) {
            prints += 1;
            notional += t.price as f64 * t.count as f64;
            contracts += t.count;
            match t.side {
                TradeSide::Buy => buys += 1,
                TradeSide::Sell => sells += 1,
                TradeSide::Unknown => {}
            }
        }
        let vwap_60s = (contracts > 0).then(|| notional / contracts as f64);
        let classified = buys + sells;
        let buy_pressure = (classified > 0).then(|| buys as f64 / classified as f64);
        let sell_pressure = (classified > 0).then(|| sells as f64 / classified as f64);

        let vol_mid_60s = stddev_of_mid_deltas(book, cutoff);

        let price_delta_1m = match (mid, book.history.mid_1m_ago()) {
            (Some(m), Some(ago)) => Some(m - ago),
            _ => None,
        };
        let jump_size = match (mid, book.history.mid_5s_ago()) {
            (Some(m), Some(ago)) => Some(m - ago),
            _ => None,
        };
        let jump_flag = jump_size
            .map(|j| j.abs() >= self.jump_threshold_cents)
            .unwrap_or(false);

        let history = &book.history;
        let age = |ts: Option<i64>| ts.map(|t| now - t);
        let last_ticker_age_ms = age(history.last_ticker_ts);
        let last_orderbook_age_ms = age(history.last_orderbook_ts);
        let last_trade_age_ms = age(history.last_trade_ts);

        let feed_status = match history.last_update_ts() {
            Some(ts) if now - ts <= self.stale_threshold_ms => FeedStatus::Fresh,
            Some(_) => FeedStatus::Stale,
            None => FeedStatus::Unknown,
        };

        MarketStats {
            ticker: ticker.to_string(),
            ts: now,
            best_bid,
            best_ask,
            bid_size: top.bid_size,
            ask_size: top.ask_size,
            mid,
            spread_cents,
            spread_bps,
            implied_prob,
            microprice,
            imbalance_top,
            sum_bid_top5: sum_bid,
            sum_ask_top5: sum_ask,
            book_imbalance_top5,
            wall_bid_size: wall_bid,
            wall_bid_ratio,
            wall_ask_size: wall_ask,
            wall_ask_ratio,
            trades_per_min: prints,
            vwap_60s,
            buy_pressure,
            sell_pressure,
            vol_mid_60s,
            price_delta_1m,
            jump_flag,
            jump_size,
            last_ticker_age_ms,
            last_orderbook_age_ms,
            last_trade_age_ms,
            feed_status,
            volume: book.volume(),
        }
    }
}

/// Sample standard deviation of successive mid changes in the window.
fn stddev_of_mid_deltas(book: &MarketBook, cutoff: i64) -> Option<f64> {
    let mids: Vec<f64> = book.history.mids_since(cutoff).map(|m| m.mid).collect();
    if mids.len() < 3 {
        return None;
    }

    // Welford over the deltas for numeric stability.
    let mut count = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for pair in mids.windows(2) {
        let delta = pair[1] - pair[0];
        count += 1;
        let d = delta - mean;
        mean += d / count as f64;
        m2 += d * (delta - mean);
    }
    (count >= 2).then(|| (m2 / (count - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::BookState;
    use crate::feeds::{FeedMessage, OrderbookSnapshotMsg, TickerMsg, TradeMsg};

    fn engine() -> StatsEngine {
        StatsEngine::new(&Config::default())
    }

    fn snapshot_msg(yes: Vec<(i64, i64)>, no: Vec<(i64, i64)>) -> FeedMessage {
        FeedMessage::OrderbookSnapshot(OrderbookSnapshotMsg {
            market_ticker: "T".to_string(),
            yes,
            no,
            ts: None,
        })
    }

    #[test]
    fn price_bounds_hold() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(
            &snapshot_msg(vec![(40, 100), (39, 60)], vec![(55, 70), (54, 30)]),
            1_000,
        );

        let stats = engine().compute("T", state.get("T").unwrap(), 1_000);
        let (bid, ask) = (stats.best_bid.unwrap(), stats.best_ask.unwrap());
        assert!((0..=100).contains(&bid));
        assert!((0..=100).contains(&ask));
        assert!(bid <= ask);
        assert!(stats.spread_cents.unwrap() >= 0.0);
        let prob = stats.implied_prob.unwrap();
        assert!((0.0..=1.0).contains(&prob));
        assert_eq!(stats.mid, Some(42.5)); // (40 + 45) / 2
    }

    #[test]
    fn microprice_and_imbalance() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(&snapshot_msg(vec![(40, 100)], vec![(55, 50)]), 0);

        let stats = engine().compute("T", state.get("T").unwrap(), 0);
        // ask = 45, bid_size = 100, ask_size = 50
        let micro = stats.microprice.unwrap();
        assert!((micro - (45.0 * 100.0 + 40.0 * 50.0) / 150.0).abs() < 1e-9);
        let imb = stats.imbalance_top.unwrap();
        assert!((imb - (100.0 - 50.0) / 150.0).abs() < 1e-9);
    }

    #[test]
    fn freshness_thresholds() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(&snapshot_msg(vec![(40, 10)], vec![(55, 10)]), 1_000);
        let book = state.get("T").unwrap();

        assert_eq!(engine().compute("T", book, 3_500).feed_status, FeedStatus::Fresh);
        assert_eq!(engine().compute("T", book, 4_100).feed_status, FeedStatus::Stale);
    }

    #[test]
    fn unknown_before_any_update() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        // Trade with no price leaves no timestamps behind.
        state.apply(
            &FeedMessage::Trade(TradeMsg {
                market_ticker: "T".to_string(),
                count: None,
                yes_price: None,
                no_price: None,
                taker_side: None,
                ts: None,
            }),
            0,
        );
        let stats = engine().compute("T", state.get("T").unwrap(), 100);
        assert_eq!(stats.feed_status, FeedStatus::Unknown);
    }

    #[test]
    fn jump_flag_fires_at_threshold() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(&snapshot_msg(vec![(40, 10)], vec![(56, 10)]), 0); // mid 42
        state.apply(&snapshot_msg(vec![(50, 10)], vec![(46, 10)]), 1_000); // mid 52

        let stats = engine().compute("T", state.get("T").unwrap(), 1_000);
        assert!(stats.jump_flag);
        assert_eq!(stats.jump_size, Some(10.0));
    }

    #[test]
    fn ticker_ages_tracked_separately() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(&snapshot_msg(vec![(40, 10)], vec![(56, 10)]), 1_000);
        state.apply(
            &FeedMessage::Ticker(TickerMsg {
                market_ticker: "T".to_string(),
                yes_bid: Some(41),
                yes_ask: Some(44),
                last_price: None,
                volume: Some(500.0),
                volume_24h: None,
                open_interest: None,
                ts: None,
            }),
            2_000,
        );

        let stats = engine().compute("T", state.get("T").unwrap(), 2_500);
        assert_eq!(stats.last_orderbook_age_ms, Some(1_500));
        assert_eq!(stats.last_ticker_age_ms, Some(500));
        assert_eq!(stats.last_trade_age_ms, None);
        assert_eq!(stats.volume, 500.0);
    }

    #[test]
    fn trade_window_aggregates() {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(&snapshot_msg(vec![(40, 10)], vec![(56, 10)]), 0); // mid 42

        let trade = |yes_price: i64, count: i64, taker: &str, ts: i64| {
            FeedMessage::Trade(TradeMsg {
                market_ticker: "T".to_string(),
                count: Some(count),
                yes_price: Some(yes_price),
                no_price: None,
                taker_side: Some(taker.to_string()),
                ts: Some(ts),
            })
        };
        state.apply(&trade(40, 2, "yes", 1_000), 1_000);
        state.apply(&trade(44, 2, "no", 2_000), 2_000);

        let stats = engine().compute("T", state.get("T").unwrap(), 2_000);
        assert_eq!(stats.trades_per_min, 2);
        assert_eq!(stats.vwap_60s, Some((40.0 * 2.0 + 44.0 * 2.0) / 4.0));
        assert_eq!(stats.buy_pressure, Some(0.5));
        assert_eq!(stats.sell_pressure, Some(0.5));
    }
}
