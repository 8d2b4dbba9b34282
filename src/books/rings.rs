//! Bounded History Ring Buffers
//!
//! Sliding windows of mid prices and trade prints per market, pruned by both
//! entry count and age. The 5s/1m mid anchors refresh only once their
//! horizon has elapsed, so `mid - anchor` always measures change over at
//! least the named horizon.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const MID_5S_REFRESH_MS: i64 = 5_000;
const MID_1M_REFRESH_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct TradeRecord {
    pub ts: i64,
    /// YES price in cents
    pub price: i64,
    pub count: i64,
    pub side: TradeSide,
}

#[derive(Debug, Clone, Copy)]
pub struct MidPoint {
    pub ts: i64,
    pub mid: f64,
}

#[derive(Debug)]
pub struct MarketHistory {
    trades: VecDeque<TradeRecord>,
    mids: VecDeque<MidPoint>,
    max_entries: usize,
    window_ms: i64,
    pub last_ticker_ts: Option<i64>,
    pub last_orderbook_ts: Option<i64>,
    pub last_trade_ts: Option<i64>,
    pub last_mid: Option<f64>,
    mid_5s_anchor: Option<MidPoint>,
    mid_1m_anchor: Option<MidPoint>,
}

impl MarketHistory {
    pub fn new(max_entries: usize, window_ms: i64) -> Self {
        Self {
            trades: VecDeque::with_capacity(max_entries.min(64)),
            mids: VecDeque::with_capacity(max_entries.min(64)),
            max_entries,
            window_ms,
            last_ticker_ts: None,
            last_orderbook_ts: None,
            last_trade_ts: None,
            last_mid: None,
            mid_5s_anchor: None,
            mid_1m_anchor: None,
        }
    }

    pub fn record_mid(&mut self, ts: i64, mid: f64) {
        self.mids.push_back(MidPoint { ts, mid });
        prune(&mut self.mids, |m| m.ts, ts - self.window_ms, self.max_entries);
        self.last_mid = Some(mid);

        match self.mid_5s_anchor {
            Some(anchor) if ts - anchor.ts < MID_5S_REFRESH_MS => {}
            _ => self.mid_5s_anchor = Some(MidPoint { ts, mid }),
        }
        match self.mid_1m_anchor {
            Some(anchor) if ts - anchor.ts < MID_1M_REFRESH_MS => {}
            _ => self.mid_1m_anchor = Some(MidPoint { ts, mid }),
        }
    }

    pub fn record_trade(&mut self, record: TradeRecord) {
        let now = record.ts;
        self.trades.push_back(record);
        prune(&mut self.trades, |t| t.ts, now - self.window_ms, self.max_entries);
        self.last_trade_ts = Some(now);
    }

    pub fn mid_5s_ago(&self) -> Option<f64> {
        self.mid_5s_anchor.map(|a| a.mid)
    }

    pub fn mid_1m_ago(&self) -> Option<f64> {
        self.mid_1m_anchor.map(|a| a.mid)
    }

    /// Newest recorded mid at or before `cutoff_ts`.
    pub fn mid_at_or_before(&self, cutoff_ts: i64) -> Option<f64> {
        self.mids
            .iter()
            .rev()
            .find(|m| m.ts <= cutoff_ts)
            .map(|m| m.mid)
    }

    pub fn trades_since(&self, cutoff_ts: i64) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(move |t| t.ts >= cutoff_ts)
    }

    pub fn mids_since(&self, cutoff_ts: i64) -> impl Iterator<Item = &MidPoint> {
        self.mids.iter().filter(move |m| m.ts >= cutoff_ts)
    }

    /// Most recent of the three feed timestamps, if any.
    pub fn last_update_ts(&self) -> Option<i64> {
        [
            self.last_ticker_ts,
            self.last_orderbook_ts,
            self.last_trade_ts,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

fn prune<T>(ring: &mut VecDeque<T>, ts_of: impl Fn(&T) -> i64, min_ts: i64, max_entries: usize) {
    while let Some(front) = ring.front() {
        if ts_of(front) < min_ts {
            ring.pop_front();
        } else {
            break;
        }
    }
    while ring.len() > max_entries {
        ring.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> MarketHistory {
        MarketHistory::new(500, 60_000)
    }

    #[test]
    fn prunes_by_age_and_count() {
        let mut h = MarketHistory::new(3, 60_000);
        for i in 0..5 {
            h.record_mid(1_000 + i, 50.0 + i as f64);
        }
        // Count cap of 3 drops the two oldest.
        assert_eq!(h.mids_since(0).count(), 3);
        assert_eq!(h.mid_at_or_before(1_004), Some(54.0));

        // Age pruning: push one far in the future, everything older falls out.
        h.record_mid(100_000, 60.0);
        assert_eq!(h.mids_since(0).count(), 1);
    }

    #[test]
    fn mid_anchor_refreshes_after_horizon() {
        let mut h = history();
        h.record_mid(0, 50.0);
        assert_eq!(h.mid_5s_ago(), Some(50.0));

        // Within the horizon the anchor holds.
        h.record_mid(4_000, 57.0);
        assert_eq!(h.mid_5s_ago(), Some(50.0));

        // At/after 5s the anchor advances to the current mid.
        h.record_mid(5_100, 58.0);
        assert_eq!(h.mid_5s_ago(), Some(58.0));

        // 1m anchor still holds the opening value.
        assert_eq!(h.mid_1m_ago(), Some(50.0));
        h.record_mid(61_000, 62.0);
        assert_eq!(h.mid_1m_ago(), Some(62.0));
    }

    #[test]
    fn mid_lookback_finds_newest_at_or_before() {
        let mut h = history();
        h.record_mid(1_000, 40.0);
        h.record_mid(2_000, 45.0);
        h.record_mid(3_000, 50.0);

        assert_eq!(h.mid_at_or_before(2_500), Some(45.0));
        assert_eq!(h.mid_at_or_before(500), None);
        assert_eq!(h.mid_at_or_before(3_000), Some(50.0));
    }

    #[test]
    fn trade_window_filter() {
        let mut h = history();
        for ts in [1_000, 30_000, 59_000] {
            h.record_trade(TradeRecord {
                ts,
                price: 50,
                count: 2,
                side: TradeSide::Buy,
            });
        }
        assert_eq!(h.trades_since(29_000).count(), 2);
        assert_eq!(h.last_trade_ts, Some(59_000));
    }
}
