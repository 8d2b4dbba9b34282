//! Order Book State
//!
//! Maintains per-market YES/NO price→size maps from snapshots and deltas,
//! the latest ticker record, and the bounded history rings. Prices are
//! integer cents in [0, 100]; sizes are strictly positive (a zero or
//! negative level is removed, never stored).

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use crate::feeds::{
    BookSide, FeedMessage, OrderbookDeltaMsg, OrderbookSnapshotMsg, TickerMsg, TradeMsg,
};
use crate::models::Config;

use super::rings::{MarketHistory, TradeRecord, TradeSide};

/// Top-of-book view. Ticker-supplied quotes win over book-derived ones;
/// sizes always come from the book's best levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopOfBook {
    pub bid: Option<i64>,
    pub ask: Option<i64>,
    pub bid_size: i64,
    pub ask_size: i64,
}

#[derive(Debug)]
pub struct MarketBook {
    /// YES side: price → size
    pub yes: BTreeMap<i64, i64>,
    /// NO side: price → size (asks derive as 100 − price)
    pub no: BTreeMap<i64, i64>,
    pub last_ticker: Option<TickerMsg>,
    pub history: MarketHistory,
}

impl MarketBook {
    fn new(ring_max: usize, ring_window_ms: i64) -> Self {
        Self {
            yes: BTreeMap::new(),
            no: BTreeMap::new(),
            last_ticker: None,
            history: MarketHistory::new(ring_max, ring_window_ms),
        }
    }

    pub fn apply_ticker(&mut self, msg: &TickerMsg, now: i64) {
        self.last_ticker = Some(msg.clone());
        self.history.last_ticker_ts = Some(now);
        self.note_mid(now);
    }

    pub fn apply_snapshot(&mut self, msg: &OrderbookSnapshotMsg, now: i64) {
        self.yes.clear();
        self.no.clear();
        for &(price, size) in &msg.yes {
            if size > 0 {
                self.yes.insert(price, size);
            }
        }
        for &(price, size) in &msg.no {
            if size > 0 {
                self.no.insert(price, size);
            }
        }
        self.history.last_orderbook_ts = Some(now);
        self.note_mid(now);
    }

    pub fn apply_delta(&mut self, msg: &OrderbookDeltaMsg, now: i64) {
        let book = match msg.side {
            BookSide::Yes => &mut self.yes,
            BookSide::No => &mut self.no,
        };
        let next = book.get(&msg.price).copied().unwrap_or(0) + msg.delta;
        if next <= 0 {
            book.remove(&msg.price);
        } else {
            book.insert(msg.price, next);
        }
        self.history.last_orderbook_ts = Some(now);
        self.note_mid(now);
    }

    pub fn apply_trade(&mut self, msg: &TradeMsg, now: i64) {
        let price = match msg.yes_price.or_else(|| msg.no_price.map(|p| 100 - p)) {
            Some(p) => p,
            None => {
                warn!(market = %msg.market_ticker, "trade with no price, dropping");
                return;
            }
        };

        let side = match msg.taker_side.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("yes") => TradeSide::Buy,
            Some(s) if s.eq_ignore_ascii_case("no") => TradeSide::Sell,
            _ => match self.mid() {
                Some(mid) if (price as f64) >= mid => TradeSide::Buy,
                Some(_) => TradeSide::Sell,
                None => TradeSide::Unknown,
            },
        };

        self.history.record_trade(TradeRecord {
            ts: now,
            price,
            count: msg.count.unwrap_or(1),
            side,
        });
    }

    /// Record the current mid into the history ring, when one exists.
    fn note_mid(&mut self, now: i64) {
        if let Some(mid) = self.mid() {
            self.history.record_mid(now, mid);
        }
    }

    pub fn top_of_book(&self) -> TopOfBook {
        let book_bid = self.yes.keys().next_back().copied();
        let book_ask = self.no.keys().next_back().map(|p| 100 - p);

        let ticker = self.last_ticker.as_ref();
        let bid = ticker.and_then(|t| t.yes_bid).or(book_bid);
        let ask = ticker.and_then(|t| t.yes_ask).or(book_ask);

        TopOfBook {
            bid,
            ask,
            bid_size: self.yes.values().next_back().copied().unwrap_or(0),
            ask_size: self.no.values().next_back().copied().unwrap_or(0),
        }
    }

    /// Mid price in cents. Undefined when either side is missing or the
    /// quotes are crossed (price fields are then not reported at all).
    pub fn mid(&self) -> Option<f64> {
        let top = self.top_of_book();
        match (top.bid, top.ask) {
            (Some(bid), Some(ask)) if bid <= ask => Some((bid + ask) as f64 / 2.0),
            _ => None,
        }
    }

    /// Top-N YES levels by price descending: `(sum, wall)` sizes.
    pub fn bid_depth(&self, n: usize) -> (i64, i64) {
        depth(self.yes.iter().rev().take(n))
    }

    /// Top-N NO levels by price descending (best asks first).
    pub fn ask_depth(&self, n: usize) -> (i64, i64) {
        depth(self.no.iter().rev().take(n))
    }

    pub fn volume(&self) -> f64 {
        self.last_ticker
            .as_ref()
            .and_then(|t| t.volume)
            .unwrap_or(0.0)
    }
}

fn depth<'a>(levels: impl Iterator<Item = (&'a i64, &'a i64)>) -> (i64, i64) {
    let mut sum = 0;
    let mut wall = 0;
    for (_, &size) in levels {
        sum += size;
        wall = wall.max(size);
    }
    (sum, wall)
}

/// All per-session book state plus dirty tracking for the fast tick.
#[derive(Debug)]
pub struct BookState {
    books: HashMap<String, MarketBook>,
    dirty: HashSet<String>,
    ring_max: usize,
    ring_window_ms: i64,
}

impl BookState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            books: HashMap::new(),
            dirty: HashSet::new(),
            ring_max: cfg.ring_buffer_max_size,
            ring_window_ms: cfg.ring_buffer_window_ms,
        }
    }

    /// Apply one feed record; creates book state on a market's first event.
    pub fn apply(&mut self, msg: &FeedMessage, now: i64) {
        match msg {
            FeedMessage::Ticker(t) => {
                self.book_mut(&t.market_ticker).apply_ticker(t, now);
                self.dirty.insert(t.market_ticker.clone());
            }
            FeedMessage::OrderbookSnapshot(s) => {
                self.book_mut(&s.market_ticker).apply_snapshot(s, now);
                self.dirty.insert(s.market_ticker.clone());
            }
            FeedMessage::OrderbookDelta(d) => {
                self.book_mut(&d.market_ticker).apply_delta(d, now);
                self.dirty.insert(d.market_ticker.clone());
            }
            FeedMessage::Trade(t) => {
                self.book_mut(&t.market_ticker).apply_trade(t, now);
                self.dirty.insert(t.market_ticker.clone());
            }
            FeedMessage::Subscribed | FeedMessage::Error { .. } => {}
        }
    }

    fn book_mut(&mut self, ticker: &str) -> &mut MarketBook {
        self.books
            .entry(ticker.to_string())
            .or_insert_with(|| MarketBook::new(self.ring_max, self.ring_window_ms))
    }

    pub fn get(&self, ticker: &str) -> Option<&MarketBook> {
        self.books.get(ticker)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MarketBook)> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Drain the set of markets touched since the last call.
    pub fn take_dirty(&mut self) -> Vec<String> {
        self.dirty.drain().collect()
    }
}
