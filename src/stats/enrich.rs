//! Stats Enricher
//!
//! Joins raw stats with parsed market metadata and layers on the
//! tradability scores plus the per-market alert flags. The flags here are
//! point-in-time annotations on the stats snapshot; the persisted signal
//! stream is a separate lifecycle.

use serde::{Deserialize, Serialize};

use crate::books::MarketBook;
use crate::markets::{GroupType, MarketMeta, ParseSource};
use crate::models::{Config, SignalKind};

use super::engine::MarketStats;

const JUMP_WINDOW_5S_MS: i64 = 5_000;
const JUMP_WINDOW_30S_MS: i64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedStats {
    #[serde(flatten)]
    pub stats: MarketStats,
    pub group_type: GroupType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<f64>,
    pub side: String,
    pub parse_source: ParseSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder_key: Option<String>,
    pub liquidity_score: f64,
    pub staleness_score: f64,
    pub jump_score_5s: f64,
    pub jump_score_30s: f64,
    pub exitability_cents: f64,
    pub signals: Vec<SignalKind>,
}

#[derive(Debug, Clone)]
pub struct Enricher {
    wide_spread_cents: f64,
}

impl Enricher {
    pub fn new(cfg: &Config) -> Self {
        Self {
            wide_spread_cents: cfg.wide_spread_cents,
        }
    }

    pub fn enrich(
        &self,
        stats: MarketStats,
        meta: &MarketMeta,
        book: &MarketBook,
        now: i64,
    ) -> EnrichedStats {
        let liquidity_score = liquidity_score(&stats);
        let staleness_score = staleness_score(&stats);
        let jump_score_5s = jump_score(&stats, book, now, JUMP_WINDOW_5S_MS);
        let jump_score_30s = jump_score(&stats, book, now, JUMP_WINDOW_30S_MS);
        let exitability_cents = exitability_cents(&stats);

        let mut signals = Vec::new();
        if staleness_score > 0.7 {
            signals.push(SignalKind::StaleQuote);
        }
        if stats.jump_flag {
            signals.push(SignalKind::Jump);
        }
        if liquidity_score < 0.2 {
            signals.push(SignalKind::LowLiquidity);
        }
        if stats
            .spread_cents
            .map(|s| s >= self.wide_spread_cents)
            .unwrap_or(false)
        {
            signals.push(SignalKind::WideSpread);
        }

        EnrichedStats {
            stats,
            group_type: meta.group_type,
            line: meta.line,
            side: meta.side.clone(),
            parse_source: meta.parse_source,
            ladder_key: meta.ladder_key.clone(),
            liquidity_score,
            staleness_score,
            jump_score_5s,
            jump_score_30s,
            exitability_cents,
            signals,
        }
    }
}

fn liquidity_score(stats: &MarketStats) -> f64 {
    let Some(spread) = stats.spread_cents else {
        return 0.0;
    };
    let min_size = stats.bid_size.min(stats.ask_size) as f64;
    let size_factor = (min_size / 500.0).min(1.0);
    let spread_penalty = 1.0 - (spread / 20.0).min(0.5);
    size_factor * spread_penalty
}

fn staleness_score(stats: &MarketStats) -> f64 {
    let max_age = [
        stats.last_ticker_age_ms,
        stats.last_orderbook_age_ms,
        stats.last_trade_age_ms,
    ]
    .into_iter()
    .flatten()
    .max();

    match max_age {
        Some(age) => (age as f64 / 10_000.0).min(1.0),
        None => 1.0,
    }
}

fn jump_score(stats: &MarketStats, book: &MarketBook, now: i64, window_ms: i64) -> f64 {
    let (Some(mid), Some(past)) = (stats.mid, book.history.mid_at_or_before(now - window_ms))
    else {
        return 0.0;
    };
    (mid - past).abs()
}

/// Estimated cost in cents to exit a position. Clamped upward to 50;
/// intentionally unclamped below. 99 when the top of book is empty.
fn exitability_cents(stats: &MarketStats) -> f64 {
    let avg_top = (stats.bid_size + stats.ask_size) as f64 / 2.0;
    if avg_top <= 0.0 {
        return 99.0;
    }
    // A crossed book keeps its depth but loses the spread; an undefined
    // spread exits like an unbounded one and lands on the clamp.
    let Some(spread) = stats.spread_cents else {
        return 50.0;
    };
    (spread / 2.0 + 100.0 / avg_top.max(1.0)).min(50.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::BookState;
    use crate::feeds::{FeedMessage, OrderbookSnapshotMsg};
    use crate::markets::parse_market;
    use crate::stats::StatsEngine;

    fn meta() -> MarketMeta {
        let parsed = parse_market(
            "KXNFLSPREAD-26JAN04BALPIT-BAL3",
            "Ravens win by over 3",
            GroupType::Spread,
            "26JAN04BALPIT",
        );
        MarketMeta {
            ticker: "KXNFLSPREAD-26JAN04BALPIT-BAL3".to_string(),
            title: "Ravens win by over 3".to_string(),
            event_ticker: "KXNFLSPREAD-26JAN04BALPIT".to_string(),
            group_type: GroupType::Spread,
            line: parsed.line,
            side: parsed.side,
            parse_source: parsed.parse_source,
            ladder_key: parsed.ladder_key,
            predicate: parsed.predicate,
            team_abbrev: parsed.team_abbrev,
        }
    }

    fn built(yes: Vec<(i64, i64)>, no: Vec<(i64, i64)>, at: i64) -> BookState {
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(
            &FeedMessage::OrderbookSnapshot(OrderbookSnapshotMsg {
                market_ticker: "T".to_string(),
                yes,
                no,
                ts: None,
            }),
            at,
        );
        state
    }

    fn enrich_at(state: &BookState, now: i64) -> EnrichedStats {
        let cfg = Config::default();
        let engine = StatsEngine::new(&cfg);
        let book = state.get("T").unwrap();
        let stats = engine.compute("T", book, now);
        Enricher::new(&cfg).enrich(stats, &meta(), book, now)
    }

    #[test]
    fn carries_parsed_metadata() {
        let state = built(vec![(40, 100)], vec![(56, 100)], 0);
        let enriched = enrich_at(&state, 0);
        assert_eq!(enriched.side, "Baltimore Ravens");
        assert_eq!(enriched.line, Some(3.0));
        assert!(enriched.ladder_key.is_some());
    }

    #[test]
    fn liquidity_score_formula() {
        // 100-lot both sides, spread 4 (40 bid / 44 ask).
        let state = built(vec![(40, 100)], vec![(56, 100)], 0);
        let enriched = enrich_at(&state, 0);
        let expected = (100.0f64 / 500.0).min(1.0) * (1.0 - (4.0f64 / 20.0).min(0.5));
        assert!((enriched.liquidity_score - expected).abs() < 1e-9);
        // Thin book with a wide-ish spread flags LOW_LIQUIDITY.
        assert!(enriched.signals.contains(&SignalKind::LowLiquidity));
    }

    #[test]
    fn staleness_saturates_and_flags() {
        let state = built(vec![(40, 100)], vec![(56, 100)], 0);
        // 8s later: score 0.8, above the 0.7 flag threshold.
        let enriched = enrich_at(&state, 8_000);
        assert!((enriched.staleness_score - 0.8).abs() < 1e-9);
        assert!(enriched.signals.contains(&SignalKind::StaleQuote));

        let enriched = enrich_at(&state, 20_000);
        assert_eq!(enriched.staleness_score, 1.0);
    }

    #[test]
    fn exitability_bounds() {
        // Healthy book: spread 4, avg size 100 → 2 + 1 = 3 cents.
        let state = built(vec![(40, 100)], vec![(56, 100)], 0);
        assert!((enrich_at(&state, 0).exitability_cents - 3.0).abs() < 1e-9);

        // One-lot book: spread 4 → 2 + 100 = 102, clamped to 50.
        let state = built(vec![(40, 1)], vec![(56, 1)], 0);
        assert_eq!(enrich_at(&state, 0).exitability_cents, 50.0);

        // No book at all → sentinel 99.
        let cfg = Config::default();
        let mut state = BookState::new(&cfg);
        state.apply(
            &FeedMessage::OrderbookSnapshot(OrderbookSnapshotMsg {
                market_ticker: "T".to_string(),
                yes: vec![],
                no: vec![],
                ts: None,
            }),
            0,
        );
        assert_eq!(enrich_at(&state, 0).exitability_cents, 99.0);

        // Crossed book: quotes suppressed but real depth on both sides.
        // Not the empty-book sentinel; the undefined spread clamps to 50.
        let state = built(vec![(60, 100)], vec![(50, 100)], 0);
        let enriched = enrich_at(&state, 0);
        assert_eq!(enriched.stats.spread_cents, None);
        assert_eq!(enriched.stats.bid_size, 100);
        assert_eq!(enriched.exitability_cents, 50.0);
    }

    #[test]
    fn wide_spread_flag() {
        // 40 bid / 52 ask → spread 12 ≥ 8.
        let state = built(vec![(40, 400)], vec![(48, 400)], 0);
        let enriched = enrich_at(&state, 0);
        assert!(enriched.signals.contains(&SignalKind::WideSpread));
    }

    #[test]
    fn jump_scores_need_history() {
        let state = built(vec![(40, 100)], vec![(56, 100)], 0);
        let enriched = enrich_at(&state, 1_000);
        // Only one mid recorded at t=0; 5s window has no point old enough
        // until now >= 5000.
        assert_eq!(enriched.jump_score_5s, 0.0);

        let enriched = enrich_at(&state, 6_000);
        assert_eq!(enriched.jump_score_5s, 0.0); // no move, score 0 either way
    }
}
