//! Ladder Builder
//!
//! Groups enriched markets into ladders, gates out unreliable points,
//! deduplicates strikes, runs the isotonic fit, and flags bound-aware
//! monotonicity violations and outliers. Ladders are rebuilt from scratch
//! every slow tick; nothing here carries state between ticks.

use std::collections::HashMap;

use crate::markets::GroupType;
use crate::models::{Config, SignalKind};
use crate::signals::{mono_confidence, outlier_confidence, SignalCandidate};
use crate::stats::EnrichedStats;

use super::isotonic;
use super::{Direction, ExcludeReason, Ladder, LadderDiagnostics, LadderPoint};

#[derive(Debug, Clone)]
pub struct LadderBuilder {
    min_liquidity_depth: f64,
    min_liquidity_volume: f64,
    max_spread_cents: f64,
    max_stale_ms: i64,
    outlier_min_cents: f64,
    mono_min_cents: f64,
    mono_epsilon: f64,
    exclude_unknown_sides: bool,
}

impl LadderBuilder {
    pub fn new(cfg: &Config) -> Self {
        Self {
            min_liquidity_depth: cfg.min_liquidity_depth,
            min_liquidity_volume: cfg.min_liquidity_volume,
            max_spread_cents: cfg.max_spread_cents,
            max_stale_ms: cfg.max_stale_ms,
            outlier_min_cents: cfg.outlier_min_cents,
            mono_min_cents: cfg.mono_min_cents,
            mono_epsilon: cfg.mono_epsilon,
            exclude_unknown_sides: cfg.exclude_unknown_sides,
        }
    }

    /// Build all ladders for the game plus the candidate signals found.
    pub fn build(
        &self,
        enriched: &HashMap<String, EnrichedStats>,
        game_id: &str,
        now: i64,
    ) -> (Vec<Ladder>, Vec<SignalCandidate>) {
        let mut buckets: HashMap<&str, Vec<&EnrichedStats>> = HashMap::new();
        let mut unparsed: HashMap<GroupType, usize> = HashMap::new();

        for market in enriched.values() {
            if !matches!(market.group_type, GroupType::Spread | GroupType::Total) {
                continue;
            }
            let unknown_side = market.side.eq_ignore_ascii_case("unknown");
            match (&market.ladder_key, market.line) {
                (Some(key), Some(_)) if !(self.exclude_unknown_sides && unknown_side) => {
                    buckets.entry(key.as_str()).or_default().push(market);
                }
                _ => {
                    *unparsed.entry(market.group_type).or_default() += 1;
                }
            }
        }

        let mut ladders = Vec::with_capacity(buckets.len());
        let mut candidates = Vec::new();

        for (key, members) in buckets {
            if members.len() < 2 {
                continue;
            }
            let unparsed_count = members
                .first()
                .map(|m| unparsed.get(&m.group_type).copied().unwrap_or(0))
                .unwrap_or(0);
            let ladder =
                self.build_one(key, members, game_id, unparsed_count, now, &mut candidates);
            ladders.push(ladder);
        }

        ladders.sort_by(|a, b| a.ladder_key.cmp(&b.ladder_key));
        (ladders, candidates)
    }

    fn build_one(
        &self,
        key: &str,
        members: Vec<&EnrichedStats>,
        game_id: &str,
        unparsed: usize,
        now: i64,
        candidates: &mut Vec<SignalCandidate>,
    ) -> Ladder {
        let ladder_type = members[0].group_type;
        let side = members[0].side.clone();
        let direction = expected_direction(ladder_type, &side);

        let mut diagnostics = LadderDiagnostics {
            total_markets: members.len(),
            parsed: members.len(),
            unparsed,
            ..Default::default()
        };

        let mut points: Vec<LadderPoint> = members
            .iter()
            .map(|m| self.gate_point(m, &mut diagnostics))
            .collect();

        self.dedup_lines(&mut points, &mut diagnostics);
        points.sort_by(|a, b| {
            a.line
                .partial_cmp(&b.line)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let analysis: Vec<usize> = (0..points.len())
            .filter(|&i| points[i].in_analysis())
            .collect();

        let mut mono_violation_count = 0;
        let mut max_violation_cents: f64 = 0.0;

        for pair in analysis.windows(2) {
            let (i, j) = (pair[0], pair[1]);
            let margin = mono_margin(direction, &points[i], &points[j], self.mono_epsilon);
            if margin < self.mono_min_cents {
                continue;
            }
            points[i].is_violation = true;
            points[j].is_violation = true;
            mono_violation_count += 1;
            max_violation_cents = max_violation_cents.max(margin);

            let min_depth = points[i].min_depth().min(points[j].min_depth());
            let avg_spread = (points[i].spread_cents.unwrap_or(0.0)
                + points[j].spread_cents.unwrap_or(0.0))
                / 2.0;
            let suggested_action = match direction {
                Direction::Nonincreasing => "BUY_LOW_LINE_SELL_HIGH_LINE",
                Direction::Nondecreasing => "BUY_HIGH_LINE_SELL_LOW_LINE",
            };
            candidates.push(SignalCandidate {
                kind: SignalKind::MonoViolation,
                market_ticker: points[j].ticker.clone(),
                ladder_key: Some(key.to_string()),
                magnitude: margin,
                confidence: mono_confidence(min_depth),
                reason: format!(
                    "lines {} and {} cross by {:.1}c against the {} curve",
                    points[i].line,
                    points[j].line,
                    margin,
                    match direction {
                        Direction::Nonincreasing => "non-increasing",
                        Direction::Nondecreasing => "non-decreasing",
                    },
                ),
                suggested_action: suggested_action.to_string(),
                related_tickers: Some(vec![points[i].ticker.clone(), points[j].ticker.clone()]),
                min_depth,
                avg_spread_cents: avg_spread,
            });
        }

        let mut outlier_count = 0;
        if analysis.len() >= 3 {
            let mids: Vec<f64> = analysis
                .iter()
                .map(|&i| points[i].mid_prob.unwrap_or(0.0))
                .collect();
            let weights = vec![1.0; mids.len()];
            let fitted = isotonic::fit(&mids, &weights, direction);

            for (slot, &i) in analysis.iter().enumerate() {
                let point = &mut points[i];
                point.fitted_prob = Some(fitted[slot]);
                let residual = (point.mid_prob.unwrap_or(0.0) - fitted[slot]) * 100.0;
                point.residual_cents = Some(residual);

                if residual.abs() >= self.outlier_min_cents {
                    point.is_outlier = true;
                    outlier_count += 1;
                    candidates.push(SignalCandidate {
                        kind: SignalKind::OutlierLine,
                        market_ticker: point.ticker.clone(),
                        ladder_key: Some(key.to_string()),
                        magnitude: residual.abs(),
                        confidence: outlier_confidence(residual.abs()),
                        reason: format!(
                            "line {} sits {:.1}c off the fitted curve",
                            point.line, residual
                        ),
                        suggested_action: if residual > 0.0 {
                            "SELL_RICH_LINE".to_string()
                        } else {
                            "BUY_CHEAP_LINE".to_string()
                        },
                        related_tickers: None,
                        min_depth: point.min_depth(),
                        avg_spread_cents: point.spread_cents.unwrap_or(0.0),
                    });
                }
            }
        }

        Ladder {
            ladder_key: key.to_string(),
            game_id: game_id.to_string(),
            ladder_type,
            side,
            expected_direction: direction,
            points,
            violations: Vec::new(),
            diagnostics,
            mono_violation_count,
            outlier_count,
            max_violation_cents,
            last_updated: now,
        }
    }

    /// Materialize one point and apply the liquidity/spread/staleness gates.
    fn gate_point(&self, market: &EnrichedStats, diagnostics: &mut LadderDiagnostics) -> LadderPoint {
        let stats = &market.stats;
        let mut point = LadderPoint {
            line: market.line.unwrap_or_default(),
            side: market.side.clone(),
            ticker: stats.ticker.clone(),
            bid_prob: stats.best_bid.map(|b| b as f64 / 100.0),
            ask_prob: stats.best_ask.map(|a| a as f64 / 100.0),
            mid_prob: stats.mid.map(|m| m / 100.0),
            fitted_prob: None,
            residual_cents: None,
            depth_bid: stats.sum_bid_top5,
            depth_ask: stats.sum_ask_top5,
            volume: stats.volume,
            spread_cents: stats.spread_cents,
            is_violation: false,
            is_outlier: false,
            is_primary: true,
            is_excluded: false,
            exclude_reason: None,
            parse_source: market.parse_source,
        };

        let min_depth = point.min_depth();
        let max_age = stats
            .last_ticker_age_ms
            .into_iter()
            .chain(stats.last_orderbook_age_ms)
            .max()
            .unwrap_or(i64::MAX);

        let reason = if min_depth < self.min_liquidity_depth && point.volume < self.min_liquidity_volume
        {
            Some(ExcludeReason::LowLiquidity)
        } else if point.spread_cents.map_or(true, |s| s > self.max_spread_cents) {
            // A missing two-sided quote gates the same as an unbounded spread.
            Some(ExcludeReason::WideSpread)
        } else if max_age > self.max_stale_ms {
            Some(ExcludeReason::Stale)
        } else {
            None
        };

        if let Some(reason) = reason {
            point.is_excluded = true;
            point.exclude_reason = Some(reason);
            match reason {
                ExcludeReason::LowLiquidity => diagnostics.excluded_low_liquidity += 1,
                ExcludeReason::WideSpread => diagnostics.excluded_wide_spread += 1,
                ExcludeReason::Stale => diagnostics.excluded_stale += 1,
            }
        }
        point
    }

    /// Among non-excluded points sharing an exact line, keep the deepest as
    /// primary and drop the rest from analysis.
    fn dedup_lines(&self, points: &mut [LadderPoint], diagnostics: &mut LadderDiagnostics) {
        let mut by_line: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            if !p.is_excluded {
                by_line.entry(p.line.to_bits()).or_default().push(i);
            }
        }

        for (_, group) in by_line {
            if group.len() < 2 {
                continue;
            }
            let winner = group
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    points[a]
                        .min_depth()
                        .partial_cmp(&points[b].min_depth())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("non-empty group");
            for i in group {
                if i != winner {
                    points[i].is_primary = false;
                    diagnostics.duplicates_dropped += 1;
                }
            }
        }
    }
}

/// Spread ladders fall as the line rises; totals fall for Over and rise for
/// Under.
pub fn expected_direction(ladder_type: GroupType, side: &str) -> Direction {
    match ladder_type {
        GroupType::Total if side.eq_ignore_ascii_case("under") => Direction::Nondecreasing,
        _ => Direction::Nonincreasing,
    }
}

/// Bounds-aware crossing margin in cents for one adjacent pair, ordered by
/// line ascending. Positive margin means executable crossing beyond noise.
pub fn mono_margin(
    direction: Direction,
    lower: &LadderPoint,
    upper: &LadderPoint,
    eps_base: f64,
) -> f64 {
    let (Some(bid_lower), Some(ask_lower)) = (lower.bid_prob, lower.ask_prob) else {
        return f64::NEG_INFINITY;
    };
    let (Some(bid_upper), Some(ask_upper)) = (upper.bid_prob, upper.ask_prob) else {
        return f64::NEG_INFINITY;
    };

    let avg_spread_cents =
        (lower.spread_cents.unwrap_or(0.0) + upper.spread_cents.unwrap_or(0.0)) / 2.0;
    let eps = eps_base.max(0.5 * avg_spread_cents / 100.0);

    match direction {
        Direction::Nonincreasing => (bid_upper - ask_lower - eps) * 100.0,
        Direction::Nondecreasing => (bid_lower - ask_upper - eps) * 100.0,
    }
}
