//! Arbitrage Detection Engine
//!
//! Scans every pair of opposing ladders (Over vs Under totals, two teams'
//! spreads) for mirrored lines whose bids sum above 1. A pair like that is
//! overpriced: selling both sides locks in the excess. Only bids count -
//! the detector never assumes a fill at the ask.

use tracing::debug;

use crate::ladders::Ladder;
use crate::markets::GroupType;
use crate::models::{Confidence, SignalKind};
use crate::signals::SignalCandidate;

/// Line mirror tolerance.
const LINE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct ArbitrageDetector {
    /// Buffer above 1.0 the bid sum must clear before flagging.
    buffer: f64,
}

impl ArbitrageDetector {
    pub fn new(buffer: f64) -> Self {
        Self { buffer }
    }

    /// Scan all opposing ladder pairs for bid sums above `1 + buffer`.
    pub fn scan(&self, ladders: &[Ladder]) -> Vec<SignalCandidate> {
        let mut candidates = Vec::new();

        for (i, first) in ladders.iter().enumerate() {
            for second in &ladders[i + 1..] {
                if !opposing(first, second) {
                    continue;
                }
                self.scan_pair(first, second, &mut candidates);
            }
        }

        candidates
    }

    fn scan_pair(&self, first: &Ladder, second: &Ladder, out: &mut Vec<SignalCandidate>) {
        for p1 in first.points.iter().filter(|p| p.in_analysis()) {
            let Some(bid1) = p1.bid_prob else { continue };

            let mirror = match first.ladder_type {
                // Totals pair on the same line; spreads on the negated line.
                GroupType::Total => p1.line,
                _ => -p1.line,
            };
            let Some(p2) = second
                .points
                .iter()
                .filter(|p| p.in_analysis())
                .find(|p| (p.line - mirror).abs() <= LINE_TOLERANCE)
            else {
                continue;
            };
            let Some(bid2) = p2.bid_prob else { continue };

            let sum_bids = bid1 + bid2;
            if sum_bids <= 1.0 + self.buffer {
                continue;
            }

            let magnitude = (sum_bids - 1.0) * 100.0;
            debug!(
                first = %p1.ticker,
                second = %p2.ticker,
                sum = sum_bids,
                "bid sum above parity"
            );
            out.push(SignalCandidate {
                kind: SignalKind::SumGt1,
                market_ticker: p1.ticker.clone(),
                ladder_key: Some(first.ladder_key.clone()),
                magnitude,
                confidence: Confidence::High,
                reason: format!(
                    "paired bids sum to {:.3} across {} and {}",
                    sum_bids, p1.ticker, p2.ticker
                ),
                suggested_action: "SELL_BOTH_SIDES".to_string(),
                related_tickers: Some(vec![p1.ticker.clone(), p2.ticker.clone()]),
                min_depth: p1.min_depth().min(p2.min_depth()),
                avg_spread_cents: (p1.spread_cents.unwrap_or(0.0)
                    + p2.spread_cents.unwrap_or(0.0))
                    / 2.0,
            });
        }
    }
}

/// Opposing means same ladder type with contrary sides: Over vs Under for
/// totals, two different teams for spreads.
fn opposing(a: &Ladder, b: &Ladder) -> bool {
    if a.ladder_type != b.ladder_type {
        return false;
    }
    match a.ladder_type {
        GroupType::Total | GroupType::Spread => !a.side.eq_ignore_ascii_case(&b.side),
        _ => false,
    }
}
