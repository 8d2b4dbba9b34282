//! Signal Stream
//! Mission: Only durable, ranked, deduplicated alerts reach the subscriber

pub mod lifecycle;

pub use lifecycle::SignalLifecycle;

use crate::models::{Confidence, SignalKind};

/// A detector's proposal. Candidates are cheap and re-detected every slow
/// tick; only the lifecycle decides what actually gets emitted.
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub kind: SignalKind,
    pub market_ticker: String,
    pub ladder_key: Option<String>,
    /// Cents: mono margin, outlier residual, or arb overpricing.
    pub magnitude: f64,
    pub confidence: Confidence,
    pub reason: String,
    pub suggested_action: String,
    pub related_tickers: Option<Vec<String>>,
    /// Context for severity scoring.
    pub min_depth: f64,
    pub avg_spread_cents: f64,
}

impl SignalCandidate {
    /// Canonical dedup key: `{type}:{market_ticker}:{ladder_key|''}`.
    pub fn canonical_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            self.market_ticker,
            self.ladder_key.as_deref().unwrap_or("")
        )
    }

    /// Severity: depth-weighted magnitude for structural signals, flat
    /// multiplier for arbitrage.
    pub fn severity_score(&self) -> f64 {
        match self.kind {
            SignalKind::SumGt1 => self.magnitude * 10.0,
            _ => {
                self.magnitude * (1.0 + self.min_depth / 1000.0).log10()
                    - 0.5 * self.avg_spread_cents
            }
        }
    }
}

/// Confidence heuristic for monotonicity violations, from shared depth.
pub fn mono_confidence(min_depth: f64) -> Confidence {
    if min_depth < 20.0 {
        Confidence::Low
    } else if min_depth < 100.0 {
        Confidence::Medium
    } else {
        Confidence::High
    }
}

/// Confidence heuristic for ladder outliers, from residual size in cents.
pub fn outlier_confidence(residual_cents_abs: f64) -> Confidence {
    if residual_cents_abs >= 8.0 {
        Confidence::High
    } else if residual_cents_abs >= 6.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
