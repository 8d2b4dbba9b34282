//! Ladder Analytics
//! Mission: Structural sanity for strike families - the curve must be monotone
//!
//! A ladder is the sorted family of contracts on one side of one game that
//! differ only by line. Prices along a ladder are probabilities of nested
//! events, so they must trend monotonically; anything else is either a data
//! problem or money on the table.

pub mod builder;
pub mod isotonic;

pub use builder::LadderBuilder;

use serde::{Deserialize, Serialize};

use crate::markets::{GroupType, ParseSource};

/// Expected trend of P(YES) as the line increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Nonincreasing,
    Nondecreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeReason {
    LowLiquidity,
    WideSpread,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderPoint {
    pub line: f64,
    pub side: String,
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitted_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_cents: Option<f64>,
    pub depth_bid: f64,
    pub depth_ask: f64,
    pub volume: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_cents: Option<f64>,
    pub is_violation: bool,
    pub is_outlier: bool,
    pub is_primary: bool,
    pub is_excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_reason: Option<ExcludeReason>,
    pub parse_source: ParseSource,
}

impl LadderPoint {
    /// A point participates in monotonicity/fit analysis only when it is
    /// the primary at its line and passed every gate.
    pub fn in_analysis(&self) -> bool {
        self.is_primary && !self.is_excluded
    }

    pub fn min_depth(&self) -> f64 {
        self.depth_bid.min(self.depth_ask)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LadderDiagnostics {
    pub total_markets: usize,
    pub parsed: usize,
    pub unparsed: usize,
    pub duplicates_dropped: usize,
    pub excluded_low_liquidity: usize,
    pub excluded_wide_spread: usize,
    pub excluded_stale: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ladder {
    pub ladder_key: String,
    pub game_id: String,
    pub ladder_type: GroupType,
    pub side: String,
    pub expected_direction: Direction,
    /// All points at this key, sorted by line ascending (excluded and
    /// duplicate points included, flagged).
    pub points: Vec<LadderPoint>,
    /// Ids of signals that passed persistence, filled by the session loop.
    pub violations: Vec<String>,
    pub diagnostics: LadderDiagnostics,
    pub mono_violation_count: usize,
    pub outlier_count: usize,
    pub max_violation_cents: f64,
    pub last_updated: i64,
}
