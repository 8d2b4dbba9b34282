//! Shared Models & Configuration
//! Mission: One home for the signal wire format and the session tuning knobs

use serde::{Deserialize, Serialize};

/// Signal types emitted over the subscriber stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    #[serde(rename = "MONO_VIOLATION")]
    MonoViolation,
    #[serde(rename = "NEG_MASS")]
    NegMass,
    #[serde(rename = "SUM_GT_1")]
    SumGt1,
    #[serde(rename = "OUTLIER_LINE")]
    OutlierLine,
    #[serde(rename = "STALE_QUOTE")]
    StaleQuote,
    #[serde(rename = "JUMP")]
    Jump,
    #[serde(rename = "LOW_LIQUIDITY")]
    LowLiquidity,
    #[serde(rename = "WIDE_SPREAD")]
    WideSpread,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::MonoViolation => "MONO_VIOLATION",
            SignalKind::NegMass => "NEG_MASS",
            SignalKind::SumGt1 => "SUM_GT_1",
            SignalKind::OutlierLine => "OUTLIER_LINE",
            SignalKind::StaleQuote => "STALE_QUOTE",
            SignalKind::Jump => "JUMP",
            SignalKind::LowLiquidity => "LOW_LIQUIDITY",
            SignalKind::WideSpread => "WIDE_SPREAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A signal that passed the persistence gate and was emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub ts: i64,
    pub market_ticker: String,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub confidence: Confidence,
    pub suggested_action: String,
    pub reason: String,
    /// Magnitude in cents (margin, residual, or overpricing depending on kind)
    pub magnitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_tickers: Option<Vec<String>>,
    pub severity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder_key: Option<String>,
}

/// Application configuration
///
/// Every analytics threshold is env-overridable so a session can be tuned
/// without a rebuild; defaults match the production calibration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Upstream market-data WebSocket endpoint
    pub feed_url: String,
    /// REST resolver base URL (game discovery)
    pub resolver_url: String,
    /// Hard cap on subscribed markets per session (tail trimmed)
    pub max_markets: usize,
    pub ticker_batch_interval_ms: u64,
    pub raw_batch_interval_ms: u64,
    pub stats_emit_interval_ms: u64,
    pub signals_emit_interval_ms: u64,
    pub ring_buffer_max_size: usize,
    pub ring_buffer_window_ms: i64,
    pub stale_threshold_ms: i64,
    pub jump_threshold_cents: f64,
    pub top_n_levels: usize,
    pub min_liquidity_depth: f64,
    pub min_liquidity_volume: f64,
    pub max_spread_cents: f64,
    pub max_stale_ms: i64,
    pub outlier_min_cents: f64,
    pub mono_min_cents: f64,
    pub mono_epsilon: f64,
    pub persist_ms: i64,
    pub cooldown_ms: i64,
    pub top_k: usize,
    pub wide_spread_cents: f64,
    pub arb_buffer: f64,
    pub active_signal_max_age_ms: i64,
    /// Drop markets with an unresolved side from ladder analysis
    pub exclude_unknown_sides: bool,
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            port: env_parse("PORT", 8080),
            feed_url: std::env::var("FEED_WS_URL").unwrap_or_else(|_| {
                "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string()
            }),
            resolver_url: std::env::var("RESOLVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090".to_string()),
            max_markets: env_parse("MAX_MARKETS", 50),
            ticker_batch_interval_ms: env_parse("TICKER_BATCH_INTERVAL_MS", 300),
            raw_batch_interval_ms: env_parse("RAW_BATCH_INTERVAL_MS", 500),
            stats_emit_interval_ms: env_parse("STATS_EMIT_INTERVAL_MS", 500),
            signals_emit_interval_ms: env_parse("SIGNALS_EMIT_INTERVAL_MS", 1000),
            ring_buffer_max_size: env_parse("RING_BUFFER_MAX_SIZE", 500),
            ring_buffer_window_ms: env_parse("RING_BUFFER_WINDOW_MS", 60_000),
            stale_threshold_ms: env_parse("STALE_THRESHOLD_MS", 3_000),
            jump_threshold_cents: env_parse("JUMP_THRESHOLD_CENTS", 5.0),
            top_n_levels: env_parse("TOP_N_LEVELS", 5),
            min_liquidity_depth: env_parse("MIN_LIQUIDITY_DEPTH", 2_000.0),
            min_liquidity_volume: env_parse("MIN_LIQUIDITY_VOLUME", 5_000.0),
            max_spread_cents: env_parse("MAX_SPREAD_CENTS", 3.0),
            max_stale_ms: env_parse("MAX_STALE_MS", 5_000),
            outlier_min_cents: env_parse("OUTLIER_MIN_CENTS", 5.0),
            mono_min_cents: env_parse("MONO_MIN_CENTS", 3.0),
            mono_epsilon: env_parse("MONO_EPSILON", 0.015),
            persist_ms: env_parse("PERSIST_MS", 3_000),
            cooldown_ms: env_parse("COOLDOWN_MS", 30_000),
            top_k: env_parse("TOP_K", 8),
            wide_spread_cents: env_parse("WIDE_SPREAD_CENTS", 8.0),
            arb_buffer: env_parse("ARB_BUFFER", 0.01),
            active_signal_max_age_ms: env_parse("ACTIVE_SIGNAL_MAX_AGE_MS", 60_000),
            exclude_unknown_sides: env_parse("EXCLUDE_UNKNOWN_SIDES", true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults only, no env reads, so tests stay hermetic.
        Self {
            port: 8080,
            feed_url: "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string(),
            resolver_url: "http://127.0.0.1:8090".to_string(),
            max_markets: 50,
            ticker_batch_interval_ms: 300,
            raw_batch_interval_ms: 500,
            stats_emit_interval_ms: 500,
            signals_emit_interval_ms: 1000,
            ring_buffer_max_size: 500,
            ring_buffer_window_ms: 60_000,
            stale_threshold_ms: 3_000,
            jump_threshold_cents: 5.0,
            top_n_levels: 5,
            min_liquidity_depth: 2_000.0,
            min_liquidity_volume: 5_000.0,
            max_spread_cents: 3.0,
            max_stale_ms: 5_000,
            outlier_min_cents: 5.0,
            mono_min_cents: 3.0,
            mono_epsilon: 0.015,
            persist_ms: 3_000,
            cooldown_ms: 30_000,
            top_k: 8,
            wide_spread_cents: 8.0,
            arb_buffer: 0.01,
            active_signal_max_age_ms: 60_000,
            exclude_unknown_sides: true,
        }
    }
}
