//! Market Identity & Discovery
//! Mission: Know exactly which contract a ticker is before the first quote lands

pub mod parser;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use parser::{parse_market, ParsedMarket};
pub use resolver::{MarketInfo, ResolvedGame, Resolver};

/// Contract family for a market within a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Winner,
    Spread,
    Total,
    Other,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Winner => "winner",
            GroupType::Spread => "spread",
            GroupType::Total => "total",
            GroupType::Other => "other",
        }
    }

    /// Best-effort classification from a ticker prefix, used when the
    /// resolver payload does not carry an explicit group type.
    pub fn infer(ticker: &str) -> Self {
        let upper = ticker.to_ascii_uppercase();
        if upper.contains("SPREAD") {
            GroupType::Spread
        } else if upper.contains("TOTAL") {
            GroupType::Total
        } else if upper.contains("GAME") || upper.contains("WINNER") {
            GroupType::Winner
        } else {
            GroupType::Other
        }
    }
}

/// Which input yielded the parsed side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseSource {
    Ticker,
    Title,
    Unknown,
}

/// Ladder predicate semantics; dictates the expected monotone direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    WinsByOver,
    TotalOver,
    TotalUnder,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::WinsByOver => "wins_by_over",
            Predicate::TotalOver => "total_over",
            Predicate::TotalUnder => "total_under",
        }
    }
}

/// Per-market metadata, parsed once at session start and frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMeta {
    pub ticker: String,
    pub title: String,
    pub event_ticker: String,
    pub group_type: GroupType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<f64>,
    /// Team name, "Over", "Under", or "Unknown"
    pub side: String,
    pub parse_source: ParseSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_abbrev: Option<String>,
}

impl MarketMeta {
    /// Join resolver metadata with the ticker/title parse.
    pub fn build(info: &MarketInfo, game_id: &str) -> Self {
        let group_type = info
            .group_type
            .unwrap_or_else(|| GroupType::infer(&info.ticker));
        let parsed = parse_market(&info.ticker, &info.title, group_type, game_id);

        // Locally parsed side is primary; the resolver's side fills in when
        // neither ticker nor title resolved one, so those markets still get
        // a ladder key. `parse_source` keeps describing the local parse.
        let mut side = parsed.side;
        let mut ladder_key = parsed.ladder_key;
        let mut predicate = parsed.predicate;
        if side.eq_ignore_ascii_case("unknown") {
            if let Some(resolver_side) = info
                .side
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                side = resolver_side.to_string();
                if matches!(group_type, GroupType::Spread | GroupType::Total) {
                    let (key, pred) = parser::ladder_key_for(game_id, group_type, &side);
                    ladder_key = key;
                    predicate = pred;
                }
            }
        }

        Self {
            ticker: info.ticker.clone(),
            title: info.title.clone(),
            event_ticker: info.event_ticker.clone(),
            group_type,
            // Resolver-supplied line wins when present; it is authoritative.
            line: info.line.or(parsed.line),
            side,
            parse_source: parsed.parse_source,
            ladder_key,
            predicate,
            team_abbrev: parsed.team_abbrev,
        }
    }
}
