//! Ticker & Title Parser
//! Mission: Turn opaque contract tickers into (side, line) ladder coordinates
//!
//! The ticker suffix is authoritative when it matches a known pattern
//! ("-BAL3" means Ravens by 3, "-O45" means Over 45). Titles are the
//! fallback for markets whose suffix encodes nothing useful. A parse
//! failure never raises; it yields side = "Unknown" and the market is kept
//! out of ladder analysis downstream.

use lazy_static::lazy_static;
use regex::Regex;

use super::{GroupType, ParseSource, Predicate};

/// Fixed team-abbreviation table (league-supplied).
const TEAM_ABBREVS: &[(&str, &str)] = &[
    ("ARI", "Arizona Cardinals"),
    ("ATL", "Atlanta Falcons"),
    ("BAL", "Baltimore Ravens"),
    ("BUF", "Buffalo Bills"),
    ("CAR", "Carolina Panthers"),
    ("CHI", "Chicago Bears"),
    ("CIN", "Cincinnati Bengals"),
    ("CLE", "Cleveland Browns"),
    ("DAL", "Dallas Cowboys"),
    ("DEN", "Denver Broncos"),
    ("DET", "Detroit Lions"),
    ("GB", "Green Bay Packers"),
    ("HOU", "Houston Texans"),
    ("IND", "Indianapolis Colts"),
    ("JAX", "Jacksonville Jaguars"),
    ("KC", "Kansas City Chiefs"),
    ("LAC", "Los Angeles Chargers"),
    ("LAR", "Los Angeles Rams"),
    ("LV", "Las Vegas Raiders"),
    ("MIA", "Miami Dolphins"),
    ("MIN", "Minnesota Vikings"),
    ("NE", "New England Patriots"),
    ("NO", "New Orleans Saints"),
    ("NYG", "New York Giants"),
    ("NYJ", "New York Jets"),
    ("PHI", "Philadelphia Eagles"),
    ("PIT", "Pittsburgh Steelers"),
    ("SEA", "Seattle Seahawks"),
    ("SF", "San Francisco 49ers"),
    ("TB", "Tampa Bay Buccaneers"),
    ("TEN", "Tennessee Titans"),
    ("WAS", "Washington Commanders"),
];

lazy_static! {
    /// Final ticker segment: letter prefix + optional numeric line.
    /// One to five letters so that both "O45" and "OVER45" resolve.
    static ref SUFFIX_RE: Regex = Regex::new(r"^([A-Z]{1,5})(\d+(?:\.\d+)?)?$").unwrap();
    /// "wins by 7", "wins by over 6.5"
    static ref WINS_BY_RE: Regex =
        Regex::new(r"(?i)wins?\s+by\s+(?:over\s+)?(\d+(?:\.\d+)?)").unwrap();
    static ref FLOAT_RE: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();
    static ref SIGNED_FLOAT_RE: Regex = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
    /// Ordered team-name matchers for title fallback.
    static ref TEAM_TITLE_RES: Vec<(Regex, &'static str)> = TEAM_ABBREVS
        .iter()
        .map(|(_, name)| (Regex::new(&format!("(?i){}", regex::escape(name))).unwrap(), *name))
        .collect();
    static ref HOME_RE: Regex = Regex::new(r"(?i)\bhome\b").unwrap();
    static ref AWAY_RE: Regex = Regex::new(r"(?i)\baway\b").unwrap();
}

/// Result of parsing one market's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMarket {
    pub line: Option<f64>,
    pub side: String,
    pub parse_source: ParseSource,
    pub ladder_key: Option<String>,
    pub predicate: Option<Predicate>,
    pub team_abbrev: Option<String>,
}

impl ParsedMarket {
    fn unknown() -> Self {
        Self {
            line: None,
            side: "Unknown".to_string(),
            parse_source: ParseSource::Unknown,
            ladder_key: None,
            predicate: None,
            team_abbrev: None,
        }
    }
}

fn team_name_for(abbrev: &str) -> Option<&'static str> {
    TEAM_ABBREVS
        .iter()
        .find(|(a, _)| *a == abbrev)
        .map(|(_, name)| *name)
}

/// Split the ticker on '-' and decode the final segment.
///
/// Returns `(letter_prefix, numeric_line)`; `None` when the final segment
/// does not look like a side/line suffix at all.
pub fn parse_suffix(ticker: &str) -> Option<(String, Option<f64>)> {
    let last = ticker.rsplit('-').next()?;
    let caps = SUFFIX_RE.captures(last)?;
    let prefix = caps.get(1)?.as_str().to_string();
    let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    Some((prefix, line))
}

fn side_from_suffix(prefix: &str) -> Option<(String, Option<String>)> {
    if let Some(name) = team_name_for(prefix) {
        return Some((name.to_string(), Some(prefix.to_string())));
    }
    match prefix {
        "O" | "OV" | "OVER" => Some(("Over".to_string(), None)),
        "U" | "UN" | "UNDER" => Some(("Under".to_string(), None)),
        _ => None,
    }
}

fn line_from_title(title: &str, group_type: GroupType) -> Option<f64> {
    match group_type {
        GroupType::Total => FLOAT_RE
            .find(title)
            .and_then(|m| m.as_str().parse().ok()),
        GroupType::Spread => {
            if let Some(caps) = WINS_BY_RE.captures(title) {
                return caps.get(1).and_then(|m| m.as_str().parse().ok());
            }
            SIGNED_FLOAT_RE
                .find(title)
                .and_then(|m| m.as_str().parse().ok())
        }
        _ => None,
    }
}

fn side_from_title(title: &str, group_type: GroupType) -> Option<String> {
    match group_type {
        GroupType::Total => {
            let lower = title.to_lowercase();
            if lower.contains("over") {
                Some("Over".to_string())
            } else if lower.contains("under") {
                Some("Under".to_string())
            } else {
                None
            }
        }
        GroupType::Spread => {
            for (re, name) in TEAM_TITLE_RES.iter() {
                if re.is_match(title) {
                    return Some(name.to_string());
                }
            }
            if HOME_RE.is_match(title) {
                Some("Home".to_string())
            } else if AWAY_RE.is_match(title) {
                Some("Away".to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Ladder key + predicate for a resolved (group, side) pair. Also used by
/// metadata assembly when the side arrives from the resolver instead of a
/// local parse.
pub(crate) fn ladder_key_for(
    game_id: &str,
    group_type: GroupType,
    side: &str,
) -> (Option<String>, Option<Predicate>) {
    let predicate = match group_type {
        GroupType::Spread => Predicate::WinsByOver,
        GroupType::Total => {
            if side.eq_ignore_ascii_case("under") {
                Predicate::TotalUnder
            } else {
                Predicate::TotalOver
            }
        }
        _ => return (None, None),
    };

    let key = format!(
        "{}|{}|{}|{}",
        game_id,
        group_type.as_str(),
        side,
        predicate.as_str()
    );
    (Some(key), Some(predicate))
}

/// Parse one market. Never fails; unknown markets come back with
/// side = "Unknown" and no ladder key.
pub fn parse_market(
    ticker: &str,
    title: &str,
    group_type: GroupType,
    game_id: &str,
) -> ParsedMarket {
    let suffix = parse_suffix(ticker);

    // Ticker suffix wins when its prefix is recognizable.
    if let Some((prefix, suffix_line)) = &suffix {
        if let Some((side, team_abbrev)) = side_from_suffix(prefix) {
            let line = suffix_line.or_else(|| line_from_title(title, group_type));
            let (ladder_key, predicate) = if matches!(
                group_type,
                GroupType::Spread | GroupType::Total
            ) {
                ladder_key_for(game_id, group_type, &side)
            } else {
                (None, None)
            };
            return ParsedMarket {
                line,
                side,
                parse_source: ParseSource::Ticker,
                ladder_key,
                predicate,
                team_abbrev,
            };
        }
    }

    // Title fallback.
    let title_line = line_from_title(title, group_type);
    if let Some(side) = side_from_title(title, group_type) {
        let line = title_line.or_else(|| suffix.as_ref().and_then(|(_, l)| *l));
        let (ladder_key, predicate) = if matches!(group_type, GroupType::Spread | GroupType::Total)
        {
            ladder_key_for(game_id, group_type, &side)
        } else {
            (None, None)
        };
        return ParsedMarket {
            line,
            side,
            parse_source: ParseSource::Title,
            ladder_key,
            predicate,
            team_abbrev: None,
        };
    }

    ParsedMarket {
        line: title_line,
        ..ParsedMarket::unknown()
    }
}
