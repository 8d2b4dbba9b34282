//! Game Resolver Client
//!
//! Discovers which markets belong to a game before the feed session starts.
//! The resolver is an external REST collaborator; this client only shapes
//! the request/response and surfaces "no markets" as a hard error so the
//! session can close cleanly.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::GroupType;

/// One market as described by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub ticker: String,
    pub title: String,
    pub event_ticker: String,
    #[serde(default)]
    pub group_type: Option<GroupType>,
    #[serde(default)]
    pub line: Option<f64>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

/// Full resolver payload for one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedGame {
    pub game_id: String,
    pub primary_event: serde_json::Value,
    #[serde(default)]
    pub enriched_markets: Vec<MarketInfo>,
    #[serde(default)]
    pub resolved_events: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct Resolver {
    client: Client,
    base_url: String,
}

impl Resolver {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build resolver HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub async fn resolve(&self, event_ticker: &str) -> Result<ResolvedGame> {
        let url = format!("{}/resolve/{}", self.base_url, event_ticker);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("game not found: {}", event_ticker);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} {}: {}", url, status, text);
        }

        let game = resp
            .json::<ResolvedGame>()
            .await
            .context("Failed to parse resolver response")?;

        if game.enriched_markets.is_empty() {
            anyhow::bail!("resolver returned no markets for {}", event_ticker);
        }

        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_game_deserializes_with_defaults() {
        let json = r#"{
            "game_id": "26JAN04BALPIT",
            "primary_event": {"event_ticker": "KXNFLGAME-26JAN04BALPIT"},
            "enriched_markets": [
                {
                    "ticker": "KXNFLSPREAD-26JAN04BALPIT-BAL3",
                    "title": "Ravens win by over 3",
                    "event_ticker": "KXNFLSPREAD-26JAN04BALPIT",
                    "group_type": "spread"
                }
            ]
        }"#;

        let game: ResolvedGame = serde_json::from_str(json).unwrap();
        assert_eq!(game.game_id, "26JAN04BALPIT");
        assert_eq!(game.enriched_markets.len(), 1);
        assert_eq!(game.enriched_markets[0].group_type, Some(GroupType::Spread));
        assert!(game.resolved_events.is_empty());
    }
}
