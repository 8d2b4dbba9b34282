//! Per-Client Analytics Session
//! Mission: One worker, one game, one subscriber - everything else is a message

pub mod orchestrator;

pub use orchestrator::{launch, Session};

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::feeds::TickerMsg;
use crate::ladders::Ladder;
use crate::markets::MarketMeta;
use crate::models::Signal;
use crate::stats::EnrichedStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Resolving,
    Connecting,
    Streaming,
    Disconnected,
    Error,
}

/// Outbound records pushed to the one subscriber of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Status {
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Meta {
        event: serde_json::Value,
        markets: Vec<MarketMeta>,
        resolved_events: Vec<serde_json::Value>,
        game_id: String,
    },
    /// Coalesced ticker echo: latest record per market since last flush.
    Ticker { data: HashMap<String, TickerMsg> },
    /// Raw feed records for debugging, batched.
    Raw { messages: Vec<serde_json::Value> },
    Stats {
        ts: i64,
        markets: HashMap<String, EnrichedStats>,
    },
    Signals {
        ts: i64,
        signals: Vec<Signal>,
        ladders: Vec<Ladder>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        requires_auth: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub event_ticker: String,
    pub game_id: String,
    pub market_count: usize,
    pub started_at_ms: i64,
}

/// Live-session registry shared with the REST surface.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
}

impl SessionRegistry {
    pub fn register(&self, info: SessionInfo) {
        self.sessions.write().insert(info.id.clone(), info);
    }

    pub fn deregister(&self, id: &str) {
        self.sessions.write().remove(id);
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at_ms.cmp(&b.started_at_ms));
        sessions
    }
}
