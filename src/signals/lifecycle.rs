//! Signal Lifecycle
//!
//! Persistence, cooldown, and ranking over raw detector candidates. A
//! candidate must re-trigger continuously for the persistence window before
//! its first emission, and the same canonical key cannot emit again inside
//! the cooldown. Pending entries decay fast; emitted signals age out of the
//! active set on their own timer.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{Config, Signal};

use super::SignalCandidate;

/// Pending entries unseen for longer than this are dropped.
const PENDING_TTL_MS: i64 = 2_000;

#[derive(Debug)]
struct PendingEntry {
    candidate: SignalCandidate,
    first_seen_ts: i64,
    last_seen_ts: i64,
    emitted_ts: Option<i64>,
}

#[derive(Debug)]
pub struct SignalLifecycle {
    persist_ms: i64,
    cooldown_ms: i64,
    active_max_age_ms: i64,
    top_k: usize,
    pending: HashMap<String, PendingEntry>,
    /// Emitted signals by id.
    active: HashMap<String, Signal>,
}

impl SignalLifecycle {
    pub fn new(cfg: &Config) -> Self {
        Self {
            persist_ms: cfg.persist_ms,
            cooldown_ms: cfg.cooldown_ms,
            active_max_age_ms: cfg.active_signal_max_age_ms,
            top_k: cfg.top_k,
            pending: HashMap::new(),
            active: HashMap::new(),
        }
    }

    /// Feed one candidate observation at time `now`. Returns the emitted
    /// signal when both the persistence and cooldown gates pass.
    pub fn observe(&mut self, candidate: SignalCandidate, now: i64) -> Option<Signal> {
        use std::collections::hash_map::Entry;

        let entry = match self.pending.entry(candidate.canonical_key()) {
            Entry::Vacant(vacant) => {
                // First sighting never emits.
                vacant.insert(PendingEntry {
                    candidate,
                    first_seen_ts: now,
                    last_seen_ts: now,
                    emitted_ts: None,
                });
                return None;
            }
            Entry::Occupied(occupied) => occupied.into_mut(),
        };

        entry.last_seen_ts = now;
        entry.candidate = candidate;

        let persisted = now - entry.first_seen_ts >= self.persist_ms;
        let cooled = match entry.emitted_ts {
            Some(emitted) => now - emitted >= self.cooldown_ms,
            None => true,
        };
        if !(persisted && cooled) {
            return None;
        }

        entry.emitted_ts = Some(now);
        let signal = Signal {
            id: format!("sig_{}", uuid::Uuid::new_v4().simple()),
            ts: now,
            market_ticker: entry.candidate.market_ticker.clone(),
            kind: entry.candidate.kind,
            confidence: entry.candidate.confidence,
            suggested_action: entry.candidate.suggested_action.clone(),
            reason: entry.candidate.reason.clone(),
            magnitude: entry.candidate.magnitude,
            related_tickers: entry.candidate.related_tickers.clone(),
            severity_score: entry.candidate.severity_score(),
            ladder_key: entry.candidate.ladder_key.clone(),
        };
        self.active.insert(signal.id.clone(), signal.clone());
        debug!(key = %signal.market_ticker, kind = signal.kind.as_str(), "signal emitted");
        Some(signal)
    }

    /// Drop decayed pending entries and aged-out active signals.
    pub fn cleanup(&mut self, now: i64) {
        self.pending
            .retain(|_, e| now - e.last_seen_ts <= PENDING_TTL_MS);
        let max_age = self.active_max_age_ms;
        self.active.retain(|_, s| now - s.ts <= max_age);
    }

    /// Top-K active signals by severity, descending.
    pub fn active_signals(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.active.values().cloned().collect();
        signals.sort_by(|a, b| {
            b.severity_score
                .partial_cmp(&a.severity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        signals.truncate(self.top_k);
        signals
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, SignalKind};

    fn candidate() -> SignalCandidate {
        SignalCandidate {
            kind: SignalKind::MonoViolation,
            market_ticker: "KXNFLSPREAD-26JAN04BALPIT-BAL3".to_string(),
            ladder_key: Some("26JAN04BALPIT|spread|Baltimore Ravens|wins_by_over".to_string()),
            magnitude: 4.5,
            confidence: Confidence::High,
            reason: "adjacent lines cross".to_string(),
            suggested_action: "REVIEW_LADDER".to_string(),
            related_tickers: None,
            min_depth: 2_500.0,
            avg_spread_cents: 2.0,
        }
    }

    fn lifecycle() -> SignalLifecycle {
        SignalLifecycle::new(&Config::default())
    }

    #[test]
    fn no_emit_before_persistence_window() {
        let mut lc = lifecycle();
        assert!(lc.observe(candidate(), 0).is_none());
        assert!(lc.observe(candidate(), 1_000).is_none());
        assert!(lc.observe(candidate(), 2_999).is_none());
        assert!(lc.observe(candidate(), 3_000).is_some());
    }

    #[test]
    fn emits_once_then_respects_cooldown() {
        let mut lc = lifecycle();
        let mut emitted = Vec::new();
        // Re-detected every second for 40 seconds.
        for t in (0..=40_000).step_by(1_000) {
            if let Some(s) = lc.observe(candidate(), t) {
                emitted.push((t, s));
            }
        }
        // First at 3s (persistence), second at 33s (cooldown).
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].0, 3_000);
        assert_eq!(emitted[1].0, 33_000);
    }

    #[test]
    fn pending_decays_when_not_reobserved() {
        let mut lc = lifecycle();
        assert!(lc.observe(candidate(), 0).is_none());
        assert_eq!(lc.pending_len(), 1);

        // Not seen for > 2s → dropped; persistence restarts from scratch.
        lc.cleanup(2_500);
        assert_eq!(lc.pending_len(), 0);

        assert!(lc.observe(candidate(), 2_600).is_none());
        assert!(lc.observe(candidate(), 5_000).is_none());
        assert!(lc.observe(candidate(), 5_600).is_some());
    }

    #[test]
    fn active_evicts_after_max_age() {
        let mut lc = lifecycle();
        for t in (0..=3_000).step_by(1_000) {
            lc.observe(candidate(), t);
        }
        assert_eq!(lc.active_len(), 1);

        lc.cleanup(62_000);
        assert_eq!(lc.active_len(), 1); // emitted at 3s, 59s old

        lc.cleanup(63_500);
        assert_eq!(lc.active_len(), 0);
    }

    #[test]
    fn top_k_ranked_by_severity() {
        let mut cfg = Config::default();
        cfg.top_k = 2;
        let mut lc = SignalLifecycle::new(&cfg);

        for (i, magnitude) in [3.0, 9.0, 6.0].iter().enumerate() {
            let mut c = candidate();
            c.market_ticker = format!("MKT-{}", i);
            c.magnitude = *magnitude;
            lc.observe(c.clone(), 0);
            lc.observe(c, 3_000);
        }
        assert_eq!(lc.active_len(), 3);

        let top = lc.active_signals();
        assert_eq!(top.len(), 2);
        assert!(top[0].severity_score >= top[1].severity_score);
        assert_eq!(top[0].market_ticker, "MKT-1");
    }

    #[test]
    fn newest_candidate_fields_win() {
        let mut lc = lifecycle();
        lc.observe(candidate(), 0);
        let mut stronger = candidate();
        stronger.magnitude = 7.5;
        let emitted = lc.observe(stronger, 3_000).unwrap();
        assert_eq!(emitted.magnitude, 7.5);
    }
}
