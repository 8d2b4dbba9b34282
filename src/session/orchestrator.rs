//! Session Orchestrator
//!
//! The single logical worker per session. It owns every piece of mutable
//! analytics state, interleaves feed ingestion with the periodic ticks, and
//! is the only producer on the subscriber channel. All suspension points
//! live in the select loop; the analytics passes themselves never yield.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::arbitrage::ArbitrageDetector;
use crate::books::BookState;
use crate::clock::Clock;
use crate::feeds::{run_feed, FeedEvent, FeedMessage, RequestSigner};
use crate::ladders::LadderBuilder;
use crate::markets::{MarketMeta, Resolver};
use crate::models::Config;
use crate::signals::SignalLifecycle;
use crate::stats::{EnrichedStats, Enricher, StatsEngine};

use super::{SessionEvent, SessionStatus};

const RAW_BUFFER_CAP: usize = 50;
const FIRST_MESSAGE_WINDOW: Duration = Duration::from_secs(5);

pub struct Session {
    cfg: Config,
    clock: Arc<dyn Clock>,
    game_id: String,
    metas: HashMap<String, MarketMeta>,
    books: BookState,
    stats: StatsEngine,
    enricher: Enricher,
    builder: LadderBuilder,
    arbitrage: ArbitrageDetector,
    lifecycle: SignalLifecycle,
    /// Last enriched snapshot per market; refreshed dirty-only on the fast
    /// tick, fully on the slow tick.
    enriched: HashMap<String, EnrichedStats>,
    raw_buffer: Vec<serde_json::Value>,
    ticker_batch: HashMap<String, crate::feeds::TickerMsg>,
    messages_ingested: u64,
}

impl Session {
    pub fn new(
        cfg: Config,
        clock: Arc<dyn Clock>,
        game_id: String,
        metas: HashMap<String, MarketMeta>,
    ) -> Self {
        let stats = StatsEngine::new(&cfg);
        let enricher = Enricher::new(&cfg);
        let builder = LadderBuilder::new(&cfg);
        let arbitrage = ArbitrageDetector::new(cfg.arb_buffer);
        let lifecycle = SignalLifecycle::new(&cfg);
        let books = BookState::new(&cfg);

        Self {
            cfg,
            clock,
            game_id,
            metas,
            books,
            stats,
            enricher,
            builder,
            arbitrage,
            lifecycle,
            enriched: HashMap::new(),
            raw_buffer: Vec::new(),
            ticker_batch: HashMap::new(),
            messages_ingested: 0,
        }
    }

    /// Drive the session to completion. Consumes the feed channel, emits
    /// snapshots on `out`, and returns when the feed ends, the subscriber
    /// goes away, or the cancel token fires.
    pub async fn run(
        mut self,
        mut feed_rx: mpsc::UnboundedReceiver<FeedEvent>,
        out: mpsc::UnboundedSender<SessionEvent>,
        mut cancel: watch::Receiver<bool>,
    ) {
        // First-message window: the upstream has 5s to show signs of life
        // before we assume missing credentials.
        match tokio::time::timeout(FIRST_MESSAGE_WINDOW, feed_rx.recv()).await {
            Ok(Some(FeedEvent::Message(msg, raw))) => {
                if let FeedMessage::Error { message } = &msg {
                    let message = message.clone().unwrap_or_else(|| "feed error".to_string());
                    warn!("Feed rejected session during open: {}", message);
                    let _ = out.send(SessionEvent::Error {
                        message,
                        requires_auth: Some(true),
                    });
                    return;
                }
                self.ingest(msg, raw);
            }
            Ok(Some(FeedEvent::Disconnected { error })) => {
                let _ = out.send(SessionEvent::Error {
                    message: error.unwrap_or_else(|| "feed closed during open".to_string()),
                    requires_auth: None,
                });
                let _ = out.send(SessionEvent::Status {
                    status: SessionStatus::Disconnected,
                    message: None,
                });
                return;
            }
            Ok(None) | Err(_) => {
                let _ = out.send(SessionEvent::Error {
                    message: "no feed messages within the open window".to_string(),
                    requires_auth: Some(true),
                });
                return;
            }
        }

        if out
            .send(SessionEvent::Status {
                status: SessionStatus::Streaming,
                message: None,
            })
            .is_err()
        {
            return;
        }

        let period = |ms: u64| {
            let period = Duration::from_millis(ms);
            let mut ticker = interval_at(Instant::now() + period, period);
            // An overrunning tick delays the next; missed ticks are never
            // queued up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        };
        let mut ticker_flush = period(self.cfg.ticker_batch_interval_ms);
        let mut raw_flush = period(self.cfg.raw_batch_interval_ms);
        let mut stats_tick = period(self.cfg.stats_emit_interval_ms);
        let mut signals_tick = period(self.cfg.signals_emit_interval_ms);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Session cancelled");
                        break;
                    }
                }
                event = feed_rx.recv() => match event {
                    Some(FeedEvent::Message(msg, raw)) => self.ingest(msg, raw),
                    Some(FeedEvent::Disconnected { error }) => {
                        if let Some(message) = error {
                            let _ = out.send(SessionEvent::Error {
                                message,
                                requires_auth: None,
                            });
                        }
                        let _ = out.send(SessionEvent::Status {
                            status: SessionStatus::Disconnected,
                            message: Some(format!(
                                "{} messages ingested",
                                self.messages_ingested
                            )),
                        });
                        break;
                    }
                    None => {
                        let _ = out.send(SessionEvent::Status {
                            status: SessionStatus::Disconnected,
                            message: None,
                        });
                        break;
                    }
                },
                _ = ticker_flush.tick() => {
                    if let Some(event) = self.flush_tickers() {
                        if out.send(event).is_err() {
                            break;
                        }
                    }
                }
                _ = raw_flush.tick() => {
                    if let Some(event) = self.flush_raw() {
                        if out.send(event).is_err() {
                            break;
                        }
                    }
                }
                _ = stats_tick.tick() => {
                    if out.send(self.fast_tick()).is_err() {
                        break;
                    }
                }
                _ = signals_tick.tick() => {
                    if let Some(event) = self.slow_tick() {
                        if out.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Apply one feed record to book state and the batching buffers.
    fn ingest(&mut self, msg: FeedMessage, raw: serde_json::Value) {
        let now = self.clock.now_ms();
        self.messages_ingested += 1;

        match &msg {
            FeedMessage::Subscribed => {
                info!("Feed subscription confirmed");
                return;
            }
            FeedMessage::Error { message } => {
                warn!("Feed error record: {:?}", message);
                return;
            }
            FeedMessage::Ticker(t) => {
                self.ticker_batch.insert(t.market_ticker.clone(), t.clone());
            }
            _ => {}
        }

        if self.raw_buffer.len() >= RAW_BUFFER_CAP {
            self.raw_buffer.remove(0);
        }
        self.raw_buffer.push(raw);

        self.books.apply(&msg, now);
    }

    /// Fast tick: refresh stats for dirty markets, emit the full map.
    fn fast_tick(&mut self) -> SessionEvent {
        let now = self.clock.now_ms();
        for ticker in self.books.take_dirty() {
            self.refresh_market(&ticker, now);
        }
        SessionEvent::Stats {
            ts: now,
            markets: self.enriched.clone(),
        }
    }

    /// Slow tick: full recompute, ladder build, arbitrage scan, signal
    /// lifecycle. Emits only when there is something to say.
    fn slow_tick(&mut self) -> Option<SessionEvent> {
        let now = self.clock.now_ms();

        let tickers: Vec<String> = self.books.iter().map(|(t, _)| t.clone()).collect();
        for ticker in tickers {
            self.refresh_market(&ticker, now);
        }
        self.books.take_dirty();

        let (mut ladders, mut candidates) =
            self.builder.build(&self.enriched, &self.game_id, now);
        candidates.extend(self.arbitrage.scan(&ladders));

        for candidate in candidates {
            let ladder_key = candidate.ladder_key.clone();
            if let Some(signal) = self.lifecycle.observe(candidate, now) {
                if let Some(key) = ladder_key {
                    if let Some(ladder) = ladders.iter_mut().find(|l| l.ladder_key == key) {
                        ladder.violations.push(signal.id.clone());
                    }
                }
            }
        }
        self.lifecycle.cleanup(now);

        let signals = self.lifecycle.active_signals();
        if signals.is_empty() && ladders.is_empty() {
            return None;
        }
        Some(SessionEvent::Signals {
            ts: now,
            signals,
            ladders,
        })
    }

    fn refresh_market(&mut self, ticker: &str, now: i64) {
        let Some(book) = self.books.get(ticker) else {
            return;
        };
        let Some(meta) = self.metas.get(ticker) else {
            // Feed can race metadata on freshly listed markets; skip quietly.
            return;
        };
        let stats = self.stats.compute(ticker, book, now);
        let enriched = self.enricher.enrich(stats, meta, book, now);
        self.enriched.insert(ticker.to_string(), enriched);
    }

    fn flush_tickers(&mut self) -> Option<SessionEvent> {
        if self.ticker_batch.is_empty() {
            return None;
        }
        Some(SessionEvent::Ticker {
            data: std::mem::take(&mut self.ticker_batch),
        })
    }

    fn flush_raw(&mut self) -> Option<SessionEvent> {
        if self.raw_buffer.is_empty() {
            return None;
        }
        Some(SessionEvent::Raw {
            messages: std::mem::take(&mut self.raw_buffer),
        })
    }
}

/// Resolve a game, start the feed, and run the session to completion.
///
/// This is the transport-facing entry point used by the WebSocket handler;
/// everything testable lives in [`Session::run`]. The session registers
/// itself for the REST surface once resolved and deregisters on exit.
pub async fn launch(
    cfg: Config,
    clock: Arc<dyn Clock>,
    registry: Arc<super::SessionRegistry>,
    session_id: String,
    event_ticker: String,
    out: mpsc::UnboundedSender<SessionEvent>,
    cancel: watch::Receiver<bool>,
) {
    let _ = out.send(SessionEvent::Status {
        status: SessionStatus::Resolving,
        message: None,
    });

    let resolver = match Resolver::new(cfg.resolver_url.clone()) {
        Ok(r) => r,
        Err(e) => {
            let _ = out.send(SessionEvent::Error {
                message: format!("{:#}", e),
                requires_auth: None,
            });
            return;
        }
    };
    let game = match resolver.resolve(&event_ticker).await {
        Ok(game) => game,
        Err(e) => {
            warn!("Resolver failed for {}: {:#}", event_ticker, e);
            let _ = out.send(SessionEvent::Error {
                message: format!("{:#}", e),
                requires_auth: None,
            });
            return;
        }
    };

    let mut markets = game.enriched_markets;
    if markets.len() > cfg.max_markets {
        warn!(
            "Trimming {} markets to the {} cap",
            markets.len(),
            cfg.max_markets
        );
        markets.truncate(cfg.max_markets);
    }

    let metas: HashMap<String, MarketMeta> = markets
        .iter()
        .map(|m| (m.ticker.clone(), MarketMeta::build(m, &game.game_id)))
        .collect();
    let tickers: Vec<String> = metas.keys().cloned().collect();

    info!(
        "🎯 Session resolved: {} ({} markets)",
        game.game_id,
        metas.len()
    );
    let _ = out.send(SessionEvent::Meta {
        event: game.primary_event,
        markets: metas.values().cloned().collect(),
        resolved_events: game.resolved_events,
        game_id: game.game_id.clone(),
    });

    let signer = match RequestSigner::from_env() {
        Ok(signer) => signer,
        Err(e) => {
            let _ = out.send(SessionEvent::Error {
                message: format!("{:#}", e),
                requires_auth: Some(true),
            });
            return;
        }
    };

    let _ = out.send(SessionEvent::Status {
        status: SessionStatus::Connecting,
        message: None,
    });

    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let feed_cancel = cancel.clone();
    tokio::spawn(run_feed(
        cfg.feed_url.clone(),
        signer,
        tickers,
        feed_tx,
        feed_cancel,
    ));

    registry.register(super::SessionInfo {
        id: session_id.clone(),
        event_ticker,
        game_id: game.game_id.clone(),
        market_count: metas.len(),
        started_at_ms: clock.now_ms(),
    });

    let session = Session::new(cfg, clock, game.game_id, metas);
    session.run(feed_rx, out, cancel).await;

    registry.deregister(&session_id);
}
