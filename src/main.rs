//! Gameline - Real-Time Ladder Analytics for Game Markets
//! Mission: Every crossed ladder and mispriced pair surfaced within a second
//!
//! One WebSocket subscriber per session: the client connects with an event
//! ticker, the worker resolves the game, subscribes to the live feed, and
//! streams stats/signals snapshots until either side goes away.

use anyhow::{Context, Result};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gameline_backend::clock::WallClock;
use gameline_backend::models::Config;
use gameline_backend::session::{launch, SessionInfo, SessionRegistry};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    cfg: Config,
    registry: Arc<SessionRegistry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::from_env();
    info!("🚀 Gameline analytics backend starting");
    info!("📡 Feed: {}", cfg.feed_url);
    info!("🔎 Resolver: {}", cfg.resolver_url);

    let state = AppState {
        registry: Arc::new(SessionRegistry::default()),
        cfg,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/ws/game/:event_ticker", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", state.cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown requested");
}

async fn health_check() -> &'static str {
    "🏈 Gameline Operational"
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(event_ticker): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, event_ticker))
}

/// Pump session snapshots to the one subscriber; a closed socket cancels
/// the whole session.
async fn handle_socket(mut socket: WebSocket, state: AppState, event_ticker: String) {
    let session_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
    info!(session = %session_id, game = %event_ticker, "👤 Subscriber connected");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let clock = Arc::new(WallClock::new());

    let session_task = tokio::spawn(launch(
        state.cfg.clone(),
        clock,
        state.registry.clone(),
        session_id.clone(),
        event_ticker,
        out_tx,
        cancel_rx,
    ));

    loop {
        tokio::select! {
            event = out_rx.recv() => match event {
                Some(event) => {
                    let msg = serde_json::to_string(&event).unwrap_or_else(|e| {
                        warn!("Failed to serialize session event: {}", e);
                        "{}".to_string()
                    });
                    if socket.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                // Session finished on its own (feed closed or error).
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if text == "ping" {
                        let _ = socket.send(Message::Text("pong".to_string())).await;
                    } else if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                        if json.get("type").and_then(|t| t.as_str()) == Some("ping") {
                            let pong = serde_json::json!({ "type": "pong" });
                            let _ = socket.send(Message::Text(pong.to_string())).await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    }

    let _ = cancel_tx.send(true);
    let _ = session_task.await;
    info!(session = %session_id, "👋 Subscriber disconnected");
}
