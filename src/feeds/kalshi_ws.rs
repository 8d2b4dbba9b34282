//! Exchange WebSocket Feed Client
//! Mission: Never miss a quote. Streaming > polling.
//!
//! Connects once, subscribes to the session's markets, and forwards every
//! recognized record to the session worker over an unbounded channel. The
//! feed does NOT auto-reconnect: a transport error or server close ends the
//! session, and the subscriber is told so.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::auth::RequestSigner;

/// Top-of-book quote record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerMsg {
    pub market_ticker: String,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub last_price: Option<i64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Full book replacement. Levels arrive as `[price, size]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshotMsg {
    pub market_ticker: String,
    #[serde(default)]
    pub yes: Vec<(i64, i64)>,
    #[serde(default)]
    pub no: Vec<(i64, i64)>,
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Yes,
    No,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookDeltaMsg {
    pub market_ticker: String,
    pub price: i64,
    pub delta: i64,
    pub side: BookSide,
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeMsg {
    pub market_ticker: String,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub yes_price: Option<i64>,
    #[serde(default)]
    pub no_price: Option<i64>,
    #[serde(default)]
    pub taker_side: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Tagged variant over the fixed upstream message set.
/// Unknown tags are rejected silently (`parse` returns `None`).
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Ticker(TickerMsg),
    OrderbookSnapshot(OrderbookSnapshotMsg),
    OrderbookDelta(OrderbookDeltaMsg),
    Trade(TradeMsg),
    Subscribed,
    Error { message: Option<String> },
}

impl FeedMessage {
    pub fn parse(text: &str) -> Option<(FeedMessage, serde_json::Value)> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Malformed feed message ({}): {}", e, &text[..text.len().min(200)]);
                return None;
            }
        };
        let parsed = Self::parse_value(&value)?;
        Some((parsed, value))
    }

    pub fn parse_value(value: &serde_json::Value) -> Option<FeedMessage> {
        let tag = value.get("type")?.as_str()?;
        let msg = value.get("msg").cloned().unwrap_or(serde_json::Value::Null);

        let parsed = match tag {
            "ticker" => FeedMessage::Ticker(from_msg(msg, tag)?),
            "orderbook_snapshot" => FeedMessage::OrderbookSnapshot(from_msg(msg, tag)?),
            "orderbook_delta" => FeedMessage::OrderbookDelta(from_msg(msg, tag)?),
            "trade" => FeedMessage::Trade(from_msg(msg, tag)?),
            "subscribed" => FeedMessage::Subscribed,
            "error" => FeedMessage::Error {
                message: msg
                    .get("message")
                    .or_else(|| value.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
            },
            other => {
                debug!("Dropping unknown feed record type: {}", other);
                return None;
            }
        };
        Some(parsed)
    }
}

fn from_msg<T: serde::de::DeserializeOwned>(msg: serde_json::Value, tag: &str) -> Option<T> {
    match serde_json::from_value(msg) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Malformed {} payload: {}", tag, e);
            None
        }
    }
}

/// Subscription command sent after connect.
#[derive(Debug, Clone, Serialize)]
struct SubscribeCmd {
    cmd: &'static str,
    params: SubscribeParams,
}

#[derive(Debug, Clone, Serialize)]
struct SubscribeParams {
    channels: Vec<&'static str>,
    market_tickers: Vec<String>,
}

/// Events delivered to the session worker.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A recognized record plus its raw JSON (for the debug raw batch).
    Message(FeedMessage, serde_json::Value),
    /// Transport ended; `error` is `None` on a graceful server close.
    Disconnected { error: Option<String> },
}

/// Connect, subscribe, and stream until cancel/close/error.
///
/// Runs as its own task; the session worker owns the receiving half.
pub async fn run_feed(
    url: String,
    signer: Option<RequestSigner>,
    market_tickers: Vec<String>,
    tx: mpsc::UnboundedSender<FeedEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    let result = connect_and_stream(&url, signer, market_tickers, &tx, &mut cancel).await;

    let error = match result {
        Ok(()) => None,
        Err(e) => {
            error!("Feed error: {:#}", e);
            Some(format!("{:#}", e))
        }
    };
    let _ = tx.send(FeedEvent::Disconnected { error });
}

async fn connect_and_stream(
    url: &str,
    signer: Option<RequestSigner>,
    market_tickers: Vec<String>,
    tx: &mpsc::UnboundedSender<FeedEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut request = url
        .into_client_request()
        .context("Failed to build feed request")?;

    if let Some(signer) = &signer {
        let path = request.uri().path().to_string();
        let ts = chrono::Utc::now().timestamp_millis();
        for (name, value) in signer.headers(ts, "GET", &path)? {
            request
                .headers_mut()
                .insert(name, value.parse().context("Invalid auth header value")?);
        }
    }

    info!("🔌 Connecting to market feed...");
    let (ws_stream, response) = connect_async(request)
        .await
        .context("Failed to connect to feed")?;
    info!("✅ Feed connected (status: {})", response.status());

    let (mut write, mut read) = ws_stream.split();

    let subscribe = SubscribeCmd {
        cmd: "subscribe",
        params: SubscribeParams {
            channels: vec!["ticker", "orderbook_delta", "trade"],
            market_tickers,
        },
    };
    let sub_json =
        serde_json::to_string(&subscribe).context("Failed to serialize subscribe command")?;
    write
        .send(Message::Text(sub_json))
        .await
        .context("Failed to send subscribe command")?;
    info!(
        "📡 Subscribed to {} markets",
        subscribe.params.market_tickers.len()
    );

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    info!("Feed cancelled, closing");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
            message = read.next() => {
                let Some(message) = message else {
                    info!("Feed stream ended");
                    return Ok(());
                };
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some((parsed, raw)) = FeedMessage::parse(&text) {
                            if tx.send(FeedEvent::Message(parsed, raw)).is_err() {
                                // Session worker is gone; nothing left to feed.
                                return Ok(());
                            }
                        }
                    }
                    Ok(Message::Ping(ping)) => {
                        write
                            .send(Message::Pong(ping))
                            .await
                            .context("Failed to send pong")?;
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        info!("Feed closed by server: {:?}", frame);
                        return Ok(());
                    }
                    Ok(Message::Binary(data)) => {
                        warn!("Unexpected binary feed message: {} bytes", data.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(e).context("Feed read error");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_record() {
        let text = r#"{
            "type": "ticker",
            "msg": {
                "market_ticker": "KXNFLSPREAD-26JAN04BALPIT-BAL3",
                "yes_bid": 42,
                "yes_ask": 45,
                "volume": 12000,
                "ts": 1700000000000
            }
        }"#;

        let (parsed, raw) = FeedMessage::parse(text).unwrap();
        match parsed {
            FeedMessage::Ticker(t) => {
                assert_eq!(t.market_ticker, "KXNFLSPREAD-26JAN04BALPIT-BAL3");
                assert_eq!(t.yes_bid, Some(42));
                assert_eq!(t.yes_ask, Some(45));
                assert_eq!(t.last_price, None);
            }
            other => panic!("expected ticker, got {:?}", other),
        }
        assert_eq!(raw["type"], "ticker");
    }

    #[test]
    fn parses_orderbook_snapshot_levels() {
        let text = r#"{
            "type": "orderbook_snapshot",
            "msg": {
                "market_ticker": "T",
                "yes": [[40, 100], [39, 250]],
                "no": [[55, 80]]
            }
        }"#;

        let (parsed, _) = FeedMessage::parse(text).unwrap();
        match parsed {
            FeedMessage::OrderbookSnapshot(s) => {
                assert_eq!(s.yes, vec![(40, 100), (39, 250)]);
                assert_eq!(s.no, vec![(55, 80)]);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn parses_delta_and_trade() {
        let delta = r#"{"type":"orderbook_delta","msg":{"market_ticker":"T","price":40,"delta":-25,"side":"no"}}"#;
        let (parsed, _) = FeedMessage::parse(delta).unwrap();
        match parsed {
            FeedMessage::OrderbookDelta(d) => {
                assert_eq!(d.side, BookSide::No);
                assert_eq!(d.delta, -25);
            }
            other => panic!("expected delta, got {:?}", other),
        }

        let trade = r#"{"type":"trade","msg":{"market_ticker":"T","yes_price":44,"count":3,"taker_side":"yes"}}"#;
        let (parsed, _) = FeedMessage::parse(trade).unwrap();
        match parsed {
            FeedMessage::Trade(t) => {
                assert_eq!(t.yes_price, Some(44));
                assert_eq!(t.count, Some(3));
                assert_eq!(t.taker_side.as_deref(), Some("yes"));
            }
            other => panic!("expected trade, got {:?}", other),
        }
    }

    #[test]
    fn unknown_tags_dropped_silently() {
        assert!(FeedMessage::parse(r#"{"type":"fill","msg":{}}"#).is_none());
        assert!(FeedMessage::parse("not json").is_none());
        assert!(FeedMessage::parse(r#"{"no_type":true}"#).is_none());
    }

    #[test]
    fn control_records_parse() {
        let (parsed, _) = FeedMessage::parse(r#"{"type":"subscribed","msg":{"sid":1}}"#).unwrap();
        assert!(matches!(parsed, FeedMessage::Subscribed));

        let (parsed, _) =
            FeedMessage::parse(r#"{"type":"error","msg":{"message":"auth required"}}"#).unwrap();
        match parsed {
            FeedMessage::Error { message } => {
                assert_eq!(message.as_deref(), Some("auth required"))
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn subscribe_command_shape() {
        let cmd = SubscribeCmd {
            cmd: "subscribe",
            params: SubscribeParams {
                channels: vec!["ticker", "orderbook_delta", "trade"],
                market_tickers: vec!["A".to_string(), "B".to_string()],
            },
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["cmd"], "subscribe");
        assert_eq!(json["params"]["channels"][1], "orderbook_delta");
        assert_eq!(json["params"]["market_tickers"][1], "B");
    }
}
