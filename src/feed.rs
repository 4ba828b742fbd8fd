//! Market data ingestion: a synthetic random-walk feed for paper trading and
//! tests, and a venue-agnostic live websocket feed with reconnect/backoff.
//!
//! Both publish `OrderBookSnapshot`/`TradeEvent` on the shared `EventBus` and
//! update the `FeedStore`'s latest-snapshot cache; neither keeps history.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::events::EventBus;
use crate::feed_store::FeedStore;
use crate::types::{OrderBookLevel, OrderBookSnapshot, Side, TradeEvent};

const SYNTHETIC_TICK_INTERVAL: Duration = Duration::from_millis(500);
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// A `true` value requests shutdown; tasks observe it at their next
/// suspension point (§5).
pub type StopSignal = watch::Receiver<bool>;

fn should_stop(stop: &StopSignal) -> bool {
    *stop.borrow()
}

/// Emits a random-walk mid with spread proportional to a fixed volatility
/// parameter, at a configurable tick interval (default 500ms per the
/// original's synthetic feed).
pub struct SyntheticFeed {
    pub venue: String,
    pub symbol: String,
    pub base_price: f64,
    pub volatility: f64,
    pub tick_interval: Duration,
}

impl SyntheticFeed {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, base_price: f64) -> Self {
        SyntheticFeed {
            venue: venue.into(),
            symbol: symbol.into(),
            base_price,
            volatility: 0.0005,
            tick_interval: SYNTHETIC_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub async fn run(self, bus: Arc<EventBus>, store: Arc<FeedStore>, mut stop: StopSignal) {
        let mut mid = self.base_price;
        let mut rng = rand::thread_rng();
        loop {
            if should_stop(&stop) {
                return;
            }
            let shock: f64 = rng.gen_range(-1.0..1.0) * mid * self.volatility;
            mid = (mid + shock).max(self.base_price * 0.01);
            let spread = (mid * self.volatility * 4.0).max(0.01);
            let snapshot = OrderBookSnapshot {
                venue: self.venue.clone(),
                symbol: self.symbol.clone(),
                timestamp: Utc::now(),
                bid: OrderBookLevel {
                    price: mid - spread / 2.0,
                    size: rng.gen_range(0.1..5.0),
                },
                ask: OrderBookLevel {
                    price: mid + spread / 2.0,
                    size: rng.gen_range(0.1..5.0),
                },
                last_trade_price: mid,
                last_trade_size: rng.gen_range(0.01..1.0),
                mark_price: None,
            };
            store.update_snapshot(snapshot.clone());
            bus.publish_snapshot(snapshot).await;

            if rng.gen_bool(0.3) {
                let trade = TradeEvent {
                    venue: self.venue.clone(),
                    symbol: self.symbol.clone(),
                    timestamp: Utc::now(),
                    price: mid,
                    size: rng.gen_range(0.01..0.5),
                    side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                };
                bus.publish_trade(trade).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = stop.changed() => { if should_stop(&stop) { return; } }
            }
        }
    }
}

/// Normalized wire schema for incoming websocket payloads. All JSON parsing
/// happens here; unparseable frames are logged and dropped (§4.1, §9).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum FeedMessage {
    Ticker {
        symbol: String,
        bid_price: f64,
        bid_size: f64,
        ask_price: f64,
        ask_size: f64,
        #[serde(default)]
        mark_price: Option<f64>,
        #[serde(default)]
        last_price: f64,
        #[serde(default)]
        last_size: f64,
    },
    Match {
        symbol: String,
        price: f64,
        size: f64,
        side: String,
    },
    Ping {
        id: String,
    },
}

/// Maintains a persistent websocket subscription to a venue's ticker and
/// match streams, reconnecting with exponential backoff on any failure.
pub struct LiveFeed {
    pub venue: String,
    pub symbol: String,
    pub ws_url: String,
}

impl LiveFeed {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, ws_url: impl Into<String>) -> Self {
        LiveFeed {
            venue: venue.into(),
            symbol: symbol.into(),
            ws_url: ws_url.into(),
        }
    }

    pub async fn run(self, bus: Arc<EventBus>, store: Arc<FeedStore>, mut stop: StopSignal) {
        let mut backoff = RECONNECT_INITIAL;
        loop {
            if should_stop(&stop) {
                return;
            }
            match self.connect_and_stream(&bus, &store, &mut stop).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(venue = %self.venue, symbol = %self.symbol, %err, "feed disconnected, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = stop.changed() => { if should_stop(&stop) { return; } }
                    }
                    backoff = (backoff * 2).min(RECONNECT_CAP);
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        bus: &Arc<EventBus>,
        store: &Arc<FeedStore>,
        stop: &mut StopSignal,
    ) -> anyhow::Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                msg = read.next() => {
                    let Some(msg) = msg else { return Ok(()) };
                    let msg = msg?;
                    self.handle_message(msg, bus, store, &mut write).await?;
                }
                _ = stop.changed() => {
                    if should_stop(stop) {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_message(
        &self,
        msg: Message,
        bus: &Arc<EventBus>,
        store: &Arc<FeedStore>,
        write: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    ) -> anyhow::Result<()> {
        let text = match msg {
            Message::Text(t) => t,
            Message::Ping(payload) => {
                write.send(Message::Pong(payload)).await?;
                return Ok(());
            }
            Message::Close(_) => return Err(anyhow::anyhow!("feed closed by remote")),
            _ => return Ok(()),
        };
        let parsed: FeedMessage = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(%err, payload = %text, "dropping unparseable feed payload");
                return Ok(());
            }
        };
        match parsed {
            FeedMessage::Ping { id } => {
                let pong = serde_json::json!({"type": "pong", "id": id});
                write.send(Message::Text(pong.to_string())).await?;
            }
            FeedMessage::Ticker {
                symbol,
                bid_price,
                bid_size,
                ask_price,
                ask_size,
                mark_price,
                last_price,
                last_size,
            } => {
                let snapshot = OrderBookSnapshot {
                    venue: self.venue.clone(),
                    symbol,
                    timestamp: Utc::now(),
                    bid: OrderBookLevel { price: bid_price, size: bid_size },
                    ask: OrderBookLevel { price: ask_price, size: ask_size },
                    last_trade_price: last_price,
                    last_trade_size: last_size,
                    mark_price,
                };
                store.update_snapshot(snapshot.clone());
                bus.publish_snapshot(snapshot).await;
            }
            FeedMessage::Match { symbol, price, size, side } => {
                let side = match side.as_str() {
                    "buy" => Side::Buy,
                    _ => Side::Sell,
                };
                bus.publish_trade(TradeEvent {
                    venue: self.venue.clone(),
                    symbol,
                    timestamp: Utc::now(),
                    price,
                    size,
                    side,
                })
                .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_feed_publishes_snapshots_until_stopped() {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(FeedStore::new());
        let (tx, rx) = watch::channel(false);
        let feed = SyntheticFeed::new("kucoin", "BTC-PERP", 30_000.0)
            .with_tick_interval(Duration::from_millis(5));
        let handle = tokio::spawn(feed.run(bus, store.clone(), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
        assert!(store.get_snapshot("BTC-PERP").is_some());
    }

    #[test]
    fn unparseable_payload_does_not_panic_on_deserialize() {
        let result: Result<FeedMessage, _> = serde_json::from_str("{not json");
        assert!(result.is_err());
    }

    #[test]
    fn ticker_payload_parses_into_normalized_schema() {
        let raw = r#"{"type":"ticker","symbol":"BTC-PERP","bid_price":100.0,"bid_size":1.0,"ask_price":101.0,"ask_size":1.0}"#;
        let parsed: FeedMessage = serde_json::from_str(raw).unwrap();
        matches!(parsed, FeedMessage::Ticker { .. });
    }
}
