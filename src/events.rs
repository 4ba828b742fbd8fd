//! A minimal async event bus: topic-keyed fan-out of snapshots and trades.
//!
//! Mirrors the shape of a pub/sub bus with async subscriber callbacks rather
//! than a broadcast channel, so that `publish` can await every subscriber as
//! a group before returning (the §5 ordering guarantee: "no publisher
//! proceeds until all subscribers return").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{OrderBookSnapshot, TradeEvent};

pub const SNAPSHOT_TOPIC: &str = "snapshot";
pub const TRADE_TOPIC: &str = "trade";

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// An async handler for events published to a topic.
pub trait Handler<T>: Send + Sync {
    fn call(&self, payload: T) -> BoxFuture;
}

impl<T, F, Fut> Handler<T> for F
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, payload: T) -> BoxFuture {
        Box::pin(self(payload))
    }
}

/// Generic event bus over a single payload type, keyed by topic name.
pub struct TopicBus<T> {
    subscribers: Mutex<HashMap<String, Vec<Arc<dyn Handler<T>>>>>,
}

impl<T: Clone + Send + 'static> TopicBus<T> {
    pub fn new() -> Self {
        TopicBus {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, topic: &str, handler: Arc<dyn Handler<T>>) {
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }

    pub async fn publish(&self, topic: &str, payload: T) {
        let handlers: Vec<Arc<dyn Handler<T>>> = self
            .subscribers
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default();
        let futures = handlers.iter().map(|h| h.call(payload.clone()));
        futures_util::future::join_all(futures).await;
    }
}

impl<T: Clone + Send + 'static> Default for TopicBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The bot's event bus: one channel for snapshots, one for trades.
pub struct EventBus {
    pub snapshots: TopicBus<OrderBookSnapshot>,
    pub trades: TopicBus<TradeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            snapshots: TopicBus::new(),
            trades: TopicBus::new(),
        }
    }

    pub async fn publish_snapshot(&self, snapshot: OrderBookSnapshot) {
        self.snapshots.publish(SNAPSHOT_TOPIC, snapshot).await;
    }

    pub async fn publish_trade(&self, trade: TradeEvent) {
        self.trades.publish(TRADE_TOPIC, trade).await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn publish_awaits_all_subscribers() {
        let bus: TopicBus<i32> = TopicBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            bus.subscribe(
                "topic",
                Arc::new(move |payload: i32| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(payload as usize, Ordering::SeqCst);
                    }
                }),
            );
        }
        bus.publish("topic", 2).await;
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn publish_on_unknown_topic_is_noop() {
        let bus: TopicBus<i32> = TopicBus::new();
        bus.publish("nothing-subscribed", 1).await;
    }

    #[tokio::test]
    async fn event_bus_fans_out_trade_events() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        bus.trades.subscribe(
            TRADE_TOPIC,
            Arc::new(move |_trade: TradeEvent| {
                let counter2 = counter2.clone();
                async move {
                    counter2.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        bus.publish_trade(TradeEvent {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            price: 100.0,
            size: 1.0,
            side: crate::types::Side::Buy,
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
