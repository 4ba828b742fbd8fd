//! Wires the microstructure/volatility/impact estimators to the event bus:
//! each is updated synchronously as snapshots and trades arrive, and the
//! quoter loop reads the latest values through the same handle.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::EventBus;
use crate::signals::{ImpactEstimator, MicrostructureSignals, VolatilityEstimator};
use crate::types::{MicrostructureFeature, OrderBookSnapshot, TradeEvent};

#[derive(Default)]
struct LastReturn {
    last_mid: Option<f64>,
}

pub struct SignalHub {
    microstructure: Mutex<MicrostructureSignals>,
    volatility: Mutex<VolatilityEstimator>,
    impact: Mutex<ImpactEstimator>,
    last_mid: Mutex<std::collections::HashMap<String, f64>>,
}

impl SignalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(SignalHub {
            microstructure: Mutex::new(MicrostructureSignals::new()),
            volatility: Mutex::new(VolatilityEstimator::new()),
            impact: Mutex::new(ImpactEstimator::new()),
            last_mid: Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// Subscribes this hub to the bus's snapshot and trade topics; call once
    /// per process at startup.
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let hub = self.clone();
        bus.snapshots.subscribe(
            crate::events::SNAPSHOT_TOPIC,
            Arc::new(move |snapshot: OrderBookSnapshot| {
                let hub = hub.clone();
                async move { hub.on_snapshot(snapshot) }
            }),
        );
        let hub = self.clone();
        bus.trades.subscribe(
            crate::events::TRADE_TOPIC,
            Arc::new(move |trade: TradeEvent| {
                let hub = hub.clone();
                async move { hub.on_trade(trade) }
            }),
        );
    }

    fn on_snapshot(&self, snapshot: OrderBookSnapshot) {
        self.last_mid
            .lock()
            .insert(snapshot.symbol.clone(), snapshot.mid());
        self.microstructure.lock().update_snapshot(snapshot.clone());
        self.volatility.lock().update(&snapshot);
    }

    fn on_trade(&self, trade: TradeEvent) {
        self.microstructure.lock().update_trade(
            &trade.symbol,
            crate::types::Trade {
                side: trade.side,
                price: trade.price,
                size: trade.size,
            },
        );
        let mut last_mid = self.last_mid.lock();
        let previous = last_mid.get(&trade.symbol).copied().unwrap_or(trade.price);
        let price_return = if previous > 0.0 {
            (trade.price - previous) / previous
        } else {
            0.0
        };
        self.impact.lock().update(
            &trade.symbol,
            crate::types::Trade {
                side: trade.side,
                price: trade.price,
                size: trade.size,
            },
            price_return,
        );
    }

    pub fn feature(&self, symbol: &str) -> Option<MicrostructureFeature> {
        self.microstructure.lock().get(symbol)
    }

    pub fn sigma(&self, symbol: &str) -> f64 {
        self.volatility.lock().sigma(symbol)
    }

    pub fn impact_lambda(&self, symbol: &str) -> f64 {
        self.impact.lock().get(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBookLevel, Side};
    use chrono::Utc;

    fn snapshot(symbol: &str, mid: f64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "kucoin".into(),
            symbol: symbol.into(),
            timestamp: Utc::now(),
            bid: OrderBookLevel { price: mid - 0.5, size: 1.0 },
            ask: OrderBookLevel { price: mid + 0.5, size: 1.0 },
            last_trade_price: mid,
            last_trade_size: 0.1,
            mark_price: None,
        }
    }

    #[tokio::test]
    async fn hub_feeds_all_three_estimators_from_the_bus() {
        let bus = EventBus::new();
        let hub = SignalHub::new();
        hub.subscribe(&bus);
        bus.publish_snapshot(snapshot("BTC-PERP", 100.0)).await;
        bus.publish_trade(TradeEvent {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            price: 100.5,
            size: 1.0,
            side: Side::Buy,
        })
        .await;
        bus.publish_snapshot(snapshot("BTC-PERP", 101.0)).await;

        assert!(hub.feature("BTC-PERP").is_some());
        assert!(hub.sigma("BTC-PERP") >= 0.0);
        assert!(hub.impact_lambda("BTC-PERP").is_finite());
        assert!(hub.feature("ETH-PERP").is_none());
    }
}
