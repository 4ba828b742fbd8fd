//! Latest-snapshot cache keyed by symbol. No history is kept; that is a
//! storage concern (see `storage`).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::OrderBookSnapshot;

pub struct FeedStore {
    snapshots: Mutex<HashMap<String, OrderBookSnapshot>>,
}

impl FeedStore {
    pub fn new() -> Self {
        FeedStore {
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    pub fn update_snapshot(&self, snapshot: OrderBookSnapshot) {
        self.snapshots
            .lock()
            .insert(snapshot.symbol.clone(), snapshot);
    }

    /// Point-in-time copy of the latest snapshot for `symbol`, if any.
    pub fn get_snapshot(&self, symbol: &str) -> Option<OrderBookSnapshot> {
        self.snapshots.lock().get(symbol).cloned()
    }
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::OrderBookLevel;

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

    #[test]
    fn unknown_symbol_returns_none() {
        let store = FeedStore::new();
        assert!(store.get_snapshot("BTC-PERP").is_none());
    }

    #[test]
    fn stores_latest_snapshot_per_symbol() {
        let store = FeedStore::new();
        store.update_snapshot(snapshot("BTC-PERP", 100.0));
        store.update_snapshot(snapshot("BTC-PERP", 101.0));
        store.update_snapshot(snapshot("ETH-PERP", 10.0));
        assert_eq!(store.get_snapshot("BTC-PERP").unwrap().mid(), 101.0);
        assert_eq!(store.get_snapshot("ETH-PERP").unwrap().mid(), 10.0);
    }
}
