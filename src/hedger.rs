//! Inventory hedging: flattens a symbol's position toward zero via
//! aggressive crossing orders, sliced through TWAP when the notional is
//! large enough to warrant it.

use std::sync::Arc;
use std::time::Instant;

use crate::connector::ExchangeConnector;
use crate::exec::Twap;
use crate::types::{OrderBookSnapshot, Side};

#[derive(Debug, Clone)]
pub struct HedgePolicy {
    pub enabled: bool,
    pub threshold: f64,
    pub max_notional: f64,
    pub hedge_ratio: f64,
    pub cooldown_seconds: f64,
}

pub struct Hedger {
    connector: Arc<ExchangeConnector>,
    policy: HedgePolicy,
    twap: Twap,
    last_timestamp: Option<Instant>,
    pub last_notional: f64,
}

impl Hedger {
    pub fn new(connector: Arc<ExchangeConnector>, policy: HedgePolicy) -> Self {
        Hedger::with_twap(connector, policy, 3, std::time::Duration::from_millis(300))
    }

    pub fn with_twap(
        connector: Arc<ExchangeConnector>,
        policy: HedgePolicy,
        twap_slices: usize,
        twap_interval: std::time::Duration,
    ) -> Self {
        Hedger {
            connector,
            policy,
            twap: Twap::new(twap_slices, twap_interval),
            last_timestamp: None,
            last_notional: 0.0,
        }
    }

    /// Attempts to flatten inventory toward zero, returning the resulting
    /// inventory after any executed hedge fills.
    pub async fn maybe_hedge(
        &mut self,
        snapshot: &OrderBookSnapshot,
        inventory: f64,
        tick_size: f64,
        lot_size: f64,
    ) -> f64 {
        self.last_notional = 0.0;
        if !self.policy.enabled {
            return inventory;
        }
        if let Some(last) = self.last_timestamp {
            if last.elapsed().as_secs_f64() < self.policy.cooldown_seconds {
                return inventory;
            }
        }
        if inventory.abs() < self.policy.threshold {
            return inventory;
        }

        let effective_inventory = inventory * self.policy.hedge_ratio;
        if effective_inventory.abs() < self.policy.threshold {
            return inventory;
        }

        let side = if effective_inventory > 0.0 {
            Side::Sell
        } else {
            Side::Buy
        };
        let price = match side {
            Side::Sell => snapshot.bid.price,
            Side::Buy => snapshot.ask.price,
        };
        let target_size = effective_inventory
            .abs()
            .min(self.policy.max_notional / price.max(tick_size));
        let desired_size = target_size.max(lot_size);

        let executed_delta = std::sync::Arc::new(parking_lot::Mutex::new(0.0f64));
        let notional = std::sync::Arc::new(parking_lot::Mutex::new(0.0f64));
        let connector = self.connector.clone();
        let symbol = snapshot.symbol.clone();
        let venue = connector.venue().to_string();
        let submit = |size: f64| {
            let connector = connector.clone();
            let symbol = symbol.clone();
            let venue = venue.clone();
            let executed_delta = executed_delta.clone();
            let notional = notional.clone();
            async move {
                let snapped = (size / lot_size).round() * lot_size;
                let snapped = snapped.max(lot_size);
                let order = crate::types::Order {
                    venue,
                    symbol: symbol.clone(),
                    side,
                    price,
                    size: snapped,
                    order_id: None,
                    post_only: false,
                };
                let order_id = match connector.place_order(order).await {
                    Ok(id) => id,
                    Err(err) => {
                        tracing::warn!(%err, "hedge order placement failed");
                        return;
                    }
                };
                connector.process_cross(&symbol, price, price).await;
                while let Some(fill) = connector.poll_fill().await {
                    if fill.order_id != order_id {
                        continue;
                    }
                    let signed = match fill.side {
                        Side::Buy => fill.size,
                        Side::Sell => -fill.size,
                    };
                    *executed_delta.lock() += signed;
                    *notional.lock() += (fill.price * fill.size).abs();
                }
            }
        };

        let slices = if desired_size <= self.policy.max_notional / 2.0 {
            1
        } else {
            self.twap.slices()
        };
        if slices > 1 {
            self.twap.execute(submit, desired_size).await;
        } else {
            submit(desired_size).await;
        }

        let delta = *executed_delta.lock();
        self.last_notional = *notional.lock();
        if delta.abs() > 0.0 {
            self.last_timestamp = Some(Instant::now());
        }
        inventory + delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot() -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            bid: crate::types::OrderBookLevel { price: 99.0, size: 1.0 },
            ask: crate::types::OrderBookLevel { price: 101.0, size: 1.0 },
            last_trade_price: 100.0,
            last_trade_size: 0.1,
            mark_price: None,
        }
    }

    fn policy() -> HedgePolicy {
        HedgePolicy {
            enabled: true,
            threshold: 0.1,
            max_notional: 10_000.0,
            hedge_ratio: 1.0,
            cooldown_seconds: 0.0,
        }
    }

    #[tokio::test]
    async fn below_threshold_inventory_is_untouched() {
        let connector = Arc::new(ExchangeConnector::paper("kucoin", 0.0));
        let mut hedger = Hedger::new(connector, policy());
        let result = hedger.maybe_hedge(&snapshot(), 0.01, 0.5, 0.01).await;
        assert_eq!(result, 0.01);
        assert_eq!(hedger.last_notional, 0.0);
    }

    #[tokio::test]
    async fn disabled_policy_returns_inventory_unchanged() {
        let connector = Arc::new(ExchangeConnector::paper("kucoin", 0.0));
        let mut disabled = policy();
        disabled.enabled = false;
        let mut hedger = Hedger::new(connector, disabled);
        let result = hedger.maybe_hedge(&snapshot(), 5.0, 0.5, 0.01).await;
        assert_eq!(result, 5.0);
    }

    #[tokio::test]
    async fn long_inventory_hedges_by_selling_toward_zero() {
        let connector = Arc::new(ExchangeConnector::paper("kucoin", 0.0));
        let mut hedger = Hedger::new(connector, policy());
        let result = hedger.maybe_hedge(&snapshot(), 1.0, 0.5, 0.01).await;
        assert!(result < 1.0);
        assert!(hedger.last_notional > 0.0);
    }

    #[tokio::test]
    async fn cooldown_suppresses_immediate_rehedge() {
        let connector = Arc::new(ExchangeConnector::paper("kucoin", 0.0));
        let mut long_cooldown = policy();
        long_cooldown.cooldown_seconds = 60.0;
        let mut hedger = Hedger::new(connector, long_cooldown);
        let first = hedger.maybe_hedge(&snapshot(), 1.0, 0.5, 0.01).await;
        assert!(first < 1.0);
        let second = hedger.maybe_hedge(&snapshot(), first, 0.5, 0.01).await;
        assert_eq!(second, first);
    }
}
