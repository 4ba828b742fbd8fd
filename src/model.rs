//! Avellaneda–Stoikov quoting model: maps (mid, inventory, sigma, features)
//! to a two-sided quote.

use crate::types::{clamp, snap, MicrostructureFeature, OrderBookSnapshot, QuoteResult};

#[derive(Debug, Clone, Copy)]
pub struct AvellanedaStoikovModel {
    pub gamma: f64,
    pub horizon: f64,
    pub kappa: f64,
    pub min_spread: f64,
    pub skew_alpha: f64,
}

impl AvellanedaStoikovModel {
    pub fn new(gamma: f64, horizon: f64, kappa: f64, min_spread: f64, skew_alpha: f64) -> Self {
        AvellanedaStoikovModel {
            gamma,
            horizon,
            kappa,
            min_spread,
            skew_alpha,
        }
    }

    fn reservation_price(&self, mid: f64, inventory: f64, sigma: f64) -> f64 {
        mid - inventory * self.gamma * sigma.powi(2) * self.horizon
    }

    fn optimal_half_spread(&self, sigma: f64) -> f64 {
        (self.gamma * sigma.powi(2) * self.horizon) / 2.0
            + (1.0 / self.kappa) * (1.0 + self.kappa / self.gamma).ln()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate_quotes(
        &self,
        snapshot: &OrderBookSnapshot,
        inventory: f64,
        sigma: f64,
        feature: &MicrostructureFeature,
        tick_size: f64,
        min_tick_spread: f64,
        impact_lambda: f64,
    ) -> QuoteResult {
        let effective_mid = 0.6 * feature.microprice + 0.4 * snapshot.mid();
        let reservation = self.reservation_price(effective_mid, inventory, sigma);
        let mut half_spread = self
            .optimal_half_spread(sigma)
            .max(self.min_spread / 2.0);

        let mut skew = self.skew_alpha * inventory;
        skew += 0.4 * feature.order_flow_imbalance;
        skew -= 0.2 * feature.queue_imbalance;

        let mut impact_multiplier = 1.0;
        if impact_lambda.abs() > 0.01 {
            impact_multiplier += clamp(impact_lambda.abs(), 0.0, 1.5);
        }
        if sigma > 0.05 {
            impact_multiplier += clamp(sigma, 0.0, 1.0);
        }
        half_spread *= impact_multiplier;

        let bid_raw = reservation - half_spread - skew;
        let ask_raw = reservation + half_spread + skew;
        let spread = (ask_raw - bid_raw).max(min_tick_spread.max(tick_size));
        let mid = (bid_raw + ask_raw) / 2.0;
        let bid = snap(mid - spread / 2.0, tick_size);
        let ask = snap(mid + spread / 2.0, tick_size);
        QuoteResult {
            bid,
            ask,
            spread: (ask - bid).max(min_tick_spread.max(tick_size)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderBookLevel;
    use chrono::Utc;

    fn snapshot(mid: f64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            bid: OrderBookLevel { price: mid - 0.5, size: 1.0 },
            ask: OrderBookLevel { price: mid + 0.5, size: 1.0 },
            last_trade_price: mid,
            last_trade_size: 0.1,
            mark_price: None,
        }
    }

    fn flat_feature(mid: f64) -> MicrostructureFeature {
        MicrostructureFeature {
            microprice: mid,
            queue_imbalance: 0.0,
            order_flow_imbalance: 0.0,
        }
    }

    fn model() -> AvellanedaStoikovModel {
        AvellanedaStoikovModel::new(0.1, 10.0, 1.0, 0.1, 0.0)
    }

    #[test]
    fn quotes_are_finite_and_ordered() {
        let m = model();
        let snap = snapshot(30_000.0);
        let feature = flat_feature(30_000.0);
        let quote = m.generate_quotes(&snap, 0.0, 0.02, &feature, 0.1, 0.1, 0.0);
        assert!(quote.bid.is_finite());
        assert!(quote.ask.is_finite());
        assert!(quote.ask >= quote.bid);
        assert!(quote.spread >= 0.1);
    }

    #[test]
    fn quotes_snap_to_tick() {
        let m = model();
        let snap = snapshot(30_000.0);
        let feature = flat_feature(30_000.0);
        let quote = m.generate_quotes(&snap, 1.5, 0.02, &feature, 0.1, 0.1, 0.0);
        let ratio_bid = (quote.bid / 0.1).round() * 0.1;
        let ratio_ask = (quote.ask / 0.1).round() * 0.1;
        assert!((ratio_bid - quote.bid).abs() < 1e-9);
        assert!((ratio_ask - quote.ask).abs() < 1e-9);
    }

    #[test]
    fn long_inventory_skews_quotes_down() {
        let m = AvellanedaStoikovModel::new(0.1, 10.0, 1.0, 0.1, 0.2);
        let snap = snapshot(30_000.0);
        let feature = flat_feature(30_000.0);
        let long_quote = m.generate_quotes(&snap, 1.0, 0.02, &feature, 0.1, 0.1, 0.0);
        let short_quote = m.generate_quotes(&snap, -1.0, 0.02, &feature, 0.1, 0.1, 0.0);
        assert!(long_quote.bid < short_quote.bid);
        assert!(long_quote.ask < short_quote.ask);
    }

    #[test]
    fn higher_volatility_widens_spread() {
        let m = model();
        let snap = snapshot(30_000.0);
        let feature = flat_feature(30_000.0);
        let low_sigma = m.generate_quotes(&snap, 0.0, 0.001, &feature, 0.1, 0.1, 0.0);
        let high_sigma = m.generate_quotes(&snap, 0.0, 0.1, &feature, 0.1, 0.1, 0.0);
        assert!(high_sigma.spread >= low_sigma.spread);
    }
}
