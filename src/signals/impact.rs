//! Kyle's-lambda-style price impact estimator.

use std::collections::HashMap;

use crate::types::{Side, Trade};

const DEFAULT_DECAY: f64 = 0.99;
const MIN_SIGNED_VOLUME: f64 = 1e-9;

#[derive(Clone, Copy, Default)]
struct ImpactState {
    mean_volume: f64,
    mean_return: f64,
    lambda: f64,
}

pub struct ImpactEstimator {
    decay: f64,
    state: HashMap<String, ImpactState>,
}

impl ImpactEstimator {
    pub fn new() -> Self {
        Self::with_decay(DEFAULT_DECAY)
    }

    pub fn with_decay(decay: f64) -> Self {
        ImpactEstimator {
            decay,
            state: HashMap::new(),
        }
    }

    pub fn update(&mut self, symbol: &str, trade: Trade, price_return: f64) -> f64 {
        let entry = self.state.entry(symbol.to_string()).or_default();
        let signed_volume = match trade.side {
            Side::Buy => trade.size,
            Side::Sell => -trade.size,
        };
        entry.mean_volume = self.decay * entry.mean_volume + (1.0 - self.decay) * signed_volume;
        entry.mean_return = self.decay * entry.mean_return + (1.0 - self.decay) * price_return;
        if signed_volume.abs() > MIN_SIGNED_VOLUME {
            entry.lambda =
                self.decay * entry.lambda + (1.0 - self.decay) * (price_return / signed_volume);
        }
        entry.lambda
    }

    pub fn get(&self, symbol: &str) -> f64 {
        self.state.get(symbol).map(|s| s.lambda).unwrap_or(0.0)
    }
}

impl Default for ImpactEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_symbol_has_zero_lambda() {
        let estimator = ImpactEstimator::new();
        assert_eq!(estimator.get("BTC-PERP"), 0.0);
    }

    #[test]
    fn near_zero_signed_volume_skips_lambda_update() {
        let mut estimator = ImpactEstimator::new();
        estimator.update(
            "BTC-PERP",
            Trade {
                side: Side::Buy,
                price: 100.0,
                size: 1e-12,
            },
            0.01,
        );
        assert_eq!(estimator.get("BTC-PERP"), 0.0);
    }

    #[test]
    fn buy_with_positive_return_yields_positive_lambda() {
        let mut estimator = ImpactEstimator::with_decay(0.5);
        let lambda = estimator.update(
            "BTC-PERP",
            Trade {
                side: Side::Buy,
                price: 100.0,
                size: 1.0,
            },
            0.02,
        );
        assert!(lambda > 0.0);
    }
}
