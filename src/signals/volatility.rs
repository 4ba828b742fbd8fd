//! Short-horizon volatility estimation: rolling sample stdev of mid returns.

use std::collections::{HashMap, VecDeque};

use crate::types::OrderBookSnapshot;

const DEFAULT_WINDOW: usize = 100;

struct SymbolWindow {
    returns: VecDeque<f64>,
    last_mid: Option<f64>,
}

pub struct VolatilityEstimator {
    window: usize,
    state: HashMap<String, SymbolWindow>,
}

impl VolatilityEstimator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        VolatilityEstimator {
            window,
            state: HashMap::new(),
        }
    }

    pub fn update(&mut self, snapshot: &OrderBookSnapshot) -> f64 {
        let mid = snapshot.mid();
        let window = self.window;
        let entry = self
            .state
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| SymbolWindow {
                returns: VecDeque::new(),
                last_mid: None,
            });
        if let Some(last) = entry.last_mid {
            if last > 0.0 {
                let ret = (mid - last) / last;
                if entry.returns.len() == window {
                    entry.returns.pop_front();
                }
                entry.returns.push_back(ret);
            }
        }
        entry.last_mid = Some(mid);
        Self::sample_sigma(&entry.returns)
    }

    pub fn sigma(&self, symbol: &str) -> f64 {
        match self.state.get(symbol) {
            Some(entry) => Self::sample_sigma(&entry.returns),
            None => 0.0,
        }
    }

    fn sample_sigma(returns: &VecDeque<f64>) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    }
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        Self::new()
    }
}
