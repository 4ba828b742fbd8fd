//! Microprice, queue imbalance, and order-flow imbalance extraction.

use std::collections::{HashMap, VecDeque};

use crate::types::{MicrostructureFeature, OrderBookSnapshot, Side, Trade};

const DEFAULT_OFI_WINDOW: usize = 20;
const DEFAULT_OFI_ALPHA: f64 = 0.3;

struct SymbolState {
    last_snapshot: Option<OrderBookSnapshot>,
    ofi_history: VecDeque<f64>,
}

impl SymbolState {
    fn new() -> Self {
        SymbolState {
            last_snapshot: None,
            ofi_history: VecDeque::new(),
        }
    }
}

pub struct MicrostructureSignals {
    ofi_window: usize,
    ofi_alpha: f64,
    state: HashMap<String, SymbolState>,
}

impl MicrostructureSignals {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_OFI_WINDOW, DEFAULT_OFI_ALPHA)
    }

    pub fn with_params(ofi_window: usize, ofi_alpha: f64) -> Self {
        MicrostructureSignals {
            ofi_window,
            ofi_alpha,
            state: HashMap::new(),
        }
    }

    pub fn update_snapshot(&mut self, snapshot: OrderBookSnapshot) -> MicrostructureFeature {
        let microprice = Self::compute_microprice(&snapshot);
        let qi = Self::compute_qi(&snapshot);
        let window = self.ofi_window;
        let entry = self
            .state
            .entry(snapshot.symbol.clone())
            .or_insert_with(SymbolState::new);

        let mut ofi = entry.ofi_history.back().copied().unwrap_or(0.0);
        if let Some(last) = &entry.last_snapshot {
            let delta = Self::compute_ofi(last, &snapshot);
            if entry.ofi_history.len() == window {
                entry.ofi_history.pop_front();
            }
            entry.ofi_history.push_back(delta);
            ofi = Self::ewma(&entry.ofi_history, self.ofi_alpha);
        }
        entry.last_snapshot = Some(snapshot);

        MicrostructureFeature {
            microprice,
            queue_imbalance: qi,
            order_flow_imbalance: ofi,
        }
    }

    pub fn update_trade(&mut self, symbol: &str, trade: Trade) {
        let window = self.ofi_window;
        let entry = self
            .state
            .entry(symbol.to_string())
            .or_insert_with(SymbolState::new);
        let signed_size = match trade.side {
            Side::Buy => trade.size,
            Side::Sell => -trade.size,
        };
        if entry.ofi_history.len() == window {
            entry.ofi_history.pop_front();
        }
        entry.ofi_history.push_back(signed_size);
    }

    pub fn get(&self, symbol: &str) -> Option<MicrostructureFeature> {
        let entry = self.state.get(symbol)?;
        let snapshot = entry.last_snapshot.as_ref()?;
        let microprice = Self::compute_microprice(snapshot);
        let qi = Self::compute_qi(snapshot);
        let ofi = if entry.ofi_history.is_empty() {
            0.0
        } else {
            Self::ewma(&entry.ofi_history, self.ofi_alpha)
        };
        Some(MicrostructureFeature {
            microprice,
            queue_imbalance: qi,
            order_flow_imbalance: ofi,
        })
    }

    fn compute_microprice(snapshot: &OrderBookSnapshot) -> f64 {
        let denom = snapshot.bid.size + snapshot.ask.size;
        if denom == 0.0 {
            return snapshot.mid();
        }
        (snapshot.ask.price * snapshot.bid.size + snapshot.bid.price * snapshot.ask.size) / denom
    }

    fn compute_qi(snapshot: &OrderBookSnapshot) -> f64 {
        let denom = snapshot.bid.size + snapshot.ask.size;
        if denom == 0.0 {
            return 0.0;
        }
        (snapshot.bid.size - snapshot.ask.size) / denom
    }

    fn compute_ofi(last: &OrderBookSnapshot, current: &OrderBookSnapshot) -> f64 {
        let bid_delta = current.bid.size - last.bid.size;
        let ask_delta = current.ask.size - last.ask.size;
        let price_move = current.mid() - last.mid();
        bid_delta - ask_delta + price_move
    }

    /// EWMA over the history deque, most recent value weighted heaviest,
    /// matching the original's reverse-iteration recurrence.
    fn ewma(values: &VecDeque<f64>, alpha: f64) -> f64 {
        let mut weight = 0.0;
        let mut result = 0.0;
        for value in values.iter().rev() {
            result = alpha * value + (1.0 - alpha) * result;
            weight = alpha + (1.0 - alpha) * weight;
        }
        if weight > 0.0 {
            result
        } else {
            0.0
        }
    }
}

impl Default for MicrostructureSignals {
    fn default() -> Self {
        Self::new()
    }
}
