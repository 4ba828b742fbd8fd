//! Pre-trade admission control and post-trade risk evaluation.
//!
//! Limits are enforced per symbol (position, order notional, cancel rate,
//! open order count, notional cap) and account-wide (drawdown, daily loss,
//! inventory notional, total open orders). A halt is a one-way latch:
//! once set, every subsequent `check_order` is denied until an operator
//! calls `reset_halt`.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::types::{Fill, Order, Side};

#[derive(Debug, Clone)]
pub struct SymbolLimits {
    pub max_position: f64,
    pub max_order_notional: f64,
    pub max_cancels_per_minute: Option<u32>,
    pub max_orders: Option<u32>,
    pub account_notional_cap: Option<f64>,
}

#[derive(Default)]
struct SymbolRiskState {
    inventory: f64,
    mid_price: f64,
    cancel_events: VecDeque<DateTime<Utc>>,
    open_order_notionals: HashMap<String, f64>,
}

pub struct RiskLimits {
    limits: HashMap<String, SymbolLimits>,
    state: HashMap<String, SymbolRiskState>,
    realized_pnl: f64,
    peak_equity: f64,
    halted_reason: Option<String>,
    max_drawdown: f64,
    max_daily_loss: f64,
    max_inventory_notional: f64,
    max_open_orders: Option<u32>,
}

impl RiskLimits {
    pub fn new(
        limits: HashMap<String, SymbolLimits>,
        max_drawdown: f64,
        max_daily_loss: f64,
        max_inventory_notional: f64,
        max_open_orders: Option<u32>,
    ) -> Self {
        let state = limits
            .keys()
            .map(|symbol| (symbol.clone(), SymbolRiskState::default()))
            .collect();
        RiskLimits {
            limits,
            state,
            realized_pnl: 0.0,
            peak_equity: 0.0,
            halted_reason: None,
            max_drawdown,
            max_daily_loss,
            max_inventory_notional,
            max_open_orders,
        }
    }

    pub fn halted(&self) -> bool {
        self.halted_reason.is_some()
    }

    pub fn halted_reason(&self) -> Option<&str> {
        self.halted_reason.as_deref()
    }

    pub fn inventory(&self, symbol: &str) -> f64 {
        self.state.get(symbol).map(|s| s.inventory).unwrap_or(0.0)
    }

    pub fn update_mid(&mut self, symbol: &str, mid: f64) {
        self.state.entry(symbol.to_string()).or_default().mid_price = mid;
        self.evaluate_inventory_notional();
    }

    pub fn update_inventory(&mut self, symbol: &str, quantity: f64) {
        self.state.entry(symbol.to_string()).or_default().inventory = quantity;
        self.evaluate_inventory_notional();
    }

    /// Replaces tracked open-order notionals for `symbol` with the
    /// connector's current view, used to reconcile after order replacement.
    pub fn sync_orders(&mut self, symbol: &str, notionals: HashMap<String, f64>) {
        self.state.entry(symbol.to_string()).or_default().open_order_notionals = notionals;
    }

    pub fn register_order(&mut self, order_id: &str, order: &Order) {
        let notional = (order.price * order.size).abs();
        self.state
            .entry(order.symbol.clone())
            .or_default()
            .open_order_notionals
            .insert(order_id.to_string(), notional);
    }

    pub fn remove_order(&mut self, order_id: &str, symbol: &str) {
        if let Some(state) = self.state.get_mut(symbol) {
            state.open_order_notionals.remove(order_id);
        }
    }

    pub fn check_order(&mut self, order: &Order) -> bool {
        if self.halted() {
            return false;
        }
        let Some(limits) = self.limits.get(&order.symbol).cloned() else {
            return false;
        };
        let now = Utc::now();
        let state = self.state.entry(order.symbol.clone()).or_default();

        if let Some(max_cancels) = limits.max_cancels_per_minute {
            while let Some(front) = state.cancel_events.front() {
                if (now - *front).num_seconds() > 60 {
                    state.cancel_events.pop_front();
                } else {
                    break;
                }
            }
            if state.cancel_events.len() as u32 >= max_cancels {
                if self.halted_reason.is_none() {
                    self.halted_reason = Some(format!(
                        "cancel rate limit reached for {}",
                        order.symbol
                    ));
                }
                return false;
            }
        }

        let projected = state.inventory
            + match order.side {
                Side::Buy => order.size,
                Side::Sell => -order.size,
            };
        if projected.abs() > limits.max_position {
            return false;
        }

        let notional = (order.price * order.size).abs();
        if notional > limits.max_order_notional {
            return false;
        }

        if let Some(max_orders) = limits.max_orders {
            if state.open_order_notionals.len() as u32 >= max_orders {
                return false;
            }
        }

        if let Some(cap) = limits.account_notional_cap {
            let open_total: f64 = state.open_order_notionals.values().sum();
            let projected_exposure = (state.inventory * state.mid_price).abs() + open_total + notional;
            if projected_exposure > cap {
                return false;
            }
        }

        if let Some(global_cap) = self.max_open_orders {
            let total_open: usize = self
                .state
                .values()
                .map(|s| s.open_order_notionals.len())
                .sum();
            if total_open as u32 >= global_cap {
                return false;
            }
        }

        true
    }

    pub fn record_cancel(&mut self, symbol: &str) {
        self.state
            .entry(symbol.to_string())
            .or_default()
            .cancel_events
            .push_back(Utc::now());
    }

    pub fn record_fill(&mut self, fill: &Fill, mid_price: f64, pnl_delta: f64) {
        if self.halted() {
            return;
        }
        let delta = match fill.side {
            Side::Buy => fill.size,
            Side::Sell => -fill.size,
        };
        {
            let state = self.state.entry(fill.symbol.clone()).or_default();
            state.inventory += delta;
            state.mid_price = mid_price;
        }

        self.realized_pnl += pnl_delta;
        if self.realized_pnl > self.peak_equity {
            self.peak_equity = self.realized_pnl;
        }
        let drawdown = self.peak_equity - self.realized_pnl;
        if drawdown > self.max_drawdown {
            self.halt(format!("drawdown {drawdown:.2} exceeds limit {:.2}", self.max_drawdown));
        }
        if -self.realized_pnl > self.max_daily_loss {
            self.halt(format!(
                "daily loss {:.2} exceeds limit {:.2}",
                -self.realized_pnl, self.max_daily_loss
            ));
        }
        self.evaluate_inventory_notional();
    }

    fn evaluate_inventory_notional(&mut self) {
        let total: f64 = self
            .state
            .values()
            .map(|s| (s.inventory * s.mid_price).abs())
            .sum();
        if total > self.max_inventory_notional {
            self.halt(format!(
                "inventory notional {total:.2} exceeds limit {:.2}",
                self.max_inventory_notional
            ));
        }
    }

    fn halt(&mut self, reason: String) {
        if self.halted_reason.is_none() {
            self.halted_reason = Some(reason);
        }
    }

    /// Operator-initiated reset of a latched halt.
    pub fn reset_halt(&mut self) {
        self.halted_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits_map() -> HashMap<String, SymbolLimits> {
        let mut m = HashMap::new();
        m.insert(
            "BTC-PERP".to_string(),
            SymbolLimits {
                max_position: 1.0,
                max_order_notional: 10_000.0,
                max_cancels_per_minute: None,
                max_orders: None,
                account_notional_cap: None,
            },
        );
        m
    }

    fn fill(side: Side, symbol: &str) -> Fill {
        Fill {
            order_id: "1".into(),
            venue: "kucoin".into(),
            symbol: symbol.into(),
            side,
            price: 100.0,
            size: 1.0,
            fee: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn denies_order_that_would_exceed_max_position() {
        let mut risk = RiskLimits::new(limits_map(), 10.0, 50.0, 100_000.0, None);
        risk.update_inventory("BTC-PERP", 0.9);
        let order = Order::new("kucoin", "BTC-PERP", Side::Buy, 30_000.0, 0.2);
        assert!(!risk.check_order(&order));
    }

    #[test]
    fn cancel_rate_limit_denies_once_window_is_full() {
        let mut limits = limits_map();
        limits.get_mut("BTC-PERP").unwrap().max_cancels_per_minute = Some(1);
        let mut risk = RiskLimits::new(limits, 10.0, 50.0, 100_000.0, None);
        risk.record_cancel("BTC-PERP");
        let order = Order::new("kucoin", "BTC-PERP", Side::Buy, 100.0, 0.01);
        assert!(!risk.check_order(&order));
        assert!(risk.halted());
    }

    #[test]
    fn halt_is_one_way_until_reset() {
        let mut risk = RiskLimits::new(limits_map(), 10.0, 50.0, 100_000.0, None);
        risk.record_fill(&fill(Side::Buy, "BTC-PERP"), 100.0, 20.0);
        risk.record_fill(&fill(Side::Sell, "BTC-PERP"), 100.0, -15.0);
        assert!(risk.halted());
        assert!(risk.halted_reason().unwrap().contains("drawdown"));

        let order = Order::new("kucoin", "BTC-PERP", Side::Buy, 100.0, 0.01);
        assert!(!risk.check_order(&order));

        risk.reset_halt();
        assert!(!risk.halted());
    }

    #[test]
    fn sync_orders_feeds_the_account_notional_cap() {
        let mut limits = limits_map();
        limits.get_mut("BTC-PERP").unwrap().account_notional_cap = Some(500.0);
        let mut risk = RiskLimits::new(limits, 10.0, 50.0, 100_000.0, None);
        let mut notionals = HashMap::new();
        notionals.insert("existing".to_string(), 450.0);
        risk.sync_orders("BTC-PERP", notionals);
        let order = Order::new("kucoin", "BTC-PERP", Side::Buy, 100.0, 1.0);
        assert!(!risk.check_order(&order));
    }
}
