//! In-memory paper exchange: simulates fills by crossing resting orders
//! against published top-of-book.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

use crate::types::{Fill, Order, OrderLifecycleStatus, OrderState, Side};

const DEFAULT_FEE_RATE: f64 = 0.0004;

pub struct PaperExchange {
    orders: Mutex<HashMap<String, OrderState>>,
    next_id: AtomicU64,
    fills_tx: mpsc::UnboundedSender<Fill>,
    fills_rx: AsyncMutex<mpsc::UnboundedReceiver<Fill>>,
    fee_rate: f64,
}

impl PaperExchange {
    pub fn new(fee_rate: f64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        PaperExchange {
            orders: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fills_tx: tx,
            fills_rx: AsyncMutex::new(rx),
            fee_rate,
        }
    }

    pub fn place_order(&self, order: Order) -> String {
        let order_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let placed = order.with_order_id(order_id.clone());
        let remaining = placed.size;
        self.orders.lock().insert(
            order_id.clone(),
            OrderState {
                order: placed,
                remaining,
                status: OrderLifecycleStatus::Open,
            },
        );
        order_id
    }

    pub fn cancel_order(&self, order_id: &str) {
        self.orders.lock().remove(order_id);
    }

    pub fn list_orders(&self, symbol: Option<&str>) -> Vec<OrderState> {
        self.orders
            .lock()
            .values()
            .filter(|state| symbol.map(|s| state.order.symbol == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn process_cross(&self, symbol: &str, bid: f64, ask: f64) {
        let matching: Vec<OrderState> = {
            let orders = self.orders.lock();
            orders
                .values()
                .filter(|s| s.order.symbol == symbol && s.remaining > 0.0)
                .cloned()
                .collect()
        };
        for state in matching {
            let order = &state.order;
            let (filled, price) = match order.side {
                Side::Buy if order.price >= ask => (true, order.price.min(ask)),
                Side::Sell if order.price <= bid => (true, order.price.max(bid)),
                _ => (false, order.price),
            };
            if filled {
                self.register_fill(&state, price, state.remaining);
            }
        }
    }

    fn register_fill(&self, state: &OrderState, price: f64, size: f64) {
        let order_id = match &state.order.order_id {
            Some(id) => id.clone(),
            None => return,
        };
        {
            let mut orders = self.orders.lock();
            if let Some(entry) = orders.get_mut(&order_id) {
                entry.remaining = (entry.remaining - size).max(0.0);
                if entry.remaining == 0.0 {
                    entry.status = OrderLifecycleStatus::Filled;
                    orders.remove(&order_id);
                }
            }
        }
        let fee = (price * size).abs() * self.fee_rate;
        let fill = Fill {
            order_id,
            venue: state.order.venue.clone(),
            symbol: state.order.symbol.clone(),
            side: state.order.side,
            price,
            size,
            fee,
            timestamp: Utc::now(),
        };
        let _ = self.fills_tx.send(fill);
    }

    pub async fn poll_fill(&self) -> Option<Fill> {
        self.fills_rx.lock().await.try_recv().ok()
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: Side, price: f64, size: f64) -> Order {
        Order::new("kucoin", "BTC-PERP", side, price, size)
    }

    #[tokio::test]
    async fn buy_order_fills_when_price_crosses_ask() {
        let exchange = PaperExchange::new(0.0);
        exchange.place_order(order(Side::Buy, 101.0, 1.0));
        exchange.process_cross("BTC-PERP", 99.0, 100.0);
        let fill = exchange.poll_fill().await.unwrap();
        assert_eq!(fill.side, Side::Buy);
        assert_eq!(fill.price, 100.0);
        assert!(exchange.list_orders(None).is_empty());
    }

    #[tokio::test]
    async fn order_below_ask_does_not_fill() {
        let exchange = PaperExchange::new(0.0);
        exchange.place_order(order(Side::Buy, 99.0, 1.0));
        exchange.process_cross("BTC-PERP", 99.0, 100.0);
        assert!(exchange.poll_fill().await.is_none());
        assert_eq!(exchange.list_orders(None).len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_order_without_fill() {
        let exchange = PaperExchange::new(0.0);
        let id = exchange.place_order(order(Side::Sell, 100.0, 1.0));
        exchange.cancel_order(&id);
        exchange.process_cross("BTC-PERP", 99.0, 101.0);
        assert!(exchange.poll_fill().await.is_none());
    }

    #[tokio::test]
    async fn fee_is_applied_to_notional() {
        let exchange = PaperExchange::new(0.001);
        exchange.place_order(order(Side::Buy, 101.0, 2.0));
        exchange.process_cross("BTC-PERP", 99.0, 100.0);
        let fill = exchange.poll_fill().await.unwrap();
        assert!((fill.fee - 0.2).abs() < 1e-9);
    }
}
