//! Core datatypes shared across the bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderBookLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub venue: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid: OrderBookLevel,
    pub ask: OrderBookLevel,
    pub last_trade_price: f64,
    pub last_trade_size: f64,
    pub mark_price: Option<f64>,
}

impl OrderBookSnapshot {
    pub fn mid(&self) -> f64 {
        (self.bid.price + self.ask.price) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub venue: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub order_id: Option<String>,
    pub post_only: bool,
}

impl Order {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Order {
            venue: venue.into(),
            symbol: symbol.into(),
            side,
            price,
            size,
            order_id: None,
            post_only: true,
        }
    }

    pub fn with_order_id(&self, order_id: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.order_id = Some(order_id.into());
        cloned
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderLifecycleStatus {
    Open,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    pub order: Order,
    pub remaining: f64,
    pub status: OrderLifecycleStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicrostructureFeature {
    pub microprice: f64,
    pub queue_imbalance: f64,
    pub order_flow_imbalance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteResult {
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingInfo {
    pub next_rate: f64,
}

/// Snap `value` to the nearest multiple of `step`.
pub fn snap(value: f64, step: f64) -> f64 {
    assert!(step > 0.0, "step must be positive");
    (value / step).round() * step
}

pub fn clamp(value: f64, minimum: f64, maximum: f64) -> f64 {
    value.max(minimum).min(maximum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_flips_side() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn mid_is_average_of_bid_ask() {
        let snapshot = OrderBookSnapshot {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            bid: OrderBookLevel { price: 100.0, size: 1.0 },
            ask: OrderBookLevel { price: 102.0, size: 1.0 },
            last_trade_price: 101.0,
            last_trade_size: 0.1,
            mark_price: None,
        };
        assert_eq!(snapshot.mid(), 101.0);
    }

    #[test]
    fn snap_rounds_to_nearest_tick() {
        assert_eq!(snap(100.07, 0.1), 100.1);
        assert_eq!(snap(100.04, 0.1), 100.0);
    }

    #[test]
    fn clamp_bounds_value() {
        assert_eq!(clamp(5.0, 0.0, 1.5), 1.5);
        assert_eq!(clamp(-5.0, 0.0, 1.5), 0.0);
        assert_eq!(clamp(0.5, 0.0, 1.5), 0.5);
    }
}
