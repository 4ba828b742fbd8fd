//! Venue abstraction: place/cancel/list/fills, backed by either the paper
//! exchange or a live REST connector.

pub mod live;
pub mod paper;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::types::{ExchangeCredentials, Fill, Order, OrderState};

use live::LiveConnector;
use paper::PaperExchange;

const DEFAULT_FILL_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

enum Backend {
    Paper(PaperExchange),
    Live(Arc<LiveConnector>),
}

/// Facade over a venue, mirroring the paper/live split of the original
/// connector: identical interface regardless of which backend is active.
pub struct ExchangeConnector {
    venue: String,
    backend: Backend,
    symbols: Mutex<HashSet<String>>,
    live_fills: Option<AsyncMutex<tokio::sync::mpsc::UnboundedReceiver<Fill>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ExchangeConnector {
    pub fn paper(venue: impl Into<String>, fee_rate: f64) -> Self {
        ExchangeConnector {
            venue: venue.into(),
            backend: Backend::Paper(PaperExchange::new(fee_rate)),
            symbols: Mutex::new(HashSet::new()),
            live_fills: None,
            poller: Mutex::new(None),
        }
    }

    pub fn live(
        venue: impl Into<String>,
        rest_base: impl Into<String>,
        credentials: Option<ExchangeCredentials>,
    ) -> Self {
        let (connector, rx) = LiveConnector::new(rest_base, credentials);
        ExchangeConnector {
            venue: venue.into(),
            backend: Backend::Live(Arc::new(connector)),
            symbols: Mutex::new(HashSet::new()),
            live_fills: Some(AsyncMutex::new(rx)),
            poller: Mutex::new(None),
        }
    }

    pub fn is_paper(&self) -> bool {
        matches!(self.backend, Backend::Paper(_))
    }

    pub fn register_symbol(&self, symbol: &str) {
        self.symbols.lock().insert(symbol.to_string());
    }

    /// Starts the background fill poller for live backends; no-op for paper.
    pub fn start(&self, poll_interval: Option<std::time::Duration>) {
        let connector = match &self.backend {
            Backend::Live(c) => c.clone(),
            Backend::Paper(_) => return,
        };
        let symbols_handle = self.symbols.lock().clone();
        let interval = poll_interval.unwrap_or(DEFAULT_FILL_POLL_INTERVAL);
        let handle = tokio::spawn(async move {
            loop {
                for symbol in symbols_handle.iter() {
                    if let Err(err) = connector.poll_fills_once(symbol).await {
                        tracing::warn!(%symbol, %err, "error polling fills");
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });
        *self.poller.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }

    pub async fn place_order(&self, order: Order) -> Result<String> {
        match &self.backend {
            Backend::Paper(p) => Ok(p.place_order(order)),
            Backend::Live(c) => c.place_order(&order).await,
        }
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        match &self.backend {
            Backend::Paper(p) => {
                p.cancel_order(order_id);
                Ok(())
            }
            Backend::Live(c) => c.cancel_order(order_id).await,
        }
    }

    pub async fn cancel_all(&self, symbol: Option<&str>) -> Result<()> {
        let orders = self.list_open_orders(symbol).await?;
        for state in orders {
            if let Some(id) = &state.order.order_id {
                self.cancel_order(id).await?;
            }
        }
        Ok(())
    }

    pub async fn list_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderState>> {
        match &self.backend {
            Backend::Paper(p) => Ok(p.list_orders(symbol)),
            Backend::Live(c) => c.list_open_orders(symbol).await,
        }
    }

    pub async fn process_cross(&self, symbol: &str, bid: f64, ask: f64) {
        if let Backend::Paper(p) = &self.backend {
            p.process_cross(symbol, bid, ask);
        }
    }

    pub async fn poll_fill(&self) -> Option<Fill> {
        match &self.backend {
            Backend::Paper(p) => p.poll_fill().await,
            Backend::Live(_) => self.live_fills.as_ref()?.lock().await.try_recv().ok(),
        }
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }
}

impl Drop for ExchangeConnector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    #[tokio::test]
    async fn paper_backend_round_trips_an_order() {
        let connector = ExchangeConnector::paper("kucoin", 0.0);
        connector.register_symbol("BTC-PERP");
        let order = Order::new("kucoin", "BTC-PERP", Side::Buy, 101.0, 1.0);
        let id = connector.place_order(order).await.unwrap();
        assert!(!id.is_empty());
        connector.process_cross("BTC-PERP", 99.0, 100.0).await;
        let fill = connector.poll_fill().await.unwrap();
        assert_eq!(fill.order_id, id);
    }

    #[tokio::test]
    async fn cancel_all_clears_open_orders() {
        let connector = ExchangeConnector::paper("kucoin", 0.0);
        connector
            .place_order(Order::new("kucoin", "BTC-PERP", Side::Buy, 99.0, 1.0))
            .await
            .unwrap();
        connector.cancel_all(Some("BTC-PERP")).await.unwrap();
        assert!(connector
            .list_open_orders(Some("BTC-PERP"))
            .await
            .unwrap()
            .is_empty());
    }
}
