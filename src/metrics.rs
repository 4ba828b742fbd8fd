//! Metrics/health HTTP surface: `GET /health` and `GET /metrics` (Prometheus
//! text format, built by hand as the teacher's `route_quality/metrics.rs`
//! does — no metrics-registry crate is warranted for this small a surface).

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use parking_lot::RwLock;
use serde_json::json;

/// Per-symbol gauges updated by each quoter; `error_rate`, `hedge_notional`,
/// and `funding_accrual` are account-wide.
#[derive(Default)]
struct Gauges {
    pnl_realized: HashMap<String, f64>,
    pnl_unrealized: HashMap<String, f64>,
    inventory: HashMap<String, f64>,
    spread_target: HashMap<String, f64>,
    fill_rate: HashMap<String, f64>,
    funding_accrual: f64,
    hedge_notional: f64,
    error_rate: f64,
}

#[derive(Clone, Default)]
pub struct MetricsRegistry {
    gauges: Arc<RwLock<Gauges>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pnl_realized(&self, symbol: &str, value: f64) {
        self.gauges.write().pnl_realized.insert(symbol.to_string(), value);
    }

    pub fn set_pnl_unrealized(&self, symbol: &str, value: f64) {
        self.gauges
            .write()
            .pnl_unrealized
            .insert(symbol.to_string(), value);
    }

    pub fn set_inventory(&self, symbol: &str, value: f64) {
        self.gauges.write().inventory.insert(symbol.to_string(), value);
    }

    pub fn set_spread_target(&self, symbol: &str, value: f64) {
        self.gauges
            .write()
            .spread_target
            .insert(symbol.to_string(), value);
    }

    pub fn set_fill_rate(&self, symbol: &str, value: f64) {
        self.gauges.write().fill_rate.insert(symbol.to_string(), value);
    }

    pub fn set_funding_accrual(&self, value: f64) {
        self.gauges.write().funding_accrual = value;
    }

    pub fn set_hedge_notional(&self, value: f64) {
        self.gauges.write().hedge_notional = value;
    }

    pub fn set_error_rate(&self, value: f64) {
        self.gauges.write().error_rate = value;
    }

    fn render(&self) -> String {
        let gauges = self.gauges.read();
        let mut out = String::new();
        render_labeled(&mut out, "pnl_realized", &gauges.pnl_realized);
        render_labeled(&mut out, "pnl_unrealized", &gauges.pnl_unrealized);
        render_labeled(&mut out, "inventory", &gauges.inventory);
        render_labeled(&mut out, "spread_target", &gauges.spread_target);
        render_labeled(&mut out, "fill_rate", &gauges.fill_rate);
        let _ = writeln!(out, "funding_accrual {}", gauges.funding_accrual);
        let _ = writeln!(out, "hedge_notional {}", gauges.hedge_notional);
        let _ = writeln!(out, "error_rate {}", gauges.error_rate);
        out
    }
}

fn render_labeled(out: &mut String, name: &str, values: &HashMap<String, f64>) {
    for (symbol, value) in values {
        let _ = writeln!(out, "{name}{{symbol=\"{symbol}\"}} {value}");
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn metrics_text(State(registry): State<MetricsRegistry>) -> impl IntoResponse {
    registry.render()
}

pub fn router(registry: MetricsRegistry) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(registry)
}

/// Serves the metrics/health router on `host:port` until the process exits.
pub async fn serve(host: impl AsRef<str>, port: u16, registry: MetricsRegistry) -> anyhow::Result<()> {
    let host = host.as_ref();
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics server listening");
    axum::serve(listener, router(registry)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_labeled_and_scalar_gauges() {
        let registry = MetricsRegistry::new();
        registry.set_inventory("BTC-PERP", 0.5);
        registry.set_error_rate(0.1);
        let text = registry.render();
        assert!(text.contains("inventory{symbol=\"BTC-PERP\"} 0.5"));
        assert!(text.contains("error_rate 0.1"));
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let registry = MetricsRegistry::new();
        let app = router(registry);
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
