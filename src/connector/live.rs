//! Live REST connector: limit-order submission with post-only, exponential
//! jitter retry on transient errors, and a background own-trades poller that
//! normalizes fills and dedupes by trade id.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::mpsc;

use crate::types::{ExchangeCredentials, Fill, Order, OrderLifecycleStatus, OrderState, Side};

const RETRY_INITIAL: Duration = Duration::from_millis(200);
const RETRY_CAP: Duration = Duration::from_secs(5);
const RETRY_ATTEMPTS: u32 = 5;
const DEDUP_CAPACITY: usize = 5_000;

/// Venue signature schemes observed across the corpus: KuCoin/Coinbase-style
/// passphrase venues base64-encode the HMAC digest, Binance-style venues
/// hex-encode it. Picked per credential shape rather than per venue name,
/// since that's the only thing this connector actually knows about a venue.
enum SignatureEncoding {
    Base64,
    Hex,
}

fn hmac_sign(secret: &str, message: &str, encoding: SignatureEncoding) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts a key of any length");
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();
    match encoding {
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(digest),
        SignatureEncoding::Hex => hex::encode(digest),
    }
}

/// Only the `Transient`/`Rejected` kinds of `BotError` are meaningful here;
/// a REST call never produces `Parse`/`Config`.
use crate::errors::BotError as CallError;

pub struct LiveConnector {
    client: reqwest::Client,
    rest_base: String,
    credentials: Option<ExchangeCredentials>,
    fills_tx: mpsc::UnboundedSender<Fill>,
    seen_trade_ids: Mutex<HashSet<String>>,
    last_since: Mutex<HashMap<String, i64>>,
}

#[derive(Deserialize)]
struct RawOrderAck {
    order_id: String,
}

#[derive(Deserialize)]
struct RawOrderState {
    order_id: String,
    symbol: String,
    side: String,
    price: f64,
    size: f64,
    remaining: f64,
    status: String,
}

#[derive(Deserialize)]
struct RawTrade {
    trade_id: String,
    order_id: String,
    symbol: String,
    side: String,
    price: f64,
    size: f64,
    fee: Option<f64>,
    timestamp_ms: i64,
}

impl LiveConnector {
    pub fn new(
        rest_base: impl Into<String>,
        credentials: Option<ExchangeCredentials>,
    ) -> (Self, mpsc::UnboundedReceiver<Fill>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LiveConnector {
                client: reqwest::Client::new(),
                rest_base: rest_base.into(),
                credentials,
                fills_tx: tx,
                seen_trade_ids: Mutex::new(HashSet::new()),
                last_since: Mutex::new(HashMap::new()),
            },
            rx,
        )
    }

    async fn retry<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CallError>>,
    {
        let mut backoff = RETRY_INITIAL;
        for attempt in 1..=RETRY_ATTEMPTS {
            match call().await {
                Ok(value) => return Ok(value),
                Err(CallError::Transient(e)) => {
                    if attempt == RETRY_ATTEMPTS {
                        return Err(e);
                    }
                    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
                    let wait = backoff.mul_f64(jitter).min(RETRY_CAP);
                    tokio::time::sleep(wait).await;
                    backoff = (backoff * 2).min(RETRY_CAP);
                }
                Err(other) => return Err(other.into()),
            }
        }
        unreachable!("loop always returns within RETRY_ATTEMPTS iterations")
    }

    pub async fn place_order(&self, order: &Order) -> Result<String> {
        // A stable client order id makes retries of a transient failure
        // idempotent on venues that dedupe by it, instead of risking a
        // duplicate resting order if the original request actually landed.
        let client_order_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({
            "symbol": order.symbol,
            "side": order.side,
            "price": order.price,
            "size": order.size,
            "post_only": order.post_only,
            "client_order_id": client_order_id,
        })
        .to_string();
        self.retry(|| async {
            let mut request = self
                .client
                .post(format!("{}/orders", self.rest_base))
                .header("Content-Type", "application/json")
                .body(body.clone());
            for (name, value) in self.auth_headers("POST", "/orders", &body) {
                request = request.header(name, value);
            }
            let resp = request
                .send()
                .await
                .map_err(|e| CallError::Transient(e.into()))?;
            if resp.status().is_client_error() {
                let body = resp.text().await.unwrap_or_default();
                return Err(CallError::Rejected(anyhow!("order rejected: {body}")));
            }
            let ack: RawOrderAck = resp
                .json()
                .await
                .map_err(|e| CallError::Transient(e.into()))?;
            Ok(ack.order_id)
        })
        .await
        .context("placing live order")
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let path = format!("/orders/{order_id}");
        self.retry(|| async {
            let mut request = self.client.delete(format!("{}{path}", self.rest_base));
            for (name, value) in self.auth_headers("DELETE", &path, "") {
                request = request.header(name, value);
            }
            let resp = request
                .send()
                .await
                .map_err(|e| CallError::Transient(e.into()))?;
            if resp.status().is_server_error() {
                return Err(CallError::Transient(anyhow!(
                    "server error cancelling {order_id}"
                )));
            }
            Ok(())
        })
        .await
        .context("cancelling live order")
    }

    pub async fn list_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderState>> {
        let path = match symbol {
            Some(s) => format!("/orders/open?symbol={s}"),
            None => "/orders/open".to_string(),
        };
        let url = format!("{}{path}", self.rest_base);
        let raw: Vec<RawOrderState> = self
            .retry(|| async {
                let mut request = self.client.get(&url);
                for (name, value) in self.auth_headers("GET", &path, "") {
                    request = request.header(name, value);
                }
                request
                    .send()
                    .await
                    .map_err(|e| CallError::Transient(e.into()))?
                    .json()
                    .await
                    .map_err(|e| CallError::Transient(e.into()))
            })
            .await
            .context("listing open orders")?;
        Ok(raw
            .into_iter()
            .filter_map(|r| {
                let side = parse_side(&r.side)?;
                Some(OrderState {
                    order: Order {
                        venue: self.rest_base.clone(),
                        symbol: r.symbol,
                        side,
                        price: r.price,
                        size: r.size,
                        order_id: Some(r.order_id),
                        post_only: true,
                    },
                    remaining: r.remaining,
                    status: parse_status(&r.status),
                })
            })
            .collect())
    }

    /// Polls recent own-trades for `symbol`, normalizing unseen ones into
    /// fills on the channel and advancing the per-symbol `since` cursor.
    pub async fn poll_fills_once(&self, symbol: &str) -> Result<()> {
        let since = self.last_since.lock().get(symbol).copied();
        let path = match since {
            Some(s) => format!("/trades?symbol={symbol}&since={s}"),
            None => format!("/trades?symbol={symbol}"),
        };
        let url = format!("{}{path}", self.rest_base);
        let raw: Vec<RawTrade> = self
            .retry(|| async {
                let mut request = self.client.get(&url);
                for (name, value) in self.auth_headers("GET", &path, "") {
                    request = request.header(name, value);
                }
                request
                    .send()
                    .await
                    .map_err(|e| CallError::Transient(e.into()))?
                    .json()
                    .await
                    .map_err(|e| CallError::Transient(e.into()))
            })
            .await
            .context("polling fills")?;
        for trade in raw {
            let is_new = {
                let mut seen = self.seen_trade_ids.lock();
                if seen.contains(&trade.trade_id) {
                    false
                } else {
                    if seen.len() > DEDUP_CAPACITY {
                        seen.clear();
                    }
                    seen.insert(trade.trade_id.clone());
                    true
                }
            };
            if !is_new {
                continue;
            }
            let side = match parse_side(&trade.side) {
                Some(s) => s,
                None => continue,
            };
            let fill = Fill {
                order_id: trade.order_id,
                venue: self.rest_base.clone(),
                symbol: trade.symbol.clone(),
                side,
                price: trade.price,
                size: trade.size,
                fee: trade.fee.unwrap_or(0.0),
                timestamp: Utc::now(),
            };
            let _ = self.fills_tx.send(fill);
            let mut cursor = self.last_since.lock();
            let next = trade.timestamp_ms + 1;
            let entry = cursor.entry(symbol.to_string()).or_insert(next);
            if next > *entry {
                *entry = next;
            }
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Builds the signed auth headers for `method path body`, or none if no
    /// credentials were resolved for this venue (paper/unauthenticated use).
    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Vec<(&'static str, String)> {
        let Some(credentials) = &self.credentials else {
            return Vec::new();
        };
        let timestamp = Utc::now().timestamp_millis().to_string();
        let message = format!("{timestamp}{method}{path}{body}");
        match &credentials.passphrase {
            Some(passphrase) => {
                let signature = hmac_sign(&credentials.secret, &message, SignatureEncoding::Base64);
                let signed_passphrase =
                    hmac_sign(&credentials.secret, passphrase, SignatureEncoding::Base64);
                vec![
                    ("API-KEY", credentials.api_key.clone()),
                    ("API-SIGN", signature),
                    ("API-TIMESTAMP", timestamp),
                    ("API-PASSPHRASE", signed_passphrase),
                ]
            }
            None => {
                let signature = hmac_sign(&credentials.secret, &message, SignatureEncoding::Hex);
                vec![
                    ("API-KEY", credentials.api_key.clone()),
                    ("API-SIGN", signature),
                    ("API-TIMESTAMP", timestamp),
                ]
            }
        }
    }
}

fn parse_side(s: &str) -> Option<Side> {
    match s {
        "buy" => Some(Side::Buy),
        "sell" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_status(s: &str) -> OrderLifecycleStatus {
    match s {
        "filled" => OrderLifecycleStatus::Filled,
        "cancelled" | "canceled" => OrderLifecycleStatus::Cancelled,
        _ => OrderLifecycleStatus::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_side_rejects_unknown_values() {
        assert!(parse_side("long").is_none());
        assert_eq!(parse_side("buy"), Some(Side::Buy));
    }

    #[test]
    fn parse_status_defaults_to_open() {
        assert_eq!(parse_status("weird"), OrderLifecycleStatus::Open);
        assert_eq!(parse_status("filled"), OrderLifecycleStatus::Filled);
    }

    #[tokio::test]
    async fn connector_without_credentials_reports_paper_eligible() {
        let (connector, _rx) = LiveConnector::new("https://example.invalid", None);
        assert!(!connector.has_credentials());
    }

    #[tokio::test]
    async fn no_credentials_yields_no_auth_headers() {
        let (connector, _rx) = LiveConnector::new("https://example.invalid", None);
        assert!(connector.auth_headers("GET", "/orders/open", "").is_empty());
    }

    #[tokio::test]
    async fn passphrase_credentials_sign_with_base64_and_include_passphrase() {
        let credentials = ExchangeCredentials {
            api_key: "key".into(),
            secret: "secret".into(),
            passphrase: Some("pass".into()),
        };
        let (connector, _rx) = LiveConnector::new("https://example.invalid", Some(credentials));
        let headers = connector.auth_headers("POST", "/orders", "{}");
        let names: Vec<_> = headers.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"API-SIGN"));
        assert!(names.contains(&"API-PASSPHRASE"));
    }

    #[tokio::test]
    async fn credentials_without_passphrase_sign_with_hex_and_omit_passphrase() {
        let credentials = ExchangeCredentials {
            api_key: "key".into(),
            secret: "secret".into(),
            passphrase: None,
        };
        let (connector, _rx) = LiveConnector::new("https://example.invalid", Some(credentials));
        let headers = connector.auth_headers("GET", "/trades", "");
        let names: Vec<_> = headers.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"API-SIGN"));
        assert!(!names.contains(&"API-PASSPHRASE"));
        let signature = headers.iter().find(|(n, _)| *n == "API-SIGN").unwrap().1.clone();
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
