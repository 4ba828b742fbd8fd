//! Cancels orders the quoter has lost track of: any tracked order older
//! than `timeout` is assumed orphaned and cancelled on the next sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connector::ExchangeConnector;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OrphanReaper {
    connector: Arc<ExchangeConnector>,
    timeout: Duration,
    tracked: Mutex<HashMap<String, Instant>>,
}

impl OrphanReaper {
    pub fn new(connector: Arc<ExchangeConnector>, timeout: Option<Duration>) -> Self {
        OrphanReaper {
            connector,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn track(&self, order_id: &str) {
        self.tracked.lock().insert(order_id.to_string(), Instant::now());
    }

    pub fn untrack(&self, order_id: &str) {
        self.tracked.lock().remove(order_id);
    }

    /// Cancels and forgets every order tracked past `timeout`.
    pub async fn sweep(&self) {
        let expired: Vec<String> = {
            let tracked = self.tracked.lock();
            let now = Instant::now();
            tracked
                .iter()
                .filter(|(_, started)| now.duration_since(**started) > self.timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for order_id in expired {
            if let Err(err) = self.connector.cancel_order(&order_id).await {
                tracing::warn!(%order_id, %err, "failed to cancel orphaned order");
            }
            self.tracked.lock().remove(&order_id);
        }
    }
}
