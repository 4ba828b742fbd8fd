//! Per-symbol control loop (§4.10): the orchestrator that reads the latest
//! snapshot and feature, calls the quoting model, reconciles resting orders,
//! reconciles fills into inventory/PnL, and drives the hedger and risk gate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::basis::BasisFunding;
use crate::connector::ExchangeConnector;
use crate::feed_store::FeedStore;
use crate::hedger::Hedger;
use crate::kill_switch::KillSwitch;
use crate::metrics::MetricsRegistry;
use crate::model::AvellanedaStoikovModel;
use crate::orphan_reaper::OrphanReaper;
use crate::risk::RiskLimits;
use crate::signals::SignalHub;
use crate::storage::Storage;
use crate::types::{Fill, Order, QuoteResult, Side};

const FEE_BPS_DIVISOR: f64 = 10_000.0;
const DUST_EPSILON: f64 = 1e-9;
const REPLACE_TOLERANCE_FRACTION: f64 = 0.5;

#[derive(Debug, Clone)]
struct OpenOrder {
    order_id: String,
    price: f64,
}

/// Per-symbol runtime state (§3). Owned by exactly one quoter task.
pub struct SymbolState {
    pub inventory: f64,
    pub inventory_cost_basis: f64,
    pub realized_pnl: f64,
    open_orders: HashMap<Side, OpenOrder>,
    posted_notional_ewma: f64,
    filled_notional_ewma: f64,
    pub last_quote: Option<QuoteResult>,
}

const NOTIONAL_EWMA_ALPHA: f64 = 0.1;

impl Default for SymbolState {
    fn default() -> Self {
        SymbolState {
            inventory: 0.0,
            inventory_cost_basis: 0.0,
            realized_pnl: 0.0,
            open_orders: HashMap::new(),
            posted_notional_ewma: 0.0,
            filled_notional_ewma: 0.0,
            last_quote: None,
        }
    }
}

impl SymbolState {
    /// Applies a fill to inventory/cost-basis/PnL per §4.10's fill
    /// accounting rules, returning the realized PnL delta (fees included).
    fn apply_fill(&mut self, fill: &Fill, maker_fee_bps: f64, taker_fee_bps: f64) -> f64 {
        let old_inventory = self.inventory;
        let signed_size = match fill.side {
            Side::Buy => fill.size,
            Side::Sell => -fill.size,
        };

        let mut realized = 0.0;
        let extending = old_inventory == 0.0 || old_inventory.signum() == signed_size.signum();
        if extending {
            self.inventory_cost_basis += fill.price * fill.size;
        } else {
            let avg_cost = if old_inventory != 0.0 {
                self.inventory_cost_basis / old_inventory.abs()
            } else {
                0.0
            };
            let closed_size = fill.size.min(old_inventory.abs());
            let pnl = if old_inventory < 0.0 {
                (avg_cost - fill.price) * closed_size
            } else {
                (fill.price - avg_cost) * closed_size
            };
            realized += pnl;
            self.inventory_cost_basis -= avg_cost * closed_size;

            let residual_size = fill.size - closed_size;
            if residual_size > DUST_EPSILON {
                self.inventory_cost_basis = fill.price * residual_size;
            }
        }

        self.inventory += signed_size;
        if self.inventory.abs() < DUST_EPSILON {
            self.inventory = 0.0;
            self.inventory_cost_basis = 0.0;
        }

        // Fee: explicit on the fill if already populated by the connector,
        // else computed from maker/taker bps depending on whether this
        // order was resting in our own book (maker) or not (taker).
        let fee = if fill.fee > 0.0 {
            fill.fee
        } else {
            let is_maker = self
                .open_orders
                .values()
                .any(|o| o.order_id == fill.order_id);
            let bps = if is_maker { maker_fee_bps } else { taker_fee_bps };
            (fill.price * fill.size).abs() * bps / FEE_BPS_DIVISOR
        };
        realized -= fee;

        self.realized_pnl += realized;
        self.filled_notional_ewma = NOTIONAL_EWMA_ALPHA * (fill.price * fill.size).abs()
            + (1.0 - NOTIONAL_EWMA_ALPHA) * self.filled_notional_ewma;
        realized
    }

    fn note_posted(&mut self, notional: f64) {
        self.posted_notional_ewma =
            NOTIONAL_EWMA_ALPHA * notional + (1.0 - NOTIONAL_EWMA_ALPHA) * self.posted_notional_ewma;
    }

    pub fn fill_rate(&self) -> f64 {
        if self.posted_notional_ewma <= 0.0 {
            0.0
        } else {
            (self.filled_notional_ewma / self.posted_notional_ewma).min(1.0)
        }
    }
}

pub struct QuoterConfig {
    pub venue: String,
    pub symbol: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub max_order_notional: f64,
    pub maker_fee_bps: f64,
    pub taker_fee_bps: f64,
    pub refresh_seconds: f64,
}

/// Lifecycle stage of a quoter task, per §4.10's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoterStatus {
    Running,
    Halted,
    Terminated,
}

pub struct Quoter {
    config: QuoterConfig,
    model: AvellanedaStoikovModel,
    connector: Arc<ExchangeConnector>,
    feed_store: Arc<FeedStore>,
    signals: Arc<SignalHub>,
    risk: Arc<Mutex<RiskLimits>>,
    hedger: Hedger,
    basis: Option<Arc<Mutex<BasisFunding>>>,
    reaper: Arc<OrphanReaper>,
    kill_switch: Option<Arc<KillSwitch>>,
    storage: Option<Storage>,
    metrics: MetricsRegistry,
    stop: tokio::sync::watch::Receiver<bool>,
    state: SymbolState,
}

#[allow(clippy::too_many_arguments)]
impl Quoter {
    pub fn new(
        config: QuoterConfig,
        model: AvellanedaStoikovModel,
        connector: Arc<ExchangeConnector>,
        feed_store: Arc<FeedStore>,
        signals: Arc<SignalHub>,
        risk: Arc<Mutex<RiskLimits>>,
        hedger: Hedger,
        reaper: Arc<OrphanReaper>,
        kill_switch: Option<Arc<KillSwitch>>,
        storage: Option<Storage>,
        metrics: MetricsRegistry,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Quoter {
            config,
            model,
            connector,
            feed_store,
            signals,
            risk,
            hedger,
            basis: None,
            reaper,
            kill_switch,
            storage,
            metrics,
            stop,
            state: SymbolState::default(),
        }
    }

    pub fn with_basis(mut self, basis: Arc<Mutex<BasisFunding>>) -> Self {
        self.basis = Some(basis);
        self
    }

    pub fn inventory(&self) -> f64 {
        self.state.inventory
    }

    pub fn realized_pnl(&self) -> f64 {
        self.state.realized_pnl
    }

    pub fn last_quote(&self) -> Option<QuoteResult> {
        self.state.last_quote
    }

    /// Drives the control loop until halted, killed, or externally stopped.
    pub async fn run(&mut self) -> QuoterStatus {
        let mut rng = rand::thread_rng();
        loop {
            if *self.stop.borrow() {
                self.connector.cancel_all(Some(&self.config.symbol)).await.ok();
                return QuoterStatus::Terminated;
            }
            if self.risk.lock().halted() || self.kill_switch.as_ref().map(|k| k.tripped()).unwrap_or(false) {
                self.connector.cancel_all(Some(&self.config.symbol)).await.ok();
                return QuoterStatus::Halted;
            }

            if let Err(err) = self.tick().await {
                tracing::warn!(symbol = %self.config.symbol, %err, "quoter iteration failed");
                if let Some(ks) = &self.kill_switch {
                    ks.record_error(&err.to_string());
                }
            }

            let jitter: f64 = rng.gen_range(-0.1..0.1);
            let sleep_for = (self.config.refresh_seconds * (1.0 + jitter)).max(0.0);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(sleep_for)) => {}
                _ = self.stop.changed() => {}
            }
        }
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        let symbol = self.config.symbol.clone();
        let Some(snapshot) = self.feed_store.get_snapshot(&symbol) else {
            return Ok(());
        };
        let Some(feature) = self.signals.feature(&symbol) else {
            return Ok(());
        };
        let sigma = self.signals.sigma(&symbol);
        let lambda = self.signals.impact_lambda(&symbol);

        let quote = self.model.generate_quotes(
            &snapshot,
            self.state.inventory,
            sigma,
            &feature,
            self.config.tick_size,
            self.config.tick_size,
            lambda,
        );
        self.state.last_quote = Some(quote);

        if let Some(storage) = &self.storage {
            storage.record_snapshot(&snapshot).await.ok();
        }

        self.reconcile_orders(&quote).await?;

        self.connector
            .process_cross(&symbol, snapshot.bid.price, snapshot.ask.price)
            .await;

        while let Some(fill) = self.connector.poll_fill().await {
            if fill.symbol != symbol {
                continue;
            }
            let pnl_delta =
                self.state
                    .apply_fill(&fill, self.config.maker_fee_bps, self.config.taker_fee_bps);
            if let Some(id) = fill_matches_open_order(&self.state, &fill) {
                self.state.open_orders.remove(&id);
                self.risk.lock().remove_order(&fill.order_id, &symbol);
                self.reaper.untrack(&fill.order_id);
            }
            self.risk.lock().record_fill(&fill, snapshot.mid(), pnl_delta);
        }
        self.risk.lock().update_mid(&symbol, snapshot.mid());

        let new_inventory = self
            .hedger
            .maybe_hedge(&snapshot, self.state.inventory, self.config.tick_size, self.config.lot_size)
            .await;
        if new_inventory != self.state.inventory {
            self.state.inventory = new_inventory;
            self.risk.lock().update_inventory(&symbol, new_inventory);
        }
        self.metrics.set_hedge_notional(self.hedger.last_notional);

        self.emit_metrics();
        self.reaper.sweep().await;
        Ok(())
    }

    /// Diffs desired prices against resting orders: keeps an order within
    /// half a tick of target, otherwise cancels and replaces (§4.10).
    async fn reconcile_orders(&mut self, quote: &QuoteResult) -> anyhow::Result<()> {
        let symbol = self.config.symbol.clone();
        let half_tick = self.config.tick_size * REPLACE_TOLERANCE_FRACTION;
        for side in [Side::Buy, Side::Sell] {
            let target_price = match side {
                Side::Buy => quote.bid,
                Side::Sell => quote.ask,
            };
            let keep = self
                .state
                .open_orders
                .get(&side)
                .map(|o| (o.price - target_price).abs() <= half_tick)
                .unwrap_or(false);
            if keep {
                continue;
            }
            if let Some(existing) = self.state.open_orders.remove(&side) {
                self.connector.cancel_order(&existing.order_id).await?;
                let mut risk = self.risk.lock();
                risk.record_cancel(&symbol);
                risk.remove_order(&existing.order_id, &symbol);
                drop(risk);
                self.reaper.untrack(&existing.order_id);
            }
            self.place_new_order(side, target_price).await?;
        }
        Ok(())
    }

    async fn place_new_order(&mut self, side: Side, price: f64) -> anyhow::Result<()> {
        let size = quote_size(self.config.max_order_notional, price, self.config.lot_size);
        if size <= 0.0 {
            return Ok(());
        }
        let order = Order {
            venue: self.config.venue.clone(),
            symbol: self.config.symbol.clone(),
            side,
            price,
            size,
            order_id: None,
            post_only: true,
        };
        let allowed = self.risk.lock().check_order(&order);
        if !allowed {
            return Ok(());
        }
        let order_id = self.connector.place_order(order.clone()).await?;
        self.risk.lock().register_order(&order_id, &order);
        self.reaper.track(&order_id);
        self.state
            .open_orders
            .insert(side, OpenOrder { order_id, price });
        self.state.note_posted((price * size).abs());
        Ok(())
    }

    fn emit_metrics(&self) {
        let symbol = &self.config.symbol;
        self.metrics.set_pnl_realized(symbol, self.state.realized_pnl);
        self.metrics.set_inventory(symbol, self.state.inventory);
        self.metrics.set_fill_rate(symbol, self.state.fill_rate());
        if let Some(quote) = self.state.last_quote {
            self.metrics.set_spread_target(symbol, quote.spread);
        }
        if let Some(basis) = &self.basis {
            self.metrics.set_funding_accrual(basis.lock().total_accrual());
        }
    }
}

fn fill_matches_open_order(state: &SymbolState, fill: &Fill) -> Option<Side> {
    state
        .open_orders
        .iter()
        .find(|(_, o)| o.order_id == fill.order_id)
        .map(|(side, _)| *side)
}

/// Sizes an order from the symbol's max notional budget, floored to a whole
/// number of lots (never below one lot).
fn quote_size(max_order_notional: f64, price: f64, lot_size: f64) -> f64 {
    if price <= 0.0 || lot_size <= 0.0 {
        return 0.0;
    }
    let raw = max_order_notional / price;
    let lots = (raw / lot_size).floor().max(1.0);
    lots * lot_size
}
