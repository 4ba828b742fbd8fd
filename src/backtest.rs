//! `run-backtest` support (§6): runs the quoting model against a random-walk
//! price simulation and summarizes the result into the CSV columns the CLI
//! contract promises (`pnl, sharpe, sortino, trades, turnover, hit_rate,
//! max_drawdown, capacity`).
//!
//! The backtest harness is an external collaborator around the core control
//! loop (§1), not part of it: it does not reconcile real orders or drive
//! risk/kill-switch gating, it replays the same Avellaneda–Stoikov model and
//! microstructure signals against synthetic price action to get a rough read
//! on a parameter set before it goes anywhere near a connector.

use std::fmt::Write as _;

use rand::Rng;

use crate::config::StrategyConfig;
use crate::model::AvellanedaStoikovModel;
use crate::signals::{ImpactEstimator, MicrostructureSignals, VolatilityEstimator};
use crate::types::{MicrostructureFeature, OrderBookLevel, OrderBookSnapshot, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestMode {
    /// Tick-by-tick replay with live microstructure/volatility/impact signal
    /// updates, closest to how the quoter actually behaves.
    Event,
    /// Same price path, but feature extraction is skipped in favor of a flat
    /// feature each tick — cheaper, an approximation of how a vectorized
    /// batch simulation trades fidelity for speed.
    Vectorized,
}

impl std::str::FromStr for BacktestMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(BacktestMode::Event),
            "vectorized" => Ok(BacktestMode::Vectorized),
            other => anyhow::bail!("unknown backtest mode: {other} (expected event|vectorized)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub pnl: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub trades: u64,
    pub turnover: f64,
    pub hit_rate: f64,
    pub max_drawdown: f64,
    pub capacity: f64,
}

impl BacktestReport {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "pnl,sharpe,sortino,trades,turnover,hit_rate,max_drawdown,capacity");
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            self.pnl,
            self.sharpe,
            self.sortino,
            self.trades,
            self.turnover,
            self.hit_rate,
            self.max_drawdown,
            self.capacity,
        );
        out
    }
}

struct TradeOutcome {
    pnl: f64,
    notional: f64,
}

/// Lightweight fill accounting mirroring `quoter::SymbolState::apply_fill`
/// (§4.10) for a single symbol, treating every backtest fill as a maker
/// trade against our own resting quote.
struct PnlTracker {
    inventory: f64,
    cost_basis: f64,
    realized_pnl: f64,
}

const DUST_EPSILON: f64 = 1e-9;

impl PnlTracker {
    fn new() -> Self {
        PnlTracker {
            inventory: 0.0,
            cost_basis: 0.0,
            realized_pnl: 0.0,
        }
    }

    fn apply_fill(&mut self, side: Side, price: f64, size: f64, fee_bps: f64) -> f64 {
        let old_inventory = self.inventory;
        let signed_size = match side {
            Side::Buy => size,
            Side::Sell => -size,
        };
        let mut realized = 0.0;
        let extending = old_inventory == 0.0 || old_inventory.signum() == signed_size.signum();
        if extending {
            self.cost_basis += price * size;
        } else {
            let avg_cost = if old_inventory != 0.0 {
                self.cost_basis / old_inventory.abs()
            } else {
                0.0
            };
            let closed_size = size.min(old_inventory.abs());
            let pnl = if old_inventory < 0.0 {
                (avg_cost - price) * closed_size
            } else {
                (price - avg_cost) * closed_size
            };
            realized += pnl;
            self.cost_basis -= avg_cost * closed_size;
            let residual = size - closed_size;
            if residual > DUST_EPSILON {
                self.cost_basis = price * residual;
            }
        }
        self.inventory += signed_size;
        if self.inventory.abs() < DUST_EPSILON {
            self.inventory = 0.0;
            self.cost_basis = 0.0;
        }
        let fee = (price * size).abs() * fee_bps / 10_000.0;
        realized -= fee;
        self.realized_pnl += realized;
        realized
    }

    fn unrealized(&self, mid: f64) -> f64 {
        if self.inventory == 0.0 {
            0.0
        } else {
            self.inventory * mid - self.cost_basis
        }
    }
}

/// Runs `steps` ticks of a random-walk simulation against the quoting model
/// configured in `config`'s first symbol/quote sections.
pub fn run(config: &StrategyConfig, mode: BacktestMode, steps: usize) -> anyhow::Result<BacktestReport> {
    let symbol = config
        .symbols
        .first()
        .ok_or_else(|| anyhow::anyhow!("strategy config has no symbols to backtest"))?;

    let model = AvellanedaStoikovModel::new(
        config.quote.gamma,
        config.quote.horizon_seconds,
        config.quote.kappa,
        config.quote.min_spread,
        config.quote.skew_alpha,
    );

    let mut rng = rand::thread_rng();
    let mut mid = 30_000.0_f64;
    let volatility = 0.0008;

    let mut microstructure = MicrostructureSignals::new();
    let mut vol_estimator = VolatilityEstimator::new();
    let mut impact = ImpactEstimator::new();

    let mut tracker = PnlTracker::new();
    let mut equity_curve = Vec::with_capacity(steps + 1);
    let mut returns = Vec::with_capacity(steps);
    let mut trade_outcomes: Vec<TradeOutcome> = Vec::new();
    let mut last_equity = 0.0;
    equity_curve.push(0.0);

    for _ in 0..steps {
        let shock: f64 = rng.gen_range(-1.0..1.0) * mid * volatility;
        let previous_mid = mid;
        mid = (mid + shock).max(1.0);
        let spread_hint = (mid * volatility * 4.0).max(symbol.tick_size);

        let snapshot = OrderBookSnapshot {
            venue: symbol.venue.clone(),
            symbol: symbol.name.clone(),
            timestamp: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap_or_default(),
            bid: OrderBookLevel { price: mid - spread_hint / 2.0, size: rng.gen_range(0.1..5.0) },
            ask: OrderBookLevel { price: mid + spread_hint / 2.0, size: rng.gen_range(0.1..5.0) },
            last_trade_price: mid,
            last_trade_size: rng.gen_range(0.01..1.0),
            mark_price: None,
        };

        let (feature, sigma, lambda) = match mode {
            BacktestMode::Event => {
                let feature = microstructure.update_snapshot(snapshot.clone());
                let sigma = vol_estimator.update(&snapshot);
                let price_return = if previous_mid > 0.0 { (mid - previous_mid) / previous_mid } else { 0.0 };
                let trade_side = if mid >= previous_mid { Side::Buy } else { Side::Sell };
                let lambda = impact.update(
                    &symbol.name,
                    crate::types::Trade { side: trade_side, price: mid, size: snapshot.last_trade_size },
                    price_return,
                );
                (feature, sigma, lambda)
            }
            BacktestMode::Vectorized => (
                MicrostructureFeature { microprice: snapshot.mid(), queue_imbalance: 0.0, order_flow_imbalance: 0.0 },
                0.0,
                0.0,
            ),
        };

        let quote = model.generate_quotes(
            &snapshot,
            tracker.inventory,
            sigma,
            &feature,
            symbol.tick_size,
            config.quote.min_spread,
            lambda,
        );

        // A random aggressor crosses one side of the book each tick; if it
        // reaches our quote, we get filled at our own price (maker print).
        let aggressor_side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let aggressor_price = match aggressor_side {
            Side::Buy => snapshot.ask.price,
            Side::Sell => snapshot.bid.price,
        };
        let size = (symbol.max_order_notional / aggressor_price.max(symbol.tick_size) / symbol.lot_size)
            .floor()
            .max(1.0)
            * symbol.lot_size;

        let filled = match aggressor_side {
            Side::Buy if aggressor_price >= quote.ask => Some((Side::Sell, quote.ask)),
            Side::Sell if aggressor_price <= quote.bid => Some((Side::Buy, quote.bid)),
            _ => None,
        };
        if let Some((our_side, price)) = filled {
            let realized = tracker.apply_fill(our_side, price, size, symbol.maker_fee_bps);
            trade_outcomes.push(TradeOutcome { pnl: realized, notional: (price * size).abs() });
        }

        let equity = tracker.realized_pnl + tracker.unrealized(mid);
        let ret = equity - last_equity;
        returns.push(ret);
        last_equity = equity;
        equity_curve.push(equity);
    }

    let pnl = equity_curve.last().copied().unwrap_or(0.0);
    let sharpe = sharpe_ratio(&returns);
    let sortino = sortino_ratio(&returns);
    let max_drawdown = max_drawdown(&equity_curve);
    let turnover: f64 = trade_outcomes.iter().map(|t| t.notional).sum();
    let winners = trade_outcomes.iter().filter(|t| t.pnl > 0.0).count();
    let hit_rate = if trade_outcomes.is_empty() {
        0.0
    } else {
        winners as f64 / trade_outcomes.len() as f64
    };
    let avg_notional = if trade_outcomes.is_empty() {
        0.0
    } else {
        turnover / trade_outcomes.len() as f64
    };
    let capacity = symbol.max_order_notional.max(avg_notional);

    Ok(BacktestReport {
        pnl,
        sharpe,
        sortino,
        trades: trade_outcomes.len() as u64,
        turnover,
        hit_rate,
        max_drawdown,
        capacity,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn sharpe_ratio(returns: &[f64]) -> f64 {
    let m = mean(returns);
    let sd = std_dev(returns, m);
    if sd == 0.0 {
        0.0
    } else {
        (m / sd) * (returns.len() as f64).sqrt()
    }
}

fn sortino_ratio(returns: &[f64]) -> f64 {
    let m = mean(returns);
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_dev = if downside.is_empty() {
        0.0
    } else {
        (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt()
    };
    if downside_dev == 0.0 {
        0.0
    } else {
        (m / downside_dev) * (returns.len() as f64).sqrt()
    }
}

fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        let drawdown = peak - equity;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    worst
}
