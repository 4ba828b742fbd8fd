//! Process-level composition (§2 "Runner", §5, §9's "runtime context"):
//! wires config + venues into feeds, connectors, signals, risk, quoters, the
//! metrics server, and storage, then drives them to a clean stop on
//! SIGINT/SIGTERM or a kill-switch trip.
//!
//! This is the single place that owns the "global mutable state" the design
//! notes call out (last-trade prices live in the feed store, the kill-switch
//! latch lives in `KillSwitch`, the funding map lives in `BasisFunding`) —
//! each is constructed once here and handed to tasks by reference, never
//! reached via an ambient global.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::basis::{BasisFunding, FundingPolicy};
use crate::config::{StrategyConfig, Venues};
use crate::connector::ExchangeConnector;
use crate::credentials::load_exchange_credentials;
use crate::events::EventBus;
use crate::feed::{LiveFeed, SyntheticFeed};
use crate::feed_store::FeedStore;
use crate::hedger::{HedgePolicy, Hedger};
use crate::kill_switch::KillSwitch;
use crate::metrics::MetricsRegistry;
use crate::model::AvellanedaStoikovModel;
use crate::orphan_reaper::OrphanReaper;
use crate::quoter::{Quoter, QuoterConfig};
use crate::risk::{RiskLimits, SymbolLimits};
use crate::signals::SignalHub;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Paper,
    Live,
}

/// Runs the bot to completion: spawns one feed task and one quoter task per
/// configured symbol plus the metrics server, and returns once every task
/// has unwound after a stop signal.
pub async fn run(config: StrategyConfig, venues: Venues, mode: RunMode) -> Result<()> {
    let bus = Arc::new(EventBus::new());
    let feed_store = Arc::new(FeedStore::new());
    let signals = SignalHub::new();
    signals.subscribe(&bus);
    let metrics = MetricsRegistry::new();

    let storage = Storage::open(&config.storage.backend, &config.storage.dsn)
        .context("opening storage backend")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let kill_switch = {
        let stop_tx = stop_tx.clone();
        Arc::new(KillSwitch::new(config.risk.kill_switch_threshold, move |reason| {
            tracing::error!(%reason, "kill switch tripped, stopping all quoters");
            let _ = stop_tx.send(true);
        }))
    };

    let mut limits = HashMap::new();
    for symbol in &config.symbols {
        limits.insert(
            symbol.name.clone(),
            SymbolLimits {
                max_position: symbol.max_position,
                max_order_notional: symbol.max_order_notional,
                max_cancels_per_minute: symbol.max_cancels_per_minute,
                max_orders: config.risk.max_orders,
                account_notional_cap: config.risk.account_notional_cap,
            },
        );
    }
    let risk = Arc::new(Mutex::new(RiskLimits::new(
        limits,
        config.risk.max_drawdown,
        config.risk.max_daily_loss,
        config.risk.max_inventory_notional,
        config.risk.max_open_orders,
    )));

    let basis = Arc::new(Mutex::new(BasisFunding::new()));
    for symbol in &config.symbols {
        if symbol.basis_capture {
            basis.lock().configure(
                &symbol.name,
                FundingPolicy {
                    enabled: config.basis.enabled,
                    max_notional: config.basis.max_notional,
                    target_notional: config.basis.target_notional,
                    threshold: config.basis.funding_threshold,
                },
            );
        }
    }

    tokio::spawn(crate::metrics::serve(
        config.metrics.host.clone(),
        config.metrics.port,
        metrics.clone(),
    ));

    let mut connectors: HashMap<String, Arc<ExchangeConnector>> = HashMap::new();
    let mut join_handles = Vec::new();

    for symbol in &config.symbols {
        let venue_config = venues
            .get(&symbol.venue)
            .with_context(|| format!("symbol {} references unknown venue", symbol.name))?;

        let connector = match connectors.get(&symbol.venue) {
            Some(c) => c.clone(),
            None => {
                let connector = Arc::new(match mode {
                    RunMode::Paper => ExchangeConnector::paper(symbol.venue.clone(), 0.0),
                    RunMode::Live => {
                        let credentials = load_exchange_credentials(&symbol.venue);
                        if credentials.is_none() {
                            anyhow::bail!(
                                "missing API credentials for venue {} in live mode",
                                symbol.venue
                            );
                        }
                        ExchangeConnector::live(
                            symbol.venue.clone(),
                            venue_config.rest_base.clone(),
                            credentials,
                        )
                    }
                });
                connector.start(None);
                connectors.insert(symbol.venue.clone(), connector.clone());
                connector
            }
        };
        connector.register_symbol(&symbol.name);

        match mode {
            RunMode::Paper => {
                let feed = SyntheticFeed::new(symbol.venue.clone(), symbol.name.clone(), 30_000.0);
                join_handles.push(tokio::spawn(feed.run(bus.clone(), feed_store.clone(), stop_rx.clone())));
            }
            RunMode::Live => {
                let feed = LiveFeed::new(symbol.venue.clone(), symbol.name.clone(), venue_config.ws_public.clone());
                join_handles.push(tokio::spawn(feed.run(bus.clone(), feed_store.clone(), stop_rx.clone())));
            }
        }

        let reaper = Arc::new(OrphanReaper::new(connector.clone(), None));
        let hedger = Hedger::new(
            connector.clone(),
            HedgePolicy {
                enabled: config.hedge.enabled,
                threshold: config.hedge.rebalance_threshold,
                max_notional: config.hedge.max_notional,
                hedge_ratio: symbol.hedge_ratio,
                cooldown_seconds: config.hedge.cooldown_seconds,
            },
        );

        let model = AvellanedaStoikovModel::new(
            config.quote.gamma,
            config.quote.horizon_seconds,
            config.quote.kappa,
            config.quote.min_spread,
            config.quote.skew_alpha,
        );

        let mut quoter = Quoter::new(
            QuoterConfig {
                venue: symbol.venue.clone(),
                symbol: symbol.name.clone(),
                tick_size: symbol.tick_size,
                lot_size: symbol.lot_size,
                max_order_notional: symbol.max_order_notional,
                maker_fee_bps: symbol.maker_fee_bps,
                taker_fee_bps: symbol.taker_fee_bps,
                refresh_seconds: config.quote.refresh_seconds,
            },
            model,
            connector.clone(),
            feed_store.clone(),
            signals.clone(),
            risk.clone(),
            hedger,
            reaper,
            Some(kill_switch.clone()),
            Some(storage.clone()),
            metrics.clone(),
            stop_rx.clone(),
        );
        if symbol.basis_capture {
            quoter = quoter.with_basis(basis.clone());
        }

        join_handles.push(tokio::spawn(async move {
            quoter.run().await;
        }));
    }

    wait_for_shutdown_signal(stop_tx).await;
    for handle in join_handles {
        let _ = handle.await;
    }
    for connector in connectors.values() {
        connector.stop();
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal(stop_tx: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = wait_for_stop(stop_tx.subscribe()) => {}
    }
    let _ = stop_tx.send(true);
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal(stop_tx: watch::Sender<bool>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c, shutting down"),
        _ = wait_for_stop(stop_tx.subscribe()) => {}
    }
    let _ = stop_tx.send(true);
}

/// Resolves early if something else (the kill switch) already requested a
/// stop, so the signal-wait above doesn't block shutdown unnecessarily.
async fn wait_for_stop(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
