//! End-to-end smoke test for the paper trading loop (spec §8 scenario 1):
//! a synthetic feed, a quoter, and the supporting plumbing wired the same
//! way `runner::run` wires them, run for a couple of seconds of wall clock
//! and checked for a populated quote and a persisted snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mm_bot::connector::ExchangeConnector;
use mm_bot::events::EventBus;
use mm_bot::feed::SyntheticFeed;
use mm_bot::feed_store::FeedStore;
use mm_bot::hedger::{Hedger, HedgePolicy};
use mm_bot::metrics::MetricsRegistry;
use mm_bot::model::AvellanedaStoikovModel;
use mm_bot::orphan_reaper::OrphanReaper;
use mm_bot::quoter::{Quoter, QuoterConfig};
use mm_bot::risk::{RiskLimits, SymbolLimits};
use mm_bot::signals::SignalHub;
use mm_bot::storage::Storage;
use parking_lot::Mutex;

#[tokio::test]
async fn paper_loop_smoke() {
    let symbol = "BTC-PERP";
    let bus = Arc::new(EventBus::new());
    let feed_store = Arc::new(FeedStore::new());
    let signals = SignalHub::new();
    signals.subscribe(&bus);

    let storage = Storage::open_sqlite(":memory:").expect("opening in-memory sqlite storage");

    let connector = Arc::new(ExchangeConnector::paper("kucoin", 0.0004));
    connector.register_symbol(symbol);
    connector.start(None);

    let mut limits = HashMap::new();
    limits.insert(
        symbol.to_string(),
        SymbolLimits {
            max_position: 10.0,
            max_order_notional: 5_000.0,
            max_cancels_per_minute: None,
            max_orders: None,
            account_notional_cap: None,
        },
    );
    let risk = Arc::new(Mutex::new(RiskLimits::new(
        limits,
        1_000.0,
        1_000.0,
        1_000_000.0,
        None,
    )));

    let reaper = Arc::new(OrphanReaper::new(connector.clone(), None));
    let hedger = Hedger::new(
        connector.clone(),
        HedgePolicy {
            enabled: true,
            threshold: 0.1,
            max_notional: 1_000.0,
            hedge_ratio: 1.0,
            cooldown_seconds: 5.0,
        },
    );
    let model = AvellanedaStoikovModel::new(0.1, 10.0, 1.0, 0.1, 0.1);

    let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let mut quoter = Quoter::new(
        QuoterConfig {
            venue: "kucoin".into(),
            symbol: symbol.into(),
            tick_size: 0.1,
            lot_size: 0.01,
            max_order_notional: 1_000.0,
            maker_fee_bps: 0.0,
            taker_fee_bps: 4.0,
            refresh_seconds: 0.1,
        },
        model,
        connector.clone(),
        feed_store.clone(),
        signals,
        risk,
        hedger,
        reaper,
        None,
        Some(storage.clone()),
        MetricsRegistry::new(),
        stop_rx.clone(),
    );

    let (feed_stop_tx, feed_stop_rx) = tokio::sync::watch::channel(false);
    let feed = SyntheticFeed::new("kucoin", symbol, 30_000.0)
        .with_tick_interval(Duration::from_millis(50));
    let feed_handle = tokio::spawn(feed.run(bus.clone(), feed_store.clone(), feed_stop_rx));

    let quoter_handle = tokio::spawn(async move {
        quoter.run().await;
        quoter
    });

    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let _ = feed_stop_tx.send(true);
    let _ = _stop_tx.send(true);
    feed_handle.await.expect("synthetic feed task panicked");
    let quoter = quoter_handle.await.expect("quoter task panicked");

    assert!(quoter.last_quote().is_some(), "expected the quoter to have produced a quote");

    let count = storage
        .snapshot_count()
        .await
        .expect("reading snapshot count from storage");
    assert!(count > 0, "expected at least one snapshot to be persisted");
}
