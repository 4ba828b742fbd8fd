//! Persistence for snapshots and trades: a SQLite sink (blocking calls
//! offloaded via `spawn_blocking`) or a ClickHouse HTTP sink, selected by
//! `StorageConfig::backend`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::types::{OrderBookSnapshot, TradeEvent};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    ts INTEGER NOT NULL,
    venue TEXT NOT NULL,
    symbol TEXT NOT NULL,
    bid REAL NOT NULL,
    ask REAL NOT NULL,
    bid_size REAL NOT NULL,
    ask_size REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS trades (
    ts INTEGER NOT NULL,
    venue TEXT NOT NULL,
    symbol TEXT NOT NULL,
    price REAL NOT NULL,
    size REAL NOT NULL,
    side TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_symbol ON snapshots(symbol, ts);
CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol, ts);
"#;

enum Backend {
    Sqlite(Arc<Mutex<Connection>>),
    ClickHouse { client: reqwest::Client, dsn: String },
}

/// Sink for `OrderBookSnapshot`/`TradeEvent` persistence. Cheaply clonable;
/// the SQLite connection is shared behind a mutex, mirroring
/// `signals/db_storage.rs`'s single-connection-plus-blocking-task shape.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<Backend>,
}

impl Storage {
    /// Opens a SQLite database at `dsn` (a filesystem path, `sqlite://` URLs
    /// accepted for parity with the config format) and ensures schema.
    pub fn open_sqlite(dsn: &str) -> Result<Self> {
        let path = dsn
            .strip_prefix("sqlite://")
            .unwrap_or(dsn)
            .trim_start_matches('/');
        let path = if dsn.starts_with("sqlite:///") {
            format!("/{path}")
        } else {
            path.to_string()
        };
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)
            .with_context(|| format!("opening sqlite storage at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initializing storage schema")?;
        Ok(Storage {
            backend: Arc::new(Backend::Sqlite(Arc::new(Mutex::new(conn)))),
        })
    }

    /// A ClickHouse HTTP sink: inserts are issued as `INSERT ... FORMAT
    /// JSONEachRow` against `dsn`, a ClickHouse HTTP endpoint URL.
    pub fn open_clickhouse(dsn: &str) -> Self {
        Storage {
            backend: Arc::new(Backend::ClickHouse {
                client: reqwest::Client::new(),
                dsn: dsn.to_string(),
            }),
        }
    }

    pub fn open(backend: &str, dsn: &str) -> Result<Self> {
        match backend {
            "sqlite" => Self::open_sqlite(dsn),
            "clickhouse" => Ok(Self::open_clickhouse(dsn)),
            other => bail!("unknown storage backend: {other}"),
        }
    }

    pub async fn record_snapshot(&self, snapshot: &OrderBookSnapshot) -> Result<()> {
        match self.backend.as_ref() {
            Backend::Sqlite(conn) => {
                let conn = conn.clone();
                let snapshot = snapshot.clone();
                tokio::task::spawn_blocking(move || {
                    let conn = conn.lock();
                    conn.execute(
                        "INSERT INTO snapshots (ts, venue, symbol, bid, ask, bid_size, ask_size) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        rusqlite::params![
                            snapshot.timestamp.timestamp_millis(),
                            snapshot.venue,
                            snapshot.symbol,
                            snapshot.bid.price,
                            snapshot.ask.price,
                            snapshot.bid.size,
                            snapshot.ask.size,
                        ],
                    )
                })
                .await
                .context("storage worker panicked")??;
                Ok(())
            }
            Backend::ClickHouse { client, dsn } => {
                let row = serde_json::json!({
                    "ts": snapshot.timestamp.timestamp_millis(),
                    "venue": snapshot.venue,
                    "symbol": snapshot.symbol,
                    "bid": snapshot.bid.price,
                    "ask": snapshot.ask.price,
                    "bid_size": snapshot.bid.size,
                    "ask_size": snapshot.ask.size,
                });
                insert_clickhouse(client, dsn, "snapshots", &row).await
            }
        }
    }

    pub async fn record_trade(&self, trade: &TradeEvent) -> Result<()> {
        match self.backend.as_ref() {
            Backend::Sqlite(conn) => {
                let conn = conn.clone();
                let trade = trade.clone();
                let side = match trade.side {
                    crate::types::Side::Buy => "buy",
                    crate::types::Side::Sell => "sell",
                };
                tokio::task::spawn_blocking(move || {
                    let conn = conn.lock();
                    conn.execute(
                        "INSERT INTO trades (ts, venue, symbol, price, size, side) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            trade.timestamp.timestamp_millis(),
                            trade.venue,
                            trade.symbol,
                            trade.price,
                            trade.size,
                            side,
                        ],
                    )
                })
                .await
                .context("storage worker panicked")??;
                Ok(())
            }
            Backend::ClickHouse { client, dsn } => {
                let side = match trade.side {
                    crate::types::Side::Buy => "buy",
                    crate::types::Side::Sell => "sell",
                };
                let row = serde_json::json!({
                    "ts": trade.timestamp.timestamp_millis(),
                    "venue": trade.venue,
                    "symbol": trade.symbol,
                    "price": trade.price,
                    "size": trade.size,
                    "side": side,
                });
                insert_clickhouse(client, dsn, "trades", &row).await
            }
        }
    }

    /// Number of persisted snapshot rows, for tests and smoke checks.
    pub async fn snapshot_count(&self) -> Result<i64> {
        match self.backend.as_ref() {
            Backend::Sqlite(conn) => {
                let conn = conn.clone();
                tokio::task::spawn_blocking(move || {
                    conn.lock()
                        .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
                })
                .await
                .context("storage worker panicked")?
                .map_err(Into::into)
            }
            Backend::ClickHouse { .. } => bail!("snapshot_count unsupported for clickhouse backend"),
        }
    }
}

async fn insert_clickhouse(
    client: &reqwest::Client,
    dsn: &str,
    table: &str,
    row: &serde_json::Value,
) -> Result<()> {
    let url = format!("{dsn}?query=INSERT%20INTO%20{table}%20FORMAT%20JSONEachRow");
    let resp = client
        .post(&url)
        .body(row.to_string())
        .send()
        .await
        .with_context(|| format!("inserting into clickhouse table {table}"))?;
    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("clickhouse insert into {table} failed: {body}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBookLevel, Side};
    use chrono::Utc;

    fn snapshot() -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "kucoin".into(),
            symbol: "BTC-PERP".into(),
            timestamp: Utc::now(),
            bid: OrderBookLevel { price: 99.0, size: 1.0 },
            ask: OrderBookLevel { price: 101.0, size: 1.0 },
            last_trade_price: 100.0,
            last_trade_size: 0.1,
            mark_price: None,
        }
    }

    #[tokio::test]
    async fn sqlite_sink_persists_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage = Storage::open_sqlite(path.to_str().unwrap()).unwrap();
        storage.record_snapshot(&snapshot()).await.unwrap();
        storage.record_snapshot(&snapshot()).await.unwrap();
        assert_eq!(storage.snapshot_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sqlite_sink_persists_trades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage = Storage::open_sqlite(path.to_str().unwrap()).unwrap();
        storage
            .record_trade(&TradeEvent {
                venue: "kucoin".into(),
                symbol: "BTC-PERP".into(),
                timestamp: Utc::now(),
                price: 100.0,
                size: 1.0,
                side: Side::Buy,
            })
            .await
            .unwrap();
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Storage::open("mongo", "whatever").is_err());
    }
}
