//! Persistent Store
//!
//! Single-writer transactional storage for inventory, sessions, and scan
//! cursors, backed by an embedded SQLite file through sqlx. The pool is
//! capped at one connection: every transaction observes a fully serialized
//! history, which is what the reservation path relies on.

pub mod models;

pub use models::{InventoryItem, Session, SessionStatus};

use crate::amount::Amount;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::time::Duration;

/// Aggregate drop progress for the public API.
#[derive(Debug, Clone, Serialize)]
pub struct MintProgress {
    pub total: i64,
    pub minted: i64,
    pub reserved: i64,
    pub available: i64,
    pub percentage: f64,
}

/// Key under `settings` holding the block scanner cursor.
pub const CURSOR_KEY: &str = "last_scanned_block";

/// Key under `settings` holding the monotonic session sequence.
pub const SESSION_SEQ_KEY: &str = "session_seq";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        content_ref TEXT NOT NULL,
        claimed INTEGER NOT NULL DEFAULT 0,
        session_ref TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_items_claimed ON items (claimed)",
    "CREATE INDEX IF NOT EXISTS idx_items_content_ref ON items (content_ref)",
    r#"CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        quantity INTEGER NOT NULL,
        amount_due INTEGER NOT NULL,
        status TEXT NOT NULL,
        txid TEXT,
        assigned_refs TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_amount_due ON sessions (amount_due)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions (status)",
    r#"CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )"#,
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('session_seq', '0')",
];

/// SQLite-backed store. Cheap to clone the inner pool handle via `pool()`.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file.
    pub async fn connect(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect_with(options).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        Self::connect_with(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        // max_connections(1) is load-bearing: it is the single-writer
        // guarantee every transaction in the service builds on.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await?;
        tracing::info!("store connection established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if missing and seed the sequence row.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Idempotent inventory seeding: item ids are assigned densely from 1 in
    /// the order given. Existing ids are left untouched.
    pub async fn seed_items(&self, content_refs: &[String]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for (i, content_ref) in content_refs.iter().enumerate() {
            let result =
                sqlx::query("INSERT OR IGNORE INTO items (id, content_ref) VALUES (?, ?)")
                    .bind((i + 1) as i64)
                    .bind(content_ref)
                    .execute(&mut *tx)
                    .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settings (scan cursor, session sequence)
    // ------------------------------------------------------------------

    pub async fn setting(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO settings (key, value) VALUES (?, ?)
               ON CONFLICT (key) DO UPDATE SET value = excluded.value"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads for the gateway and the observers
    // ------------------------------------------------------------------

    pub async fn progress(&self, max_supply: i64) -> Result<MintProgress, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT
                   COUNT(*) AS total,
                   COALESCE(SUM(claimed = 1), 0) AS minted,
                   COALESCE(SUM(claimed = 0 AND session_ref IS NOT NULL), 0) AS reserved
               FROM items WHERE id <= ?"#,
        )
        .bind(max_supply)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.get("total");
        let minted: i64 = row.get("minted");
        let reserved: i64 = row.get("reserved");
        let percentage = if total > 0 {
            minted as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        Ok(MintProgress {
            total,
            minted,
            reserved,
            available: total - minted - reserved,
            percentage,
        })
    }

    pub async fn session_by_id(&self, session_id: &str) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT session_id, quantity, amount_due, status, txid, assigned_refs,
                      created_at, updated_at
               FROM sessions WHERE session_id = ?"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_session).transpose()
    }

    /// All sessions the observers still care about, as
    /// `(amount_due, session_id, quantity)`.
    pub async fn open_sessions(&self) -> Result<Vec<(Amount, String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT amount_due, session_id, quantity FROM sessions
               WHERE status IN ('pending', 'payment_pending')"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    Amount::from_units(r.get("amount_due")),
                    r.get("session_id"),
                    r.get("quantity"),
                )
            })
            .collect())
    }

    /// Items currently attached to a session (claimed or not), in id order.
    pub async fn items_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<InventoryItem>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT id, content_ref, claimed, session_ref FROM items
               WHERE session_ref = ? ORDER BY id"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| InventoryItem {
                id: r.get("id"),
                content_ref: r.get("content_ref"),
                claimed: r.get::<i64, _>("claimed") != 0,
                session_ref: r.get("session_ref"),
            })
            .collect())
    }
}

fn map_session(row: sqlx::sqlite::SqliteRow) -> Result<Session, sqlx::Error> {
    let status_raw: String = row.get("status");
    let status = SessionStatus::parse(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: format!("unknown session status: {status_raw}").into(),
    })?;
    let assigned_refs: Option<Vec<String>> = row
        .get::<Option<String>, _>("assigned_refs")
        .and_then(|raw| serde_json::from_str(&raw).ok());

    Ok(Session {
        session_id: row.get("session_id"),
        quantity: row.get("quantity"),
        amount_due: Amount::from_units(row.get("amount_due")),
        status,
        txid: row.get("txid"),
        assigned_refs,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let store = test_store().await;
        store.init_schema().await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_seed_items_idempotent() {
        let store = test_store().await;
        let refs: Vec<String> = (0..10).map(|i| format!("cid-{i}")).collect();
        assert_eq!(store.seed_items(&refs).await.unwrap(), 10);
        // Second pass inserts nothing.
        assert_eq!(store.seed_items(&refs).await.unwrap(), 0);

        let progress = store.progress(5000).await.unwrap();
        assert_eq!(progress.total, 10);
        assert_eq!(progress.minted, 0);
        assert_eq!(progress.reserved, 0);
        assert_eq!(progress.available, 10);
        assert_eq!(progress.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let store = test_store().await;
        assert_eq!(store.setting(CURSOR_KEY).await.unwrap(), None);
        store.put_setting(CURSOR_KEY, "812345").await.unwrap();
        assert_eq!(
            store.setting(CURSOR_KEY).await.unwrap().as_deref(),
            Some("812345")
        );
        store.put_setting(CURSOR_KEY, "812346").await.unwrap();
        assert_eq!(
            store.setting(CURSOR_KEY).await.unwrap().as_deref(),
            Some("812346")
        );
    }

    #[tokio::test]
    async fn test_session_seq_seeded() {
        let store = test_store().await;
        assert_eq!(
            store.setting(SESSION_SEQ_KEY).await.unwrap().as_deref(),
            Some("0")
        );
    }

    #[tokio::test]
    async fn test_session_not_found() {
        let store = test_store().await;
        assert!(store.session_by_id("missing").await.unwrap().is_none());
    }
}
