//! Ledger store: connection pooling, encryption and migrations
//!
//! This module is organized by domain:
//! - `users` - User records (created on first contact, never deleted)
//! - `transactions` - Append-only transaction ledger and spend aggregation
//! - `goals` - Savings goals and the primary-goal flag
//! - `budgets` - Budget definitions, unique per (user, scope, period)
//! - `interventions` - Intervention events with atomic de-duplication
//!
//! Every multi-row write runs in a `BEGIN IMMEDIATE` transaction so a single
//! writer holds the database for the whole operation.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::{Error, Result};

mod budgets;
mod goals;
mod interventions;
mod transactions;
mod users;

pub use interventions::RecordedIntervention;
pub use transactions::{Correction, TransactionInsertResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "ANYA_DB_KEY";

/// How long a connection waits for the write lock before giving up with SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored timestamp format. Fixed width so text comparison orders correctly.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path. This allows moving/renaming/restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"anya-salt-v1-fix";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Format a timestamp for storage
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored timestamp (with or without milliseconds)
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|dt| dt.and_utc())
}

fn corrupt_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unparseable date/time {:?}", value).into(),
    )
}

/// Timestamp column. A corrupt value is an error rather than a guess.
pub(crate) fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| corrupt_column(idx, &raw))
}

pub(crate) fn get_opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_datetime(&s).ok_or_else(|| corrupt_column(idx, &s)))
        .transpose()
}

/// User-local date column (`YYYY-MM-DD`)
pub(crate) fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| corrupt_column(idx, &raw))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `ANYA_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `ANYA_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `ANYA_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Per-connection setup: key first, then the settings SQLite does not persist
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "anya_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any leftovers from an earlier run
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path, suffix));
        }

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success.
    ///
    /// The write lock is taken up front, so read-then-write sequences inside
    /// `f` cannot interleave with another writer. A lock that stays busy past
    /// the busy timeout surfaces as a `Database` error of kind `Conflict`.
    pub(crate) fn write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        migrate(&conn)?;
        info!("Database schema initialized");
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- WAL mode: readers don't block the single writer
        PRAGMA journal_mode = WAL;
        PRAGMA cache_size = 2000;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            currency TEXT NOT NULL DEFAULT 'INR',
            timezone TEXT NOT NULL DEFAULT 'Asia/Kolkata',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS goals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,
            target_amount INTEGER NOT NULL CHECK (target_amount > 0),
            deadline TEXT NOT NULL,                  -- user-local date, YYYY-MM-DD
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'achieved', 'abandoned')),
            is_primary INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            achieved_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id, status);

        -- Append-only ledger. Positive = spend or contribution, negative = offset.
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            amount INTEGER NOT NULL,                 -- minor units
            category TEXT NOT NULL,
            merchant TEXT,
            description TEXT,
            occurred_at TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT 'chat',
            goal_id INTEGER REFERENCES goals(id),    -- set on contributions
            corrects_id INTEGER REFERENCES transactions(id),
            dedupe_hash TEXT UNIQUE,                 -- webhook redelivery guard
            created_at TEXT NOT NULL,
            is_essential INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_user_time ON transactions(user_id, occurred_at);
        CREATE INDEX IF NOT EXISTS idx_transactions_goal ON transactions(goal_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_corrects ON transactions(corrects_id);

        CREATE TRIGGER IF NOT EXISTS transactions_no_update
        BEFORE UPDATE ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'transactions are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS transactions_no_delete
        BEFORE DELETE ON transactions
        BEGIN
            SELECT RAISE(ABORT, 'transactions are append-only');
        END;

        CREATE TABLE IF NOT EXISTS budgets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            scope TEXT NOT NULL,                     -- category name or '*'
            period TEXT NOT NULL CHECK (period IN ('weekly', 'monthly')),
            limit_amount INTEGER NOT NULL CHECK (limit_amount >= 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, scope, period)
        );

        CREATE TABLE IF NOT EXISTS intervention_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            merchant TEXT NOT NULL,
            url TEXT,
            amount INTEGER NOT NULL,
            category TEXT NOT NULL,
            verdict TEXT NOT NULL,
            impact_ratio REAL NOT NULL DEFAULT 0,
            message TEXT,
            outcome TEXT NOT NULL,
            dedupe_key TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_interventions_dedupe
            ON intervention_events(user_id, dedupe_key, created_at);
        CREATE INDEX IF NOT EXISTS idx_interventions_outcome
            ON intervention_events(user_id, outcome, created_at);
        "#,
    )?;
    Ok(())
}
