//! Persistent memoization for provider responses at ~/.mikrolage/cache.db.
//!
//! TTL: 30 days, measured from the moment the stored value was fetched.
//! Three tables (geocode, places, distance) share one read/upsert/validity contract.
//! Expired rows are never deleted on read; `purge_expired` is the explicit reaper.

use super::types::CacheError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const CACHE_TTL_DAYS: i64 = 30;

/// Source of "now" for validity checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The three logical cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTable {
    Geocode,
    Places,
    Distance,
}

impl CacheTable {
    pub const ALL: [CacheTable; 3] = [CacheTable::Geocode, CacheTable::Places, CacheTable::Distance];

    fn table_name(&self) -> &'static str {
        match self {
            Self::Geocode => "geocode_cache",
            Self::Places => "places_cache",
            Self::Distance => "distance_cache",
        }
    }
}

/// A typed natural key. `cache_id` must be stable across processes.
pub trait CacheKey: Serialize {
    const TABLE: CacheTable;

    fn cache_id(&self) -> String;
}

/// A stored value together with its timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table: String,
    pub entries: u64,
    pub expired: u64,
}

/// The cache store. One SQLite connection behind a mutex; every upsert is a
/// single statement, so concurrent writers for the same key are last-writer-wins.
pub struct CacheStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open the cache at the default location (~/.mikrolage/cache.db).
    pub fn open() -> Result<Self, CacheError> {
        Self::open_at(&Self::default_path())
    }

    /// Open (and create if needed) the cache at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::create_tables(&conn)?;
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// A throwaway in-memory cache.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self::from_connection(conn, None))
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mikrolage")
            .join("cache.db")
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            path,
            conn: Mutex::new(conn),
            ttl: Duration::days(CACHE_TTL_DAYS),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn create_tables(conn: &Connection) -> Result<(), CacheError> {
        for table in CacheTable::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id TEXT PRIMARY KEY,
                    key_json TEXT NOT NULL,
                    value_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{name}_created ON {name}(created_at);",
                name = table.table_name()
            ))?;
        }
        Ok(())
    }

    /// `now - created_at < ttl`.
    pub fn is_valid(&self, created_at: DateTime<Utc>) -> bool {
        self.clock.now() - created_at < self.ttl
    }

    /// Raw lookup, expired entries included. The caller decides what "valid" means.
    pub fn get<K, V>(&self, key: &K) -> Result<Option<Cached<V>>, CacheError>
    where
        K: CacheKey,
        V: DeserializeOwned,
    {
        let row = {
            let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
            conn.query_row(
                &format!(
                    "SELECT value_json, created_at, updated_at FROM {} WHERE id = ?1",
                    K::TABLE.table_name()
                ),
                params![key.cache_id()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?
        };

        let Some((value_json, created_ms, updated_ms)) = row else {
            return Ok(None);
        };
        Ok(Some(Cached {
            value: serde_json::from_str(&value_json)?,
            created_at: from_millis(created_ms),
            updated_at: from_millis(updated_ms),
        }))
    }

    /// Lookup that treats expired entries and read failures as absent.
    pub fn get_fresh<K, V>(&self, key: &K) -> Option<V>
    where
        K: CacheKey,
        V: DeserializeOwned,
    {
        match self.get::<K, V>(key) {
            Ok(Some(cached)) if self.is_valid(cached.created_at) => {
                tracing::debug!(table = ?K::TABLE, id = %key.cache_id(), "cache hit");
                Some(cached.value)
            }
            Ok(Some(_)) => {
                tracing::debug!(table = ?K::TABLE, id = %key.cache_id(), "cache entry expired");
                None
            }
            Ok(None) => {
                tracing::debug!(table = ?K::TABLE, id = %key.cache_id(), "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(table = ?K::TABLE, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Insert or replace the value stored under `key`. A fresh value restamps
    /// `created_at`, so the validity window restarts.
    pub fn upsert<K, V>(&self, key: &K, value: &V) -> Result<(), CacheError>
    where
        K: CacheKey,
        V: Serialize,
    {
        let key_json = serde_json::to_string(key)?;
        let value_json = serde_json::to_string(value)?;
        let now = self.clock.now().timestamp_millis();

        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, key_json, value_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    key_json = excluded.key_json,
                    value_json = excluded.value_json,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                K::TABLE.table_name()
            ),
            params![key.cache_id(), key_json, value_json, now],
        )?;
        Ok(())
    }

    /// Upsert whose failure is only logged. Returns whether the write landed.
    pub fn put_best_effort<K, V>(&self, key: &K, value: &V) -> bool
    where
        K: CacheKey,
        V: Serialize,
    {
        match self.upsert(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    table = ?K::TABLE,
                    id = %key.cache_id(),
                    error = %e,
                    "cache write failed, continuing with fetched value"
                );
                false
            }
        }
    }

    /// Entry and expired-entry counts per table.
    pub fn stats(&self) -> Result<Vec<TableStats>, CacheError> {
        let cutoff = self.expiry_cutoff_millis();
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let mut stats = Vec::with_capacity(CacheTable::ALL.len());
        for table in CacheTable::ALL {
            let (entries, expired): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN created_at <= ?1 THEN 1 ELSE 0 END), 0)
                     FROM {}",
                    table.table_name()
                ),
                params![cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            stats.push(TableStats {
                table: table.table_name().to_string(),
                entries: entries.max(0) as u64,
                expired: expired.max(0) as u64,
            });
        }
        Ok(stats)
    }

    /// Delete every entry whose validity window has closed. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let cutoff = self.expiry_cutoff_millis();
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let mut removed = 0;
        for table in CacheTable::ALL {
            removed += conn.execute(
                &format!("DELETE FROM {} WHERE created_at <= ?1", table.table_name()),
                params![cutoff],
            )?;
        }
        tracing::info!(removed, "purged expired cache entries");
        Ok(removed)
    }

    fn expiry_cutoff_millis(&self) -> i64 {
        (self.clock.now() - self.ttl).timestamp_millis()
    }

    /// A store whose connection rejects writes, for exercising write-failure paths.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> Result<Self, CacheError> {
        use rusqlite::OpenFlags;

        // Make sure the schema exists before reopening read-only.
        drop(Self::open_at(path)?);
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Lowercased, trimmed, whitespace-collapsed form used as the geocode key.
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Shortest decimal form that round-trips the `f64` exactly.
pub(crate) fn coord_key(value: f64) -> String {
    format!("{}", value)
}
