//! src/persistent.rs  Andrew Belles  Sept 12th, 2025
//!
//! On-disk response cache. Values are json, zstd compressed, kept in a
//! sqlite table keyed by "{function}:{argument}". Once the stored bytes
//! pass the size limit the oldest-stored entries are culled first.
//!
//! The running byte total lives in the settings table and is kept in step
//! by triggers, so a store never has to sum the whole cache.
//!

use std::{fs, sync::Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::errors::CrawlerError;

pub const CACHE_FILE: &str = "cache.db";

pub struct ResponseCache {
    conn: Mutex<Connection>,
    size_limit: u64,
    cull_limit: u32,
    compress_level: i32
}

impl ResponseCache {
    pub fn open(cfg: &CacheConfig) -> Result<Self, CrawlerError> {
        fs::create_dir_all(&cfg.directory)?;
        let path = cfg.directory.join(CACHE_FILE);
        let conn = Connection::open(&path)
            .map_err(|e| CrawlerError::Cache(
                format!("open sqlite at {}: {e}", path.display())
            ))?;

        // auto_vacuum has to be set before the table exists
        conn.pragma_update(None, "auto_vacuum", 1)?;       // FULL
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", 1)?;       // NORMAL
        conn.pragma_update(None, "cache_size", 8192)?;
        conn.query_row("PRAGMA mmap_size = 67108864;", [], |_| Ok(()))
            .optional()?;
        conn.busy_timeout(std::time::Duration::from_secs(60))?;

        let this = Self {
            conn: Mutex::new(conn),
            size_limit: cfg.size_limit,
            cull_limit: cfg.cull_limit.max(1),
            compress_level: cfg.compress_level
        };
        this.ensure_schema()?;
        Ok( this )
    }

    fn ensure_schema(&self) -> Result<(), CrawlerError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
              key         TEXT PRIMARY KEY,
              store_time  INTEGER NOT NULL,
              size        INTEGER NOT NULL,
              value       BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_store_time ON cache(store_time);

            CREATE TABLE IF NOT EXISTS settings (
              key    TEXT PRIMARY KEY,
              value  INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO settings (key, value)
              SELECT 'volume', COALESCE(SUM(size), 0) FROM cache;

            CREATE TRIGGER IF NOT EXISTS cache_volume_insert AFTER INSERT ON cache
            BEGIN
              UPDATE settings SET value = value + NEW.size WHERE key = 'volume';
            END;
            CREATE TRIGGER IF NOT EXISTS cache_volume_update AFTER UPDATE OF size ON cache
            BEGIN
              UPDATE settings SET value = value + NEW.size - OLD.size WHERE key = 'volume';
            END;
            CREATE TRIGGER IF NOT EXISTS cache_volume_delete AFTER DELETE ON cache
            BEGIN
              UPDATE settings SET value = value - OLD.size WHERE key = 'volume';
            END;
            "#
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CrawlerError> {
        self.conn.lock()
            .map_err(|_| CrawlerError::Cache("cache connection poisoned".to_string()))
    }

    pub fn key(function: &str, argument: &str) -> String {
        format!("{function}:{argument}")
    }

    /// Decoded value under key, None on a miss or an undecodable entry
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CrawlerError> {
        let blob: Option<Vec<u8>> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT value FROM cache WHERE key = ?1;",
                params![key],
                |row| row.get(0)
            ).optional()?
        };

        let Some(blob) = blob else { return Ok(None) };
        let decoded = zstd::decode_all(blob.as_slice())
            .map_err(|e| CrawlerError::Cache(format!("zstd decode: {e}")))
            .and_then(|raw| serde_json::from_slice::<T>(&raw).map_err(CrawlerError::from));

        match decoded {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(key, error = %e, "cache.decode");
                Ok(None)
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CrawlerError> {
        let raw = serde_json::to_vec(value)?;
        let blob = zstd::encode_all(raw.as_slice(), self.compress_level)
            .map_err(|e| CrawlerError::Cache(format!("zstd encode: {e}")))?;
        let now = chrono::Utc::now().timestamp_micros();

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        // upsert rather than REPLACE: REPLACE skips the delete trigger
        tx.execute(
            r#"
            INSERT INTO cache (key, store_time, size, value)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
              store_time = excluded.store_time,
              size       = excluded.size,
              value      = excluded.value;
            "#,
            params![key, now, blob.len() as i64, blob]
        )?;
        Self::cull(&tx, self.size_limit, self.cull_limit)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop the oldest-stored entries until the volume fits the limit
    fn cull(conn: &Connection, size_limit: u64, cull_limit: u32) -> Result<(), CrawlerError> {
        loop {
            let volume = Self::volume_of(conn)?;
            if volume <= size_limit {
                return Ok(());
            }
            let removed = conn.execute(
                r#"
                DELETE FROM cache WHERE key IN (
                    SELECT key FROM cache ORDER BY store_time, rowid LIMIT ?1
                );
                "#,
                params![cull_limit]
            )?;
            debug!(volume, removed, "cache.cull");
            if removed == 0 {
                return Ok(());
            }
        }
    }

    fn volume_of(conn: &Connection) -> Result<u64, CrawlerError> {
        let total: i64 = conn.query_row(
            "SELECT value FROM settings WHERE key = 'volume';",
            [],
            |row| row.get(0)
        )?;
        Ok(total.max(0) as u64)
    }

    /// Total stored (compressed) bytes
    pub fn volume(&self) -> Result<u64, CrawlerError> {
        let conn = self.lock()?;
        Self::volume_of(&conn)
    }

    pub fn len(&self) -> Result<usize, CrawlerError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM cache;", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    ///
    /// Return the cached result for (function, argument), or run compute
    /// and store what it returns. Errors from compute are never stored.
    ///
    pub fn memoize<T, F>(&self, function: &str, argument: &str, compute: F) -> Result<T, CrawlerError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, CrawlerError>
    {
        let key = Self::key(function, argument);
        if let Some(hit) = self.get::<T>(&key)? {
            debug!(key, "cache.hit");
            return Ok(hit);
        }
        let value = compute()?;
        self.set(&key, &value)?;
        debug!(key, "cache.store");
        Ok(value)
    }
}
