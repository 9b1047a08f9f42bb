//! Lookup cache for authority-source responses.
//!
//! The [`Cache`] trait is the capability the connectors depend on. Two
//! implementations ship here:
//! - [`Storage`] — a libSQL database on disk, shared across runs
//! - [`MemoryCache`] — an in-process map for tests
//!
//! Writers race as last-writer-wins; [`Cache::set_if_absent`] gives the
//! idempotent variant used when populating agent labels.

mod memory;
mod migrations;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use libsql::{Connection, Database, params};
use reconcile_shared::{ReconcileError, Result};

pub use memory::MemoryCache;

/// Longest sleep between cache open attempts.
const MAX_CONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Entry counts reported by `cache stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub hashes: u64,
    pub hash_fields: u64,
}

/// Key/value and hash cache capability.
pub trait Cache {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>>;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>>;

    /// Store `value` only when `key` is unset. Returns whether it was stored.
    fn set_if_absent(&self, key: &str, value: &str) -> impl Future<Output = Result<bool>>;

    fn hash_get(&self, key: &str, field: &str) -> impl Future<Output = Result<Option<String>>>;

    /// Merge `fields` into the hash at `key`.
    fn hash_set(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<()>>;

    /// All `(field, value)` pairs of the hash at `key`, ordered by field.
    fn hash_scan(&self, key: &str) -> impl Future<Output = Result<Vec<(String, String)>>>;

    fn stats(&self) -> impl Future<Output = Result<CacheStats>>;

    fn clear(&self) -> impl Future<Output = Result<()>>;
}

/// Persistent cache handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReconcileError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open the cache, retrying with doubling backoff.
    ///
    /// `attempts == 0` retries until the database opens.
    pub async fn open_with_retry(path: &Path, attempts: u32, backoff: Duration) -> Result<Self> {
        let mut delay = backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match Self::open(path).await {
                Ok(storage) => return Ok(storage),
                Err(e) if attempts == 0 || attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        path = %path.display(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "cache unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_CONNECT_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ReconcileError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(ReconcileError::Storage(e.to_string())),
        }
    }
}

impl Cache for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv_cache WHERE key = ?1", params![key])
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| ReconcileError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ReconcileError::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO NOTHING",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;
        Ok(inserted > 0)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM hash_cache WHERE key = ?1 AND field = ?2",
                params![key, field],
            )
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| ReconcileError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ReconcileError::Storage(e.to_string())),
        }
    }

    async fn hash_set(&self, key: &str, fields: &BTreeMap<String, String>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for (field, value) in fields {
            self.conn
                .execute(
                    "INSERT INTO hash_cache (key, field, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key, field) DO UPDATE SET
                       value = excluded.value,
                       updated_at = excluded.updated_at",
                    params![key, field.as_str(), value.as_str(), now.as_str()],
                )
                .await
                .map_err(|e| ReconcileError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn hash_scan(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT field, value FROM hash_cache WHERE key = ?1 ORDER BY field",
                params![key],
            )
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| ReconcileError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| ReconcileError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            entries: self.count("SELECT COUNT(*) FROM kv_cache").await?,
            hashes: self
                .count("SELECT COUNT(DISTINCT key) FROM hash_cache")
                .await?,
            hash_fields: self.count("SELECT COUNT(*) FROM hash_cache").await?,
        })
    }

    async fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM kv_cache; DELETE FROM hash_cache;")
            .await
            .map_err(|e| ReconcileError::Storage(e.to_string()))?;
        Ok(())
    }
}
