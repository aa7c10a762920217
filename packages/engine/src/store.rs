//! Konform Engine: Persistence
//!
//! Two authoritative tables: `scans` and `generated_fixes`. Everything
//! else belongs to collaborators. The in-memory store backs tests and
//! single-node setups; the SQLite store sits behind the `sql` feature.

use async_trait::async_trait;
use konform_core::{EngineError, GeneratedFix, ScanResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Typed persistence for scans and fixes.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn put_scan(&self, scan: &ScanResult) -> Result<(), EngineError>;
    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<ScanResult>, EngineError>;
    /// Persist a fix under its idempotency key (unique per request digest).
    async fn put_fix(&self, fix: &GeneratedFix, idempotency_key: &str) -> Result<(), EngineError>;
    async fn get_fix(&self, fix_id: Uuid) -> Result<Option<GeneratedFix>, EngineError>;
    /// All fixes stored under one idempotency key, insertion order.
    async fn fixes_by_idempotency(
        &self,
        idempotency_key: &str,
    ) -> Result<Vec<GeneratedFix>, EngineError>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    scans: RwLock<HashMap<Uuid, ScanResult>>,
    fixes: RwLock<HashMap<Uuid, GeneratedFix>>,
    by_idempotency: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn put_scan(&self, scan: &ScanResult) -> Result<(), EngineError> {
        self.scans.write().insert(scan.scan_id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<ScanResult>, EngineError> {
        Ok(self.scans.read().get(&scan_id).cloned())
    }

    async fn put_fix(&self, fix: &GeneratedFix, idempotency_key: &str) -> Result<(), EngineError> {
        self.fixes.write().insert(fix.fix_id, fix.clone());
        self.by_idempotency
            .write()
            .entry(idempotency_key.to_string())
            .or_default()
            .push(fix.fix_id);
        Ok(())
    }

    async fn get_fix(&self, fix_id: Uuid) -> Result<Option<GeneratedFix>, EngineError> {
        Ok(self.fixes.read().get(&fix_id).cloned())
    }

    async fn fixes_by_idempotency(
        &self,
        idempotency_key: &str,
    ) -> Result<Vec<GeneratedFix>, EngineError> {
        let ids = self
            .by_idempotency
            .read()
            .get(idempotency_key)
            .cloned()
            .unwrap_or_default();
        let fixes = self.fixes.read();
        Ok(ids.iter().filter_map(|id| fixes.get(id).cloned()).collect())
    }
}

#[cfg(feature = "sql")]
pub use sql::SqlStore;

#[cfg(feature = "sql")]
mod sql {
    use super::*;
    use sqlx::sqlite::SqlitePool;
    use sqlx::Row;

    /// SQLite-backed store.
    pub struct SqlStore {
        pool: SqlitePool,
    }

    impl SqlStore {
        pub async fn connect(url: &str) -> Result<Self, EngineError> {
            let pool = SqlitePool::connect(url)
                .await
                .map_err(|e| EngineError::Dependency(e.to_string()))?;
            let store = Self { pool };
            store.migrate().await?;
            Ok(store)
        }

        async fn migrate(&self) -> Result<(), EngineError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS scans (
                     scan_id TEXT PRIMARY KEY,
                     user_id TEXT NOT NULL,
                     url TEXT NOT NULL,
                     payload TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 )",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS generated_fixes (
                     fix_id TEXT PRIMARY KEY,
                     scan_id TEXT NOT NULL,
                     user_id TEXT NOT NULL,
                     issue_id TEXT NOT NULL,
                     fix_type TEXT NOT NULL,
                     payload TEXT NOT NULL,
                     idempotency_key TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 )",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_fixes_idempotency
                 ON generated_fixes (idempotency_key)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            Ok(())
        }
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
        serde_json::to_string(value).map_err(|e| EngineError::Internal(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, EngineError> {
        serde_json::from_str(payload).map_err(|e| EngineError::Internal(e.to_string()))
    }

    #[async_trait]
    impl ScanStore for SqlStore {
        async fn put_scan(&self, scan: &ScanResult) -> Result<(), EngineError> {
            sqlx::query(
                "INSERT OR REPLACE INTO scans (scan_id, user_id, url, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(scan.scan_id.to_string())
            .bind(scan.user_id.to_string())
            .bind(&scan.url)
            .bind(encode(scan)?)
            .bind(scan.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            Ok(())
        }

        async fn get_scan(&self, scan_id: Uuid) -> Result<Option<ScanResult>, EngineError> {
            let row = sqlx::query("SELECT payload FROM scans WHERE scan_id = ?1")
                .bind(scan_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| EngineError::Dependency(e.to_string()))?;
            row.map(|r| {
                let payload: String = r
                    .try_get("payload")
                    .map_err(|e| EngineError::Dependency(e.to_string()))?;
                decode(&payload)
            })
            .transpose()
        }

        async fn put_fix(
            &self,
            fix: &GeneratedFix,
            idempotency_key: &str,
        ) -> Result<(), EngineError> {
            sqlx::query(
                "INSERT INTO generated_fixes
                 (fix_id, scan_id, user_id, issue_id, fix_type, payload, idempotency_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(fix.fix_id.to_string())
            .bind(fix.scan_id.to_string())
            .bind(fix.user_id.to_string())
            .bind(&fix.issue_id)
            .bind(serde_json::to_value(fix.fix_type).map_or_else(
                |_| "guide".to_string(),
                |v| v.as_str().unwrap_or("guide").to_string(),
            ))
            .bind(encode(fix)?)
            .bind(idempotency_key)
            .bind(fix.generated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            Ok(())
        }

        async fn get_fix(&self, fix_id: Uuid) -> Result<Option<GeneratedFix>, EngineError> {
            let row = sqlx::query("SELECT payload FROM generated_fixes WHERE fix_id = ?1")
                .bind(fix_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| EngineError::Dependency(e.to_string()))?;
            row.map(|r| {
                let payload: String = r
                    .try_get("payload")
                    .map_err(|e| EngineError::Dependency(e.to_string()))?;
                decode(&payload)
            })
            .transpose()
        }

        async fn fixes_by_idempotency(
            &self,
            idempotency_key: &str,
        ) -> Result<Vec<GeneratedFix>, EngineError> {
            let rows = sqlx::query(
                "SELECT payload FROM generated_fixes
                 WHERE idempotency_key = ?1 ORDER BY created_at",
            )
            .bind(idempotency_key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::Dependency(e.to_string()))?;
            rows.iter()
                .map(|r| {
                    let payload: String = r
                        .try_get("payload")
                        .map_err(|e| EngineError::Dependency(e.to_string()))?;
                    decode(&payload)
                })
                .collect()
        }
    }
}
