// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response-cache store implementations.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that SQL
//! string comparison matches chronological order.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_core::{CacheEntry, CacheStore, CacheType, CourierError};
use rusqlite::{OptionalExtension, params};
use tokio::sync::RwLock;

use crate::database::{Database, map_tr_err};

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, CourierError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CourierError::Corrupted {
            store: "cache_entries".into(),
            detail: format!("{column} `{raw}`: {e}"),
        })
}

/// A `cache_entries` row before decoding.
struct CacheRow {
    key: String,
    value: String,
    cache_type: String,
    created_at: String,
    expires_at: String,
    access_count: i64,
    last_accessed: String,
}

impl CacheRow {
    const COLUMNS: &'static str =
        "key, value, cache_type, created_at, expires_at, access_count, last_accessed";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            cache_type: row.get(2)?,
            created_at: row.get(3)?,
            expires_at: row.get(4)?,
            access_count: row.get(5)?,
            last_accessed: row.get(6)?,
        })
    }

    fn decode(self) -> Result<CacheEntry, CourierError> {
        let cache_type = CacheType::from_str(&self.cache_type).map_err(|e| {
            CourierError::Corrupted {
                store: "cache_entries".into(),
                detail: format!("cache_type `{}`: {e}", self.cache_type),
            }
        })?;
        Ok(CacheEntry {
            value: serde_json::from_str(&self.value)?,
            cache_type,
            created_at: parse_ts("created_at", &self.created_at)?,
            expires_at: parse_ts("expires_at", &self.expires_at)?,
            access_count: u64::try_from(self.access_count).unwrap_or_default(),
            last_accessed: parse_ts("last_accessed", &self.last_accessed)?,
            key: self.key,
        })
    }
}

/// Cache store backed by the `cache_entries` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
    db: Arc<Database>,
}

impl SqliteCacheStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CourierError> {
        let key = key.to_string();
        let row = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<CacheRow>, rusqlite::Error> {
                conn.query_row(
                    &format!("SELECT {} FROM cache_entries WHERE key = ?1", CacheRow::COLUMNS),
                    params![key],
                    CacheRow::from_row,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        row.map(CacheRow::decode).transpose()
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CourierError> {
        let value = serde_json::to_string(&entry.value)?;
        let access_count = i64::try_from(entry.access_count).unwrap_or(i64::MAX);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT OR REPLACE INTO cache_entries
                     (key, value, cache_type, created_at, expires_at, access_count, last_accessed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        entry.key,
                        value,
                        entry.cache_type.to_string(),
                        ts(entry.created_at),
                        ts(entry.expires_at),
                        access_count,
                        ts(entry.last_accessed),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn record_access(&self, key: &str, at: DateTime<Utc>) -> Result<(), CourierError> {
        let key = key.to_string();
        let at = ts(at);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE cache_entries
                     SET access_count = access_count + 1, last_accessed = ?2
                     WHERE key = ?1",
                    params![key, at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&self, key: &str) -> Result<bool, CourierError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let n = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CourierError> {
        let key = key.to_string();
        let now = ts(now);
        self.db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let n = conn.execute(
                    "DELETE FROM cache_entries WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CourierError> {
        let prefix = prefix.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                // substr avoids LIKE wildcard escaping for `%` and `_` in keys.
                conn.execute(
                    "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )
            })
            .await
            .map_err(map_tr_err)
    }

    async fn scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, CourierError> {
        let after = after.map(str::to_string);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<CacheRow>, rusqlite::Error> {
                let sql = format!(
                    "SELECT {} FROM cache_entries
                     WHERE ?1 IS NULL OR key > ?1
                     ORDER BY key ASC LIMIT ?2",
                    CacheRow::COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![after, limit], CacheRow::from_row)?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;
        rows.into_iter().map(CacheRow::decode).collect()
    }
}

/// Process-local cache store, ordered by key.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<BTreeMap<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CourierError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CourierError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn record_access(&self, key: &str, at: DateTime<Utc>) -> Result<(), CourierError> {
        if let Some(entry) = self.entries.write().await.get_mut(key) {
            entry.access_count += 1;
            entry.last_accessed = at;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CourierError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CourierError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CourierError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, CourierError> {
        let entries = self.entries.read().await;
        let lower = match after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };
        Ok(entries
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(key: &str, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: json!({ "summary": key }),
            cache_type: CacheType::Summary,
            created_at: now,
            expires_at: now + Duration::hours(1),
            access_count: 0,
            last_accessed: now,
        }
    }

    async fn exercise(store: &dyn CacheStore) {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(store.get("conversation:c1:summary:aa").await.unwrap().is_none());

        for key in [
            "conversation:c1:summary:aa",
            "conversation:c1:decisions:bb",
            "conversation:c2:summary:cc",
            "conversation:c10:summary:dd",
        ] {
            store.put(entry(key, now)).await.unwrap();
        }

        let got = store.get("conversation:c1:summary:aa").await.unwrap().unwrap();
        assert_eq!(got, entry("conversation:c1:summary:aa", now));

        let later = now + Duration::minutes(5);
        store
            .record_access("conversation:c1:summary:aa", later)
            .await
            .unwrap();
        store
            .record_access("conversation:c1:summary:aa", later)
            .await
            .unwrap();
        let got = store.get("conversation:c1:summary:aa").await.unwrap().unwrap();
        assert_eq!(got.access_count, 2);
        assert_eq!(got.last_accessed, later);

        // Access on a missing key is silently ignored.
        store.record_access("nope", later).await.unwrap();

        let first = store.scan(None, 2).await.unwrap();
        let keys: Vec<_> = first.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            ["conversation:c1:decisions:bb", "conversation:c1:summary:aa"]
        );
        let rest = store.scan(Some(keys[1]), 10).await.unwrap();
        assert_eq!(rest.len(), 2);

        // Prefix `conversation:c1:` must not match `conversation:c10:`.
        let removed = store.delete_prefix("conversation:c1:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("conversation:c10:summary:dd").await.unwrap().is_some());

        // Not expired yet, then expired.
        let expiry = now + Duration::hours(1);
        assert!(
            !store
                .delete_if_expired("conversation:c2:summary:cc", expiry - Duration::seconds(1))
                .await
                .unwrap()
        );
        store
            .put(entry("conversation:c2:summary:ee", now))
            .await
            .unwrap();
        assert!(
            store
                .delete_if_expired("conversation:c2:summary:ee", expiry)
                .await
                .unwrap()
        );
        assert!(!store.delete_if_expired("nope", expiry).await.unwrap());

        assert!(store.delete("conversation:c2:summary:cc").await.unwrap());
        assert!(!store.delete("conversation:c2:summary:cc").await.unwrap());
        assert_eq!(store.scan(None, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_store_contract() {
        exercise(&MemoryCacheStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_contract() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        exercise(&SqliteCacheStore::new(db)).await;
    }

    #[tokio::test]
    async fn sqlite_prefix_with_like_wildcards_is_literal() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let store = SqliteCacheStore::new(db);
        let now = Utc::now();
        store.put(entry("conversation:a_b:x", now)).await.unwrap();
        store.put(entry("conversation:axb:x", now)).await.unwrap();

        assert_eq!(store.delete_prefix("conversation:a_b:").await.unwrap(), 1);
        assert!(store.get("conversation:axb:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sqlite_rejects_corrupted_rows() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO cache_entries
                     (key, value, cache_type, created_at, expires_at, access_count, last_accessed)
                     VALUES ('k', '{}', 'horoscope', 'x', 'x', 0, 'x')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        let store = SqliteCacheStore::new(db);
        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, CourierError::Corrupted { .. }));
    }
}
