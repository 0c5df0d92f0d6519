// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed checkpoint store.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use super::{CheckpointStore, StateKey};
use crate::error::CheckpointError;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Checkpoint store persisting JSON state in a SQLite table.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Create a store from an existing pool. Call [`migrate`](Self::migrate)
    /// unless the schema is managed elsewhere.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a file path.
    ///
    /// Creates parent directories and the database file if missing, then runs
    /// all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Storage {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CheckpointError::Storage {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create a private in-memory database, migrated and ready to use.
    pub async fn in_memory() -> Result<Self, CheckpointError> {
        // One connection: every connection to sqlite::memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<(), CheckpointError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Number of states stored for `subject_id`.
    pub async fn count_for_subject(&self, subject_id: &str) -> Result<i64, CheckpointError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM checkpoint_states WHERE subject_id = ?",
        )
        .bind(subject_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

fn sub_id_column(key: &StateKey) -> &str {
    key.sub_id.as_deref().unwrap_or("")
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    fn store_type(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, key: &StateKey) -> Result<Option<Value>, CheckpointError> {
        let raw = sqlx::query_scalar::<_, String>(
            r#"
            SELECT state
            FROM checkpoint_states
            WHERE subject_id = ? AND state_key = ? AND sub_id = ?
            "#,
        )
        .bind(&key.subject_id)
        .bind(&key.key)
        .bind(sub_id_column(key))
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| CheckpointError::Serialization {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn save(&self, key: &StateKey, state: Value) -> Result<(), CheckpointError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO checkpoint_states (subject_id, state_key, sub_id, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (subject_id, state_key, sub_id)
            DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.subject_id)
        .bind(&key.key)
        .bind(sub_id_column(key))
        .bind(state.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(key = %key, "Checkpoint state saved");
        Ok(())
    }
}
