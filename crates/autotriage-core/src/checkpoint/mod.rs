// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Checkpoint store client.
//!
//! State is addressed by `(subject id, state key, optional sub-id)`. The store
//! itself is untyped and holds JSON; [`CheckpointStoreExt`] layers the typed
//! `get_or_create` / `save_state` helpers every reentrant operation uses.

pub mod memory;
pub mod sqlite;

pub use self::memory::InMemoryCheckpointStore;
pub use self::sqlite::SqliteCheckpointStore;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CheckpointError;

/// Address of one piece of checkpoint state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    /// Subject the state belongs to (the experiment id).
    pub subject_id: String,
    /// State key within the subject.
    pub key: String,
    /// Optional discriminator below the key.
    pub sub_id: Option<String>,
}

impl StateKey {
    /// Create a key without a sub-id.
    pub fn new(subject_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            key: key.into(),
            sub_id: None,
        }
    }

    /// Set the sub-id.
    pub fn with_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_id {
            Some(sub_id) => write!(f, "{}/{}/{}", self.subject_id, self.key, sub_id),
            None => write!(f, "{}/{}", self.subject_id, self.key),
        }
    }
}

/// External key/value state service.
///
/// A single `save` must be atomic for its key; no other transaction
/// discipline is expected from implementations.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store type identifier (e.g. "memory", "sqlite").
    fn store_type(&self) -> &'static str;

    /// Load the state stored at `key`, if any.
    async fn load(&self, key: &StateKey) -> Result<Option<Value>, CheckpointError>;

    /// Store `state` at `key`, replacing what was there.
    async fn save(&self, key: &StateKey, state: Value) -> Result<(), CheckpointError>;
}

/// Typed helpers over any [`CheckpointStore`].
#[async_trait]
pub trait CheckpointStoreExt: CheckpointStore {
    /// Load and deserialize the state at `key`.
    async fn get_state<T>(&self, key: &StateKey) -> Result<Option<T>, CheckpointError>
    where
        T: DeserializeOwned + Send,
    {
        match self.load(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| CheckpointError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Load the state at `key`, or build it with `init` if none exists.
    ///
    /// A freshly built state is not written back; the caller saves it at the
    /// end of its tick.
    async fn get_or_create_with<T, F>(&self, key: &StateKey, init: F) -> Result<T, CheckpointError>
    where
        T: DeserializeOwned + Send,
        F: FnOnce() -> T + Send,
    {
        Ok(match self.get_state(key).await? {
            Some(state) => state,
            None => init(),
        })
    }

    /// Load the state at `key`, or `T::default()` if none exists.
    async fn get_or_create<T>(&self, key: &StateKey) -> Result<T, CheckpointError>
    where
        T: DeserializeOwned + Default + Send,
    {
        self.get_or_create_with(key, T::default).await
    }

    /// Serialize and store `state` at `key`.
    async fn save_state<T>(&self, key: &StateKey, state: &T) -> Result<(), CheckpointError>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(state).map_err(|source| {
            CheckpointError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;
        self.save(key, value).await
    }
}

impl<S: CheckpointStore + ?Sized> CheckpointStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        ticks: u32,
    }

    #[test]
    fn test_state_key_display() {
        let key = StateKey::new("exp-1", "exp-1-diagnostics");
        assert_eq!(key.to_string(), "exp-1/exp-1-diagnostics");

        let key = key.with_sub_id("req-1-diagnostics-state");
        assert_eq!(
            key.to_string(),
            "exp-1/exp-1-diagnostics/req-1-diagnostics-state"
        );
    }

    #[test]
    fn test_sub_id_distinguishes_keys() {
        let base = StateKey::new("exp-1", "exp-1-diagnostics");
        assert_ne!(base, base.clone().with_sub_id("a"));
        assert_ne!(base.clone().with_sub_id("a"), base.with_sub_id("b"));
    }

    #[tokio::test]
    async fn test_get_or_create_defaults_then_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let key = StateKey::new("exp-1", "counter");

        let mut counter: Counter = store.get_or_create(&key).await.unwrap();
        assert_eq!(counter, Counter::default());
        // creating does not persist
        assert!(store.load(&key).await.unwrap().is_none());

        counter.ticks = 3;
        store.save_state(&key, &counter).await.unwrap();

        let loaded: Counter = store.get_or_create(&key).await.unwrap();
        assert_eq!(loaded.ticks, 3);
    }

    #[tokio::test]
    async fn test_get_state_rejects_mismatched_shape() {
        let store = InMemoryCheckpointStore::new();
        let key = StateKey::new("exp-1", "counter");
        store
            .save(&key, serde_json::json!({ "ticks": "many" }))
            .await
            .unwrap();

        let err = store.get_state::<Counter>(&key).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_ext_works_through_trait_object() {
        let store: std::sync::Arc<dyn CheckpointStore> =
            std::sync::Arc::new(InMemoryCheckpointStore::new());
        let key = StateKey::new("exp-2", "counter").with_sub_id("x");

        let created: Counter = store
            .get_or_create_with(&key, || Counter { ticks: 7 })
            .await
            .unwrap();
        assert_eq!(created.ticks, 7);

        store.save_state(&key, &created).await.unwrap();
        let loaded: Option<Counter> = store.get_state(&key).await.unwrap();
        assert_eq!(loaded, Some(Counter { ticks: 7 }));
    }
}
