// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{CheckpointStore, StateKey};
use crate::error::CheckpointError;

/// Checkpoint store backed by a process-local map.
///
/// Suitable for tests and for hosts that re-invoke triage within one process.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<StateKey, Value>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Whether nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<StateKey> {
        let mut keys: Vec<StateKey> = self.states.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, key: &StateKey) -> Result<Option<Value>, CheckpointError> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn save(&self, key: &StateKey, state: Value) -> Result<(), CheckpointError> {
        self.states.write().await.insert(key.clone(), state);
        Ok(())
    }
}
