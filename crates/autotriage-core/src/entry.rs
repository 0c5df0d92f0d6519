// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnostics entries produced by backend queries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat, named bag of scalar fields, e.g. one timestamped log row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticsEntry {
    fields: Map<String, Value>,
}

impl DiagnosticsEntry {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field. Nested arrays and objects are flattened to their JSON text.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = match value.into() {
            nested @ (Value::Array(_) | Value::Object(_)) => Value::String(nested.to_string()),
            scalar => scalar,
        };
        self.fields.insert(name.into(), value);
    }

    /// Get a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a string field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the entry has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for DiagnosticsEntry {
    fn from(row: Map<String, Value>) -> Self {
        let mut entry = DiagnosticsEntry::new();
        for (name, value) in row {
            entry.insert(name, value);
        }
        entry
    }
}
