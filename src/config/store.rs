//! Layered runtime configuration store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};

use crate::config::loader::{load_config_file, ConfigError};

/// A flattened configuration snapshot keyed by dotted path
/// (e.g. `mediator.api.url`).
///
/// Snapshots are cheap to clone and never mutated after publication;
/// writers build a new snapshot and swap it in via [`ConfigStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfig {
    values: BTreeMap<String, Value>,
}

impl RuntimeConfig {
    /// Flatten a nested JSON document into dotted keys.
    ///
    /// Objects recurse; scalars and arrays are leaves. Unknown keys are
    /// preserved verbatim so layers can carry fields this service never
    /// interprets.
    pub fn from_json(root: &Value) -> Self {
        let mut values = BTreeMap::new();
        if let Value::Object(map) = root {
            flatten_into(&mut values, "", map);
        }
        Self { values }
    }

    /// Rebuild the nested JSON document for persistence.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in &self.values {
            insert_nested(&mut root, key, value.clone());
        }
        Value::Object(root)
    }

    /// Overlay `delta` on top of this layer. Delta keys win; keys present
    /// only on either side are kept.
    ///
    /// A delta key also displaces base keys above or below it in the
    /// tree (a scalar replacing a whole subtree, or the reverse), so no
    /// key is ever both a leaf and an interior node.
    pub fn merged_with(&self, delta: &RuntimeConfig) -> RuntimeConfig {
        let mut values = self.values.clone();
        for (key, value) in &delta.values {
            let descendant_prefix = format!("{}.", key);
            values.retain(|existing, _| {
                existing != key
                    && !existing.starts_with(&descendant_prefix)
                    && !key.starts_with(&format!("{}.", existing))
            });
            values.insert(key.clone(), value.clone());
        }
        RuntimeConfig { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.get_u64(key).and_then(|v| u16::try_from(v).ok())
    }

    /// Set a single key, returning the modified snapshot.
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, &dotted, inner),
            other => {
                out.insert(dotted, other.clone());
            }
        }
    }
}

fn insert_nested(root: &mut Map<String, Value>, dotted: &str, value: Value) {
    let mut parts = dotted.split('.').peekable();
    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            // A scalar shadowed by a deeper key; the deeper key wins.
            other => {
                *other = Value::Object(Map::new());
                match other {
                    Value::Object(map) => current = map,
                    _ => unreachable!(),
                }
            }
        }
    }
}

/// Shared handle on the live configuration.
///
/// Readers take consistent snapshots; the base layer is retained so each
/// reconciliation merges the orchestrator delta over the same starting
/// point, regardless of how many deltas came before it.
pub struct ConfigStore {
    live: ArcSwap<RuntimeConfig>,
    base: RuntimeConfig,
    merged_path: PathBuf,
}

impl ConfigStore {
    /// Create a store whose initial snapshot is the base layer itself.
    pub fn new(base: RuntimeConfig, merged_path: PathBuf) -> Self {
        Self {
            live: ArcSwap::from_pointee(base.clone()),
            base,
            merged_path,
        }
    }

    /// Current snapshot. Valid for the caller's lifetime even if a
    /// reconciliation swaps the live pointer underneath.
    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.live.load_full()
    }

    /// The immutable base layer loaded at startup.
    pub fn base(&self) -> &RuntimeConfig {
        &self.base
    }

    /// Replace a single key in the live snapshot (copy-on-write).
    pub fn set(&self, key: &str, value: Value) {
        let next = (*self.live.load_full()).clone().with_value(key, value);
        self.live.store(Arc::new(next));
    }

    /// Merge an orchestrator delta over the base layer, persist the
    /// result durably, and repoint the live snapshot at what was read
    /// back from disk.
    ///
    /// The snapshot is only swapped after both the temp-file write and
    /// the rename succeed; a failure leaves the previous snapshot live.
    pub async fn reconcile(&self, delta: &Value) -> Result<(), ConfigError> {
        let merged = self.base.merged_with(&RuntimeConfig::from_json(delta));
        let rendered = serde_json::to_vec_pretty(&merged.to_json())
            .map_err(|source| ConfigError::Serialize { source })?;

        let tmp_path = self.merged_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &rendered)
            .await
            .map_err(|source| ConfigError::Io { path: tmp_path.clone(), source })?;
        tokio::fs::rename(&tmp_path, &self.merged_path)
            .await
            .map_err(|source| ConfigError::Io { path: self.merged_path.clone(), source })?;

        let reloaded = load_config_file(&self.merged_path).await?;
        self.live.store(Arc::new(reloaded));

        tracing::info!(
            path = %self.merged_path.display(),
            keys = self.live.load().len(),
            "Configuration reconciled"
        );
        Ok(())
    }

    /// Path of the persisted merged layer.
    pub fn merged_path(&self) -> &PathBuf {
        &self.merged_path
    }
}
