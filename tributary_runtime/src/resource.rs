// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource loaders backing `source` fields.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

/// Loads the value of a resource for one key.
///
/// Caching, retries and deduplication are the loader's business. Closures
/// `Fn(Value) -> impl Future<Output = Result<Value, String>>` implement
/// this trait.
pub trait ResourceLoader: Send + Sync {
    /// Starts loading `key`.
    fn load(&self, key: Value) -> BoxFuture<'static, Result<Value, String>>;
}

impl<F, Fut> ResourceLoader for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    fn load(&self, key: Value) -> BoxFuture<'static, Result<Value, String>> {
        self(key).boxed()
    }
}

/// Loaders by resource id.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    loaders: HashMap<String, Arc<dyn ResourceLoader>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.loaders.keys().collect();
        ids.sort();
        f.debug_struct("ResourceRegistry")
            .field("resources", &ids)
            .finish()
    }
}

impl ResourceRegistry {
    /// No loaders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` under `id`, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, loader: impl ResourceLoader + 'static) {
        self.loaders.insert(id.into(), Arc::new(loader));
    }

    /// The loader for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ResourceLoader>> {
        self.loaders.get(id).cloned()
    }
}

/// Snapshot of a successful load.
#[must_use]
pub fn success_snapshot(key_hash: &str, data: Value) -> Value {
    json!({ "status": "success", "keyHash": key_hash, "data": data, "error": null })
}

/// Snapshot of a failed load. `data` is whatever the field held before.
#[must_use]
pub fn error_snapshot(key_hash: &str, data: Value, message: &str) -> Value {
    json!({ "status": "error", "keyHash": key_hash, "data": data, "error": message })
}

/// `keyHash` stored in a snapshot, if it has one.
pub(crate) fn snapshot_key_hash(snapshot: &Value) -> Option<&str> {
    snapshot.get("keyHash").and_then(Value::as_str)
}
