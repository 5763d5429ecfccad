//! In-memory [`Store`] implementation for tests and demos.
//!
//! `create`/`clear` are fixture conveniences; the core itself only depends
//! on the read-oriented `find` contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use riptide_store::{Filter, Store, StoreError};

#[derive(Default)]
pub struct MemStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, assigning a uuid `id` when the caller supplied
    /// none. Returns the stored record.
    pub async fn create(&self, collection: &str, record: Value) -> Value {
        let mut obj = match record {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        if !obj.contains_key("id") {
            obj.insert("id".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        }
        let stored = Value::Object(obj);
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(stored.clone());
        stored
    }

    pub async fn clear(&self, collection: &str) {
        self.collections.write().await.remove(collection);
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let records = collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}
