//! Read-oriented persisted-record lookup used by validation.
//!
//! The validation engine only ever asks one question through this seam:
//! "do records matching this flat equality filter exist?" Concrete engines
//! (SQL, document, in-memory) live behind the [`Store`] trait; the core
//! never writes through it.

use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("no store configured")]
    Unavailable,
}

/// Flat field-equality filter. For uniqueness checks this is the field
/// under test plus one equality per scope field; for existence checks a
/// single primary-key equality.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: Value) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// True when every filtered field is present on `record` with an equal
    /// value.
    pub fn matches(&self, record: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;
}

/// Store used when an application wires no backend; any rule that needs a
/// lookup becomes a hard error rather than silently passing.
#[derive(Default, Clone)]
pub struct NoopStore;

#[async_trait]
impl Store for NoopStore {
    async fn find(&self, _collection: &str, _filter: &Filter) -> Result<Vec<Value>, StoreError> {
        Err(StoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_on_all_fields() {
        let filter = Filter::new()
            .eq("email", json!("test@example.com"))
            .eq("site_id", json!("1234"));
        assert!(filter.matches(&json!({
            "id": "a", "email": "test@example.com", "site_id": "1234"
        })));
        assert!(!filter.matches(&json!({
            "id": "b", "email": "test@example.com", "site_id": "4321"
        })));
        assert!(!filter.matches(&json!({ "email": "test@example.com" })));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({ "any": 1 })));
    }

    #[tokio::test]
    async fn noop_store_refuses_lookups() {
        let store = NoopStore;
        let err = store
            .find("user", &Filter::new())
            .await
            .expect_err("noop store must not answer");
        assert!(matches!(err, StoreError::Unavailable));
    }
}
