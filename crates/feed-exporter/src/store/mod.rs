//! Document store access.
//!
//! The pipeline fetches the full document for every change notification
//! through [`DocumentStore`], keyed by collection and document id.

pub mod postgres;

pub use postgres::PgDocumentStore;

use crate::errors::StoreError;
use crate::models::{Document, DocumentId};

/// Point lookup of documents by id (enables mocking).
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. `Ok(None)` when no document has this id.
    async fn fetch_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError>;
}

/// In-memory document store for testing.
pub mod mock {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{PoisonError, RwLock};

    /// Document store backed by a map, with call counting and failure injection.
    #[derive(Default)]
    pub struct InMemoryDocumentStore {
        documents: RwLock<HashMap<(String, DocumentId), Document>>,
        fetch_count: AtomicUsize,
        failing: AtomicBool,
    }

    impl InMemoryDocumentStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Insert or replace a document. Non-object values are ignored.
        pub fn insert(&self, collection: &str, id: impl Into<String>, document: Value) {
            if let Value::Object(document) = document {
                self.documents
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert((collection.to_string(), DocumentId::new(id)), document);
            }
        }

        /// Remove a document.
        pub fn remove(&self, collection: &str, id: impl Into<String>) {
            self.documents
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&(collection.to_string(), DocumentId::new(id)));
        }

        /// Make every subsequent fetch fail (or succeed again).
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Number of fetches made.
        pub fn fetch_count(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DocumentStore for InMemoryDocumentStore {
        async fn fetch_by_id(
            &self,
            collection: &str,
            id: &DocumentId,
        ) -> Result<Option<Document>, StoreError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);

            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Database("connection refused".to_string()));
            }

            Ok(self
                .documents
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(collection.to_string(), id.clone()))
                .cloned())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::InMemoryDocumentStore;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_store_fetch() {
        let store = InMemoryDocumentStore::new();
        store.insert("orders", "5", json!({"id": 5, "value": 42}));

        let found = store
            .fetch_by_id("orders", &DocumentId::new("5"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().get("value"), Some(&json!(42)));

        let other_collection = store
            .fetch_by_id("users", &DocumentId::new("5"))
            .await
            .unwrap();
        assert!(other_collection.is_none());
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_store_failure_injection() {
        let store = InMemoryDocumentStore::new();
        store.set_failing(true);

        let result = store.fetch_by_id("orders", &DocumentId::new("1")).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
