//! Postgres-backed document store.
//!
//! Each collection is a table with an `id` key column and a JSONB `doc`
//! column holding the document. Database and collection names are schema
//! and table identifiers, validated by the config layer and quoted here.

use crate::errors::StoreError;
use crate::models::{Document, DocumentId};
use crate::observability::metrics::record_store_fetch;
use crate::store::DocumentStore;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{error, instrument};

/// Document store reading JSONB documents from Postgres.
pub struct PgDocumentStore {
    pool: PgPool,
    database: String,
}

impl PgDocumentStore {
    /// Create a store reading from the `database` schema.
    pub fn new(pool: PgPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }
}

/// Point lookup by id. The id is compared as text so integer and text keys
/// both work.
fn fetch_by_id_query(database: &str, collection: &str) -> String {
    format!(
        r#"SELECT doc FROM "{}"."{}" WHERE id::text = $1"#,
        database.replace('"', "\"\""),
        collection.replace('"', "\"\"")
    )
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip_all, name = "feed_exporter.store.fetch_by_id", fields(collection = %collection, id = %id))]
    async fn fetch_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let start = Instant::now();
        let query = fetch_by_id_query(&self.database, collection);

        let row = sqlx::query_scalar::<_, Value>(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                record_store_fetch("error", start.elapsed());
                error!(
                    target: "feed_exporter.store",
                    error = %e,
                    collection = %collection,
                    "Failed to fetch document"
                );
                StoreError::from(e)
            })?;

        match row {
            None => {
                record_store_fetch("not_found", start.elapsed());
                Ok(None)
            }
            Some(Value::Object(document)) => {
                record_store_fetch("found", start.elapsed());
                Ok(Some(document))
            }
            Some(_) => {
                record_store_fetch("error", start.elapsed());
                Err(StoreError::NotAnObject(id.to_string()))
            }
        }
    }
}
