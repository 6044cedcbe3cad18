// mongodb_stream/src/store/mod.rs
// Persistence boundary shared by the sink and the source.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tracing::info;

use crate::error::Result;
use crate::query::QuerySpec;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Connection settings for the document database.
#[derive(Debug, Clone,)]
pub struct MongoConfig {
    pub uri:      String,
    pub database: String,
    /// Keep documents in memory instead of connecting.
    pub dry_run:  bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri:      crate::DEFAULT_MONGODB_URI.to_string(),
            database: crate::DEFAULT_DATABASE_NAME.to_string(),
            dry_run:  false,
        }
    }
}

/// A schemaless document store addressed by collection name.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts one document, returning the `_id` it was stored under.
    /// The store assigns an identifier when the document carries none.
    async fn insert_one(&self, collection: &str, document: Document,) -> Result<Bson,>;

    /// Runs a find and returns every matching document in result order.
    async fn find(&self, collection: &str, query: &QuerySpec,) -> Result<Vec<Document,>,>;
}

/// Opens the store the applications run against: MongoDB, or memory on a dry run.
pub async fn open(config: &MongoConfig,) -> Result<Arc<dyn DocumentStore,>,> {
    if config.dry_run {
        info!("Dry run: documents are kept in memory and discarded on exit");
        return Ok(Arc::new(MemoryStore::new(),),);
    }
    Ok(Arc::new(MongoStore::connect(config,).await?,),)
}
