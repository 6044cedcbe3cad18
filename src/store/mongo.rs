// mongodb_stream/src/store/mongo.rs
// MongoDB backed document store.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Database};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::query::QuerySpec;
use crate::retry::{execute_with_retry, wrap_error};
use crate::store::{DocumentStore, MongoConfig};

#[derive(Clone,)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Parses the URI, builds the client and waits until the server answers a ping.
    pub async fn connect(config: &MongoConfig,) -> Result<Self,> {
        let client_options = ClientOptions::parse(&config.uri,).await.map_err(|e| {
            StreamError::ConfigurationError(format!("Failed to parse MongoDB URI: {}", e),)
        },)?;
        let client = Client::with_options(client_options,).map_err(|e| {
            StreamError::ConnectionError(format!("Failed to create MongoDB client: {}", e),)
        },)?;

        execute_with_retry(|| async {
            client
                .database("admin",)
                .run_command(doc! {"ping": 1}, None,)
                .await
                .map(|_| (),)
                .map_err(|e| {
                    wrap_error(StreamError::ConnectionError(format!(
                        "Failed to connect to MongoDB: {}",
                        e
                    ),),)
                },)
        },)
        .await?;

        info!("Connected to MongoDB database '{}'.", config.database);
        let database = client.database(&config.database,);
        Ok(MongoStore { database, },)
    }

    pub fn database(&self,) -> &Database {
        &self.database
    }
}

fn find_options(query: &QuerySpec,) -> FindOptions {
    let mut options = FindOptions::default();
    options.sort = query.sort.clone();
    options.limit = query.limit;
    options.skip = query.skip;
    options.projection = query.projection.clone();
    options
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(&self, collection: &str, document: Document,) -> Result<Bson,> {
        let result = self
            .database
            .collection::<Document>(collection,)
            .insert_one(document, None,)
            .await
            .map_err(|e| {
                StreamError::DatabaseError(format!(
                    "Failed to insert document into '{}': {}",
                    collection, e
                ),)
            },)?;

        debug!("Inserted document {} into '{}'", result.inserted_id, collection);
        Ok(result.inserted_id,)
    }

    async fn find(&self, collection: &str, query: &QuerySpec,) -> Result<Vec<Document,>,> {
        let cursor = self
            .database
            .collection::<Document>(collection,)
            .find(query.filter.clone(), find_options(query,),)
            .await
            .map_err(|e| {
                StreamError::DatabaseError(format!("Failed to query '{}': {}", collection, e),)
            },)?;

        cursor.try_collect().await.map_err(|e| {
            StreamError::DatabaseError(format!(
                "Failed to read results from '{}': {}",
                collection, e
            ),)
        },)
    }
}
