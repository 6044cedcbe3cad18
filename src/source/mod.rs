// mongodb_stream/src/source/mod.rs
// Source poll path: run the configured query and turn the result into outbound messages.

use std::sync::Arc;

use mongodb::bson::{Bson, Document};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::expression::Expression;
use crate::message::{
    APPLICATION_JSON, CONTENT_TYPE_HEADER, CORRELATION_ID_HEADER, Message, SEQUENCE_NUMBER_HEADER,
    SEQUENCE_SIZE_HEADER,
};
use crate::query::{MATCH_ALL_QUERY, QuerySpec};
use crate::store::DocumentStore;

/// Source options as bound from the command line.
#[derive(Debug, Clone,)]
pub struct SourceConfig {
    pub collection:       String,
    pub query:            String,
    pub query_expression: Option<String,>,
    pub split:            bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            collection:       String::new(),
            query:            MATCH_ALL_QUERY.to_string(),
            query_expression: None,
            split:            true,
        }
    }
}

/// The query run on every poll.
#[derive(Debug, Clone, PartialEq,)]
pub enum QuerySource {
    Literal(QuerySpec,),
    Expression(Expression,),
}

impl QuerySource {
    pub fn resolve(&self,) -> Result<QuerySpec,> {
        match self {
            QuerySource::Literal(spec,) => Ok(spec.clone(),),
            QuerySource::Expression(expr,) => expr.evaluate_query(),
        }
    }
}

impl SourceConfig {
    /// Compiles the query once; the expression wins over the literal query.
    pub fn query_source(&self,) -> Result<QuerySource,> {
        if let Some(expr,) = self.query_expression.as_deref().filter(|s| !s.trim().is_empty(),) {
            return Ok(QuerySource::Expression(Expression::parse(expr,)?,),);
        }
        let spec = QuerySpec::parse(&self.query,).map_err(|e| {
            StreamError::ConfigurationError(format!("Invalid query '{}': {}", self.query, e),)
        },)?;
        Ok(QuerySource::Literal(spec,),)
    }
}

/// Renders a stored document as relaxed extended JSON text.
pub fn document_to_json(doc: &Document,) -> String {
    Bson::Document(doc.clone(),).into_relaxed_extjson().to_string()
}

pub struct MongoSource {
    store:      Arc<dyn DocumentStore,>,
    collection: String,
    query:      QuerySource,
    split:      bool,
}

impl MongoSource {
    pub fn new(config: &SourceConfig, store: Arc<dyn DocumentStore,>,) -> Result<Self,> {
        let collection = config.collection.trim();
        if collection.is_empty() {
            return Err(StreamError::ConfigurationError(
                "The source requires a collection".to_string(),
            ),);
        }
        let query = config.query_source()?;
        info!(
            "Source polling collection '{}' (split: {})",
            collection, config.split
        );
        Ok(Self {
            store,
            collection: collection.to_string(),
            query,
            split: config.split,
        },)
    }

    pub fn collection(&self,) -> &str {
        &self.collection
    }

    async fn fetch(&self,) -> Result<Vec<Document,>,> {
        let spec = self.query.resolve()?;
        self.store.find(&self.collection, &spec,).await
    }

    /// One poll cycle: the messages to emit, in result order. Empty when nothing matched.
    pub async fn poll(&self,) -> Result<Vec<Message,>,> {
        let docs = self.fetch().await?;
        if docs.is_empty() {
            debug!("Query on '{}' matched no documents", self.collection);
            return Ok(Vec::new(),);
        }
        debug!("Query on '{}' matched {} documents", self.collection, docs.len());

        if !self.split {
            let items: Vec<Value,> = docs
                .into_iter()
                .map(|d| Bson::Document(d,).into_relaxed_extjson(),)
                .collect();
            let payload = Value::Array(items,).to_string();
            return Ok(vec![Message::new(payload,).with_header(CONTENT_TYPE_HEADER, APPLICATION_JSON,)],);
        }

        let results: Vec<String,> = docs.iter().map(document_to_json,).collect();
        let correlation_id = Uuid::new_v4().to_string();
        let size = results.len();
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(idx, json,)| {
                Message::new(json,)
                    .with_header(CONTENT_TYPE_HEADER, APPLICATION_JSON,)
                    .with_header(CORRELATION_ID_HEADER, correlation_id.clone(),)
                    .with_header(SEQUENCE_NUMBER_HEADER, idx + 1,)
                    .with_header(SEQUENCE_SIZE_HEADER, size,)
            },)
            .collect(),)
    }
}
