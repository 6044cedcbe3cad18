// mongodb_stream/src/sink/mod.rs
// Sink write path: resolve the target collection and persist the payload as a document.

use std::sync::Arc;

use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{self, Binary, Bson, Document};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::expression::Expression;
use crate::message::{Message, Payload};
use crate::query::parse_document;
use crate::store::DocumentStore;

/// Field holding the type discriminator written alongside converted payloads.
pub const TYPE_HINT_KEY: &str = "_class";
pub const MAP_TYPE_HINT: &str = "map";
pub const BYTES_TYPE_HINT: &str = "bytes";

/// Sink options as bound from the command line.
#[derive(Debug, Clone, Default,)]
pub struct SinkConfig {
    pub collection:            Option<String,>,
    pub collection_expression: Option<String,>,
}

/// Where a message is written.
#[derive(Debug, Clone, PartialEq,)]
pub enum CollectionName {
    Literal(String,),
    Expression(Expression,),
}

impl CollectionName {
    pub fn resolve(&self, message: &Message,) -> Result<String,> {
        match self {
            CollectionName::Literal(name,) => Ok(name.clone(),),
            CollectionName::Expression(expr,) => expr.evaluate_string(message,),
        }
    }
}

impl SinkConfig {
    /// Validates the options. The expression wins when both are set.
    pub fn collection_name(&self,) -> Result<CollectionName,> {
        if let Some(expr,) = self.collection_expression.as_deref().filter(|s| !s.trim().is_empty(),) {
            return Ok(CollectionName::Expression(Expression::parse(expr,)?,),);
        }
        match self.collection.as_deref().map(str::trim,) {
            Some(name,) if !name.is_empty() => Ok(CollectionName::Literal(name.to_string(),),),
            _ => Err(StreamError::ConfigurationError(
                "Either collection or collection-expression must be set".to_string(),
            ),),
        }
    }
}

/// Converts a payload into the document that gets stored.
///
/// Map payloads are tagged with a type hint. Text must hold a JSON object and is
/// stored as written. Bytes that no interceptor decoded are wrapped as binary.
pub fn to_document(payload: &Payload,) -> Result<Document,> {
    match payload {
        Payload::Map(map,) => {
            let mut doc = bson::to_document(map,).map_err(|e| {
                StreamError::ConversionError(format!("Failed to convert map payload: {}", e),)
            },)?;
            doc.insert(TYPE_HINT_KEY, MAP_TYPE_HINT,);
            Ok(doc,)
        },
        Payload::Text(text,) => parse_document(text,),
        Payload::Bytes(bytes,) => {
            let mut doc = Document::new();
            doc.insert(
                "payload",
                Binary {
                    subtype: BinarySubtype::Generic,
                    bytes:   bytes.to_vec(),
                },
            );
            doc.insert(TYPE_HINT_KEY, BYTES_TYPE_HINT,);
            Ok(doc,)
        },
    }
}

pub struct MongoSink {
    store:      Arc<dyn DocumentStore,>,
    collection: CollectionName,
}

impl MongoSink {
    pub fn new(config: &SinkConfig, store: Arc<dyn DocumentStore,>,) -> Result<Self,> {
        let collection = config.collection_name()?;
        match &collection {
            CollectionName::Literal(name,) => info!("Sink writing into collection '{}'", name),
            CollectionName::Expression(expr,) => {
                info!("Sink writing into collection given by '{}'", expr.source())
            },
        }
        Ok(Self { store, collection, },)
    }

    /// Persists one message and returns the assigned `_id`. Failures are returned as is.
    pub async fn handle(&self, message: &Message,) -> Result<Bson,> {
        let collection = self.collection.resolve(message,)?;
        let document = to_document(&message.payload,)?;
        let id = self.store.insert_one(&collection, document,).await?;
        debug!(
            "Stored {} payload as {} in collection '{}'",
            message.payload.kind(),
            id,
            collection
        );
        Ok(id,)
    }
}
