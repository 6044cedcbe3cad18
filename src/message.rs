// mongodb_stream/src/message.rs
// Message envelope exchanged over the input and output channels.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// Header carrying the payload MIME type, in the camel-cased form used by binders.
pub const CONTENT_TYPE_HEADER: &str = "contentType";
/// Alternative spelling accepted on inbound messages.
pub const CONTENT_TYPE_HEADER_ALT: &str = "content-type";
pub const CORRELATION_ID_HEADER: &str = "correlationId";
pub const SEQUENCE_NUMBER_HEADER: &str = "sequenceNumber";
pub const SEQUENCE_SIZE_HEADER: &str = "sequenceSize";

pub const APPLICATION_JSON: &str = "application/json";

pub type Headers = BTreeMap<String, Value,>;

/// Message body. On the wire a JSON string is text, a JSON object is a map and
/// an array of byte values is raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
#[serde(untagged)]
pub enum Payload {
    Text(String,),
    Bytes(Bytes,),
    Map(serde_json::Map<String, Value,>,),
}

impl Payload {
    pub fn kind(&self,) -> &'static str {
        match self {
            Payload::Text(_,) => "text",
            Payload::Bytes(_,) => "bytes",
            Payload::Map(_,) => "map",
        }
    }

    /// JSON view of the payload, used by expressions.
    pub fn to_value(&self,) -> Value {
        match self {
            Payload::Text(s,) => Value::String(s.clone(),),
            Payload::Bytes(b,) => Value::Array(b.iter().map(|x| Value::from(*x,),).collect(),),
            Payload::Map(m,) => Value::Object(m.clone(),),
        }
    }
}

impl From<String,> for Payload {
    fn from(s: String,) -> Self {
        Payload::Text(s,)
    }
}

impl From<&str,> for Payload {
    fn from(s: &str,) -> Self {
        Payload::Text(s.to_string(),)
    }
}

impl From<Bytes,> for Payload {
    fn from(b: Bytes,) -> Self {
        Payload::Bytes(b,)
    }
}

impl From<Vec<u8,>,> for Payload {
    fn from(b: Vec<u8,>,) -> Self {
        Payload::Bytes(Bytes::from(b,),)
    }
}

impl From<serde_json::Map<String, Value,>,> for Payload {
    fn from(m: serde_json::Map<String, Value,>,) -> Self {
        Payload::Map(m,)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize,)]
pub struct Message {
    #[serde(default)]
    pub headers: Headers,
    pub payload: Payload,
}

impl Message {
    pub fn new(payload: impl Into<Payload,>,) -> Self {
        Self {
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String,>, value: impl Into<Value,>,) -> Self {
        self.headers.insert(name.into(), value.into(),);
        self
    }

    pub fn header(&self, name: &str,) -> Option<&Value,> {
        self.headers.get(name,)
    }

    /// The content type, looked up under both accepted header names.
    pub fn content_type(&self,) -> Option<&str,> {
        self.header(CONTENT_TYPE_HEADER,)
            .or_else(|| self.header(CONTENT_TYPE_HEADER_ALT,),)
            .and_then(Value::as_str,)
    }

    /// Decodes one line of the channel wire format.
    pub fn from_json_line(line: &str,) -> Result<Self,> {
        serde_json::from_str(line,).map_err(|e| {
            StreamError::ChannelError(format!("Malformed message envelope: {}", e),)
        },)
    }

    /// Encodes the message as a single line of the channel wire format.
    pub fn to_json_line(&self,) -> Result<String,> {
        serde_json::to_string(self,).map_err(|e| {
            StreamError::ChannelError(format!("Failed to serialize message envelope: {}", e),)
        },)
    }
}
