// mongodb_stream/src/interceptor.rs
// Pre-processing stages applied to inbound messages before they reach the sink handler.

use tracing::debug;

use crate::error::{Result, StreamError};
use crate::message::{Message, Payload};

/// Content-type fragments whose byte payloads are decoded to text.
pub const TEXT_CONTENT_TYPES: [&str; 3] = ["text", "json", "x-spring-tuple"];

/// A stage run on every inbound message, in registration order.
pub trait MessageInterceptor: Send + Sync {
    fn pre_send(&self, message: Message,) -> Result<Message,>;
}

/// Decodes byte payloads into UTF-8 strings when the content type says they are text.
#[derive(Debug, Clone, Copy, Default,)]
pub struct ByteArrayTextInterceptor;

impl ByteArrayTextInterceptor {
    pub fn is_text_content_type(content_type: &str,) -> bool {
        let ct = content_type.to_ascii_lowercase();
        TEXT_CONTENT_TYPES.iter().any(|t| ct.contains(t,),)
    }
}

impl MessageInterceptor for ByteArrayTextInterceptor {
    fn pre_send(&self, message: Message,) -> Result<Message,> {
        let Message { headers, payload, } = message;
        let payload = match payload {
            Payload::Bytes(bytes,) => {
                let content_type = headers
                    .get(crate::message::CONTENT_TYPE_HEADER,)
                    .or_else(|| headers.get(crate::message::CONTENT_TYPE_HEADER_ALT,),)
                    .and_then(|v| v.as_str(),);
                match content_type {
                    Some(ct,) if Self::is_text_content_type(ct,) => {
                        debug!("Decoding {} byte payload as text ({})", bytes.len(), ct);
                        let text = String::from_utf8(bytes.to_vec(),).map_err(|e| {
                            StreamError::ConversionError(format!(
                                "Payload declared as '{}' is not valid UTF-8: {}",
                                ct, e
                            ),)
                        },)?;
                        Payload::Text(text,)
                    },
                    _ => Payload::Bytes(bytes,),
                }
            },
            other => other,
        };
        Ok(Message { headers, payload, },)
    }
}

/// Ordered list of interceptors.
#[derive(Default,)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn MessageInterceptor,>,>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: impl MessageInterceptor + 'static,) -> Self {
        self.interceptors.push(Box::new(interceptor,),);
        self
    }

    pub fn len(&self,) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self,) -> bool {
        self.interceptors.is_empty()
    }

    pub fn apply(&self, message: Message,) -> Result<Message,> {
        self.interceptors
            .iter()
            .try_fold(message, |msg, interceptor| interceptor.pre_send(msg,),)
    }
}
