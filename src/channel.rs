// mongodb_stream/src/channel.rs
// In-process input and output channels.

use std::sync::Arc;

use mongodb::bson::Bson;
use tokio::sync::mpsc;

use crate::error::{Result, StreamError};
use crate::interceptor::{ByteArrayTextInterceptor, InterceptorChain};
use crate::message::Message;
use crate::sink::MongoSink;

/// Inbound side of the sink: runs the interceptors, then hands the message to the sink.
pub struct InputChannel {
    interceptors: InterceptorChain,
    sink:         Arc<MongoSink,>,
}

impl InputChannel {
    /// A channel with the byte-to-text interceptor installed.
    pub fn new(sink: Arc<MongoSink,>,) -> Self {
        Self::with_interceptors(sink, InterceptorChain::new().with(ByteArrayTextInterceptor,),)
    }

    pub fn with_interceptors(sink: Arc<MongoSink,>, interceptors: InterceptorChain,) -> Self {
        Self { interceptors, sink, }
    }

    pub async fn send(&self, message: Message,) -> Result<Bson,> {
        let message = self.interceptors.apply(message,)?;
        self.sink.handle(&message,).await
    }
}

/// Outbound side of the source.
#[derive(Clone,)]
pub struct OutputChannel {
    sender: mpsc::Sender<Message,>,
}

impl OutputChannel {
    pub async fn send(&self, message: Message,) -> Result<(),> {
        self.sender
            .send(message,)
            .await
            .map_err(|_| StreamError::ChannelError("Output channel closed".to_string(),),)
    }
}

/// Creates a bounded output channel and the receiver that drains it.
pub fn output_channel(capacity: usize,) -> (OutputChannel, mpsc::Receiver<Message,>,) {
    let (sender, receiver,) = mpsc::channel(capacity.max(1,),);
    (OutputChannel { sender, }, receiver,)
}
