// mongodb_stream/src/error.rs
// Defines custom error types for the mongodb_stream module.

use thiserror::Error;

#[derive(Debug, Error,)]
pub enum StreamError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String,),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String,),
    #[error("Expression error: {0}")]
    ExpressionError(String,),
    #[error("Failed to convert message: {0}")]
    ConversionError(String,),
    #[error("Database specific error: {0}")]
    DatabaseError(String,),
    #[error("Channel error: {0}")]
    ChannelError(String,),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error,),
    #[error("Other error: {0}")]
    Other(String,),
}

impl StreamError {
    pub fn is_transient(&self,) -> bool {
        match self {
            StreamError::ConnectionError(_,) => true,
            StreamError::DatabaseError(msg,) => {
                let m = msg.to_lowercase();
                m.contains("timeout",)
                    || m.contains("connection",)
                    || m.contains("busy",)
                    || m.contains("server selection",)
                    || m.contains("connection reset",)
                    || m.contains("service unavailable",)
            },
            _ => false,
        }
    }
}

pub type Result<T,> = std::result::Result<T, StreamError,>;
