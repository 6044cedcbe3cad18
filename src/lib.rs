// mongodb_stream/src/lib.rs
// Public API for the MongoDB sink and source stream applications.

pub mod binder;
pub mod channel;
pub mod cli;
pub mod error;
pub mod expression;
pub mod interceptor;
pub mod message;
pub mod query;
pub mod report;
pub mod retry;
pub mod sink;
pub mod source;
pub mod store;
pub mod trigger;

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE_NAME: &str = "test";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
