// mongodb_stream/src/cli.rs
// Command Line Interface (CLI) specific logic for mongodb_stream.

use std::path::PathBuf;

use clap::Parser;

use crate::sink::SinkConfig;
use crate::source::SourceConfig;
use crate::store::MongoConfig;
use crate::trigger::{TimeUnit, TriggerConfig};

/// Command Line Interface for the MongoDB stream applications.
#[derive(Parser, Debug,)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Which application to run.
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug,)]
pub enum Commands {
    /// Write messages read from stdin into a MongoDB collection
    Sink(SinkArgs,),
    /// Poll a MongoDB collection and write matching documents to stdout
    Source(SourceArgs,),
}

#[derive(Parser, Debug,)]
pub struct MongoArgs {
    /// Connection string for MongoDB
    #[clap(long, env = "MONGODB_URI", default_value = crate::DEFAULT_MONGODB_URI)]
    pub uri: String,

    /// Database holding the collection
    #[clap(long, env = "MONGODB_DATABASE", default_value = crate::DEFAULT_DATABASE_NAME)]
    pub database: String,

    /// Run against an in-memory store instead of MongoDB
    #[clap(long)]
    pub dry_run: bool,
}

impl MongoArgs {
    pub fn config(&self,) -> MongoConfig {
        MongoConfig {
            uri:      self.uri.clone(),
            database: self.database.clone(),
            dry_run:  self.dry_run,
        }
    }
}

#[derive(Parser, Debug,)]
pub struct SinkArgs {
    #[clap(flatten)]
    pub mongo: MongoArgs,

    /// Collection to write into
    #[clap(long, env = "MONGODB_COLLECTION")]
    pub collection: Option<String,>,

    /// Expression evaluated per message giving the collection (e.g. headers.collection).
    /// Takes precedence over --collection.
    #[clap(long, env = "MONGODB_COLLECTION_EXPRESSION")]
    pub collection_expression: Option<String,>,

    /// Number of messages handled concurrently.
    #[clap(short, long, default_value_t = 4)]
    pub concurrency: usize,

    /// Halt immediately when a message cannot be stored.
    #[clap(long)]
    pub strict: bool,

    /// Write a JSON summary of handled messages to this file on exit.
    #[clap(long)]
    pub report: Option<PathBuf,>,
}

impl SinkArgs {
    pub fn config(&self,) -> SinkConfig {
        SinkConfig {
            collection:            self.collection.clone(),
            collection_expression: self.collection_expression.clone(),
        }
    }
}

#[derive(Parser, Debug,)]
pub struct SourceArgs {
    #[clap(flatten)]
    pub mongo: MongoArgs,

    /// Collection to poll
    #[clap(long, env = "MONGODB_COLLECTION")]
    pub collection: String,

    /// Query document, e.g. "{ 'greeting': 'hola' }"
    #[clap(long, env = "MONGODB_QUERY", default_value = crate::query::MATCH_ALL_QUERY)]
    pub query: String,

    /// Query expression, e.g. "query('{}').sort('{ n: 1 }').limit(10)". Takes precedence over --query.
    #[clap(long, env = "MONGODB_QUERY_EXPRESSION")]
    pub query_expression: Option<String,>,

    /// Emit one message per document instead of one message for the whole result.
    #[clap(long, env = "MONGODB_SPLIT", default_value_t = true, action = clap::ArgAction::Set)]
    pub split: bool,

    #[clap(flatten)]
    pub trigger: TriggerArgs,
}

impl SourceArgs {
    pub fn config(&self,) -> SourceConfig {
        SourceConfig {
            collection:       self.collection.clone(),
            query:            self.query.clone(),
            query_expression: self.query_expression.clone(),
            split:            self.split,
        }
    }
}

#[derive(Parser, Debug,)]
pub struct TriggerArgs {
    /// Delay between polls, in --time-unit
    #[clap(long, env = "TRIGGER_FIXED_DELAY", default_value_t = 1)]
    pub fixed_delay: u64,

    /// Delay before the first poll, in --time-unit
    #[clap(long, env = "TRIGGER_INITIAL_DELAY", default_value_t = 0)]
    pub initial_delay: u64,

    /// Unit for the delays
    #[clap(long, env = "TRIGGER_TIME_UNIT", value_enum, default_value_t = TimeUnit::Seconds)]
    pub time_unit: TimeUnit,

    /// Stop after emitting this many messages (unlimited when absent)
    #[clap(long, env = "TRIGGER_MAX_MESSAGES")]
    pub max_messages: Option<u64,>,
}

impl TriggerArgs {
    pub fn config(&self,) -> TriggerConfig {
        TriggerConfig {
            fixed_delay:   self.fixed_delay,
            initial_delay: self.initial_delay,
            time_unit:     self.time_unit,
            max_messages:  self.max_messages,
        }
    }
}
