// mongodb_stream/src/main.rs
// Entry point for the mongodb-stream CLI application.

use std::sync::Arc;

use clap::Parser;
use mongodb_stream::binder::{run_inbound, run_outbound};
use mongodb_stream::channel::{InputChannel, output_channel};
use mongodb_stream::cli::{Cli, Commands, SinkArgs, SourceArgs};
use mongodb_stream::error::{Result, StreamError};
use mongodb_stream::report::ProcessingRegistry;
use mongodb_stream::sink::MongoSink;
use mongodb_stream::source::MongoSource;
use mongodb_stream::store;
use mongodb_stream::trigger::Trigger;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(),> {
    // stdout carries the output channel, so logs go to stderr and the log file only.
    let file_appender = tracing_appender::rolling::never(".", "mongodb-stream.log",);
    let (non_blocking, _guard,) = tracing_appender::non_blocking(file_appender,);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),),)
        .with(fmt::layer().with_writer(std::io::stderr,),)
        .with(fmt::layer().with_writer(non_blocking,).with_ansi(false,),)
        .init();

    let cli = Cli::parse();

    let (shutdown_tx, _,) = broadcast::channel::<(),>(1,);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = signal_tx.send((),);
        }
    },);

    let res = match &cli.command {
        Commands::Sink(args,) => run_sink(args, shutdown_tx.subscribe(),).await,
        Commands::Source(args,) => run_source(args, shutdown_tx.subscribe(),).await,
    };

    if let Err(e,) = &res {
        error!("{}", e);
    }
    res
}

async fn run_sink(args: &SinkArgs, mut shutdown: broadcast::Receiver<(),>,) -> Result<(),> {
    let config = args.config();
    // Reject bad configuration before touching the network.
    config.collection_name()?;

    let store = store::open(&args.mongo.config(),).await?;
    let sink = Arc::new(MongoSink::new(&config, store,)?,);
    let input = Arc::new(InputChannel::new(sink,),);
    let registry = Arc::new(ProcessingRegistry::new(args.strict,),);

    info!("Sink reading messages from stdin with concurrency {}", args.concurrency);
    let res = run_inbound(
        BufReader::new(tokio::io::stdin(),),
        input,
        Arc::clone(&registry,),
        args.concurrency,
        &mut shutdown,
    )
    .await;

    let summary = registry.snapshot()?;
    info!(
        "Sink finished: {} messages, {} stored, {} failed",
        summary.total_messages, summary.success_count, summary.failure_count
    );
    if let Some(path,) = &args.report {
        registry.save_report(path,)?;
    }

    res
}

async fn run_source(args: &SourceArgs, mut shutdown: broadcast::Receiver<(),>,) -> Result<(),> {
    let config = args.config();
    config.query_source()?;

    let store = store::open(&args.mongo.config(),).await?;
    let source = MongoSource::new(&config, store,)?;

    let (output, receiver,) = output_channel(mongodb_stream::DEFAULT_CHANNEL_CAPACITY,);
    let writer = tokio::spawn(run_outbound(receiver, tokio::io::stdout(),),);

    let trigger = Trigger::new(args.trigger.config(),);
    let stats = trigger.run(&source, &output, &mut shutdown,).await;
    drop(output,);

    let written = writer
        .await
        .map_err(|e| StreamError::Other(format!("Output writer task failed: {}", e),),)??;
    let stats = stats?;
    info!(
        "Source finished: {} polls ({} failed), {} messages written",
        stats.polls, stats.failed_polls, written
    );
    Ok((),)
}
