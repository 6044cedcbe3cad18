// mongodb_stream/src/binder.rs
// Binds the in-process channels to newline-delimited JSON streams (stdin/stdout in the CLI).

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::channel::InputChannel;
use crate::error::{Result, StreamError};
use crate::message::Message;
use crate::report::ProcessingRegistry;

/// Reads envelopes from `reader` and sends each one through the input channel,
/// at most `concurrency` at a time. Returns once the input is exhausted, on
/// shutdown, or when strict mode halts the run.
pub async fn run_inbound<R,>(
    reader: R,
    input: Arc<InputChannel,>,
    registry: Arc<ProcessingRegistry,>,
    concurrency: usize,
    shutdown: &mut broadcast::Receiver<(),>,
) -> Result<(),>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut join_set = JoinSet::new();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1,),),);
    let mut line_no = 0usize;

    loop {
        if registry.is_halted() {
            break;
        }

        let line = tokio::select! {
            _ = shutdown.recv() => {
                info!("Inbound channel shutting down");
                break;
            }
            _ = registry.halted() => break,
            line = lines.next_line() => line?,
        };
        let Some(line,) = line else {
            break;
        };
        // A failure may have landed while the read was pending.
        if registry.is_halted() {
            break;
        }
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let label = format!("message {}", line_no);
        let message = match Message::from_json_line(&line,) {
            Ok(m,) => m,
            Err(e,) => {
                let _ = registry.record_error(&label, e.to_string(),);
                continue;
            },
        };

        let permit = Arc::clone(&semaphore,)
            .acquire_owned()
            .await
            .map_err(|e| StreamError::Other(format!("Concurrency limiter closed: {}", e),),)?;
        let input_task = Arc::clone(&input,);
        let registry_task = Arc::clone(&registry,);

        join_set.spawn(async move {
            let _permit = permit; // Hold permit until task is done
            match input_task.send(message,).await {
                Ok(_,) => {
                    let _ = registry_task.record_success();
                },
                Err(e,) => {
                    let _ = registry_task.record_error(&label, e.to_string(),);
                },
            }
        },);
    }

    while let Some(res,) = join_set.join_next().await {
        if let Err(e,) = res {
            error!("Task panicked: {}", e);
        }
    }

    if registry.is_halted() {
        return Err(StreamError::Other(
            "Strict mode enabled. Halted after a failed message".to_string(),
        ),);
    }
    Ok((),)
}

/// Drains the output channel into `writer`, one envelope per line. Returns the number written.
pub async fn run_outbound<W,>(mut receiver: mpsc::Receiver<Message,>, mut writer: W,) -> Result<u64,>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(message,) = receiver.recv().await {
        let mut line = message.to_json_line()?;
        line.push('\n',);
        writer.write_all(line.as_bytes(),).await?;
        writer.flush().await?;
        written += 1;
    }
    Ok(written,)
}
