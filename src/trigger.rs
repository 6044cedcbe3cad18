// mongodb_stream/src/trigger.rs
// Fixed-delay trigger driving the source's poll cycles.

use std::time::Duration;

use clap::ValueEnum;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::OutputChannel;
use crate::error::Result;
use crate::source::MongoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum,)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(self, amount: u64,) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount,),
            TimeUnit::Microseconds => Duration::from_micros(amount,),
            TimeUnit::Milliseconds => Duration::from_millis(amount,),
            TimeUnit::Seconds => Duration::from_secs(amount,),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60,),),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600,),),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400,),),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
pub struct TriggerConfig {
    /// Delay between the end of one poll and the start of the next.
    pub fixed_delay:   u64,
    pub initial_delay: u64,
    pub time_unit:     TimeUnit,
    /// Total number of messages to emit before stopping; `None` is unlimited.
    pub max_messages:  Option<u64,>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            fixed_delay:   1,
            initial_delay: 0,
            time_unit:     TimeUnit::Seconds,
            max_messages:  None,
        }
    }
}

impl TriggerConfig {
    pub fn fixed_delay(&self,) -> Duration {
        self.time_unit.duration(self.fixed_delay,)
    }

    pub fn initial_delay(&self,) -> Duration {
        self.time_unit.duration(self.initial_delay,)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq,)]
pub struct TriggerStats {
    pub polls:            u64,
    pub failed_polls:     u64,
    pub messages_emitted: u64,
}

pub struct Trigger {
    config: TriggerConfig,
}

impl Trigger {
    pub fn new(config: TriggerConfig,) -> Self {
        Self { config, }
    }

    /// Polls until shutdown, or until `max_messages` have been emitted.
    ///
    /// A failed poll is logged and the next one runs on the usual delay. Only a
    /// closed output channel ends the loop with an error.
    pub async fn run(
        &self,
        source: &MongoSource,
        output: &OutputChannel,
        shutdown: &mut broadcast::Receiver<(),>,
    ) -> Result<TriggerStats,> {
        let mut stats = TriggerStats::default();
        info!(
            "Trigger started: fixed delay {:?}, initial delay {:?}, max messages {:?}",
            self.config.fixed_delay(),
            self.config.initial_delay(),
            self.config.max_messages
        );

        let initial = self.config.initial_delay();
        if !initial.is_zero() {
            tokio::select! {
                _ = shutdown.recv() => return Ok(stats),
                _ = tokio::time::sleep(initial) => {}
            }
        }

        loop {
            stats.polls += 1;
            match source.poll().await {
                Ok(messages,) => {
                    debug!("Poll {} produced {} messages", stats.polls, messages.len());
                    for message in messages {
                        if self.limit_reached(&stats,) {
                            break;
                        }
                        output.send(message,).await?;
                        stats.messages_emitted += 1;
                    }
                },
                Err(e,) => {
                    stats.failed_polls += 1;
                    warn!("Poll of '{}' failed: {}", source.collection(), e);
                },
            }

            if self.limit_reached(&stats,) {
                info!("Emitted {} messages, trigger stopping", stats.messages_emitted);
                return Ok(stats,);
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Trigger shutting down after {} polls", stats.polls);
                    return Ok(stats);
                }
                _ = tokio::time::sleep(self.config.fixed_delay()) => {}
            }
        }
    }

    fn limit_reached(&self, stats: &TriggerStats,) -> bool {
        self.config
            .max_messages
            .is_some_and(|max| stats.messages_emitted >= max,)
    }
}
