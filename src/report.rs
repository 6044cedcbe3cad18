// mongodb_stream/src/report.rs
// Per-run bookkeeping of handled messages, with strict mode and a JSON summary.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Serialize,)]
pub struct ProcessingError {
    pub message: String,
    pub error:   String,
}

#[derive(Debug, Clone, Serialize, Default,)]
pub struct Report {
    pub total_messages: usize,
    pub success_count:  usize,
    pub failure_count:  usize,
    pub errors:         Vec<ProcessingError,>,
}

pub struct ProcessingRegistry {
    report: Mutex<Report,>,
    strict: bool,
    halted: AtomicBool,
    halt:   Notify,
}

impl ProcessingRegistry {
    pub fn new(strict: bool,) -> Self {
        Self {
            report: Mutex::new(Report::default(),),
            strict,
            halted: AtomicBool::new(false,),
            halt:   Notify::new(),
        }
    }

    fn lock(&self,) -> Result<std::sync::MutexGuard<'_, Report,>,> {
        self.report
            .lock()
            .map_err(|_| StreamError::Other("Processing report lock poisoned".to_string(),),)
    }

    pub fn record_success(&self,) -> Result<(),> {
        let mut report = self.lock()?;
        report.total_messages += 1;
        report.success_count += 1;
        Ok((),)
    }

    /// Records a failed message. In strict mode this also halts the run and returns an error.
    pub fn record_error(&self, message: &str, err: String,) -> Result<(),> {
        {
            let mut report = self.lock()?;
            report.total_messages += 1;
            report.failure_count += 1;
            report.errors.push(ProcessingError {
                message: message.to_string(),
                error:   err.clone(),
            },);
        }

        error!("Error at {}: {}", message, err);

        if self.strict {
            self.halted.store(true, Ordering::SeqCst,);
            self.halt.notify_one();
            return Err(StreamError::Other(format!(
                "Strict mode enabled. Halting on error at {}: {}",
                message, err
            ),),);
        }
        Ok((),)
    }

    pub fn is_halted(&self,) -> bool {
        self.halted.load(Ordering::SeqCst,)
    }

    /// Resolves once strict mode has halted the run.
    pub async fn halted(&self,) {
        if self.is_halted() {
            return;
        }
        self.halt.notified().await;
    }

    pub fn snapshot(&self,) -> Result<Report,> {
        Ok(self.lock()?.clone(),)
    }

    pub fn save_report(&self, path: &Path,) -> Result<(),> {
        let report = self.snapshot()?;
        let json = serde_json::to_string_pretty(&report,).map_err(|e| {
            StreamError::Other(format!("Failed to serialize processing report: {}", e),)
        },)?;
        std::fs::write(path, json,).map_err(|e| {
            StreamError::Other(format!("Failed to write {}: {}", path.display(), e),)
        },)?;
        info!("Processing report saved to {}", path.display());
        Ok((),)
    }
}
