use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::compute::ComputeBackend;
use crate::error::{ErrorKind, Result};

use super::config::PipelineConfig;
use super::orchestrator::run_pipeline;
use super::types::{CancellationToken, PipelineReport, ProgressReporter};

/// Result of one acquisition in a batch.
#[derive(Debug)]
pub struct AcquisitionOutcome {
    pub input: PathBuf,
    pub result: Result<PipelineReport>,
}

impl AcquisitionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run several acquisitions in sequence.
///
/// A failing acquisition is logged and recorded; the batch moves on to the
/// next one. Cancellation stops the whole batch after recording the
/// interrupted acquisition.
pub fn run_batch(
    configs: &[PipelineConfig],
    backend: Arc<dyn ComputeBackend>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancellationToken,
) -> Vec<AcquisitionOutcome> {
    let mut outcomes = Vec::with_capacity(configs.len());
    for (i, config) in configs.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        info!(
            acquisition = i + 1,
            total = configs.len(),
            input = %config.input.display(),
            "Starting acquisition"
        );
        let result = run_pipeline(config, Arc::clone(&backend), Arc::clone(&reporter), cancel);
        let stop = match &result {
            Ok(_) => false,
            Err(e) => {
                error!(input = %config.input.display(), kind = ?e.kind(), "Acquisition failed: {e}");
                e.kind() == ErrorKind::Cancelled
            }
        };
        outcomes.push(AcquisitionOutcome {
            input: config.input.clone(),
            result,
        });
        if stop {
            break;
        }
    }
    outcomes
}
