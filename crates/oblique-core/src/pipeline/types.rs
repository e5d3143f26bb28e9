use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ObliqueError, Result};
use crate::volume::VolumeShape;

use super::config::View;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Indexing,
    Assembling,
    Deshearing,
    Resampling,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Indexing => write!(f, "Indexing acquisition"),
            Self::Assembling => write!(f, "Assembling volume"),
            Self::Deshearing => write!(f, "Deshearing"),
            Self::Resampling => write!(f, "Resampling"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (buffers, timepoints or planes), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` work items within the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative cancellation flag shared between a caller and a running job.
///
/// Long operations poll it between work units (buffers, timepoints) and stop
/// with [`ObliqueError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if cancellation was requested.
    pub fn check(&self, completed: usize, total: usize) -> Result<()> {
        if self.is_cancelled() {
            Err(ObliqueError::Cancelled { completed, total })
        } else {
            Ok(())
        }
    }
}

/// Summary of a completed pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub output: PathBuf,
    pub view: View,
    pub input_shape: VolumeShape,
    pub output_shape: VolumeShape,
    pub streamed: bool,
    pub device: String,
    pub elapsed: Duration,
}
