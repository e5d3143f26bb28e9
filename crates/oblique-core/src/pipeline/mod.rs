mod batch;
pub mod config;
mod orchestrator;
mod types;

pub use batch::{run_batch, AcquisitionOutcome};
pub use config::{MemoryStrategy, PipelineConfig, View};
pub use orchestrator::{run_pipeline, run_pipeline_simple};
pub use types::{CancellationToken, NoOpReporter, PipelineReport, PipelineStage, ProgressReporter};
