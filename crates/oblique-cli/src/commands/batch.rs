use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use oblique_core::compute::create_backend;
use oblique_core::pipeline::run_batch;

use super::run::ProcessingArgs;
use crate::interrupt::cancel_on_ctrl_c;
use crate::progress::BarReporter;
use crate::summary::print_batch_summary;

#[derive(Args)]
pub struct BatchArgs {
    /// Acquisition directories, processed in the given order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub processing: ProcessingArgs,
}

pub fn run(args: &BatchArgs) -> Result<()> {
    let configs = args
        .inputs
        .iter()
        .map(|input| args.processing.build_config(input))
        .collect::<Result<Vec<_>>>()?;

    // All acquisitions share one device.
    let backend = create_backend(&configs[0].device);
    println!(
        "Processing {} acquisitions on {}",
        configs.len(),
        backend.name()
    );

    let reporter = Arc::new(BarReporter::new()?);
    let cancel = cancel_on_ctrl_c()?;
    let outcomes = run_batch(&configs, backend, reporter, &cancel);
    print_batch_summary(&outcomes, configs.len());

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        bail!("{failed} of {} acquisitions failed", configs.len());
    }
    Ok(())
}
