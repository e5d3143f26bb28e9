use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use oblique_core::pipeline::{PipelineStage, ProgressReporter};

/// Drives one indicatif bar per pipeline stage.
pub struct BarReporter {
    bar_style: ProgressStyle,
    spinner_style: ProgressStyle,
    current: Mutex<Option<(PipelineStage, ProgressBar)>>,
}

impl BarReporter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bar_style: ProgressStyle::default_bar()
                .template("{msg:22} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
            spinner_style: ProgressStyle::default_spinner().template("{spinner} {msg}")?,
            current: Mutex::new(None),
        })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(self.bar_style.clone());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(self.spinner_style.clone());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(stage.to_string());
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, previous)) = current.replace((stage, bar)) {
                previous.finish();
            }
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(current) = self.current.lock() {
            if let Some((_, bar)) = current.as_ref() {
                bar.set_position(items_done as u64);
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((stage, bar)) = current.take() {
                bar.finish_with_message(format!("{stage} done"));
            }
        }
    }
}
