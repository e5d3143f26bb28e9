use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use oblique_core::compute::{create_backend, DevicePreference};
use oblique_core::geometry::{CropAnchor, ShiftDirection};
use oblique_core::pipeline::{run_pipeline, MemoryStrategy, PipelineConfig, View};
use tracing::debug;

use crate::interrupt::cancel_on_ctrl_c;
use crate::progress::BarReporter;
use crate::summary::{print_report, print_run_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum ViewArg {
    Raw,
    Native,
    Traditional,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AnchorArg {
    Center,
    Start,
    End,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MemoryArg {
    Auto,
    Eager,
    Streaming,
}

/// Processing options shared by `run` and `batch`. Flags override values
/// loaded from `--config`.
#[derive(Args)]
pub struct ProcessingArgs {
    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output representation
    #[arg(long, value_enum)]
    pub view: Option<ViewArg>,

    /// Rotate the traditional view into the sample frame
    #[arg(long)]
    pub rotate: bool,

    /// Light-sheet tilt in degrees (default: sidecar value, then 30)
    #[arg(long)]
    pub tilt: Option<f64>,

    /// Scan direction relative to the camera rows
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,

    /// Where to take the depth crop after rotation
    #[arg(long, value_enum)]
    pub crop_anchor: Option<AnchorArg>,

    /// Compute device for resampling
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Assemble in memory or stream buffer by buffer to disk
    #[arg(long, value_enum)]
    pub memory: Option<MemoryArg>,

    /// Always write BigTIFF
    #[arg(long)]
    pub bigtiff: bool,

    /// Also save a max-intensity projection per channel
    #[arg(long)]
    pub preview: bool,
}

impl ProcessingArgs {
    /// Load `--config` if given, point it at `input`, then apply flags.
    pub fn build_config(&self, input: &Path) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let mut config: PipelineConfig =
                    toml::from_str(&contents).context("Invalid pipeline config")?;
                config.input = input.to_path_buf();
                config
            }
            None => PipelineConfig::new(input),
        };

        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(view) = self.view {
            config.view = match view {
                ViewArg::Raw => View::Raw,
                ViewArg::Native => View::Native,
                ViewArg::Traditional => View::Traditional,
            };
        }
        if let Some(tilt) = self.tilt {
            config.tilt_deg = Some(tilt);
        }
        if let Some(direction) = self.direction {
            config.direction = match direction {
                DirectionArg::Ascending => ShiftDirection::Ascending,
                DirectionArg::Descending => ShiftDirection::Descending,
            };
        }
        if let Some(anchor) = self.crop_anchor {
            config.crop_anchor = match anchor {
                AnchorArg::Center => CropAnchor::Center,
                AnchorArg::Start => CropAnchor::Start,
                AnchorArg::End => CropAnchor::End,
            };
        }
        if let Some(device) = self.device {
            config.device = match device {
                DeviceArg::Auto => DevicePreference::Auto,
                DeviceArg::Cpu => DevicePreference::Cpu,
                DeviceArg::Gpu => DevicePreference::Gpu,
            };
        }
        if let Some(memory) = self.memory {
            config.memory = match memory {
                MemoryArg::Auto => MemoryStrategy::Auto,
                MemoryArg::Eager => MemoryStrategy::Eager,
                MemoryArg::Streaming => MemoryStrategy::Streaming,
            };
        }
        config.rotate |= self.rotate;
        config.force_bigtiff |= self.bigtiff;
        config.preview |= self.preview;
        debug!(?config, "Resolved pipeline config");
        Ok(config)
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Acquisition directory containing data/ and metadata/
    pub input: PathBuf,

    /// Output file name stem (default: input directory name)
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub processing: ProcessingArgs,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = args.processing.build_config(&args.input)?;
    if args.name.is_some() {
        config.name = args.name.clone();
    }

    let backend = create_backend(&config.device);
    print_run_summary(&config, backend.name());

    let reporter = Arc::new(BarReporter::new()?);
    let cancel = cancel_on_ctrl_c()?;
    let report = run_pipeline(&config, backend, reporter, &cancel)
        .with_context(|| format!("Failed to process {}", config.input.display()))?;

    print_report(&report);
    Ok(())
}
