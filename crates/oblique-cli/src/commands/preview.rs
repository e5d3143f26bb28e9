use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use oblique_core::io::{max_projection, read_volume, save_projection, BufferReader};
use oblique_core::{Pixel, PixelType};

#[derive(Args)]
pub struct PreviewArgs {
    /// Processed volume (TIFF written by `oblique run`)
    pub file: PathBuf,

    /// Timepoint to project
    #[arg(short, long, default_value = "0")]
    pub timepoint: usize,

    /// Channel to project
    #[arg(short, long, default_value = "0")]
    pub channel: usize,

    /// Output image path (format from extension)
    #[arg(short, long, default_value = "preview.png")]
    pub output: PathBuf,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let pixel_type = BufferReader::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?
        .pixel_type();
    match pixel_type {
        PixelType::U8 => project::<u8>(&args.file, args),
        PixelType::U16 => project::<u16>(&args.file, args),
        PixelType::F32 => project::<f32>(&args.file, args),
    }
}

fn project<T: Pixel>(path: &Path, args: &PreviewArgs) -> Result<()> {
    let (volume, _) = read_volume::<T>(path)?;
    let shape = volume.shape();
    let projection = max_projection(&volume, args.timepoint, args.channel).with_context(|| {
        format!(
            "Timepoint {} / channel {} out of range for shape {shape}",
            args.timepoint, args.channel
        )
    })?;
    save_projection(&args.output, projection.view())?;
    println!("Preview saved to {}", args.output.display());
    Ok(())
}
