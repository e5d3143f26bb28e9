use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use oblique_core::acquisition::AcquisitionIndex;
use oblique_core::geometry::GeometryParameters;
use oblique_core::transform::{affine_shape, deshear_shape, AffineOptions};

#[derive(Args)]
pub struct InfoArgs {
    /// Acquisition directory containing data/ and metadata/
    pub input: PathBuf,

    /// Light-sheet tilt in degrees used for the derived shapes
    #[arg(long)]
    pub tilt: Option<f64>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let index = AcquisitionIndex::build(&args.input)
        .with_context(|| format!("Failed to index {}", args.input.display()))?;
    let meta = index.metadata();
    let shape = index.shape();

    println!("Acquisition: {}", args.input.display());
    println!("Buffers:     {}", index.buffers().len());
    println!("Frame:       {}x{}", index.frame_shape().1, index.frame_shape().0);
    println!("Pixel type:  {}", index.pixel_type());
    println!("Channels:    {}", meta.channels_per_slice.join(", "));
    println!("Shape:       {shape} (t, c, z, y, x)");
    println!("Scan step:   {} px", meta.scan_step_size_px);
    println!("Aspect:      {}", meta.voxel_aspect_ratio);
    println!("Pixel size:  {} um", meta.sample_px_um);
    println!("Interval:    {:.3} s", meta.frame_interval_s());
    if let Some(description) = &meta.description {
        println!("Description: {description}");
    }
    let total_mb = index.raw_bytes() as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    let geometry = GeometryParameters::from_metadata(meta, args.tilt.map(f64::to_radians))?;
    println!();
    println!("Tilt:        {:.1} deg", geometry.tilt_rad.to_degrees());
    if !geometry.aspect_ratio_consistent() {
        println!(
            "Warning:     aspect ratio differs from scan step x tan(tilt) = {:.4}",
            geometry.expected_voxel_aspect_ratio()
        );
    }
    println!("Native:      {}", deshear_shape(shape, &geometry));
    match affine_shape(shape, &geometry, &AffineOptions::default()) {
        Ok(s) => println!("Traditional: {s}"),
        Err(e) => println!("Traditional: unavailable ({e})"),
    }
    let rotated = AffineOptions {
        rotate: true,
        ..Default::default()
    };
    match affine_shape(shape, &geometry, &rotated) {
        Ok(s) => println!("Rotated:     {s}"),
        Err(e) => println!("Rotated:     unavailable ({e})"),
    }

    Ok(())
}
