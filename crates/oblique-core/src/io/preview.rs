use std::path::Path;

use image::{ImageBuffer, Luma};
use ndarray::{s, Array2, ArrayView2, Axis};
use tracing::debug;

use crate::error::{ObliqueError, Result};
use crate::pixel::{Pixel, PixelType};
use crate::volume::Volume;

/// Maximum-intensity projection along depth of timepoint `t`, channel `c`.
/// Returns `None` if either index is out of range.
pub fn max_projection<T: Pixel>(volume: &Volume<T>, t: usize, c: usize) -> Option<Array2<T>> {
    let shape = volume.shape();
    if t >= shape.t || c >= shape.c || shape.z == 0 {
        return None;
    }
    let view = volume.view();
    let stack = view.slice(s![t, c, .., .., ..]);
    Some(stack.map_axis(Axis(0), |lane| {
        lane.iter()
            .copied()
            .reduce(|a, b| if b.to_f32() > a.to_f32() { b } else { a })
            .unwrap_or_default()
    }))
}

/// Save a projection as a 16-bit grayscale image. The format follows the
/// file extension (`.png`, `.tif`, ...). Float data is stretched to the full
/// 16-bit range.
pub fn save_projection<T: Pixel>(path: &Path, projection: ArrayView2<'_, T>) -> Result<()> {
    let (height, width) = projection.dim();
    let pixels: Vec<u16> = match T::PIXEL_TYPE {
        PixelType::U8 => projection.iter().map(|v| v.to_f32() as u16 * 257).collect(),
        PixelType::U16 => projection.iter().map(|v| v.to_f32() as u16).collect(),
        PixelType::F32 => {
            let (lo, hi) = projection
                .iter()
                .map(|v| v.to_f32())
                .filter(|v| v.is_finite())
                .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let range = if hi > lo { hi - lo } else { 1.0 };
            projection
                .iter()
                .map(|v| u16::from_f32((v.to_f32() - lo) / range * u16::MAX as f32))
                .collect()
        }
    };

    // Iteration above is logical (row-major) order regardless of layout.
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            ObliqueError::output(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "projection buffer size"),
            )
        })?;
    buffer.save(path)?;
    debug!(path = %path.display(), width, height, "Saved projection");
    Ok(())
}
