use std::path::Path;

use ndarray::{s, Array2};
use tracing::debug;

use crate::calibration::Calibration;
use crate::error::{ObliqueError, Result};
use crate::io::buffer::BufferReader;
use crate::io::imagej::parse_imagej_description;
use crate::pixel::Pixel;
use crate::volume::{Volume, VolumeShape};

/// Read a volume written by [`crate::io::writer`] (or any ImageJ hyperstack
/// TIFF) back into memory together with its calibration.
///
/// Files without an ImageJ description are read as a single (z, y, x) stack.
pub fn read_volume<T: Pixel>(path: &Path) -> Result<(Volume<T>, Calibration)> {
    let mut reader = BufferReader::open(path)?;
    let (height, width) = reader.frame_shape();
    let header = reader
        .description()
        .as_deref()
        .and_then(parse_imagej_description);
    let x_resolution = reader.x_resolution();

    let mut calibration = Calibration::default();
    if let Some(res) = x_resolution {
        calibration.pixel_size_um = 1.0 / res;
    }

    let Some(header) = header else {
        let mut planes: Vec<Array2<T>> = Vec::new();
        while let Some(page) = reader.next_page::<T>()? {
            planes.push(page);
        }
        let shape = VolumeShape::new(1, 1, planes.len(), height, width);
        let mut volume = Volume::<T>::zeros(shape);
        {
            let mut view = volume.view_mut();
            for (z, plane) in planes.iter().enumerate() {
                view.slice_mut(s![0, 0, z, .., ..]).assign(plane);
            }
        }
        debug!(path = %path.display(), shape = %shape, "Read plain TIFF stack");
        return Ok((volume, calibration));
    };

    let shape = VolumeShape::new(header.frames, header.channels, header.slices, height, width);
    if let Some(images) = header.images {
        if images != shape.planes() {
            return Err(ObliqueError::ShapeMismatch {
                path: path.to_path_buf(),
                expected: vec![shape.planes()],
                found: vec![images],
            });
        }
    }

    if let Some(spacing) = header.spacing {
        calibration.z_step_um = spacing;
    }
    if let Some(finterval) = header.finterval {
        calibration.frame_interval_s = finterval;
    }
    calibration.description = header.description.unwrap_or_default();
    calibration.channel_labels = header.labels;
    calibration.metadata = header.info;

    let mut volume = Volume::<T>::zeros(shape);
    {
        let mut view = volume.view_mut();
        // Pages are stored (t, z, c).
        for t in 0..shape.t {
            for z in 0..shape.z {
                for c in 0..shape.c {
                    let page = reader.require_page::<T>(shape.planes())?;
                    view.slice_mut(s![t, c, z, .., ..]).assign(&page);
                }
            }
        }
    }
    debug!(path = %path.display(), shape = %shape, "Read hyperstack");
    Ok((volume, calibration))
}
