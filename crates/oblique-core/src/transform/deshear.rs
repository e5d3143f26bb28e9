//! Native view: undo the per-slice scan offset with whole-row shifts.

use ndarray::{s, ArrayView5, ArrayViewMut5, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{ObliqueError, Result};
use crate::geometry::{GeometryParameters, ShiftDirection};
use crate::pipeline::{CancellationToken, PipelineStage, ProgressReporter};
use crate::pixel::Pixel;
use crate::volume::{Volume, VolumeShape};

#[derive(Clone, Copy, Debug, Default)]
pub struct DeshearOptions {
    pub direction: ShiftDirection,
}

/// Row offset of slice `z`, rounded half away from zero.
pub fn slice_shift(z: usize, scan_step_size_px: f64) -> usize {
    (z as f64 * scan_step_size_px).round() as usize
}

/// Largest row offset over `depth` slices.
pub fn max_shift(depth: usize, scan_step_size_px: f64) -> usize {
    slice_shift(depth.saturating_sub(1), scan_step_size_px)
}

/// Shape of the deshear output for an input of `shape`.
pub fn deshear_shape(shape: VolumeShape, geometry: &GeometryParameters) -> VolumeShape {
    VolumeShape {
        y: shape.y + max_shift(shape.z, geometry.scan_step_size_px),
        ..shape
    }
}

/// Deshear a volume into a new heap volume.
///
/// Slice `z` lands on output rows `[shift(z), shift(z) + height)` unchanged;
/// every other row is zero. A zero scan step returns a copy of the input.
pub fn deshear<T: Pixel>(
    volume: &Volume<T>,
    geometry: &GeometryParameters,
    options: &DeshearOptions,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Volume<T>> {
    validate_step(geometry)?;
    let shape = deshear_shape(volume.shape(), geometry);
    let mut out = Volume::zeros(shape);
    info!(
        input = %volume.shape(),
        output = %shape,
        scan_step_size_px = geometry.scan_step_size_px,
        "Deshearing"
    );
    reporter.begin_stage(PipelineStage::Deshearing, Some(shape.t));
    deshear_into(volume.view(), out.view_mut(), geometry, options, reporter, cancel)?;
    reporter.finish_stage();
    Ok(out)
}

/// Deshear `input` into a caller-provided `output` of shape
/// [`deshear_shape`]. Reports one progress item per timepoint.
pub fn deshear_into<T: Pixel>(
    input: ArrayView5<'_, T>,
    mut output: ArrayViewMut5<'_, T>,
    geometry: &GeometryParameters,
    options: &DeshearOptions,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<()> {
    validate_step(geometry)?;
    let in_shape = VolumeShape::from(input.dim());
    let expected = deshear_shape(in_shape, geometry);
    if output.dim() != expected.as_tuple() {
        return Err(ObliqueError::ShapeMismatch {
            path: Default::default(),
            expected: expected.dims().to_vec(),
            found: VolumeShape::from(output.dim()).dims().to_vec(),
        });
    }

    let step = geometry.scan_step_size_px;
    let top = max_shift(in_shape.z, step);
    let height = in_shape.y;
    let shift = |z: usize| match options.direction {
        ShiftDirection::Ascending => slice_shift(z, step),
        ShiftDirection::Descending => top - slice_shift(z, step),
    };

    for t in 0..in_shape.t {
        cancel.check(t, in_shape.t)?;
        let mut out_t = output.index_axis_mut(Axis(0), t);
        for c in 0..in_shape.c {
            let source = input.slice(s![t, c, .., .., ..]);
            out_t
                .index_axis_mut(Axis(0), c)
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(z, mut plane)| {
                    let offset = shift(z);
                    plane.fill(T::default());
                    plane
                        .slice_mut(s![offset..offset + height, ..])
                        .assign(&source.index_axis(Axis(0), z));
                });
        }
        reporter.advance(t + 1);
        debug!(timepoint = t, "Desheared timepoint");
    }
    Ok(())
}

fn validate_step(geometry: &GeometryParameters) -> Result<()> {
    let step = geometry.scan_step_size_px;
    if !step.is_finite() || step < 0.0 {
        return Err(ObliqueError::InvalidGeometry {
            name: "scan_step_size_px",
            value: step,
        });
    }
    Ok(())
}
