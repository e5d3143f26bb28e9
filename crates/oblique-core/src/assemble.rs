use ndarray::{s, ArrayViewMut5};
use tracing::{debug, info};

use crate::acquisition::AcquisitionIndex;
use crate::consts::TIMING_ROWS;
use crate::error::{ObliqueError, Result};
use crate::io::buffer::BufferReader;
use crate::pipeline::{CancellationToken, NoOpReporter, PipelineStage, ProgressReporter};
use crate::pixel::Pixel;
use crate::volume::Volume;

/// Where an assembled volume is written.
pub enum OutputTarget<T: Pixel> {
    /// A new heap volume.
    InMemory,
    /// A pre-allocated file-backed volume with the index's shape.
    File(Volume<T>),
}

/// Assemble every buffer of an acquisition into one (t, c, z, y, x) volume.
pub fn assemble<T: Pixel>(index: &AcquisitionIndex, target: OutputTarget<T>) -> Result<Volume<T>> {
    assemble_with(index, target, &NoOpReporter, &CancellationToken::new())
}

/// [`assemble`] with progress reporting and cancellation.
///
/// Buffers are decoded one page at a time, in time order. File-backed
/// targets are flushed after each buffer, so at most one buffer of work is
/// lost if the process dies.
pub fn assemble_with<T: Pixel>(
    index: &AcquisitionIndex,
    target: OutputTarget<T>,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Volume<T>> {
    check_pixel_type::<T>(index)?;
    let shape = index.shape();
    let mut volume = match target {
        OutputTarget::InMemory => Volume::zeros(shape),
        OutputTarget::File(volume) => {
            if volume.shape() != shape {
                return Err(ObliqueError::ShapeMismatch {
                    path: volume.path().map(|p| p.to_path_buf()).unwrap_or_default(),
                    expected: shape.dims().to_vec(),
                    found: volume.shape().dims().to_vec(),
                });
            }
            volume
        }
    };

    let total = index.buffers().len();
    info!(buffers = total, shape = %shape, file_backed = volume.is_file_backed(), "Assembling volume");
    reporter.begin_stage(PipelineStage::Assembling, Some(total));
    for buffer_index in 0..total {
        cancel.check(buffer_index, total)?;
        let range = index.time_range(buffer_index);
        {
            let mut view = volume.view_mut();
            let slab = view.slice_mut(s![range.clone(), .., .., .., ..]);
            read_buffer_into(index, buffer_index, slab)?;
        }
        volume.flush_timepoints(range.start, range.end)?;
        reporter.advance(buffer_index + 1);
    }
    reporter.finish_stage();
    Ok(volume)
}

/// Assemble a single buffer into a heap volume of shape
/// (volumes_per_buffer, c, z, y, x).
pub fn assemble_buffer<T: Pixel>(index: &AcquisitionIndex, buffer_index: usize) -> Result<Volume<T>> {
    check_pixel_type::<T>(index)?;
    let mut volume = Volume::zeros(index.buffer_shape());
    read_buffer_into(index, buffer_index, volume.view_mut())?;
    Ok(volume)
}

fn check_pixel_type<T: Pixel>(index: &AcquisitionIndex) -> Result<()> {
    if T::PIXEL_TYPE != index.pixel_type() {
        return Err(ObliqueError::DtypeMismatch {
            path: index.buffers().first().cloned().unwrap_or_default(),
            expected: T::PIXEL_TYPE,
            found: index.pixel_type(),
        });
    }
    Ok(())
}

/// Decode buffer `buffer_index` into `out`, which covers that buffer's
/// timepoints. Raw pages are ordered (t, z, c) with channels innermost.
fn read_buffer_into<T: Pixel>(
    index: &AcquisitionIndex,
    buffer_index: usize,
    mut out: ArrayViewMut5<'_, T>,
) -> Result<()> {
    let path = &index.buffers()[buffer_index];
    let mut reader = BufferReader::open(path)?;
    if reader.pixel_type() != index.pixel_type() {
        return Err(ObliqueError::DtypeMismatch {
            path: path.clone(),
            expected: index.pixel_type(),
            found: reader.pixel_type(),
        });
    }
    if reader.frame_shape() != index.frame_shape() {
        let (expected, found) = (index.frame_shape(), reader.frame_shape());
        return Err(ObliqueError::ShapeMismatch {
            path: path.clone(),
            expected: vec![expected.0, expected.1],
            found: vec![found.0, found.1],
        });
    }

    let (vpb, channels, depth, _, _) = out.dim();
    let pages = index.pages_per_buffer();
    for t in 0..vpb {
        for z in 0..depth {
            for c in 0..channels {
                let page = reader.require_page::<T>(pages)?;
                out.slice_mut(s![t, c, z, .., ..])
                    .assign(&page.slice(s![TIMING_ROWS.., ..]));
            }
        }
    }
    debug!(buffer = buffer_index, path = %path.display(), pages, "Assembled buffer");
    Ok(())
}
