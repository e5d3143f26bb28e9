use std::fs;
use std::sync::Arc;
use std::time::Instant;

use ndarray::s;
use tracing::info;

use crate::acquisition::AcquisitionIndex;
use crate::assemble::{assemble_buffer, assemble_with, OutputTarget};
use crate::calibration::Calibration;
use crate::compute::ComputeBackend;
use crate::consts::LOW_MEMORY_THRESHOLD_BYTES;
use crate::error::{ObliqueError, Result};
use crate::geometry::GeometryParameters;
use crate::io::preview::{max_projection, save_projection};
use crate::io::writer::{self, WriterOptions};
use crate::pixel::{Pixel, PixelType};
use crate::transform::{affine, affine_into, affine_shape, deshear, deshear_into, deshear_shape};
use crate::volume::{Volume, VolumeShape};

use super::config::{MemoryStrategy, PipelineConfig, View};
use super::types::{
    CancellationToken, NoOpReporter, PipelineReport, PipelineStage, ProgressReporter,
};

/// Decide whether to transform buffer by buffer into the mapped output.
pub(super) fn should_stream(config: &PipelineConfig, index: &AcquisitionIndex) -> bool {
    match config.memory {
        MemoryStrategy::Eager => false,
        MemoryStrategy::Streaming => true,
        MemoryStrategy::Auto => index.raw_bytes() > LOW_MEMORY_THRESHOLD_BYTES,
    }
}

/// Index, assemble, transform and write one acquisition.
///
/// The output is written to [`PipelineConfig::output_path`]. Until the run
/// completes the file carries an `.incomplete` marker.
pub fn run_pipeline(
    config: &PipelineConfig,
    backend: Arc<dyn ComputeBackend>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancellationToken,
) -> Result<PipelineReport> {
    let started = Instant::now();

    reporter.begin_stage(PipelineStage::Indexing, None);
    let index = AcquisitionIndex::build(&config.input)?;
    reporter.finish_stage();

    let run = Run {
        config,
        index: &index,
        backend: backend.as_ref(),
        reporter: reporter.as_ref(),
        cancel,
    };
    let (output_shape, streamed) = match index.pixel_type() {
        PixelType::U8 => run.execute::<u8>()?,
        PixelType::U16 => run.execute::<u16>()?,
        PixelType::F32 => run.execute::<f32>()?,
    };

    let report = PipelineReport {
        output: config.output_path(),
        view: config.view,
        input_shape: index.shape(),
        output_shape,
        streamed,
        device: backend.name().to_string(),
        elapsed: started.elapsed(),
    };
    info!(
        output = %report.output.display(),
        view = %report.view,
        shape = %report.output_shape,
        streamed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Pipeline complete"
    );
    Ok(report)
}

/// [`run_pipeline`] with the configured device, no progress output and no
/// external cancellation.
pub fn run_pipeline_simple(config: &PipelineConfig) -> Result<PipelineReport> {
    let backend = crate::compute::create_backend(&config.device);
    run_pipeline(config, backend, Arc::new(NoOpReporter), &CancellationToken::new())
}

struct Run<'a> {
    config: &'a PipelineConfig,
    index: &'a AcquisitionIndex,
    backend: &'a dyn ComputeBackend,
    reporter: &'a dyn ProgressReporter,
    cancel: &'a CancellationToken,
}

impl Run<'_> {
    fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            force_bigtiff: self.config.force_bigtiff,
        }
    }

    fn execute<T: Pixel>(&self) -> Result<(VolumeShape, bool)> {
        let config = self.config;
        let meta = self.index.metadata();
        let geometry = match config.view {
            View::Raw => None,
            View::Native | View::Traditional => {
                Some(GeometryParameters::from_metadata(meta, config.tilt_rad())?)
            }
        };

        let mut calibration = Calibration::from_metadata(meta);
        if config.view == View::Traditional {
            // Resampled voxels are cubic.
            let pixel_size_um = calibration.pixel_size_um;
            calibration = calibration.with_z_step(pixel_size_um);
        }

        let output_shape = match (&geometry, config.view) {
            (_, View::Raw) | (None, _) => self.index.shape(),
            (Some(g), View::Native) => deshear_shape(self.index.shape(), g),
            (Some(g), View::Traditional) => affine_shape(self.index.shape(), g, &config.affine_options())?,
        };

        fs::create_dir_all(&config.output_dir)
            .map_err(|e| ObliqueError::output(&config.output_dir, e))?;
        let path = config.output_path();
        let streamed = should_stream(config, self.index);
        info!(
            input = %config.input.display(),
            view = %config.view,
            pixel_type = %T::PIXEL_TYPE,
            raw_bytes = self.index.raw_bytes(),
            streamed,
            "Running pipeline"
        );

        let output = if streamed {
            self.streamed::<T>(geometry.as_ref(), output_shape, &calibration)?
        } else {
            self.eager::<T>(geometry.as_ref())?
        };

        if config.preview {
            self.save_previews(&output)?;
        }
        self.reporter.begin_stage(PipelineStage::Writing, None);
        writer::write_with(&path, output, &calibration, &self.writer_options())?;
        self.reporter.finish_stage();
        Ok((output_shape, streamed))
    }

    /// Assemble everything in memory, then transform.
    fn eager<T: Pixel>(
        &self,
        geometry: Option<&GeometryParameters>,
    ) -> Result<Volume<T>> {
        let raw = assemble_with(self.index, OutputTarget::InMemory, self.reporter, self.cancel)?;
        match (self.config.view, geometry) {
            (View::Native, Some(g)) => deshear(
                &raw,
                g,
                &self.config.deshear_options(),
                self.reporter,
                self.cancel,
            ),
            (View::Traditional, Some(g)) => affine(
                &raw,
                g,
                &self.config.affine_options(),
                self.backend,
                self.reporter,
                self.cancel,
            ),
            _ => Ok(raw),
        }
    }

    /// Allocate the output file once and fill it buffer by buffer.
    fn streamed<T: Pixel>(
        &self,
        geometry: Option<&GeometryParameters>,
        output_shape: VolumeShape,
        calibration: &Calibration,
    ) -> Result<Volume<T>> {
        let target = writer::allocate_with::<T>(
            &self.config.output_path(),
            output_shape,
            calibration,
            &self.writer_options(),
        )?;

        let (view, geometry) = match (self.config.view, geometry) {
            (View::Raw, _) | (_, None) => {
                return assemble_with(self.index, OutputTarget::File(target), self.reporter, self.cancel);
            }
            (view, Some(g)) => (view, g),
        };

        let mut target = target;
        let total = self.index.buffers().len();
        let stage = if view == View::Native {
            PipelineStage::Deshearing
        } else {
            PipelineStage::Resampling
        };
        self.reporter.begin_stage(stage, Some(total));
        for buffer_index in 0..total {
            self.cancel.check(buffer_index, total)?;
            let raw = assemble_buffer::<T>(self.index, buffer_index)?;
            let range = self.index.time_range(buffer_index);
            {
                let mut out = target.view_mut();
                let slab = out.slice_mut(s![range.clone(), .., .., .., ..]);
                if view == View::Native {
                    deshear_into(
                        raw.view(),
                        slab,
                        geometry,
                        &self.config.deshear_options(),
                        &NoOpReporter,
                        self.cancel,
                    )?;
                } else {
                    affine_into(
                        raw.view(),
                        slab,
                        geometry,
                        &self.config.affine_options(),
                        self.backend,
                        &NoOpReporter,
                        self.cancel,
                    )?;
                }
            }
            target.flush_timepoints(range.start, range.end)?;
            self.reporter.advance(buffer_index + 1);
        }
        self.reporter.finish_stage();
        Ok(target)
    }

    fn save_previews<T: Pixel>(&self, volume: &Volume<T>) -> Result<()> {
        for c in 0..volume.shape().c {
            if let Some(projection) = max_projection(volume, 0, c) {
                save_projection(&self.config.preview_path(c), projection.view())?;
            }
        }
        Ok(())
    }
}
