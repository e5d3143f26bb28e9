use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::acquisition::metadata::AcquisitionMetadata;
use crate::consts::TIMING_ROWS;
use crate::error::{ObliqueError, Result};
use crate::io::buffer::BufferReader;
use crate::pixel::PixelType;
use crate::volume::VolumeShape;

/// Everything known about an acquisition before any pixel data is loaded.
///
/// Buffers are ordered by file name, which is acquisition time order. Each
/// buffer's first page is inspected to validate frame shape and pixel type.
#[derive(Clone, Debug)]
pub struct AcquisitionIndex {
    buffers: Vec<PathBuf>,
    frame_shape: (usize, usize),
    pixel_type: PixelType,
    metadata: AcquisitionMetadata,
}

impl AcquisitionIndex {
    /// Index an acquisition directory holding `data/*.tif` buffers and a
    /// `metadata/*.txt` sidecar.
    pub fn build(dir: &Path) -> Result<Self> {
        let data_dir = dir.join("data");
        let buffers = list_files(&data_dir, &["tif", "tiff"])
            .map_err(|_| ObliqueError::MissingData(data_dir.clone()))?;
        if buffers.is_empty() {
            return Err(ObliqueError::MissingData(data_dir));
        }

        let metadata_dir = dir.join("metadata");
        let candidates = list_files(&metadata_dir, &["txt"]).unwrap_or_default();
        let mut metadata = None;
        for (i, path) in candidates.iter().enumerate() {
            match fs::read_to_string(path) {
                Ok(text) => {
                    for ignored in &candidates[i + 1..] {
                        debug!(path = %ignored.display(), "Ignoring additional metadata file");
                    }
                    let map = crate::io::metadata::parse_metadata(&text)?;
                    metadata = Some(AcquisitionMetadata::from_map(map)?);
                    break;
                }
                Err(e) => debug!(path = %path.display(), error = %e, "Unreadable metadata file"),
            }
        }
        let metadata = metadata.ok_or(ObliqueError::MissingMetadata(metadata_dir))?;

        Self::from_parts(buffers, metadata)
    }

    /// Build an index from an explicit buffer list in any order.
    pub fn from_parts(mut buffers: Vec<PathBuf>, metadata: AcquisitionMetadata) -> Result<Self> {
        let Some(first) = buffers.first().cloned() else {
            return Err(ObliqueError::MissingData(PathBuf::new()));
        };
        buffers.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut expected: Option<((usize, usize), PixelType)> = None;
        for path in &buffers {
            let reader = BufferReader::open(path)?;
            let shape = reader.frame_shape();
            let (expected_shape, expected_type) =
                *expected.get_or_insert((shape, reader.pixel_type()));

            if shape != expected_shape {
                return Err(ObliqueError::ShapeMismatch {
                    path: path.clone(),
                    expected: vec![expected_shape.0, expected_shape.1],
                    found: vec![shape.0, shape.1],
                });
            }
            if reader.pixel_type() != expected_type {
                return Err(ObliqueError::DtypeMismatch {
                    path: path.clone(),
                    expected: expected_type,
                    found: reader.pixel_type(),
                });
            }
            debug!(path = %path.display(), height = shape.0, width = shape.1, "Indexed buffer");
        }

        let Some(((height, width), pixel_type)) = expected else {
            return Err(ObliqueError::MissingData(first));
        };
        if height <= TIMING_ROWS {
            return Err(ObliqueError::ShapeMismatch {
                path: buffers[0].clone(),
                expected: vec![TIMING_ROWS + 1, width],
                found: vec![height, width],
            });
        }

        let index = Self {
            buffers,
            frame_shape: (height, width),
            pixel_type,
            metadata,
        };
        info!(
            buffers = index.buffers.len(),
            shape = %index.shape(),
            pixel_type = %index.pixel_type,
            "Indexed acquisition"
        );
        Ok(index)
    }

    /// Logical (t, c, z, y, x) shape of the assembled volume, timing rows
    /// excluded.
    pub fn shape(&self) -> VolumeShape {
        let (height, width) = self.frame_shape;
        VolumeShape {
            t: self.metadata.volumes_per_buffer * self.buffers.len(),
            c: self.num_channels(),
            z: self.metadata.slices_per_volume,
            y: height - TIMING_ROWS,
            x: width,
        }
    }

    /// Shape of the volume held by a single buffer.
    pub fn buffer_shape(&self) -> VolumeShape {
        self.shape().with_t(self.metadata.volumes_per_buffer)
    }

    pub fn buffers(&self) -> &[PathBuf] {
        &self.buffers
    }

    pub fn num_channels(&self) -> usize {
        self.metadata.num_channels()
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn metadata(&self) -> &AcquisitionMetadata {
        &self.metadata
    }

    pub fn volumes_per_buffer(&self) -> usize {
        self.metadata.volumes_per_buffer
    }

    /// Raw (height, width) of every page, timing rows included.
    pub fn frame_shape(&self) -> (usize, usize) {
        self.frame_shape
    }

    /// Pages each buffer must hold.
    pub fn pages_per_buffer(&self) -> usize {
        self.buffer_shape().planes()
    }

    /// Size of the assembled volume in bytes.
    pub fn raw_bytes(&self) -> usize {
        self.shape().len() * self.pixel_type.byte_size()
    }

    /// Timepoints covered by buffer `buffer_index`.
    pub fn time_range(&self, buffer_index: usize) -> Range<usize> {
        let vpb = self.metadata.volumes_per_buffer;
        buffer_index * vpb..(buffer_index + 1) * vpb
    }

    /// Raw page holding timepoint `t`, slice `z`, channel `c` of a buffer.
    /// Channels are innermost.
    pub fn page_index(&self, t: usize, z: usize, c: usize) -> usize {
        (t * self.metadata.slices_per_volume + z) * self.num_channels() + c
    }
}

fn list_files(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
