use std::path::PathBuf;

use thiserror::Error;

use crate::pixel::PixelType;

#[derive(Error, Debug)]
pub enum ObliqueError {
    #[error("Malformed metadata at line {line_number}: {line:?} (expected `key: value`)")]
    MalformedMetadata { line_number: usize, line: String },

    #[error("Missing required metadata key: {0}")]
    MissingKey(String),

    #[error("Invalid value for metadata key {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Scan step must be positive, got {0} px")]
    InvalidScanStep(f64),

    #[error("Invalid geometry parameter {name} = {value}")]
    InvalidGeometry { name: &'static str, value: f64 },

    #[error("Unsupported pixel format in {path}: {detail}")]
    UnsupportedPixelType { path: PathBuf, detail: String },

    #[error("No buffer files found in {0}")]
    MissingData(PathBuf),

    #[error("No readable metadata file found in {0}")]
    MissingMetadata(PathBuf),

    #[error("Shape mismatch in {path}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Pixel type mismatch in {path}: expected {expected}, found {found}")]
    DtypeMismatch {
        path: PathBuf,
        expected: PixelType,
        found: PixelType,
    },

    #[error("Failed to read buffer {path}: {reason}")]
    BufferRead { path: PathBuf, reason: String },

    #[error(
        "Degenerate geometry ({reason}): height={height}, depth={depth}, \
         voxel_aspect_ratio={voxel_aspect_ratio}, scan_step_size_px={scan_step_size_px}, \
         tilt_rad={tilt_rad}"
    )]
    DegenerateGeometry {
        reason: String,
        height: usize,
        depth: usize,
        voxel_aspect_ratio: f64,
        scan_step_size_px: f64,
        tilt_rad: f64,
    },

    #[error("Cannot write output {path}: {source}")]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported volume rank {ndim} (expected 3 to 5 dimensions)")]
    UnsupportedShape { ndim: usize },

    #[error("Cancelled after {completed} of {total} units")]
    Cancelled { completed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("GPU error: {0}")]
    GpuError(String),
}

/// Failure category, used by batch callers to decide how to report an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InputIo,
    Geometry,
    OutputIo,
    Cancelled,
    Compute,
}

impl ObliqueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedMetadata { .. }
            | Self::MissingKey(_)
            | Self::InvalidValue { .. }
            | Self::InvalidScanStep(_)
            | Self::InvalidGeometry { .. }
            | Self::UnsupportedPixelType { .. } => ErrorKind::Configuration,
            Self::MissingData(_)
            | Self::MissingMetadata(_)
            | Self::ShapeMismatch { .. }
            | Self::DtypeMismatch { .. }
            | Self::BufferRead { .. }
            | Self::Io(_)
            | Self::Tiff(_) => ErrorKind::InputIo,
            Self::DegenerateGeometry { .. } => ErrorKind::Geometry,
            Self::OutputIo { .. } | Self::UnsupportedShape { .. } | Self::ImageError(_) => {
                ErrorKind::OutputIo
            }
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::GpuError(_) => ErrorKind::Compute,
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObliqueError>;
