/// Rows burned into the top of every raw frame by the acquisition hardware.
/// Always cropped during assembly.
pub const TIMING_ROWS: usize = 8;

/// Default angle between the light-sheet propagation axis and the detection axis.
pub const DEFAULT_TILT_DEG: f64 = 30.0;

/// Raw volume size (in bytes) above which the pipeline switches to
/// buffer-by-buffer streaming into the output file. Default: 1 GiB.
pub const LOW_MEMORY_THRESHOLD_BYTES: usize = 1_073_741_824;

/// Number of x-planes resampled together by the affine transform.
/// Bounds the f32 working set to roughly `chunk * depth * height * 8` bytes.
pub const RESAMPLE_CHUNK_COLUMNS: usize = 64;

/// Cubic convolution kernel parameter (Keys). -0.5 gives third-order accuracy.
pub const CUBIC_A: f64 = -0.5;

/// Value written where the inverse map falls outside the input plane.
pub const FILL_VALUE: f32 = 0.0;

/// Relative disagreement between the sidecar voxel aspect ratio and
/// `scan_step * tan(tilt)` above which a warning is logged.
pub const ASPECT_RATIO_TOLERANCE: f64 = 0.05;

/// Alignment (in bytes) of the contiguous pixel block in written TIFF files.
/// Keeps the mapped pixel slice castable for every supported pixel type.
pub const TIFF_DATA_ALIGNMENT: u64 = 4096;

/// Version string written into the ImageJ description header.
pub const IMAGEJ_VERSION: &str = "1.11a";
