use std::collections::BTreeMap;

use crate::acquisition::AcquisitionMetadata;

/// Physical calibration carried into written volumes.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    /// Lateral (x and y) pixel size in micrometers.
    pub pixel_size_um: f64,
    /// Spacing between depth slices in micrometers.
    pub z_step_um: f64,
    /// Time between consecutive volumes in seconds.
    pub frame_interval_s: f64,
    pub description: String,
    pub channel_labels: Vec<String>,
    /// Source sidecar metadata, written as auxiliary description text.
    pub metadata: BTreeMap<String, String>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_size_um: 1.0,
            z_step_um: 1.0,
            frame_interval_s: 1.0,
            description: String::new(),
            channel_labels: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl Calibration {
    pub fn from_metadata(meta: &AcquisitionMetadata) -> Self {
        Self {
            pixel_size_um: meta.sample_px_um,
            z_step_um: meta.sample_px_um * meta.voxel_aspect_ratio,
            frame_interval_s: meta.frame_interval_s(),
            description: meta.description.clone().unwrap_or_default(),
            channel_labels: meta.channels_per_slice.clone(),
            metadata: meta.raw().clone(),
        }
    }

    pub fn with_z_step(mut self, z_step_um: f64) -> Self {
        self.z_step_um = z_step_um;
        self
    }
}
