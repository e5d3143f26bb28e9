use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ObliqueError, Result};
use crate::io::metadata::load_metadata;

/// Typed acquisition configuration read from the sidecar metadata file.
///
/// Every field is parsed and validated once, when the value is built. The
/// original string map is kept so it can be written out alongside results.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionMetadata {
    /// Lateral shift between consecutive slices, in pixels.
    pub scan_step_size_px: f64,
    /// Ratio of the physical slice spacing to the lateral pixel size.
    pub voxel_aspect_ratio: f64,
    /// Lateral pixel size at the sample, in micrometers.
    pub sample_px_um: f64,
    pub volumes_per_buffer: usize,
    /// Channel labels in acquisition order.
    pub channels_per_slice: Vec<String>,
    pub slices_per_volume: usize,
    pub volumes_per_s: f64,
    pub buffer_time_s: f64,
    pub delay_s: Option<f64>,
    pub description: Option<String>,
    /// Light-sheet tilt in radians, when the instrument records it.
    pub tilt_rad: Option<f64>,
    raw: BTreeMap<String, String>,
}

impl AcquisitionMetadata {
    pub fn from_map(raw: BTreeMap<String, String>) -> Result<Self> {
        let scan_step_size_px: f64 = required(&raw, "scan_step_size_px")?;
        if !scan_step_size_px.is_finite() || scan_step_size_px <= 0.0 {
            return Err(ObliqueError::InvalidScanStep(scan_step_size_px));
        }

        let voxel_aspect_ratio: f64 = required(&raw, "voxel_aspect_ratio")?;
        if !voxel_aspect_ratio.is_finite() || voxel_aspect_ratio < 0.0 {
            return Err(invalid(&raw, "voxel_aspect_ratio"));
        }
        let sample_px_um = positive(&raw, "sample_px_um")?;
        let volumes_per_buffer = count(&raw, "volumes_per_buffer")?;
        let slices_per_volume = count(&raw, "slices_per_volume")?;
        let volumes_per_s = positive(&raw, "volumes_per_s")?;

        let buffer_time_s: f64 = required(&raw, "buffer_time_s")?;
        if !buffer_time_s.is_finite() || buffer_time_s < 0.0 {
            return Err(invalid(&raw, "buffer_time_s"));
        }

        let channels_text = raw
            .get("channels_per_slice")
            .ok_or_else(|| ObliqueError::MissingKey("channels_per_slice".into()))?;
        let channels_per_slice = parse_channel_list(channels_text);
        if channels_per_slice.is_empty() {
            return Err(invalid(&raw, "channels_per_slice"));
        }

        let delay_s = match raw.get("delay_s").map(|s| s.trim()) {
            None | Some("") | Some("None") | Some("null") => None,
            Some(text) => Some(
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| invalid(&raw, "delay_s"))?,
            ),
        };
        let tilt_rad = match raw.get("tilt") {
            None => None,
            Some(_) => Some(required::<f64>(&raw, "tilt")?),
        };
        let description = raw
            .get("description")
            .filter(|d| !d.is_empty())
            .cloned();

        Ok(Self {
            scan_step_size_px,
            voxel_aspect_ratio,
            sample_px_um,
            volumes_per_buffer,
            channels_per_slice,
            slices_per_volume,
            volumes_per_s,
            buffer_time_s,
            delay_s,
            description,
            tilt_rad,
            raw,
        })
    }

    /// Load and validate a sidecar metadata file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_map(load_metadata(path)?)
    }

    /// The unparsed source map.
    pub fn raw(&self) -> &BTreeMap<String, String> {
        &self.raw
    }

    pub fn num_channels(&self) -> usize {
        self.channels_per_slice.len()
    }

    /// Seconds between the starts of consecutive volumes.
    pub fn frame_interval_s(&self) -> f64 {
        1.0 / self.volumes_per_s + self.buffer_time_s + self.delay_s.unwrap_or(0.0)
    }
}

/// Split a channel list such as `['488', '405']` or `488 405` into labels.
pub fn parse_channel_list(text: &str) -> Vec<String> {
    text.trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')'])
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|label| label.trim_matches(|c| c == '\'' || c == '"'))
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn required<T: FromStr>(raw: &BTreeMap<String, String>, key: &str) -> Result<T> {
    let value = raw
        .get(key)
        .ok_or_else(|| ObliqueError::MissingKey(key.to_string()))?;
    value.parse().map_err(|_| invalid(raw, key))
}

fn positive(raw: &BTreeMap<String, String>, key: &str) -> Result<f64> {
    let value: f64 = required(raw, key)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(raw, key))
    }
}

/// A count of at least one, written either as an integer or a whole float.
fn count(raw: &BTreeMap<String, String>, key: &str) -> Result<usize> {
    let value: f64 = required(raw, key)?;
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(invalid(raw, key))
    }
}

fn invalid(raw: &BTreeMap<String, String>, key: &str) -> ObliqueError {
    ObliqueError::InvalidValue {
        key: key.to_string(),
        value: raw.get(key).cloned().unwrap_or_default(),
    }
}
