use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::compute::DevicePreference;
use crate::geometry::{CropAnchor, ShiftDirection};
use crate::transform::{AffineOptions, DeshearOptions};

/// Which representation of the acquisition to write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Assembled but uncorrected.
    Raw,
    /// Integer-shift deshear.
    #[default]
    Native,
    /// Cubic-resampled deshear, optionally rotated.
    Traditional,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Native => "native",
            Self::Traditional => "traditional",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "native" => Ok(Self::Native),
            "traditional" => Ok(Self::Traditional),
            other => Err(format!(
                "unknown view '{other}' (expected raw, native or traditional)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrategy {
    /// Stream when the raw volume exceeds `LOW_MEMORY_THRESHOLD_BYTES`.
    #[default]
    Auto,
    /// Assemble the whole acquisition in memory, then transform it.
    Eager,
    /// Transform buffer by buffer straight into the mapped output file.
    Streaming,
}

impl fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Eager => write!(f, "Eager"),
            Self::Streaming => write!(f, "Streaming"),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Acquisition directory holding `data/` and `metadata/`. Config files
    /// may omit it when the command line supplies the directory.
    #[serde(default)]
    pub input: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Output file stem. Defaults to the input directory name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub view: View,
    /// Rotate the traditional view into the sample frame.
    #[serde(default)]
    pub rotate: bool,
    /// Light-sheet tilt in degrees. Falls back to the sidecar `tilt`, then 30°.
    #[serde(default)]
    pub tilt_deg: Option<f64>,
    #[serde(default)]
    pub direction: ShiftDirection,
    #[serde(default)]
    pub crop_anchor: CropAnchor,
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub memory: MemoryStrategy,
    /// Write BigTIFF even when the output would fit classic TIFF.
    #[serde(default)]
    pub force_bigtiff: bool,
    /// Also save a max-intensity projection per channel next to the output.
    #[serde(default)]
    pub preview: bool,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: default_output_dir(),
            name: None,
            view: View::default(),
            rotate: false,
            tilt_deg: None,
            direction: ShiftDirection::default(),
            crop_anchor: CropAnchor::default(),
            device: DevicePreference::default(),
            memory: MemoryStrategy::default(),
            force_bigtiff: false,
            preview: false,
        }
    }

    /// Output file stem.
    pub fn acquisition_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.input
            .canonicalize()
            .ok()
            .as_deref()
            .unwrap_or(self.input.as_path())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "acquisition".into())
    }

    /// `<output_dir>/<name>-<view>.tif`
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.tif", self.acquisition_name(), self.view))
    }

    /// Path of the projection preview for channel `c`.
    pub fn preview_path(&self, c: usize) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}-c{c}.png",
            self.acquisition_name(),
            self.view
        ))
    }

    pub fn tilt_rad(&self) -> Option<f64> {
        self.tilt_deg.map(f64::to_radians)
    }

    pub fn deshear_options(&self) -> DeshearOptions {
        DeshearOptions {
            direction: self.direction,
        }
    }

    pub fn affine_options(&self) -> AffineOptions {
        AffineOptions {
            rotate: self.rotate,
            direction: self.direction,
            crop_anchor: self.crop_anchor,
        }
    }
}
