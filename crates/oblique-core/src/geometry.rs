//! Scan geometry of a tilted light-sheet acquisition and the plane
//! transforms derived from it.
//!
//! All 2D maps act on the (depth, height) plane of a single x column, in
//! (z, y) coordinate order. Width is never touched.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::acquisition::AcquisitionMetadata;
use crate::consts::{ASPECT_RATIO_TOLERANCE, DEFAULT_TILT_DEG};
use crate::error::{ObliqueError, Result};

/// Direction in which successive slices are displaced along the height axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    /// Slice `z` moves down by `round(z * step)` rows.
    #[default]
    Ascending,
    /// Mirror of `Ascending`: the last slice sits at the top.
    Descending,
}

/// Where the depth crop of a rotated volume is taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropAnchor {
    #[default]
    Center,
    Start,
    End,
}

/// Physical scan parameters shared by the transforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryParameters {
    pub scan_step_size_px: f64,
    pub voxel_aspect_ratio: f64,
    pub tilt_rad: f64,
}

impl GeometryParameters {
    /// Validate and build. All values must be finite and non-negative; a zero
    /// scan step is representable (it makes deshearing the identity).
    pub fn new(scan_step_size_px: f64, voxel_aspect_ratio: f64, tilt_rad: f64) -> Result<Self> {
        for (name, value) in [
            ("scan_step_size_px", scan_step_size_px),
            ("voxel_aspect_ratio", voxel_aspect_ratio),
            ("tilt_rad", tilt_rad),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ObliqueError::InvalidGeometry { name, value });
            }
        }
        if tilt_rad >= PI / 2.0 {
            return Err(ObliqueError::InvalidGeometry {
                name: "tilt_rad",
                value: tilt_rad,
            });
        }
        Ok(Self {
            scan_step_size_px,
            voxel_aspect_ratio,
            tilt_rad,
        })
    }

    /// Build from sidecar metadata. The tilt is taken from `tilt_rad` if
    /// given, then from the metadata, then the instrument default of 30°.
    pub fn from_metadata(meta: &AcquisitionMetadata, tilt_rad: Option<f64>) -> Result<Self> {
        let tilt_rad = tilt_rad
            .or(meta.tilt_rad)
            .unwrap_or_else(|| DEFAULT_TILT_DEG.to_radians());
        let geometry = Self::new(meta.scan_step_size_px, meta.voxel_aspect_ratio, tilt_rad)?;
        if !geometry.aspect_ratio_consistent() {
            warn!(
                voxel_aspect_ratio = geometry.voxel_aspect_ratio,
                expected = geometry.expected_voxel_aspect_ratio(),
                scan_step_size_px = geometry.scan_step_size_px,
                tilt_deg = tilt_rad.to_degrees(),
                "Voxel aspect ratio disagrees with scan step and tilt"
            );
        }
        Ok(geometry)
    }

    /// Aspect ratio implied by the scan step and tilt.
    pub fn expected_voxel_aspect_ratio(&self) -> f64 {
        self.scan_step_size_px * self.tilt_rad.tan()
    }

    /// Whether the recorded aspect ratio is within 5% of the implied one.
    pub fn aspect_ratio_consistent(&self) -> bool {
        let expected = self.expected_voxel_aspect_ratio();
        if expected <= 0.0 {
            return true;
        }
        (self.voxel_aspect_ratio - expected).abs() / expected <= ASPECT_RATIO_TOLERANCE
    }

    fn degenerate(&self, reason: impl Into<String>, height: usize, depth: usize) -> ObliqueError {
        ObliqueError::DegenerateGeometry {
            reason: reason.into(),
            height,
            depth,
            voxel_aspect_ratio: self.voxel_aspect_ratio,
            scan_step_size_px: self.scan_step_size_px,
            tilt_rad: self.tilt_rad,
        }
    }
}

/// Row-major 2x3 affine map on (z, y) points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2 {
    pub m: [[f64; 3]; 2],
}

impl Affine2 {
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub fn new(m: [[f64; 3]; 2]) -> Self {
        Self { m }
    }

    pub fn translation(dz: f64, dy: f64) -> Self {
        Self::new([[1.0, 0.0, dz], [0.0, 1.0, dy]])
    }

    /// Rotation by `angle` radians: `z' = cos·z − sin·y`, `y' = sin·z + cos·y`.
    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new([[cos, -sin, 0.0], [sin, cos, 0.0]])
    }

    /// The map that applies `self` first, then `next`.
    pub fn then(&self, next: &Affine2) -> Affine2 {
        let a = &self.m;
        let n = &next.m;
        let mut m = [[0.0; 3]; 2];
        for (r, row) in m.iter_mut().enumerate() {
            row[0] = n[r][0] * a[0][0] + n[r][1] * a[1][0];
            row[1] = n[r][0] * a[0][1] + n[r][1] * a[1][1];
            row[2] = n[r][0] * a[0][2] + n[r][1] * a[1][2] + n[r][2];
        }
        Affine2 { m }
    }

    pub fn inverse(&self) -> Option<Affine2> {
        let [[a, b, tz], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Affine2::new([
            [ia, ib, -(ia * tz + ib * ty)],
            [ic, id, -(ic * tz + id * ty)],
        ]))
    }

    #[inline]
    pub fn apply(&self, z: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        (
            m[0][0] * z + m[0][1] * y + m[0][2],
            m[1][0] * z + m[1][1] * y + m[1][2],
        )
    }
}

/// Extents of the rotated frame and the depth crop taken from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatedExtent {
    pub depth: usize,
    pub height: usize,
    pub crop_depth: usize,
    pub crop_start: usize,
}

/// Derived shear, scale and rotation extents for one (height, depth) frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineGeometry {
    pub height: usize,
    pub depth: usize,
    pub shear_angle: f64,
    pub shear_length: f64,
    pub y_shrink: f64,
    pub z_scaling: f64,
    /// Height after shear and scale.
    pub sheared_height: usize,
    /// Depth after shear and scale.
    pub sheared_depth: usize,
    pub rotated: Option<RotatedExtent>,
    tilt_rad: f64,
}

impl AffineGeometry {
    pub fn new(
        height: usize,
        depth: usize,
        geometry: &GeometryParameters,
        rotate: bool,
        anchor: CropAnchor,
    ) -> Result<Self> {
        let s = geometry.scan_step_size_px;
        if s <= 0.0 {
            return Err(ObliqueError::InvalidScanStep(s));
        }
        if height == 0 || depth == 0 {
            return Err(geometry.degenerate("empty input frame", height, depth));
        }

        let shear_angle = geometry.voxel_aspect_ratio.atan();
        let shear_length = (height as f64 * shear_angle.sin()).round();
        let y_shrink = (shear_length / ((PI - shear_angle) / 2.0).tan()).round();
        let z_scaling = (s * s + 1.0).sqrt();

        let sheared_height = height as f64 - y_shrink;
        let sheared_depth = (shear_length + depth as f64 * z_scaling).round();
        if sheared_height < 1.0 || sheared_depth < 1.0 {
            return Err(geometry.degenerate("sheared extent is empty", height, depth));
        }
        let sheared_height = sheared_height as usize;
        let sheared_depth = sheared_depth as usize;

        let rotated = if rotate {
            let (sin, cos) = geometry.tilt_rad.sin_cos();
            let (zs, ys) = (sheared_depth as f64, sheared_height as f64);
            let rot_depth = (zs * cos + ys * sin).round();
            let rot_height = (zs * sin + ys * cos).round();
            let crop_depth = (height as f64 * sin).round();
            if rot_depth < 1.0 || rot_height < 1.0 || crop_depth < 1.0 {
                return Err(geometry.degenerate("rotated extent is empty", height, depth));
            }
            if crop_depth > rot_depth {
                return Err(geometry.degenerate(
                    format!("crop depth {crop_depth} exceeds rotated depth {rot_depth}"),
                    height,
                    depth,
                ));
            }
            let (rot_depth, crop_depth) = (rot_depth as usize, crop_depth as usize);
            let crop_start = match anchor {
                CropAnchor::Center => (rot_depth - crop_depth) / 2,
                CropAnchor::Start => 0,
                CropAnchor::End => rot_depth - crop_depth,
            };
            Some(RotatedExtent {
                depth: rot_depth,
                height: rot_height as usize,
                crop_depth,
                crop_start,
            })
        } else {
            None
        };

        Ok(Self {
            height,
            depth,
            shear_angle,
            shear_length,
            y_shrink,
            z_scaling,
            sheared_height,
            sheared_depth,
            rotated,
            tilt_rad: geometry.tilt_rad,
        })
    }

    /// Output (depth, height) of the plane transform.
    pub fn output_extent(&self) -> (usize, usize) {
        match self.rotated {
            Some(r) => (r.crop_depth, r.height),
            None => (self.sheared_depth, self.sheared_height),
        }
    }

    /// Map from input (z, y) to output (z, y).
    pub fn forward(&self, direction: ShiftDirection) -> Affine2 {
        let sin = self.shear_angle.sin();
        let cos = self.shear_angle.cos();
        let shear = match direction {
            ShiftDirection::Ascending => Affine2::new([[self.z_scaling, sin, 0.0], [0.0, cos, 0.0]]),
            ShiftDirection::Descending => Affine2::new([
                [self.z_scaling, -sin, sin * (self.height as f64 - 1.0)],
                [0.0, cos, 0.0],
            ]),
        };
        match self.rotated {
            Some(r) => {
                let lift = self.tilt_rad.sin() * self.sheared_height as f64;
                shear
                    .then(&Affine2::rotation(self.tilt_rad))
                    .then(&Affine2::translation(lift - r.crop_start as f64, 0.0))
            }
            None => shear,
        }
    }

    /// Map from output (z, y) back to the input point it samples.
    pub fn inverse(&self, direction: ShiftDirection) -> Result<Affine2> {
        self.forward(direction).inverse().ok_or_else(|| ObliqueError::DegenerateGeometry {
            reason: "singular plane transform".into(),
            height: self.height,
            depth: self.depth,
            voxel_aspect_ratio: self.shear_angle.tan(),
            scan_step_size_px: (self.z_scaling * self.z_scaling - 1.0).sqrt(),
            tilt_rad: self.tilt_rad,
        })
    }
}
