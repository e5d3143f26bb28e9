use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};
use rayon::prelude::*;

use crate::consts::CUBIC_A;
use crate::error::Result;
use crate::geometry::Affine2;

use super::ComputeBackend;

/// CPU backend using Rayon for parallelism.
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn resample(
        &self,
        planes: ArrayView3<'_, f32>,
        out_dim: (usize, usize),
        map: &Affine2,
        fill: f32,
    ) -> Result<Array3<f32>> {
        let mut out = Array3::<f32>::zeros((planes.len_of(Axis(0)), out_dim.0, out_dim.1));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(planes.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut target, source)| resample_into(source, &mut target, map, fill));
        Ok(out)
    }
}

/// Resample a single plane onto an `out_dim` grid.
pub fn resample_plane(
    plane: ArrayView2<'_, f32>,
    out_dim: (usize, usize),
    map: &Affine2,
    fill: f32,
) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros(out_dim);
    resample_into(plane, &mut out.view_mut(), map, fill);
    out
}

fn resample_into(plane: ArrayView2<'_, f32>, out: &mut ArrayViewMut2<'_, f32>, map: &Affine2, fill: f32) {
    for ((oz, oy), value) in out.indexed_iter_mut() {
        let (z, y) = map.apply(oz as f64, oy as f64);
        *value = sample_cubic(&plane, z, y).unwrap_or(fill);
    }
}

/// Keys cubic convolution weight.
#[inline]
pub(crate) fn cubic_weight(t: f64) -> f64 {
    let a = CUBIC_A;
    let t = t.abs();
    if t <= 1.0 {
        ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((a * t - 5.0 * a) * t + 8.0 * a) * t - 4.0 * a
    } else {
        0.0
    }
}

/// Tolerance for points that land a hair outside the plane through rounding.
const EDGE_EPSILON: f64 = 1e-6;

/// Sample `plane` at fractional (z, y). `None` outside `[0, n-1]` on either
/// axis; taps beyond the edge clamp to it.
pub(crate) fn sample_cubic(plane: &ArrayView2<'_, f32>, z: f64, y: f64) -> Option<f32> {
    let (nz, ny) = plane.dim();
    if nz == 0 || ny == 0 {
        return None;
    }
    let max_z = (nz - 1) as f64;
    let max_y = (ny - 1) as f64;
    if !(-EDGE_EPSILON..=max_z + EDGE_EPSILON).contains(&z)
        || !(-EDGE_EPSILON..=max_y + EDGE_EPSILON).contains(&y)
    {
        return None;
    }
    let z = z.clamp(0.0, max_z);
    let y = y.clamp(0.0, max_y);

    let z0 = z.floor();
    let y0 = y.floor();
    let fz = z - z0;
    let fy = y - y0;
    let (z0, y0) = (z0 as isize, y0 as isize);

    let mut wz = [0.0; 4];
    let mut wy = [0.0; 4];
    for k in 0..4 {
        wz[k] = cubic_weight(fz - (k as f64 - 1.0));
        wy[k] = cubic_weight(fy - (k as f64 - 1.0));
    }

    let clamp_z = |i: isize| i.clamp(0, nz as isize - 1) as usize;
    let clamp_y = |i: isize| i.clamp(0, ny as isize - 1) as usize;

    let mut acc = 0.0f64;
    for (kz, wzk) in wz.iter().enumerate() {
        if *wzk == 0.0 {
            continue;
        }
        let iz = clamp_z(z0 + kz as isize - 1);
        let mut row = 0.0f64;
        for (ky, wyk) in wy.iter().enumerate() {
            if *wyk == 0.0 {
                continue;
            }
            let iy = clamp_y(y0 + ky as isize - 1);
            row += *wyk * plane[[iz, iy]] as f64;
        }
        acc += *wzk * row;
    }
    Some(acc as f32)
}
