use std::sync::Arc;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::Affine2;

use super::cpu::CpuBackend;

/// Numeric backend for the resampling-heavy parts of the pipeline.
///
/// Implementations must be interchangeable: given the same input they
/// produce the same values up to floating-point rounding.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    /// Resample every (depth, height) plane of `planes` onto an `out_dim`
    /// grid with cubic convolution.
    ///
    /// `planes` is indexed (plane, z, y). `map` takes an output (z, y) point
    /// to the input point it samples; points outside the input plane give
    /// `fill`. Returns an array of shape (plane, out_dim.0, out_dim.1).
    fn resample(
        &self,
        planes: ArrayView3<'_, f32>,
        out_dim: (usize, usize),
        map: &Affine2,
        fill: f32,
    ) -> Result<Array3<f32>>;
}

/// Which backend `create_backend` should try to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// GPU when one is compiled in and available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Select a backend. Falls back to the CPU when the GPU backend is not
/// compiled in or cannot be initialised.
pub fn create_backend(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    match preference {
        DevicePreference::Cpu => Arc::new(CpuBackend),
        DevicePreference::Auto | DevicePreference::Gpu => gpu_or_cpu(preference),
    }
}

#[cfg(feature = "gpu")]
fn gpu_or_cpu(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    match super::wgpu_backend::WgpuBackend::new() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            if *preference == DevicePreference::Gpu {
                tracing::warn!("GPU requested but unavailable ({e}), using CPU");
            } else {
                tracing::debug!("No GPU backend ({e}), using CPU");
            }
            Arc::new(CpuBackend)
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn gpu_or_cpu(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    if *preference == DevicePreference::Gpu {
        tracing::warn!("GPU requested but this build has no GPU support, using CPU");
    }
    Arc::new(CpuBackend)
}
