//! wgpu-based GPU compute backend (Metal / Vulkan / DX12).

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ndarray::{s, Array3, ArrayView3};
use wgpu::util::DeviceExt;

use crate::error::{ObliqueError, Result};
use crate::geometry::Affine2;

use super::ComputeBackend;

// Same kernel and boundary rules as the CPU path in `cpu.rs`.
const RESAMPLE_CUBIC_WGSL: &str = r"
struct Params {
    planes: u32, in_z: u32, in_y: u32, out_z: u32,
    out_y: u32, fill: f32, a: f32, eps: f32,
    m00: f32, m01: f32, m02: f32, m10: f32,
    m11: f32, m12: f32, _pad0: f32, _pad1: f32,
}
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;

fn weight(x: f32) -> f32 {
    let t = abs(x);
    let a = params.a;
    if t <= 1.0 { return ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0; }
    if t < 2.0 { return ((a * t - 5.0 * a) * t + 8.0 * a) * t - 4.0 * a; }
    return 0.0;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let oy = gid.x; let oz = gid.y; let p = gid.z;
    if oy >= params.out_y || oz >= params.out_z || p >= params.planes { return; }
    let out_index = (p * params.out_z + oz) * params.out_y + oy;

    let fz = f32(oz); let fy = f32(oy);
    var z = params.m00 * fz + params.m01 * fy + params.m02;
    var y = params.m10 * fz + params.m11 * fy + params.m12;
    let max_z = f32(params.in_z - 1u);
    let max_y = f32(params.in_y - 1u);
    if z < -params.eps || z > max_z + params.eps || y < -params.eps || y > max_y + params.eps {
        output[out_index] = params.fill;
        return;
    }
    z = clamp(z, 0.0, max_z);
    y = clamp(y, 0.0, max_y);
    let z0 = floor(z); let y0 = floor(y);
    let dz = z - z0; let dy = y - y0;
    let base = p * params.in_z * params.in_y;

    var acc = 0.0;
    for (var kz = 0; kz < 4; kz++) {
        let wz = weight(dz - f32(kz - 1));
        let iz = u32(clamp(i32(z0) + kz - 1, 0, i32(params.in_z) - 1));
        var row = 0.0;
        for (var ky = 0; ky < 4; ky++) {
            let wy = weight(dy - f32(ky - 1));
            let iy = u32(clamp(i32(y0) + ky - 1, 0, i32(params.in_y) - 1));
            row += wy * input[base + iz * params.in_y + iy];
        }
        acc += wz * row;
    }
    output[out_index] = acc;
}
";

// Must match the WGSL `Params` layout exactly.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ResampleParams {
    planes: u32,
    in_z: u32,
    in_y: u32,
    out_z: u32,
    out_y: u32,
    fill: f32,
    a: f32,
    eps: f32,
    m: [f32; 6],
    _pad: [f32; 2],
}

const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    resample_pipeline: wgpu::ComputePipeline,
    max_binding_bytes: u64,
}

impl WgpuBackend {
    pub fn new() -> std::result::Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| format!("No suitable GPU adapter found: {e}"))?;

        let adapter_name = adapter.get_info().name.clone();
        tracing::info!("GPU adapter: {adapter_name}");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("oblique"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| format!("Failed to create GPU device: {e}"))?;

        let max_binding_bytes = device.limits().max_storage_buffer_binding_size as u64;
        let device: Arc<wgpu::Device> = Arc::new(device);
        let queue: Arc<wgpu::Queue> = Arc::new(queue);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("resample_cubic"),
            source: wgpu::ShaderSource::Wgsl(RESAMPLE_CUBIC_WGSL.into()),
        });
        let resample_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("resample_cubic"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            adapter_name,
            resample_pipeline,
            max_binding_bytes,
        })
    }

    // --- Buffer helpers ---

    fn create_storage(&self, data: &[f32]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn create_storage_uninit(&self, byte_size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    fn create_uniform<T: Pod>(&self, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn download_f32(&self, buffer: &wgpu::Buffer) -> Result<Vec<f32>> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut enc = self.device.create_command_encoder(&Default::default());
        enc.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(enc.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            tx.send(r).ok();
        });
        self.device.poll(wgpu::PollType::wait_indefinitely()).ok();
        rx.recv()
            .map_err(|_| ObliqueError::GpuError("GPU channel closed".into()))?
            .map_err(|e| ObliqueError::GpuError(format!("Buffer mapping failed: {e}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(result)
    }

    /// Dispatch a single compute pass with one bind group at group(0).
    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        workgroups: (u32, u32, u32),
    ) {
        let layout = pipeline.get_bind_group_layout(0);
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries,
        });
        let mut enc = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = enc.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(std::iter::once(enc.finish()));
    }

    fn resample_batch(
        &self,
        planes: ArrayView3<'_, f32>,
        out_dim: (usize, usize),
        map: &Affine2,
        fill: f32,
    ) -> Result<Array3<f32>> {
        let (count, in_z, in_y) = planes.dim();
        let input: Vec<f32> = planes.iter().copied().collect();
        let out_len = count * out_dim.0 * out_dim.1;

        let params = ResampleParams {
            planes: count as u32,
            in_z: in_z as u32,
            in_y: in_y as u32,
            out_z: out_dim.0 as u32,
            out_y: out_dim.1 as u32,
            fill,
            a: crate::consts::CUBIC_A as f32,
            eps: 1e-4,
            m: [
                map.m[0][0] as f32,
                map.m[0][1] as f32,
                map.m[0][2] as f32,
                map.m[1][0] as f32,
                map.m[1][1] as f32,
                map.m[1][2] as f32,
            ],
            _pad: [0.0; 2],
        };

        let input_buf = self.create_storage(&input);
        let output_buf = self.create_storage_uninit((out_len * 4) as u64);
        let uniform = self.create_uniform(&params);
        self.dispatch(
            &self.resample_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
            (
                div_ceil(out_dim.1 as u32, 16),
                div_ceil(out_dim.0 as u32, 16),
                count as u32,
            ),
        );

        let data = self.download_f32(&output_buf)?;
        Array3::from_shape_vec((count, out_dim.0, out_dim.1), data)
            .map_err(|e| ObliqueError::GpuError(format!("shape mismatch in download: {e}")))
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn resample(
        &self,
        planes: ArrayView3<'_, f32>,
        out_dim: (usize, usize),
        map: &Affine2,
        fill: f32,
    ) -> Result<Array3<f32>> {
        let (count, in_z, in_y) = planes.dim();
        let mut out = Array3::<f32>::zeros((count, out_dim.0, out_dim.1));
        if count == 0 || out_dim.0 == 0 || out_dim.1 == 0 {
            return Ok(out);
        }

        // Split so that neither binding exceeds the device limit.
        let plane_bytes = (4 * in_z * in_y).max(4 * out_dim.0 * out_dim.1) as u64;
        if plane_bytes > self.max_binding_bytes {
            return Err(ObliqueError::GpuError(format!(
                "plane of {plane_bytes} bytes exceeds the device binding limit of {} bytes",
                self.max_binding_bytes
            )));
        }
        let per_batch = ((self.max_binding_bytes / plane_bytes) as usize).clamp(1, u16::MAX as usize);

        let mut start = 0;
        while start < count {
            let end = (start + per_batch).min(count);
            let batch = self.resample_batch(planes.slice(s![start..end, .., ..]), out_dim, map, fill)?;
            out.slice_mut(s![start..end, .., ..]).assign(&batch);
            start = end;
        }
        Ok(out)
    }
}
