#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tiff::encoder::{colortype, TiffEncoder};

use oblique_core::consts::TIMING_ROWS;

/// Value written into the timing rows of every synthetic frame.
pub const TIMING_SENTINEL: u16 = 65535;

/// Layout of a synthetic acquisition.
#[derive(Clone, Debug)]
pub struct AcquisitionLayout {
    pub buffers: usize,
    pub volumes_per_buffer: usize,
    pub channels: Vec<&'static str>,
    pub slices: usize,
    /// Frame height including timing rows.
    pub height: usize,
    pub width: usize,
    pub scan_step_size_px: f64,
}

impl Default for AcquisitionLayout {
    fn default() -> Self {
        Self {
            buffers: 2,
            volumes_per_buffer: 2,
            channels: vec!["488"],
            slices: 5,
            height: 28,
            width: 6,
            scan_step_size_px: 1.0,
        }
    }
}

impl AcquisitionLayout {
    pub fn voxel_aspect_ratio(&self) -> f64 {
        self.scan_step_size_px * 30f64.to_radians().tan()
    }

    pub fn sidecar(&self) -> String {
        let channels = self
            .channels
            .iter()
            .map(|c| format!("'{c}'"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "scan_step_size_px: {}\n\
             voxel_aspect_ratio: {}\n\
             sample_px_um: 0.1154\n\
             volumes_per_buffer: {}\n\
             channels_per_slice: [{channels}]\n\
             slices_per_volume: {}\n\
             volumes_per_s: 4\n\
             buffer_time_s: 0.5\n\
             delay_s: None\n\
             description: synthetic acquisition\n",
            self.scan_step_size_px,
            self.voxel_aspect_ratio(),
            self.volumes_per_buffer,
            self.slices,
        )
    }
}

/// Deterministic pixel value of timepoint `t`, channel `c`, slice `z` at
/// cropped row `y`, column `x`.
pub fn expected_value(t: usize, c: usize, z: usize, y: usize, x: usize) -> u16 {
    ((t * 1000 + c * 500 + z * 50 + y * 2 + x) % 60000) as u16
}

/// Raw page of buffer `b` for (t, z, c), timing rows included.
pub fn raw_page(layout: &AcquisitionLayout, b: usize, t: usize, z: usize, c: usize) -> Array2<u16> {
    let global_t = b * layout.volumes_per_buffer + t;
    Array2::from_shape_fn((layout.height, layout.width), |(y, x)| {
        if y < TIMING_ROWS {
            TIMING_SENTINEL
        } else {
            expected_value(global_t, c, z, y - TIMING_ROWS, x)
        }
    })
}

/// Write a multi-page 16-bit TIFF.
pub fn write_pages_u16(path: &Path, pages: &[Array2<u16>]) {
    let mut file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(&mut file).unwrap();
    for page in pages {
        let (h, w) = page.dim();
        let data: Vec<u16> = page.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray16>(w as u32, h as u32, &data)
            .unwrap();
    }
}

/// Write a multi-page 8-bit TIFF.
pub fn write_pages_u8(path: &Path, pages: &[Array2<u8>]) {
    let mut file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(&mut file).unwrap();
    for page in pages {
        let (h, w) = page.dim();
        let data: Vec<u8> = page.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray8>(w as u32, h as u32, &data)
            .unwrap();
    }
}

/// Buffer file name for index `b`; lexicographic order equals time order.
pub fn buffer_name(b: usize) -> String {
    format!("{b:06}.tif")
}

/// Create `<root>/data/*.tif` and `<root>/metadata/000000.txt` for `layout`.
/// Returns the buffer paths in time order.
pub fn build_acquisition(root: &Path, layout: &AcquisitionLayout) -> Vec<PathBuf> {
    let data = root.join("data");
    let metadata = root.join("metadata");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&metadata).unwrap();
    fs::write(metadata.join("000000.txt"), layout.sidecar()).unwrap();

    let mut paths = Vec::new();
    for b in 0..layout.buffers {
        let mut pages = Vec::new();
        for t in 0..layout.volumes_per_buffer {
            for z in 0..layout.slices {
                for c in 0..layout.channels.len() {
                    pages.push(raw_page(layout, b, t, z, c));
                }
            }
        }
        let path = data.join(buffer_name(b));
        write_pages_u16(&path, &pages);
        paths.push(path);
    }
    paths
}
