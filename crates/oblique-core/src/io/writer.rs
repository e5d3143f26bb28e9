use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use ndarray::{ArrayView5, ArrayViewD, ArrayViewMut5, Axis, Ix5};
use tracing::{debug, info};

use crate::calibration::Calibration;
use crate::error::{ObliqueError, Result};
use crate::io::imagej::{imagej_description, TiffLayout};
use crate::pixel::Pixel;
use crate::volume::{Volume, VolumeShape};

/// Options for [`allocate_with`].
#[derive(Clone, Debug, Default)]
pub struct WriterOptions {
    /// Write BigTIFF even when classic 32-bit offsets would suffice.
    pub force_bigtiff: bool,
}

/// Path of the marker file that flags `path` as not yet complete.
pub fn incomplete_marker(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".incomplete");
    path.with_file_name(name)
}

/// Memory-mapped pixel block of an output file.
pub(crate) struct MappedStorage {
    path: PathBuf,
    mmap: MmapMut,
    data_offset: usize,
    data_len: usize,
    timepoint_bytes: usize,
    /// (t, z, c, y, x)
    disk_shape: (usize, usize, usize, usize, usize),
}

impl MappedStorage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn view<T: Pixel>(&self) -> ArrayView5<'_, T> {
        let bytes = &self.mmap[self.data_offset..self.data_offset + self.data_len];
        let pixels: &[T] = bytemuck::cast_slice(bytes);
        ArrayView5::from_shape(self.disk_shape, pixels)
            .expect("mapped region sized for its shape at allocation")
            .permuted_axes([0, 2, 1, 3, 4])
    }

    pub fn view_mut<T: Pixel>(&mut self) -> ArrayViewMut5<'_, T> {
        let bytes = &mut self.mmap[self.data_offset..self.data_offset + self.data_len];
        let pixels: &mut [T] = bytemuck::cast_slice_mut(bytes);
        ArrayViewMut5::from_shape(self.disk_shape, pixels)
            .expect("mapped region sized for its shape at allocation")
            .permuted_axes([0, 2, 1, 3, 4])
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| ObliqueError::output(&self.path, e))
    }

    pub fn flush_timepoints(&self, start: usize, end: usize) -> Result<()> {
        if end <= start {
            return Ok(());
        }
        let offset = self.data_offset + start * self.timepoint_bytes;
        let len = (end - start) * self.timepoint_bytes;
        self.mmap
            .flush_range(offset, len)
            .map_err(|e| ObliqueError::output(&self.path, e))
    }

    pub fn finish(self) -> Result<()> {
        self.flush()?;
        let Self { path, mmap, .. } = self;
        drop(mmap);
        let marker = incomplete_marker(&path);
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ObliqueError::output(marker, e)),
        }
        info!(path = %path.display(), "Output complete");
        Ok(())
    }
}

/// Create a calibrated output file and map it as a writable volume.
///
/// The returned volume reads and writes straight through to disk. It stays
/// flagged incomplete (see [`incomplete_marker`]) until [`Volume::finish`] is
/// called, so a cancelled or crashed run is never mistaken for a full one.
pub fn allocate<T: Pixel>(
    path: &Path,
    shape: VolumeShape,
    calibration: &Calibration,
) -> Result<Volume<T>> {
    allocate_with(path, shape, calibration, &WriterOptions::default())
}

pub fn allocate_with<T: Pixel>(
    path: &Path,
    shape: VolumeShape,
    calibration: &Calibration,
    options: &WriterOptions,
) -> Result<Volume<T>> {
    if shape.is_empty() {
        return Err(ObliqueError::output(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, format!("empty volume {shape}")),
        ));
    }

    let description = imagej_description(shape, calibration);
    let layout = TiffLayout::plan(shape, T::PIXEL_TYPE, &description, options.force_bigtiff);

    let marker = incomplete_marker(path);
    File::create(&marker).map_err(|e| ObliqueError::output(&marker, e))?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ObliqueError::output(path, e))?;
    {
        let mut writer = BufWriter::new(&file);
        layout
            .write_header(&mut writer, &description, calibration)
            .and_then(|_| writer.flush())
            .map_err(|e| ObliqueError::output(path, e))?;
    }
    file.set_len(layout.file_len())
        .map_err(|e| ObliqueError::output(path, e))?;

    let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| ObliqueError::output(path, e))?;

    info!(
        path = %path.display(),
        shape = %shape,
        pixel_type = %T::PIXEL_TYPE,
        bigtiff = layout.big,
        bytes = layout.file_len(),
        "Allocated output volume"
    );

    Ok(Volume::mapped(MappedStorage {
        path: path.to_path_buf(),
        mmap,
        data_offset: layout.data_offset as usize,
        data_len: layout.data_len() as usize,
        timepoint_bytes: layout.timepoint_bytes() as usize,
        disk_shape: (shape.t, shape.z, shape.c, shape.y, shape.x),
    }))
}

/// Persist a volume to a calibrated TIFF at `path`.
///
/// The (t, c, z, y, x) to (t, z, c, y, x) transposition happens here, while
/// copying into the mapped file. Data is flushed after every timepoint.
pub fn write<T: Pixel>(path: &Path, volume: Volume<T>, calibration: &Calibration) -> Result<PathBuf> {
    write_with(path, volume, calibration, &WriterOptions::default())
}

/// [`write`] with explicit writer options.
///
/// A volume already mapped at `path` is only marked complete. A volume
/// mapped elsewhere is copied, then its own file is marked complete too.
pub fn write_with<T: Pixel>(
    path: &Path,
    volume: Volume<T>,
    calibration: &Calibration,
    options: &WriterOptions,
) -> Result<PathBuf> {
    if volume.path() == Some(path) {
        volume.finish()?;
        return Ok(path.to_path_buf());
    }
    write_view(path, volume.view(), calibration, options)?;
    volume.finish()?;
    Ok(path.to_path_buf())
}

/// Persist an array of rank 3 (z, y, x), 4 (t, z, y, x) or 5 (t, c, z, y, x).
pub fn write_array<T: Pixel>(
    path: &Path,
    data: ArrayViewD<'_, T>,
    calibration: &Calibration,
) -> Result<PathBuf> {
    let view = match data.ndim() {
        3 => data.insert_axis(Axis(0)).insert_axis(Axis(0)),
        4 => data.insert_axis(Axis(1)),
        5 => data,
        ndim => return Err(ObliqueError::UnsupportedShape { ndim }),
    };
    let view = view
        .into_dimensionality::<Ix5>()
        .map_err(|_| ObliqueError::UnsupportedShape { ndim: 5 })?;
    write_view(path, view, calibration, &WriterOptions::default())?;
    Ok(path.to_path_buf())
}

fn write_view<T: Pixel>(
    path: &Path,
    source: ArrayView5<'_, T>,
    calibration: &Calibration,
    options: &WriterOptions,
) -> Result<()> {
    let (t, c, z, y, x) = source.dim();
    let shape = VolumeShape { t, c, z, y, x };
    let mut target = allocate_with::<T>(path, shape, calibration, options)?;
    for (index, timepoint) in source.outer_iter().enumerate() {
        target
            .view_mut()
            .index_axis_mut(Axis(0), index)
            .assign(&timepoint);
        target.flush_timepoints(index, index + 1)?;
        debug!(timepoint = index, "Wrote timepoint");
    }
    target.finish()
}
