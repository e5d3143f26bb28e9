use std::fmt;
use std::path::Path;

use ndarray::{Array5, ArrayView5, ArrayViewMut5};

use crate::error::Result;
use crate::io::writer::MappedStorage;
use crate::pixel::Pixel;

/// Logical extent of a volume in (time, channel, depth, height, width) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeShape {
    pub t: usize,
    pub c: usize,
    pub z: usize,
    pub y: usize,
    pub x: usize,
}

impl VolumeShape {
    pub fn new(t: usize, c: usize, z: usize, y: usize, x: usize) -> Self {
        Self { t, c, z, y, x }
    }

    pub fn dims(&self) -> [usize; 5] {
        [self.t, self.c, self.z, self.y, self.x]
    }

    pub fn as_tuple(&self) -> (usize, usize, usize, usize, usize) {
        (self.t, self.c, self.z, self.y, self.x)
    }

    pub fn len(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of 2D (y, x) planes.
    pub fn planes(&self) -> usize {
        self.t * self.c * self.z
    }

    pub fn plane_len(&self) -> usize {
        self.y * self.x
    }

    pub fn with_t(self, t: usize) -> Self {
        Self { t, ..self }
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.t, self.c, self.z, self.y, self.x
        )
    }
}

impl From<(usize, usize, usize, usize, usize)> for VolumeShape {
    fn from((t, c, z, y, x): (usize, usize, usize, usize, usize)) -> Self {
        Self { t, c, z, y, x }
    }
}

enum Storage<T: Pixel> {
    Heap(Array5<T>),
    Mapped(MappedStorage),
}

/// A dense 5D (t, c, z, y, x) volume, either owned in memory or backed by a
/// memory-mapped output file.
///
/// File-backed volumes are created by [`crate::io::writer::allocate`]. Their
/// on-disk order is (t, z, c, y, x); `view`/`view_mut` present it permuted
/// back to (t, c, z, y, x), so callers never see the disk layout.
pub struct Volume<T: Pixel> {
    storage: Storage<T>,
}

impl<T: Pixel> Volume<T> {
    pub fn zeros(shape: VolumeShape) -> Self {
        Self::from_array(Array5::default(shape.as_tuple()))
    }

    pub fn from_array(data: Array5<T>) -> Self {
        Self {
            storage: Storage::Heap(data),
        }
    }

    pub(crate) fn mapped(storage: MappedStorage) -> Self {
        Self {
            storage: Storage::Mapped(storage),
        }
    }

    pub fn shape(&self) -> VolumeShape {
        let (t, c, z, y, x) = self.view().dim();
        VolumeShape { t, c, z, y, x }
    }

    pub fn nbytes(&self) -> usize {
        self.shape().len() * std::mem::size_of::<T>()
    }

    pub fn view(&self) -> ArrayView5<'_, T> {
        match &self.storage {
            Storage::Heap(data) => data.view(),
            Storage::Mapped(mapped) => mapped.view::<T>(),
        }
    }

    pub fn view_mut(&mut self) -> ArrayViewMut5<'_, T> {
        match &mut self.storage {
            Storage::Heap(data) => data.view_mut(),
            Storage::Mapped(mapped) => mapped.view_mut::<T>(),
        }
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// Backing file of a file-backed volume.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Heap(_) => None,
            Storage::Mapped(mapped) => Some(mapped.path()),
        }
    }

    /// Flush everything written so far to storage. No-op for heap volumes.
    pub fn flush(&self) -> Result<()> {
        match &self.storage {
            Storage::Heap(_) => Ok(()),
            Storage::Mapped(mapped) => mapped.flush(),
        }
    }

    /// Flush the timepoint range `[start, end)`. No-op for heap volumes.
    pub fn flush_timepoints(&self, start: usize, end: usize) -> Result<()> {
        match &self.storage {
            Storage::Heap(_) => Ok(()),
            Storage::Mapped(mapped) => mapped.flush_timepoints(start, end),
        }
    }

    /// Mark a file-backed volume complete: flush, unmap and clear its
    /// incomplete marker. Heap volumes are simply dropped.
    pub fn finish(self) -> Result<()> {
        match self.storage {
            Storage::Heap(_) => Ok(()),
            Storage::Mapped(mapped) => mapped.finish(),
        }
    }

    /// Take the pixel data as an owned array, copying out of the mapping if
    /// the volume is file-backed.
    pub fn into_array(self) -> Array5<T> {
        match self.storage {
            Storage::Heap(data) => data,
            Storage::Mapped(mapped) => mapped.view::<T>().to_owned(),
        }
    }
}

impl<T: Pixel> fmt::Debug for Volume<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("shape", &self.shape())
            .field("pixel_type", &T::PIXEL_TYPE)
            .field("path", &self.path())
            .finish()
    }
}
