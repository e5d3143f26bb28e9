pub mod acquisition;
pub mod assemble;
pub mod calibration;
pub mod compute;
pub mod consts;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod pixel;
pub mod transform;
pub mod volume;

pub use error::{ErrorKind, ObliqueError, Result};
pub use pixel::{Pixel, PixelType};
pub use volume::{Volume, VolumeShape};
