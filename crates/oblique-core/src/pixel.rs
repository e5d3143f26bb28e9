use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use tiff::decoder::DecodingResult;

/// Pixel storage type of a buffer or volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    pub fn byte_size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        (self.byte_size() * 8) as u16
    }

    /// TIFF SampleFormat value (1 = unsigned integer, 3 = IEEE float).
    pub fn sample_format(self) -> u16 {
        match self {
            Self::U8 | Self::U16 => 1,
            Self::F32 => 3,
        }
    }

    /// Resolve a pixel type from TIFF bits-per-sample and sample format.
    pub fn from_tiff(bits: u8, sample_format: u16) -> Option<Self> {
        match (bits, sample_format) {
            (8, 1) => Some(Self::U8),
            (16, 1) => Some(Self::U16),
            (32, 3) => Some(Self::F32),
            _ => None,
        }
    }

    pub(crate) fn of_decoded(result: &DecodingResult) -> Option<Self> {
        match result {
            DecodingResult::U8(_) => Some(Self::U8),
            DecodingResult::U16(_) => Some(Self::U16),
            DecodingResult::F32(_) => Some(Self::F32),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::U16 => write!(f, "uint16"),
            Self::F32 => write!(f, "float32"),
        }
    }
}

/// A scalar voxel type that volumes can hold.
///
/// Conversion to `f32` is lossless for the integer types; conversion back
/// rounds to nearest and saturates at the type's range, so resampled values
/// never wrap.
pub trait Pixel: Pod + Default + PartialEq + Send + Sync + fmt::Debug + 'static {
    const PIXEL_TYPE: PixelType;

    fn to_f32(self) -> f32;

    fn from_f32(value: f32) -> Self;

    /// Take ownership of decoded samples if they are of this type.
    fn from_decoded(result: DecodingResult) -> Option<Vec<Self>>;
}

impl Pixel for u8 {
    const PIXEL_TYPE: PixelType = PixelType::U8;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        num_traits::clamp(value.round(), 0.0, u8::MAX as f32) as u8
    }

    fn from_decoded(result: DecodingResult) -> Option<Vec<Self>> {
        match result {
            DecodingResult::U8(v) => Some(v),
            _ => None,
        }
    }
}

impl Pixel for u16 {
    const PIXEL_TYPE: PixelType = PixelType::U16;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        num_traits::clamp(value.round(), 0.0, u16::MAX as f32) as u16
    }

    fn from_decoded(result: DecodingResult) -> Option<Vec<Self>> {
        match result {
            DecodingResult::U16(v) => Some(v),
            _ => None,
        }
    }
}

impl Pixel for f32 {
    const PIXEL_TYPE: PixelType = PixelType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn from_decoded(result: DecodingResult) -> Option<Vec<Self>> {
        match result {
            DecodingResult::F32(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32_rounds_and_saturates() {
        assert_eq!(u16::from_f32(12.5), 13);
        assert_eq!(u16::from_f32(-3.0), 0);
        assert_eq!(u16::from_f32(70_000.0), u16::MAX);
        assert_eq!(u8::from_f32(254.6), 255);
        assert_eq!(f32::from_f32(-1.25), -1.25);
    }

    #[test]
    fn test_from_tiff() {
        assert_eq!(PixelType::from_tiff(16, 1), Some(PixelType::U16));
        assert_eq!(PixelType::from_tiff(32, 3), Some(PixelType::F32));
        assert_eq!(PixelType::from_tiff(32, 1), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PixelType::U16.to_string(), "uint16");
    }
}
