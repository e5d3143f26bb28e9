//! ImageJ hyperstack TIFF layout.
//!
//! Files are laid out as header, description, IFD chain, then one contiguous
//! pixel block in (t, z, c, y, x) order starting at an aligned offset. Keeping
//! the pixels contiguous is what allows the writer to memory-map them as a
//! single array.

use std::collections::BTreeMap;
use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::calibration::Calibration;
use crate::consts::{IMAGEJ_VERSION, TIFF_DATA_ALIGNMENT};
use crate::pixel::PixelType;
use crate::volume::VolumeShape;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_IMAGE_DESCRIPTION: u16 = 270;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_RESOLUTION_UNIT: u16 = 296;
const TAG_SAMPLE_FORMAT: u16 = 339;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_LONG8: u16 = 16;

/// Tags written to every IFD, in ascending order. The first IFD also
/// carries ImageDescription.
const IFD_TAGS: [u16; 13] = [
    TAG_IMAGE_WIDTH,
    TAG_IMAGE_LENGTH,
    TAG_BITS_PER_SAMPLE,
    TAG_COMPRESSION,
    TAG_PHOTOMETRIC,
    TAG_STRIP_OFFSETS,
    TAG_SAMPLES_PER_PIXEL,
    TAG_ROWS_PER_STRIP,
    TAG_STRIP_BYTE_COUNTS,
    TAG_X_RESOLUTION,
    TAG_Y_RESOLUTION,
    TAG_RESOLUTION_UNIT,
    TAG_SAMPLE_FORMAT,
];

fn entry_count(page: u64) -> u64 {
    IFD_TAGS.len() as u64 + u64::from(page == 0)
}

/// Byte offsets of every structure in a planned file.
#[derive(Clone, Debug)]
pub(crate) struct TiffLayout {
    pub big: bool,
    pub shape: VolumeShape,
    pub pixel_type: PixelType,
    description_offset: u64,
    description_len: u64,
    resolution_offset: u64,
    ifd_offsets: Vec<u64>,
    pub data_offset: u64,
    pub plane_bytes: u64,
}

impl TiffLayout {
    /// Plan a file. Classic TIFF is used unless the file would need offsets
    /// beyond 32 bits, or `force_big` is set.
    pub fn plan(
        shape: VolumeShape,
        pixel_type: PixelType,
        description: &str,
        force_big: bool,
    ) -> Self {
        let classic = Self::plan_with(shape, pixel_type, description, false);
        if force_big || classic.file_len() > u32::MAX as u64 {
            Self::plan_with(shape, pixel_type, description, true)
        } else {
            classic
        }
    }

    fn plan_with(shape: VolumeShape, pixel_type: PixelType, description: &str, big: bool) -> Self {
        let header_len: u64 = if big { 16 } else { 8 };
        // ASCII values are NUL terminated.
        let description_len = description.len() as u64 + 1;
        let description_offset = header_len;
        let resolution_offset = even(description_offset + description_len);
        // Classic TIFF stores the two rationals out of line; BigTIFF inlines them.
        let resolution_len = if big { 0 } else { 16 };

        let pages = shape.planes() as u64;
        let mut ifd_offsets = Vec::with_capacity(pages as usize);
        let mut cursor = resolution_offset + resolution_len;
        for page in 0..pages {
            ifd_offsets.push(cursor);
            cursor += ifd_len(entry_count(page), big);
        }

        Self {
            big,
            shape,
            pixel_type,
            description_offset,
            description_len,
            resolution_offset,
            ifd_offsets,
            data_offset: align_up(cursor, TIFF_DATA_ALIGNMENT),
            plane_bytes: (shape.plane_len() * pixel_type.byte_size()) as u64,
        }
    }

    pub fn data_len(&self) -> u64 {
        self.plane_bytes * self.shape.planes() as u64
    }

    pub fn file_len(&self) -> u64 {
        self.data_offset + self.data_len()
    }

    /// Byte length of one timepoint in the pixel block.
    pub fn timepoint_bytes(&self) -> u64 {
        self.plane_bytes * (self.shape.z * self.shape.c) as u64
    }

    /// Write everything before the pixel block.
    pub fn write_header<W: Write>(
        &self,
        w: &mut W,
        description: &str,
        calibration: &Calibration,
    ) -> io::Result<()> {
        let first_ifd = self.ifd_offsets.first().copied().unwrap_or(0);
        w.write_all(b"II")?;
        if self.big {
            w.write_u16::<LittleEndian>(43)?;
            w.write_u16::<LittleEndian>(8)?;
            w.write_u16::<LittleEndian>(0)?;
            w.write_u64::<LittleEndian>(first_ifd)?;
        } else {
            w.write_u16::<LittleEndian>(42)?;
            w.write_u32::<LittleEndian>(first_ifd as u32)?;
        }

        w.write_all(description.as_bytes())?;
        w.write_u8(0)?;
        pad(w, self.resolution_offset - (self.description_offset + self.description_len))?;

        let resolution = rational(1.0 / calibration.pixel_size_um);
        if !self.big {
            for _ in 0..2 {
                w.write_u32::<LittleEndian>(resolution.0)?;
                w.write_u32::<LittleEndian>(resolution.1)?;
            }
        }

        for page in 0..self.ifd_offsets.len() {
            let next = self.ifd_offsets.get(page + 1).copied().unwrap_or(0);
            self.write_ifd(w, page, next, resolution)?;
        }
        Ok(())
    }

    fn write_ifd<W: Write>(
        &self,
        w: &mut W,
        page: usize,
        next: u64,
        resolution: (u32, u32),
    ) -> io::Result<()> {
        let width = self.shape.x as u64;
        let height = self.shape.y as u64;
        let strip_offset = self.data_offset + page as u64 * self.plane_bytes;
        let offset_type = if self.big { TYPE_LONG8 } else { TYPE_LONG };
        let (res_value, res_next) = if self.big {
            let packed = resolution.0 as u64 | ((resolution.1 as u64) << 32);
            (packed, packed)
        } else {
            (self.resolution_offset, self.resolution_offset + 8)
        };

        // (tag, type, count, value)
        let mut entries = vec![
            (TAG_IMAGE_WIDTH, TYPE_LONG, 1, width),
            (TAG_IMAGE_LENGTH, TYPE_LONG, 1, height),
            (TAG_BITS_PER_SAMPLE, TYPE_SHORT, 1, self.pixel_type.bits_per_sample() as u64),
            (TAG_COMPRESSION, TYPE_SHORT, 1, 1),
            // BlackIsZero
            (TAG_PHOTOMETRIC, TYPE_SHORT, 1, 1),
            (TAG_STRIP_OFFSETS, offset_type, 1, strip_offset),
            (TAG_SAMPLES_PER_PIXEL, TYPE_SHORT, 1, 1),
            (TAG_ROWS_PER_STRIP, TYPE_LONG, 1, height),
            (TAG_STRIP_BYTE_COUNTS, offset_type, 1, self.plane_bytes),
            (TAG_X_RESOLUTION, TYPE_RATIONAL, 1, res_value),
            (TAG_Y_RESOLUTION, TYPE_RATIONAL, 1, res_next),
            // No absolute unit; ImageJ reads the unit from the description.
            (TAG_RESOLUTION_UNIT, TYPE_SHORT, 1, 1),
            (TAG_SAMPLE_FORMAT, TYPE_SHORT, 1, self.pixel_type.sample_format() as u64),
        ];
        if page == 0 {
            entries.insert(
                5,
                (
                    TAG_IMAGE_DESCRIPTION,
                    TYPE_ASCII,
                    self.description_len,
                    self.description_offset,
                ),
            );
        }
        debug_assert_eq!(entries.len() as u64, entry_count(page as u64));

        if self.big {
            w.write_u64::<LittleEndian>(entries.len() as u64)?;
        } else {
            w.write_u16::<LittleEndian>(entries.len() as u16)?;
        }
        for (tag, field_type, count, value) in entries {
            self.entry(w, tag, field_type, count, value)?;
        }

        if self.big {
            w.write_u64::<LittleEndian>(next)?;
        } else {
            w.write_u32::<LittleEndian>(next as u32)?;
        }
        Ok(())
    }

    /// Write one directory entry. `value` is either the inline value packed
    /// little-endian from the low byte, or the offset of out-of-line data.
    fn entry<W: Write>(
        &self,
        w: &mut W,
        tag: u16,
        field_type: u16,
        count: u64,
        value: u64,
    ) -> io::Result<()> {
        w.write_u16::<LittleEndian>(tag)?;
        w.write_u16::<LittleEndian>(field_type)?;
        if self.big {
            w.write_u64::<LittleEndian>(count)?;
            w.write_u64::<LittleEndian>(value)
        } else {
            w.write_u32::<LittleEndian>(count as u32)?;
            w.write_u32::<LittleEndian>(value as u32)
        }
    }
}

fn ifd_len(entries: u64, big: bool) -> u64 {
    if big {
        8 + 20 * entries + 8
    } else {
        2 + 12 * entries + 4
    }
}

fn even(offset: u64) -> u64 {
    offset + (offset & 1)
}

fn align_up(offset: u64, alignment: u64) -> u64 {
    offset.div_ceil(alignment) * alignment
}

fn pad<W: Write>(w: &mut W, n: u64) -> io::Result<()> {
    for _ in 0..n {
        w.write_u8(0)?;
    }
    Ok(())
}

/// Approximate a positive value as a TIFF rational with a 32-bit numerator.
pub(crate) fn rational(value: f64) -> (u32, u32) {
    if !value.is_finite() || value <= 0.0 {
        return (1, 1);
    }
    let mut denominator: u32 = 1_000_000;
    while denominator > 1 && value * denominator as f64 > u32::MAX as f64 {
        denominator /= 10;
    }
    let numerator = (value * denominator as f64).round().clamp(1.0, u32::MAX as f64) as u32;
    (numerator, denominator)
}

/// Build the ImageJ hyperstack description for a volume.
pub(crate) fn imagej_description(shape: VolumeShape, calibration: &Calibration) -> String {
    let mut lines = vec![
        format!("ImageJ={IMAGEJ_VERSION}"),
        format!("images={}", shape.planes()),
    ];
    if shape.c > 1 {
        lines.push(format!("channels={}", shape.c));
    }
    if shape.z > 1 {
        lines.push(format!("slices={}", shape.z));
    }
    if shape.t > 1 {
        lines.push(format!("frames={}", shape.t));
    }
    lines.push("hyperstack=true".into());
    lines.push("mode=grayscale".into());
    lines.push("unit=micron".into());
    lines.push(format!("spacing={}", calibration.z_step_um));
    lines.push(format!("finterval={}", calibration.frame_interval_s));
    lines.push("loop=false".into());
    if !calibration.description.is_empty() {
        lines.push(format!("description={}", single_line(&calibration.description)));
    }
    if !calibration.channel_labels.is_empty() {
        lines.push(format!("labels={}", calibration.channel_labels.join(",")));
    }
    for (key, value) in &calibration.metadata {
        lines.push(format!("info.{}={}", single_line(key), single_line(value)));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn single_line(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}

/// Parsed ImageJ description.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ImageJHeader {
    pub images: Option<usize>,
    pub channels: usize,
    pub slices: usize,
    pub frames: usize,
    pub spacing: Option<f64>,
    pub finterval: Option<f64>,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub info: BTreeMap<String, String>,
}

pub(crate) fn parse_imagej_description(text: &str) -> Option<ImageJHeader> {
    if !text.starts_with("ImageJ=") {
        return None;
    }
    let mut header = ImageJHeader {
        channels: 1,
        slices: 1,
        frames: 1,
        ..Default::default()
    };
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "images" => header.images = value.parse().ok(),
            "channels" => header.channels = value.parse().unwrap_or(1),
            "slices" => header.slices = value.parse().unwrap_or(1),
            "frames" => header.frames = value.parse().unwrap_or(1),
            "spacing" => header.spacing = value.parse().ok(),
            "finterval" => header.finterval = value.parse().ok(),
            "description" => header.description = Some(value.to_string()),
            "labels" => header.labels = value.split(',').map(str::to_string).collect(),
            _ => {
                if let Some(info_key) = key.strip_prefix("info.") {
                    header.info.insert(info_key.to_string(), value.to_string());
                }
            }
        }
    }
    Some(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_round_trip() {
        let (n, d) = rational(1.0 / 0.1154);
        let px = d as f64 / n as f64;
        assert!((px - 0.1154).abs() < 1e-6, "got {px}");
    }

    #[test]
    fn test_rational_large_value_fits() {
        let (n, d) = rational(1.0e7);
        assert!(d >= 1);
        assert!(((n as f64 / d as f64) - 1.0e7).abs() < 1.0);
    }

    #[test]
    fn test_layout_is_aligned_and_contiguous() {
        let shape = VolumeShape::new(2, 2, 3, 10, 12);
        let layout = TiffLayout::plan(shape, PixelType::U16, "ImageJ=1.11a\n", false);
        assert!(!layout.big);
        assert_eq!(layout.data_offset % TIFF_DATA_ALIGNMENT, 0);
        assert_eq!(layout.plane_bytes, 10 * 12 * 2);
        assert_eq!(layout.data_len(), 12 * 240);
        assert_eq!(layout.timepoint_bytes(), 6 * 240);
    }

    #[test]
    fn test_header_length_matches_plan() {
        let shape = VolumeShape::new(1, 2, 3, 4, 5);
        let calibration = Calibration::default();
        let description = imagej_description(shape, &calibration);
        for big in [false, true] {
            let layout = TiffLayout::plan(shape, PixelType::U16, &description, big);
            let mut buf = Vec::new();
            layout.write_header(&mut buf, &description, &calibration).unwrap();
            let last_ifd = *layout.ifd_offsets.last().unwrap();
            let last_page = layout.ifd_offsets.len() as u64 - 1;
            assert_eq!(buf.len() as u64, last_ifd + ifd_len(entry_count(last_page), big));
            assert!(buf.len() as u64 <= layout.data_offset);
        }
    }

    /// Declared entry counts and tags match what each IFD actually holds.
    #[test]
    fn test_ifd_entries_match_declared_count() {
        let shape = VolumeShape::new(1, 1, 2, 3, 3);
        let calibration = Calibration::default();
        let description = imagej_description(shape, &calibration);
        let layout = TiffLayout::plan(shape, PixelType::F32, &description, false);
        let mut buf = Vec::new();
        layout.write_header(&mut buf, &description, &calibration).unwrap();

        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        for (page, &offset) in layout.ifd_offsets.iter().enumerate() {
            let offset = offset as usize;
            let count = u16_at(offset) as usize;
            assert_eq!(count as u64, entry_count(page as u64));
            let tags: Vec<u16> = (0..count).map(|i| u16_at(offset + 2 + 12 * i)).collect();
            assert!(tags.windows(2).all(|w| w[0] < w[1]), "{tags:?}");
            assert_eq!(tags.last(), Some(&TAG_SAMPLE_FORMAT));
            assert_eq!(tags.contains(&TAG_IMAGE_DESCRIPTION), page == 0);
            let common: Vec<u16> = tags.into_iter().filter(|&t| t != TAG_IMAGE_DESCRIPTION).collect();
            assert_eq!(common, IFD_TAGS);
            let next = u32_at(offset + 2 + 12 * count) as u64;
            let expected = layout.ifd_offsets.get(page + 1).copied().unwrap_or(0);
            assert_eq!(next, expected);
        }
    }

    #[test]
    fn test_description_round_trip() {
        let mut calibration = Calibration {
            z_step_um: 0.75,
            frame_interval_s: 2.5,
            description: "two\nlines".into(),
            channel_labels: vec!["488".into(), "561".into()],
            ..Default::default()
        };
        calibration.metadata.insert("scan_step_size_px".into(), "3".into());
        let text = imagej_description(VolumeShape::new(4, 2, 5, 8, 8), &calibration);
        let header = parse_imagej_description(&text).unwrap();
        assert_eq!(header.images, Some(40));
        assert_eq!((header.frames, header.channels, header.slices), (4, 2, 5));
        assert_eq!(header.spacing, Some(0.75));
        assert_eq!(header.finterval, Some(2.5));
        assert_eq!(header.description.as_deref(), Some("two lines"));
        assert_eq!(header.labels, vec!["488", "561"]);
        assert_eq!(header.info["scan_step_size_px"], "3");
    }

    #[test]
    fn test_non_imagej_description() {
        assert!(parse_imagej_description("hello").is_none());
    }
}
