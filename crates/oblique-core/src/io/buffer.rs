use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{ObliqueError, Result};
use crate::pixel::{Pixel, PixelType};

/// Page-sequential reader over one multi-page TIFF.
///
/// Only one decoded page is held at a time, so memory use is bounded by the
/// frame size regardless of how many pages the file holds.
pub struct BufferReader {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    frame_shape: (usize, usize),
    pixel_type: PixelType,
    page: usize,
    exhausted: bool,
}

impl BufferReader {
    /// Open a file and inspect its first page.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| read_error(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| read_error(path, e))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(|e| read_error(path, e))?;
        let pixel_type = page_pixel_type(path, &mut decoder)?;

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            frame_shape: (height as usize, width as usize),
            pixel_type,
            page: 0,
            exhausted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (height, width) of the first page.
    pub fn frame_shape(&self) -> (usize, usize) {
        self.frame_shape
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Index of the page the next call to [`next_page`](Self::next_page) decodes.
    pub fn page_index(&self) -> usize {
        self.page
    }

    /// ImageDescription of the current page, if present.
    pub fn description(&mut self) -> Option<String> {
        self.decoder.get_tag_ascii_string(Tag::ImageDescription).ok()
    }

    /// Horizontal resolution of the current page in pixels per unit.
    pub fn x_resolution(&mut self) -> Option<f64> {
        match self.decoder.find_tag(Tag::XResolution) {
            Ok(Some(Value::Rational(n, d))) if n > 0 && d > 0 => Some(n as f64 / d as f64),
            _ => None,
        }
    }

    /// Decode the current page and advance. Returns `None` once every page
    /// has been read.
    pub fn next_page<T: Pixel>(&mut self) -> Result<Option<Array2<T>>> {
        if self.exhausted {
            return Ok(None);
        }

        let (width, height) = self
            .decoder
            .dimensions()
            .map_err(|e| read_error(&self.path, e))?;
        let shape = (height as usize, width as usize);
        if shape != self.frame_shape {
            return Err(ObliqueError::ShapeMismatch {
                path: self.path.clone(),
                expected: vec![self.frame_shape.0, self.frame_shape.1],
                found: vec![shape.0, shape.1],
            });
        }

        let decoded = self
            .decoder
            .read_image()
            .map_err(|e| read_error(&self.path, e))?;
        let found = PixelType::of_decoded(&decoded);
        let pixels = T::from_decoded(decoded).ok_or_else(|| match found {
            Some(found) => ObliqueError::DtypeMismatch {
                path: self.path.clone(),
                expected: T::PIXEL_TYPE,
                found,
            },
            None => ObliqueError::UnsupportedPixelType {
                path: self.path.clone(),
                detail: format!("page {} decodes to an unsupported sample type", self.page),
            },
        })?;
        let frame = Array2::from_shape_vec(shape, pixels).map_err(|e| ObliqueError::BufferRead {
            path: self.path.clone(),
            reason: format!("page {}: {e}", self.page),
        })?;

        self.page += 1;
        if self.decoder.more_images() {
            self.decoder
                .next_image()
                .map_err(|e| read_error(&self.path, e))?;
        } else {
            self.exhausted = true;
        }
        Ok(Some(frame))
    }

    /// Decode the next page, failing if the file has run out.
    pub fn require_page<T: Pixel>(&mut self, expected_pages: usize) -> Result<Array2<T>> {
        let page = self.page;
        self.next_page()?.ok_or_else(|| ObliqueError::BufferRead {
            path: self.path.clone(),
            reason: format!("expected {expected_pages} pages, found {page}"),
        })
    }
}

fn page_pixel_type(path: &Path, decoder: &mut Decoder<BufReader<File>>) -> Result<PixelType> {
    let bits = match decoder.colortype().map_err(|e| read_error(path, e))? {
        ColorType::Gray(bits) => bits,
        other => {
            return Err(ObliqueError::UnsupportedPixelType {
                path: path.to_path_buf(),
                detail: format!("{other:?} (only single-sample grayscale is supported)"),
            })
        }
    };
    let sample_format = match decoder.find_tag(Tag::SampleFormat) {
        Ok(Some(Value::Short(v))) => v,
        Ok(Some(Value::Unsigned(v))) => v as u16,
        Ok(Some(Value::List(values))) => match values.first() {
            Some(Value::Short(v)) => *v,
            Some(Value::Unsigned(v)) => *v as u16,
            _ => 1,
        },
        _ => 1,
    };
    PixelType::from_tiff(bits, sample_format).ok_or_else(|| ObliqueError::UnsupportedPixelType {
        path: path.to_path_buf(),
        detail: format!("{bits}-bit samples with sample format {sample_format}"),
    })
}

fn read_error(path: &Path, error: impl std::fmt::Display) -> ObliqueError {
    ObliqueError::BufferRead {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
