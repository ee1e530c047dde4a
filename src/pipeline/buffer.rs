//! Pixel buffer bridge between decoders and the pipeline stages.
//!
//! Every stage works on [`ImageBuffer`]: tightly described 8-bit RGB or
//! RGBA pixels with an explicit stride, plus the metadata extracted at
//! decode time. Conversions to and from the image crate's
//! [`DynamicImage`] live here so no other module has to care about the
//! crate's many pixel layouts.

use image::DynamicImage;

/// Pixel layout of an [`ImageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8)
    }
}

/// A decoded image together with the metadata pulled from its container.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Embedded ICC profile bytes, if the container carried one.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF orientation code (1..=8), if present.
    pub orientation: Option<u16>,
}

/// An 8-bit pixel buffer with explicit geometry.
///
/// `stride` is the byte distance between rows and may exceed
/// `width * channels` for buffers that came from row-padded sources.
/// Buffers produced by this crate are always tightly packed.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
    pub icc_profile: Option<Vec<u8>>,
    pub orientation: Option<u16>,
}

impl ImageBuffer {
    /// Wrap raw pixel data. Returns `None` when the geometry does not
    /// describe the buffer: stride shorter than a row, or data shorter
    /// than `stride * height`.
    pub fn from_raw(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Option<Self> {
        let row_bytes = width as usize * format.channels();
        if stride < row_bytes {
            return None;
        }
        if height > 0 && data.len() < stride * (height as usize - 1) + row_bytes {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            stride,
            format,
            icc_profile: None,
            orientation: None,
        })
    }

    /// Bridge a decoded image into the pipeline's pixel model.
    ///
    /// Sources with an alpha channel land in `Rgba8`, everything else in
    /// `Rgb8`. Higher bit depths are narrowed to 8 bits.
    pub fn from_decoded(decoded: DecodedImage) -> Self {
        let DecodedImage {
            image,
            icc_profile,
            orientation,
        } = decoded;
        let width = image.width();
        let height = image.height();
        let (data, format) = match image {
            DynamicImage::ImageRgb8(rgb) => (rgb.into_raw(), PixelFormat::Rgb8),
            DynamicImage::ImageRgba8(rgba) => (rgba.into_raw(), PixelFormat::Rgba8),
            other if other.color().has_alpha() => {
                (other.into_rgba8().into_raw(), PixelFormat::Rgba8)
            }
            other => (other.into_rgb8().into_raw(), PixelFormat::Rgb8),
        };
        let stride = width as usize * format.channels();
        Self {
            data,
            width,
            height,
            stride,
            format,
            icc_profile,
            orientation,
        }
    }

    /// Whether rows are packed back to back with no padding.
    pub fn is_tight(&self) -> bool {
        self.stride == self.width as usize * self.format.channels()
    }

    /// Copy out a tightly packed pixel vector, dropping row padding.
    pub fn tight_pixels(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * self.format.channels();
        if self.is_tight() {
            return self.data.clone();
        }
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * self.stride;
            packed.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        packed
    }

    /// Convert to a [`DynamicImage`], repacking padded rows if needed.
    pub fn to_dynamic(&self) -> DynamicImage {
        let pixels = self.tight_pixels();
        match self.format {
            PixelFormat::Rgb8 => {
                let buf = image::RgbImage::from_raw(self.width, self.height, pixels)
                    .unwrap_or_else(|| unreachable!("geometry checked at construction"));
                DynamicImage::ImageRgb8(buf)
            }
            PixelFormat::Rgba8 => {
                let buf = image::RgbaImage::from_raw(self.width, self.height, pixels)
                    .unwrap_or_else(|| unreachable!("geometry checked at construction"));
                DynamicImage::ImageRgba8(buf)
            }
        }
    }

    /// Convert back into a [`DecodedImage`] without copying when the
    /// buffer is already tight.
    pub fn into_decoded(self) -> DecodedImage {
        let icc_profile = self.icc_profile.clone();
        let orientation = self.orientation;
        let width = self.width;
        let height = self.height;
        let format = self.format;
        let pixels = if self.is_tight() {
            self.data
        } else {
            self.tight_pixels()
        };
        let image = match format {
            PixelFormat::Rgb8 => {
                let buf = image::RgbImage::from_raw(width, height, pixels)
                    .unwrap_or_else(|| unreachable!("geometry checked at construction"));
                DynamicImage::ImageRgb8(buf)
            }
            PixelFormat::Rgba8 => {
                let buf = image::RgbaImage::from_raw(width, height, pixels)
                    .unwrap_or_else(|| unreachable!("geometry checked at construction"));
                DynamicImage::ImageRgba8(buf)
            }
        };
        DecodedImage {
            image,
            icc_profile,
            orientation,
        }
    }
}
