//! Multi-provider image loading.
//!
//! Decoding goes through an ordered list of providers: mozjpeg for
//! JPEG, zune-png for PNG, and the image crate as the catch-all.
//! Providers that recognize the bytes are tried first; every failure is
//! recorded and the next provider gets its turn. Only when the whole
//! chain fails does the caller see an error, carrying the last failure.

use std::borrow::Cow;
use std::fs::File;
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageICC};
use memmap2::Mmap;
use mozjpeg::Decompress;
use tracing::debug;
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::error::{RenderError, Result};
use crate::pipeline::buffer::{DecodedImage, ImageBuffer};
use crate::pipeline::orientation::orientation_from_bytes;
use crate::pipeline::{MAX_DIMENSION, MAX_PIXELS};

/// Where encoded image bytes come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Bytes already in memory, shared between loads.
    Memory(Arc<Vec<u8>>),
    /// A memory-mapped file. Cheap for large archives extracted to disk.
    Mapped(Arc<Mmap>),
    /// A path read on demand.
    Path(PathBuf),
}

impl Source {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Source::Memory(Arc::new(bytes))
    }

    /// Memory-map a file. Prefer this over [`Source::Path`] for files
    /// that get decoded more than once.
    pub fn map_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)
            .map_err(|e| RenderError::file_read_failed(path.display().to_string(), e))?;
        // The file must not be truncated while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| RenderError::mmap_failed(path.display().to_string(), e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Source::Memory(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            Source::Mapped(mmap) => Ok(Cow::Borrowed(&mmap[..])),
            Source::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| RenderError::file_read_failed(path.display().to_string(), e)),
        }
    }
}

/// Header-level description of an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Canonical short format name, e.g. "jpg" or "png".
    pub format: Cow<'static, str>,
    pub width: u32,
    pub height: u32,
}

/// A single decode backend.
pub trait DecodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap header inspection. `Some` means this provider recognizes
    /// the bytes and should be tried before providers that do not.
    fn probe(&self, bytes: &[u8]) -> Option<ProbeInfo>;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;

    /// Decode knowing the image will be scaled to at most `target`.
    /// Backends without a downscale-on-decode path just decode fully.
    fn decode_bounded(&self, bytes: &[u8], target: (u32, u32)) -> Result<DynamicImage> {
        let _ = target;
        self.decode(bytes)
    }
}

fn header_probe(bytes: &[u8], expect: Option<image::ImageFormat>) -> Option<ProbeInfo> {
    let format = image::guess_format(bytes).ok()?;
    if let Some(expected) = expect {
        if format != expected {
            return None;
        }
    }
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    let name = format.extensions_str().first().copied().unwrap_or("unknown");
    Some(ProbeInfo {
        format: Cow::Borrowed(name),
        width,
        height,
    })
}

/// Run a decoder that may panic out of foreign code, turning panics
/// into decode errors.
fn guard_decode<F>(provider: &'static str, f: F) -> Result<DynamicImage>
where
    F: FnOnce() -> Result<DynamicImage>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "decoder panicked".to_string());
            Err(RenderError::decode_failed(provider, message))
        }
    }
}

/// JPEG decoding through mozjpeg, backed by libjpeg-turbo. Much faster
/// than the pure Rust decoder on large pages.
pub struct MozjpegProvider;

impl DecodeProvider for MozjpegProvider {
    fn name(&self) -> &'static str {
        "mozjpeg"
    }

    fn probe(&self, bytes: &[u8]) -> Option<ProbeInfo> {
        header_probe(bytes, Some(image::ImageFormat::Jpeg))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        guard_decode(self.name(), || {
            // Truncated files make libjpeg block looking for the end
            // marker, reject them up front.
            if !bytes.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
                return Err(RenderError::decode_failed(
                    self.name(),
                    "missing JPEG EOI marker",
                ));
            }
            let decompress = Decompress::new_mem(bytes).map_err(|e| {
                RenderError::decode_failed(self.name(), format!("decompress init failed: {e:?}"))
            })?;
            let mut decompress = decompress.rgb().map_err(|e| {
                RenderError::decode_failed(self.name(), format!("rgb conversion failed: {e:?}"))
            })?;

            let width = decompress.width() as u32;
            let height = decompress.height() as u32;
            check_dimensions(width, height)?;

            let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
                RenderError::decode_failed(self.name(), format!("scanline read failed: {e:?}"))
            })?;
            let flat: Vec<u8> = pixels.into_iter().flatten().collect();
            RgbImage::from_raw(width, height, flat)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| {
                    RenderError::decode_failed(self.name(), "scanline buffer has wrong size")
                })
        })
    }
}

/// PNG decoding through zune-png. 16-bit channels are stripped to 8.
pub struct ZunePngProvider;

impl DecodeProvider for ZunePngProvider {
    fn name(&self) -> &'static str {
        "zune-png"
    }

    fn probe(&self, bytes: &[u8]) -> Option<ProbeInfo> {
        header_probe(bytes, Some(image::ImageFormat::Png))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(bytes), options);
        let pixels = decoder
            .decode()
            .map_err(|e| RenderError::decode_failed(self.name(), format!("decode failed: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| RenderError::decode_failed(self.name(), "missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(RenderError::decode_failed(
                    self.name(),
                    "unexpected non-U8 pixel buffer",
                ))
            }
        };
        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| RenderError::decode_failed(self.name(), "missing colorspace"))?;

        let build_err =
            |kind: &str| RenderError::decode_failed("zune-png", format!("failed to build {kind} image"));
        match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| build_err("RGB")),
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| build_err("RGBA"))
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| build_err("Luma")),
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| build_err("LumaA")),
            other => Err(RenderError::decode_failed(
                self.name(),
                format!("unsupported colorspace {other:?}"),
            )),
        }
    }
}

/// Catch-all decoding through the image crate.
pub struct ImageCrateProvider;

impl DecodeProvider for ImageCrateProvider {
    fn name(&self) -> &'static str {
        "image"
    }

    fn probe(&self, bytes: &[u8]) -> Option<ProbeInfo> {
        header_probe(bytes, None)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        guard_decode(self.name(), || {
            image::load_from_memory(bytes)
                .map_err(|e| RenderError::decode_failed(self.name(), format!("decode failed: {e}")))
        })
    }
}

/// Reject images that would blow up memory before any pixels are
/// allocated.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RenderError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(RenderError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Header-only inspection without decoding any pixel data.
pub fn image_info(bytes: &[u8]) -> Option<ProbeInfo> {
    header_probe(bytes, None)
}

/// Pull the embedded ICC profile out of JPEG, PNG or WebP containers.
/// Profiles with a broken header are dropped rather than handed to the
/// color engine.
pub fn extract_icc_profile(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < 12 {
        return None;
    }
    let icc = if bytes[..2] == [0xFF, 0xD8] {
        Jpeg::from_bytes(bytes.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec())?
    } else if bytes.starts_with(b"\x89PNG") {
        Png::from_bytes(bytes.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec())?
    } else if &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        WebP::from_bytes(bytes.to_vec().into())
            .ok()?
            .icc_profile()
            .map(|icc| icc.to_vec())?
    } else {
        return None;
    };
    if validate_icc_profile(&icc) {
        Some(icc)
    } else {
        None
    }
}

/// Sanity-check the 128-byte ICC header: size field, version, and the
/// four-character signatures that must be printable ASCII.
pub(crate) fn validate_icc_profile(icc: &[u8]) -> bool {
    if icc.len() < 128 {
        return false;
    }
    let declared = u32::from_be_bytes([icc[0], icc[1], icc[2], icc[3]]) as usize;
    if declared != icc.len() {
        return false;
    }
    if icc[8] > 10 {
        return false;
    }
    let ascii_fields = [&icc[4..8], &icc[12..16], &icc[16..20], &icc[20..24]];
    ascii_fields.iter().all(|field| {
        field
            .iter()
            .all(|&byte| (32..=126).contains(&byte) || byte == 0)
    })
}

/// One provider attempt during a load.
#[derive(Debug)]
pub struct LoadAttempt {
    pub provider: &'static str,
    /// `None` on success.
    pub error: Option<String>,
}

/// Record of which providers were tried, in order.
#[derive(Debug, Default)]
pub struct LoadTrace {
    pub attempts: Vec<LoadAttempt>,
}

/// Ordered provider chain.
pub struct Loader {
    providers: Vec<Box<dyn DecodeProvider>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::with_providers(vec![
            Box::new(MozjpegProvider),
            Box::new(ZunePngProvider),
            Box::new(ImageCrateProvider),
        ])
    }
}

impl Loader {
    pub fn with_providers(providers: Vec<Box<dyn DecodeProvider>>) -> Self {
        Self { providers }
    }

    /// Decode a source through the provider chain.
    pub fn load(&self, source: &Source) -> Result<ImageBuffer> {
        let bytes = source.bytes()?;
        self.load_bytes(&bytes, None, None)
    }

    /// Decode knowing the result will be scaled to at most `target`.
    /// The bound is clamped to the source dimensions first, a smaller
    /// target never enlarges the decode.
    pub fn load_bounded(&self, source: &Source, target: (u32, u32)) -> Result<ImageBuffer> {
        let bytes = source.bytes()?;
        let target = match image_info(&bytes) {
            Some(info) => (target.0.min(info.width), target.1.min(info.height)),
            None => target,
        };
        self.load_bytes(&bytes, Some(target), None)
    }

    /// Like [`Loader::load`], returning the attempt log alongside the
    /// result.
    pub fn load_with_trace(&self, source: &Source) -> (Result<ImageBuffer>, LoadTrace) {
        let mut trace = LoadTrace::default();
        let result = match source.bytes() {
            Ok(bytes) => self.load_bytes(&bytes, None, Some(&mut trace)),
            Err(err) => Err(err),
        };
        (result, trace)
    }

    fn load_bytes(
        &self,
        bytes: &[u8],
        target: Option<(u32, u32)>,
        mut trace: Option<&mut LoadTrace>,
    ) -> Result<ImageBuffer> {
        let mut last_error: Option<RenderError> = None;
        for provider in self.ordered_providers(bytes) {
            let attempt = match target {
                Some(bound) => provider.decode_bounded(bytes, bound),
                None => provider.decode(bytes),
            };
            match attempt {
                Ok(image) => {
                    // An oversized result counts as a provider failure,
                    // another backend may downscale at decode time.
                    if let Err(err) = check_dimensions(image.width(), image.height()) {
                        debug!(provider = provider.name(), error = %err, "decoded image over limits");
                        if let Some(trace) = trace.as_deref_mut() {
                            trace.attempts.push(LoadAttempt {
                                provider: provider.name(),
                                error: Some(err.to_string()),
                            });
                        }
                        last_error = Some(err);
                        continue;
                    }
                    if let Some(trace) = trace.as_deref_mut() {
                        trace.attempts.push(LoadAttempt {
                            provider: provider.name(),
                            error: None,
                        });
                    }
                    let decoded = DecodedImage {
                        image,
                        icc_profile: extract_icc_profile(bytes),
                        orientation: orientation_from_bytes(bytes),
                    };
                    return Ok(ImageBuffer::from_decoded(decoded));
                }
                Err(err) => {
                    debug!(provider = provider.name(), error = %err, "decode attempt failed");
                    if let Some(trace) = trace.as_deref_mut() {
                        trace.attempts.push(LoadAttempt {
                            provider: provider.name(),
                            error: Some(err.to_string()),
                        });
                    }
                    if !err.is_provider_failure() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(RenderError::all_providers_failed(last_error))
    }

    /// Providers whose probe recognizes the bytes come first, in their
    /// configured order, then the rest as a fallback tail.
    fn ordered_providers<'a>(
        &'a self,
        bytes: &[u8],
    ) -> impl Iterator<Item = &'a dyn DecodeProvider> + 'a {
        let mut recognized = Vec::new();
        let mut rest = Vec::new();
        for provider in &self.providers {
            if provider.probe(bytes).is_some() {
                recognized.push(provider.as_ref());
            } else {
                rest.push(provider.as_ref());
            }
        }
        recognized.into_iter().chain(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 30, 200]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn png_decodes_through_chain() {
        let loader = Loader::default();
        let source = Source::from_vec(png_bytes(20, 10));
        let buffer = loader.load(&source).unwrap();
        assert_eq!((buffer.width, buffer.height), (20, 10));
        assert_eq!(&buffer.data[..3], &[120, 30, 200]);
    }

    #[test]
    fn probe_orders_recognizing_provider_first() {
        let loader = Loader::default();
        let bytes = png_bytes(4, 4);
        let names: Vec<_> = loader
            .ordered_providers(&bytes)
            .map(|p| p.name())
            .collect();
        assert_eq!(names, ["zune-png", "image", "mozjpeg"]);
    }

    #[test]
    fn garbage_fails_with_last_error() {
        let loader = Loader::default();
        let source = Source::from_vec(vec![0u8; 64]);
        let err = loader.load(&source).unwrap_err();
        assert!(matches!(err, RenderError::AllProvidersFailed { .. }));
    }

    #[test]
    fn trace_records_every_attempt() {
        let loader = Loader::default();
        let (result, trace) = loader.load_with_trace(&Source::from_vec(vec![1u8; 16]));
        assert!(result.is_err());
        assert_eq!(trace.attempts.len(), 3);
        assert!(trace.attempts.iter().all(|a| a.error.is_some()));
    }

    #[test]
    fn image_info_reads_header_only() {
        let info = image_info(&png_bytes(33, 44)).unwrap();
        assert_eq!(info.format, "png");
        assert_eq!((info.width, info.height), (33, 44));
        assert_eq!(image_info(b"not an image"), None);
    }

    #[test]
    fn dimension_limits_enforced() {
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(RenderError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000),
            Err(RenderError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn icc_validation_rejects_short_and_mis_sized() {
        assert!(!validate_icc_profile(&[0u8; 64]));
        let mut profile = vec![0u8; 128];
        profile[..4].copy_from_slice(&200u32.to_be_bytes());
        assert!(!validate_icc_profile(&profile));
        profile[..4].copy_from_slice(&128u32.to_be_bytes());
        assert!(validate_icc_profile(&profile));
    }

    struct FailingProvider;
    impl DecodeProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn probe(&self, _bytes: &[u8]) -> Option<ProbeInfo> {
            Some(ProbeInfo {
                format: Cow::Borrowed("fake"),
                width: 1,
                height: 1,
            })
        }
        fn decode(&self, _bytes: &[u8]) -> Result<DynamicImage> {
            Err(RenderError::decode_failed("failing", "always fails"))
        }
    }

    struct OversizedProvider;
    impl DecodeProvider for OversizedProvider {
        fn name(&self) -> &'static str {
            "oversized"
        }
        fn probe(&self, _bytes: &[u8]) -> Option<ProbeInfo> {
            Some(ProbeInfo {
                format: Cow::Borrowed("fake"),
                width: MAX_DIMENSION + 1,
                height: 1,
            })
        }
        fn decode(&self, _bytes: &[u8]) -> Result<DynamicImage> {
            Ok(DynamicImage::ImageRgb8(RgbImage::new(MAX_DIMENSION + 1, 1)))
        }
    }

    #[test]
    fn oversized_decode_falls_through_to_next_provider() {
        let loader = Loader::with_providers(vec![
            Box::new(OversizedProvider),
            Box::new(ImageCrateProvider),
        ]);
        let (result, trace) = loader.load_with_trace(&Source::from_vec(png_bytes(5, 5)));
        assert!(result.is_ok());
        assert_eq!(trace.attempts.len(), 2);
        assert!(trace.attempts[0].error.is_some());
        assert!(trace.attempts[1].error.is_none());
    }

    #[test]
    fn chain_falls_through_failing_provider() {
        let loader = Loader::with_providers(vec![
            Box::new(FailingProvider),
            Box::new(ImageCrateProvider),
        ]);
        let buffer = loader.load(&Source::from_vec(png_bytes(5, 5))).unwrap();
        assert_eq!((buffer.width, buffer.height), (5, 5));
    }

    #[test]
    fn bounded_load_clamps_to_source() {
        let loader = Loader::default();
        let source = Source::from_vec(png_bytes(10, 10));
        // A hint larger than the source never enlarges anything.
        let buffer = loader.load_bounded(&source, (512, 512)).unwrap();
        assert_eq!((buffer.width, buffer.height), (10, 10));
    }
}
