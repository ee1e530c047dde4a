//! End-to-end pipeline tests: encoded bytes in, rendered buffers out.

use std::io::Cursor;
use std::io::Write as _;
use std::sync::Arc;

use image::{DynamicImage, RgbImage, RgbaImage};
use page_render::pipeline::loader::{DecodeProvider, ImageCrateProvider, ProbeInfo};
use page_render::pipeline::{
    combine_side_by_side, fit_in_rectangle, most_common_edge_color, ColorEngine, FitOptions,
    Loader, PixelFormat, Source,
};
use page_render::{Background, ColorConfig, RenderError, RenderingIntent};

fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn encode_jpeg(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

#[test]
fn png_page_renders_to_fit() {
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 600, image::Rgb([180, 40, 40])));
    let loader = Loader::default();
    let engine = ColorEngine::new();

    let buffer = loader.load(&Source::from_vec(encode_png(&page))).unwrap();
    let rendered =
        fit_in_rectangle(&engine, buffer, 300, 300, &FitOptions::default()).unwrap();
    assert_eq!((rendered.width, rendered.height), (200, 300));
    assert_eq!(rendered.format, PixelFormat::Rgb8);
}

#[test]
fn jpeg_page_round_trips_through_native_decoder() {
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, image::Rgb([230, 230, 230])));
    let loader = Loader::default();
    let buffer = loader.load(&Source::from_vec(encode_jpeg(&page))).unwrap();
    assert_eq!((buffer.width, buffer.height), (64, 64));
    // JPEG is lossy, allow a little drift on a flat image.
    assert!(buffer.data[0].abs_diff(230) <= 4);
}

#[test]
fn mapped_file_loads_like_memory() {
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, image::Rgb([1, 2, 3])));
    let bytes = encode_png(&page);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let loader = Loader::default();
    let mapped = loader.load(&Source::map_path(file.path()).unwrap()).unwrap();
    let in_memory = loader.load(&Source::from_vec(bytes)).unwrap();
    assert_eq!(mapped.data, in_memory.data);
}

#[test]
fn missing_file_reports_read_error() {
    let err = Source::map_path("/nonexistent/page.png").unwrap_err();
    assert!(matches!(err, RenderError::FileReadFailed { .. }));
}

struct RejectEverything;
impl DecodeProvider for RejectEverything {
    fn name(&self) -> &'static str {
        "reject"
    }
    fn probe(&self, _bytes: &[u8]) -> Option<ProbeInfo> {
        // Claims every payload so it is always tried first.
        Some(ProbeInfo {
            format: "anything".into(),
            width: 1,
            height: 1,
        })
    }
    fn decode(&self, _bytes: &[u8]) -> page_render::Result<DynamicImage> {
        Err(RenderError::decode_failed("reject", "not today"))
    }
}

#[test]
fn loader_falls_through_to_working_provider() {
    let loader = Loader::with_providers(vec![
        Box::new(RejectEverything),
        Box::new(ImageCrateProvider),
    ]);
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, image::Rgb([9, 9, 9])));
    let (result, trace) = loader.load_with_trace(&Source::from_vec(encode_png(&page)));
    assert!(result.is_ok());
    assert_eq!(trace.attempts.len(), 2);
    assert_eq!(trace.attempts[0].provider, "reject");
    assert!(trace.attempts[0].error.is_some());
    assert_eq!(trace.attempts[1].provider, "image");
    assert!(trace.attempts[1].error.is_none());
}

#[test]
fn transparent_page_flattens_over_background() {
    let page = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        32,
        32,
        image::Rgba([255, 0, 0, 0]),
    ));
    let loader = Loader::default();
    let engine = ColorEngine::new();
    let buffer = loader.load(&Source::from_vec(encode_png(&page))).unwrap();
    assert_eq!(buffer.format, PixelFormat::Rgba8);

    let options = FitOptions {
        background: Background::Solid([10, 20, 30]),
        ..FitOptions::default()
    };
    let rendered = fit_in_rectangle(&engine, buffer, 32, 32, &options).unwrap();
    assert_eq!(rendered.format, PixelFormat::Rgb8);
    // Fully transparent red shows only the background.
    assert_eq!(&rendered.data[..3], &[10, 20, 30]);
}

#[test]
fn display_transforms_rebuild_only_on_config_change() {
    let engine = ColorEngine::new();
    let loader = Loader::default();
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([5, 5, 5])));
    let bytes = encode_png(&page);

    let config = ColorConfig {
        enabled: true,
        display_profile: Some(Arc::new(vec![0u8; 32])),
        intent: RenderingIntent::Perceptual,
    };
    let options = FitOptions {
        color: config.clone(),
        ..FitOptions::default()
    };
    for _ in 0..3 {
        let buffer = loader.load(&Source::from_vec(bytes.clone())).unwrap();
        fit_in_rectangle(&engine, buffer, 8, 8, &options).unwrap();
    }
    assert_eq!(engine.rebuild_count(), 1);

    let changed = FitOptions {
        color: ColorConfig {
            intent: RenderingIntent::Saturation,
            ..config
        },
        ..FitOptions::default()
    };
    let buffer = loader.load(&Source::from_vec(bytes)).unwrap();
    fit_in_rectangle(&engine, buffer, 8, 8, &changed).unwrap();
    assert_eq!(engine.rebuild_count(), 2);
}

#[test]
fn double_page_spread_and_edge_color() {
    let loader = Loader::default();
    let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, image::Rgb([250, 250, 250])));
    let left = loader.load(&Source::from_vec(encode_png(&white))).unwrap();
    let right = left.clone();

    let spread = combine_side_by_side(&left, &right, false);
    assert_eq!((spread.width, spread.height), (80, 60));

    let color = most_common_edge_color(&[&left, &right], 2);
    assert_eq!(color, [250 * 257, 250 * 257, 250 * 257]);
}
