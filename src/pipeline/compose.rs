//! Geometry and alpha composition: scaling, rotation, alpha flattening
//! and page assembly.

use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops, DynamicImage, RgbImage, RgbaImage};
use tracing::trace;

use crate::error::{RenderError, Result};
use crate::pipeline::buffer::{ImageBuffer, PixelFormat};
use crate::pipeline::color::ColorEngine;
use crate::pipeline::fit::fitting_size;
use crate::pipeline::orientation::{implied_rotation, size_rotation, Rotation};
use crate::pipeline::UNBOUNDED_SIZE;
use crate::prefs::{AutoRotate, Background, ColorConfig, ScalingPrefs};

/// Checkerboard cell size in pixels.
const CHECKER_CELL: u32 = 8;
const CHECKER_DARK: [u8; 3] = [0x77, 0x77, 0x77];
const CHECKER_LIGHT: [u8; 3] = [0x99, 0x99, 0x99];

/// Everything that steers [`fit_in_rectangle`].
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub keep_ratio: bool,
    pub scale_up: bool,
    /// Explicit rotation in degrees, composed with the EXIF and
    /// auto-rotate contributions. Must be a multiple of 90.
    pub rotation: i32,
    pub auto_rotate: AutoRotate,
    pub background: Background,
    pub scaling: ScalingPrefs,
    /// Thumbnail renders skip the display color transform.
    pub thumbnail: bool,
    pub color: ColorConfig,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            keep_ratio: true,
            scale_up: false,
            rotation: 0,
            auto_rotate: AutoRotate::Disabled,
            background: Background::default(),
            scaling: ScalingPrefs::default(),
            thumbnail: false,
            color: ColorConfig::default(),
        }
    }
}

/// Render a page buffer to fit inside a target rectangle.
///
/// Stage order: resolve the total rotation, fit against the (possibly
/// axis-swapped) target, resize, flatten alpha over the background,
/// rotate, and finally color-correct. A non-positive target dimension
/// means that axis is unconstrained.
pub fn fit_in_rectangle(
    engine: &ColorEngine,
    buffer: ImageBuffer,
    width: i32,
    height: i32,
    options: &FitOptions,
) -> Result<ImageBuffer> {
    let target_width = if width <= 0 { UNBOUNDED_SIZE } else { width as u32 };
    let target_height = if height <= 0 { UNBOUNDED_SIZE } else { height as u32 };

    let user = Rotation::from_degrees(options.rotation)?;
    let implied = implied_rotation(&buffer);
    let (upright_width, upright_height) = match implied {
        Rotation::R90 | Rotation::R270 => (buffer.height, buffer.width),
        _ => (buffer.width, buffer.height),
    };
    let auto = size_rotation(upright_width, upright_height, options.auto_rotate);
    let rotation = implied.compose(user).compose(auto);

    // Fit against the swapped target so the rotated result fills it.
    let (fit_width, fit_height) = match rotation {
        Rotation::R90 | Rotation::R270 => (target_height, target_width),
        _ => (target_width, target_height),
    };
    let (dst_width, dst_height) = fitting_size(
        (buffer.width, buffer.height),
        (fit_width, fit_height),
        options.keep_ratio,
        options.scale_up,
    );
    trace!(
        src_width = buffer.width,
        src_height = buffer.height,
        dst_width,
        dst_height,
        rotation = rotation.degrees(),
        "fitting page"
    );

    let mut buffer = resize_buffer(buffer, dst_width, dst_height, &options.scaling)?;
    if buffer.format.has_alpha() {
        buffer = flatten_alpha(&buffer, options.background);
    }
    buffer = rotate_buffer(buffer, rotation);
    buffer.orientation = None;

    if options.thumbnail {
        return Ok(buffer);
    }
    Ok(engine.apply_display_transform(buffer, &options.color))
}

/// Stretch a buffer to exactly fill a rectangle, ignoring aspect ratio.
pub fn fit_to_rectangle(
    engine: &ColorEngine,
    buffer: ImageBuffer,
    width: i32,
    height: i32,
    options: &FitOptions,
) -> Result<ImageBuffer> {
    let stretched = FitOptions {
        keep_ratio: false,
        scale_up: true,
        ..options.clone()
    };
    fit_in_rectangle(engine, buffer, width, height, &stretched)
}

/// Resize through fast_image_resize when an external filter is set,
/// otherwise through the image crate. Pixel-art mode forces
/// nearest-neighbor regardless.
fn resize_buffer(
    buffer: ImageBuffer,
    dst_width: u32,
    dst_height: u32,
    scaling: &ScalingPrefs,
) -> Result<ImageBuffer> {
    if dst_width == buffer.width && dst_height == buffer.height {
        return Ok(buffer);
    }
    let icc_profile = buffer.icc_profile.clone();
    let orientation = buffer.orientation;
    let format = buffer.format;

    let resized = if scaling.pixel_art {
        image_crate_resize(&buffer, dst_width, dst_height, imageops::FilterType::Nearest)
    } else if let Some(filter) = scaling.external_filter {
        let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(filter));
        fast_resize(&buffer, dst_width, dst_height, options).map_err(|message| {
            RenderError::resize_failed(
                (buffer.width, buffer.height),
                (dst_width, dst_height),
                message,
            )
        })?
    } else {
        image_crate_resize(&buffer, dst_width, dst_height, scaling.quality)
    };

    let mut out = ImageBuffer::from_raw(
        resized,
        dst_width,
        dst_height,
        dst_width as usize * format.channels(),
        format,
    )
    .ok_or_else(|| {
        RenderError::resize_failed(
            (buffer.width, buffer.height),
            (dst_width, dst_height),
            "resized buffer has wrong size",
        )
    })?;
    out.icc_profile = icc_profile;
    out.orientation = orientation;
    Ok(out)
}

fn image_crate_resize(
    buffer: &ImageBuffer,
    dst_width: u32,
    dst_height: u32,
    filter: imageops::FilterType,
) -> Vec<u8> {
    match buffer.to_dynamic() {
        DynamicImage::ImageRgb8(rgb) => {
            imageops::resize(&rgb, dst_width, dst_height, filter).into_raw()
        }
        DynamicImage::ImageRgba8(rgba) => {
            imageops::resize(&rgba, dst_width, dst_height, filter).into_raw()
        }
        other => {
            // to_dynamic only produces the two arms above.
            imageops::resize(&other.into_rgb8(), dst_width, dst_height, filter).into_raw()
        }
    }
}

fn pixel_type_for(format: PixelFormat) -> PixelType {
    match format {
        PixelFormat::Rgb8 => PixelType::U8x3,
        PixelFormat::Rgba8 => PixelType::U8x4,
    }
}

/// SIMD resize path. Alpha is premultiplied around the convolution so
/// transparent pixels cannot bleed color into their neighbors.
fn fast_resize(
    buffer: &ImageBuffer,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<Vec<u8>, String> {
    let pixel_type = pixel_type_for(buffer.format);
    let mut src_pixels = buffer.tight_pixels();
    let required_bytes = buffer.width as usize * buffer.height as usize * pixel_type.size();
    if src_pixels.len() < required_bytes {
        return Err(format!(
            "source buffer too small, expected {required_bytes} bytes, got {}",
            src_pixels.len()
        ));
    }

    match fir::images::Image::from_slice_u8(
        buffer.width,
        buffer.height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(buffer.width, buffer.height, pixel_type);
            let aligned_buffer = aligned.buffer_mut();
            if aligned_buffer.len() != required_bytes {
                return Err(format!(
                    "alignment fallback buffer mismatch, expected {required_bytes} bytes, got {}",
                    aligned_buffer.len()
                ));
            }
            aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
            resize_with_source_image(aligned, pixel_type, dst_width, dst_height, options)
        }
        Err(other) => Err(format!("source image rejected: {other:?}")),
    }
}

/// Skip the premultiply round trip when every alpha byte is 255. Only
/// worth scanning for on large images; small ones premultiply faster
/// than they scan.
fn is_fully_opaque(image: &fir::images::Image, pixel_type: PixelType) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true;
    }
    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (image.width() as u64) * (image.height() as u64) < THRESHOLD_PIXELS {
        return false;
    }
    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<Vec<u8>, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let needs_premultiply =
        pixel_type == PixelType::U8x4 && !is_fully_opaque(&src_image, pixel_type);
    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("premultiply failed: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("resize failed: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("unpremultiply failed: {e}"))?;
    }
    Ok(dst_image.into_vec())
}

/// Composite an RGBA buffer over the configured background, producing
/// an opaque RGB buffer.
fn flatten_alpha(buffer: &ImageBuffer, background: Background) -> ImageBuffer {
    let mut data = Vec::with_capacity(buffer.width as usize * buffer.height as usize * 3);
    let channels = buffer.format.channels();
    for y in 0..buffer.height {
        let row = &buffer.data[y as usize * buffer.stride..];
        for x in 0..buffer.width {
            let px = &row[x as usize * channels..x as usize * channels + channels];
            let (fg, alpha) = ([px[0], px[1], px[2]], px.get(3).copied().unwrap_or(255));
            let bg = match background {
                Background::Solid(color) => color,
                Background::Checkerboard => {
                    if (x / CHECKER_CELL + y / CHECKER_CELL) % 2 == 0 {
                        CHECKER_DARK
                    } else {
                        CHECKER_LIGHT
                    }
                }
            };
            for channel in 0..3 {
                let blended = (fg[channel] as u32 * alpha as u32
                    + bg[channel] as u32 * (255 - alpha as u32)
                    + 127)
                    / 255;
                data.push(blended as u8);
            }
        }
    }
    let mut out = ImageBuffer::from_raw(
        data,
        buffer.width,
        buffer.height,
        buffer.width as usize * 3,
        PixelFormat::Rgb8,
    )
    .unwrap_or_else(|| unreachable!("flattened buffer geometry is exact"));
    out.icc_profile = buffer.icc_profile.clone();
    out.orientation = buffer.orientation;
    out
}

fn rotate_buffer(buffer: ImageBuffer, rotation: Rotation) -> ImageBuffer {
    if rotation == Rotation::R0 {
        return buffer;
    }
    let icc_profile = buffer.icc_profile.clone();
    let orientation = buffer.orientation;
    let dynamic = buffer.to_dynamic();
    let rotated = match rotation {
        Rotation::R0 => dynamic,
        Rotation::R90 => dynamic.rotate90(),
        Rotation::R180 => dynamic.rotate180(),
        Rotation::R270 => dynamic.rotate270(),
    };
    let mut out = ImageBuffer::from_decoded(crate::pipeline::buffer::DecodedImage {
        image: rotated,
        icc_profile,
        orientation,
    });
    out.orientation = orientation;
    out
}

/// Place two page buffers side by side on a white canvas. In manga
/// mode the second buffer goes on the left.
pub fn combine_side_by_side(
    first: &ImageBuffer,
    second: &ImageBuffer,
    manga_mode: bool,
) -> ImageBuffer {
    let (left, right) = if manga_mode { (second, first) } else { (first, second) };
    let width = left.width + right.width;
    let height = left.height.max(right.height);
    let has_alpha = left.format.has_alpha() || right.format.has_alpha();

    let mut canvas = if has_alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([255, 255, 255, 255]),
        ))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
    };
    let left_img = if has_alpha {
        DynamicImage::ImageRgba8(left.to_dynamic().into_rgba8())
    } else {
        left.to_dynamic()
    };
    let right_img = if has_alpha {
        DynamicImage::ImageRgba8(right.to_dynamic().into_rgba8())
    } else {
        right.to_dynamic()
    };
    imageops::replace(&mut canvas, &left_img, 0, 0);
    imageops::replace(&mut canvas, &right_img, left.width as i64, 0);

    ImageBuffer::from_decoded(crate::pipeline::buffer::DecodedImage {
        image: canvas,
        icc_profile: None,
        orientation: None,
    })
}

/// Surround a buffer with a solid border of the given thickness.
pub fn add_border(buffer: &ImageBuffer, thickness: u32, color: [u8; 4]) -> ImageBuffer {
    let width = buffer.width + 2 * thickness;
    let height = buffer.height + 2 * thickness;
    let needs_alpha = buffer.format.has_alpha() || color[3] != 255;

    let mut canvas = if needs_alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, image::Rgba(color)))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([color[0], color[1], color[2]]),
        ))
    };
    let inner = if needs_alpha {
        DynamicImage::ImageRgba8(buffer.to_dynamic().into_rgba8())
    } else {
        buffer.to_dynamic()
    };
    imageops::replace(&mut canvas, &inner, thickness as i64, thickness as i64);

    let mut out = ImageBuffer::from_decoded(crate::pipeline::buffer::DecodedImage {
        image: canvas,
        icc_profile: buffer.icc_profile.clone(),
        orientation: None,
    });
    out.orientation = buffer.orientation;
    out
}
