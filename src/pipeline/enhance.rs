//! Post-render image adjustments.
//!
//! Factor semantics: 1.0 is the unmodified image, 0.0 removes the
//! quality entirely (black, mean gray, grayscale, smoothed), values
//! above 1.0 amplify it. Auto-contrast overrides the contrast factor
//! with a per-channel histogram stretch. Alpha channels pass through
//! untouched.

use image::{imageops, DynamicImage};

use crate::pipeline::buffer::{DecodedImage, ImageBuffer};

/// Adjustment factors applied by [`enhance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceOptions {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
    /// Stretch each channel to the full range, ignoring `contrast`.
    pub auto_contrast: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            sharpness: 1.0,
            auto_contrast: false,
        }
    }
}

impl EnhanceOptions {
    /// True when applying these options would change nothing.
    pub fn is_neutral(&self) -> bool {
        self.brightness == 1.0
            && self.contrast == 1.0
            && self.saturation == 1.0
            && self.sharpness == 1.0
            && !self.auto_contrast
    }
}

/// Apply brightness, contrast, saturation and sharpness adjustments in
/// that order.
pub fn enhance(buffer: ImageBuffer, options: &EnhanceOptions) -> ImageBuffer {
    if options.is_neutral() {
        return buffer;
    }
    let mut buffer = buffer;
    if options.brightness != 1.0 {
        for_each_rgb(&mut buffer, |px| {
            for channel in px {
                *channel = clamp_channel(*channel as f32 * options.brightness);
            }
        });
    }
    if options.auto_contrast {
        stretch_channels(&mut buffer);
    } else if options.contrast != 1.0 {
        let mean = mean_luminance(&buffer);
        for_each_rgb(&mut buffer, |px| {
            for channel in px {
                *channel = clamp_channel(mean + (*channel as f32 - mean) * options.contrast);
            }
        });
    }
    if options.saturation != 1.0 {
        for_each_rgb(&mut buffer, |px| {
            let gray = luminance(px[0], px[1], px[2]);
            for channel in px {
                *channel = clamp_channel(gray + (*channel as f32 - gray) * options.saturation);
            }
        });
    }
    if options.sharpness != 1.0 {
        buffer = blend_sharpness(buffer, options.sharpness);
    }
    buffer
}

fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Visit the RGB bytes of every pixel, skipping row padding and alpha.
fn for_each_rgb(buffer: &mut ImageBuffer, mut f: impl FnMut(&mut [u8])) {
    let channels = buffer.format.channels();
    let width = buffer.width as usize;
    let stride = buffer.stride;
    for y in 0..buffer.height as usize {
        let row = &mut buffer.data[y * stride..y * stride + width * channels];
        for px in row.chunks_exact_mut(channels) {
            f(&mut px[..3]);
        }
    }
}

fn mean_luminance(buffer: &ImageBuffer) -> f32 {
    let channels = buffer.format.channels();
    let mut total = 0.0f64;
    let mut count = 0u64;
    for y in 0..buffer.height as usize {
        let row = &buffer.data[y * buffer.stride..];
        for px in row[..buffer.width as usize * channels].chunks_exact(channels) {
            total += luminance(px[0], px[1], px[2]) as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}

/// Per-channel histogram stretch to the full 0..=255 range.
fn stretch_channels(buffer: &mut ImageBuffer) {
    let mut min = [255u8; 3];
    let mut max = [0u8; 3];
    let channels = buffer.format.channels();
    for y in 0..buffer.height as usize {
        let row = &buffer.data[y * buffer.stride..];
        for px in row[..buffer.width as usize * channels].chunks_exact(channels) {
            for c in 0..3 {
                min[c] = min[c].min(px[c]);
                max[c] = max[c].max(px[c]);
            }
        }
    }
    for_each_rgb(buffer, |px| {
        for c in 0..3 {
            if max[c] > min[c] {
                let scaled =
                    (px[c] - min[c]) as f32 * 255.0 / (max[c] - min[c]) as f32;
                px[c] = clamp_channel(scaled);
            }
        }
    });
}

/// Blend between a 3x3-smoothed copy (factor 0) and the original
/// (factor 1); factors above 1 overshoot into sharpening.
fn blend_sharpness(buffer: ImageBuffer, factor: f32) -> ImageBuffer {
    // Center-weighted smoothing kernel.
    const SMOOTH: [f32; 9] = [
        1.0 / 13.0,
        1.0 / 13.0,
        1.0 / 13.0,
        1.0 / 13.0,
        5.0 / 13.0,
        1.0 / 13.0,
        1.0 / 13.0,
        1.0 / 13.0,
        1.0 / 13.0,
    ];
    let smoothed = match buffer.to_dynamic() {
        DynamicImage::ImageRgb8(rgb) => {
            DynamicImage::ImageRgb8(imageops::filter3x3(&rgb, &SMOOTH))
        }
        DynamicImage::ImageRgba8(rgba) => {
            DynamicImage::ImageRgba8(imageops::filter3x3(&rgba, &SMOOTH))
        }
        other => other,
    };
    let smoothed = ImageBuffer::from_decoded(DecodedImage {
        image: smoothed,
        icc_profile: None,
        orientation: None,
    });
    let mut out = buffer;
    let channels = out.format.channels();
    let width = out.width as usize;
    for y in 0..out.height as usize {
        let smooth_row = &smoothed.data[y * smoothed.stride..];
        let row = &mut out.data[y * out.stride..y * out.stride + width * channels];
        for (x, px) in row.chunks_exact_mut(channels).enumerate() {
            for c in 0..3 {
                let base = smooth_row[x * channels + c] as f32;
                let original = px[c] as f32;
                px[c] = clamp_channel(base + (original - base) * factor);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn buffer_from(img: RgbImage) -> ImageBuffer {
        ImageBuffer::from_decoded(DecodedImage {
            image: DynamicImage::ImageRgb8(img),
            icc_profile: None,
            orientation: None,
        })
    }

    #[test]
    fn neutral_options_change_nothing() {
        let buffer = buffer_from(RgbImage::from_fn(6, 4, |x, y| {
            image::Rgb([x as u8 * 10, y as u8 * 20, 77])
        }));
        let before = buffer.data.clone();
        let out = enhance(buffer, &EnhanceOptions::default());
        assert_eq!(out.data, before);
    }

    #[test]
    fn zero_brightness_is_black() {
        let buffer = buffer_from(RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50])));
        let out = enhance(
            buffer,
            &EnhanceOptions {
                brightness: 0.0,
                ..EnhanceOptions::default()
            },
        );
        assert!(out.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_saturation_is_grayscale() {
        let buffer = buffer_from(RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 10])));
        let out = enhance(
            buffer,
            &EnhanceOptions {
                saturation: 0.0,
                ..EnhanceOptions::default()
            },
        );
        let px = &out.data[..3];
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn zero_contrast_flattens_to_mean() {
        let mut img = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        img.put_pixel(1, 0, image::Rgb([200, 200, 200]));
        let out = enhance(
            buffer_from(img),
            &EnhanceOptions {
                contrast: 0.0,
                ..EnhanceOptions::default()
            },
        );
        assert_eq!(out.data[0], out.data[3]);
        assert_eq!(out.data[0], 150);
    }

    #[test]
    fn auto_contrast_stretches_to_full_range() {
        let mut img = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        img.put_pixel(1, 0, image::Rgb([150, 150, 150]));
        let out = enhance(
            buffer_from(img),
            &EnhanceOptions {
                auto_contrast: true,
                ..EnhanceOptions::default()
            },
        );
        assert_eq!(&out.data[..3], &[0, 0, 0]);
        assert_eq!(&out.data[3..6], &[255, 255, 255]);
    }

    #[test]
    fn auto_contrast_overrides_contrast_factor() {
        let mut img = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        img.put_pixel(1, 0, image::Rgb([150, 150, 150]));
        let out = enhance(
            buffer_from(img),
            &EnhanceOptions {
                contrast: 0.0,
                auto_contrast: true,
                ..EnhanceOptions::default()
            },
        );
        assert_eq!(out.data[0], 0);
        assert_eq!(out.data[3], 255);
    }

    #[test]
    fn smoothing_pulls_outlier_toward_neighbors() {
        let mut img = RgbImage::from_pixel(3, 3, image::Rgb([0, 0, 0]));
        img.put_pixel(1, 1, image::Rgb([255, 255, 255]));
        let out = enhance(
            buffer_from(img),
            &EnhanceOptions {
                sharpness: 0.0,
                ..EnhanceOptions::default()
            },
        );
        let center = (1 * 3 + 1) * 3;
        assert!(out.data[center] < 255);
        assert!(out.data[center] > 0);
    }

    #[test]
    fn sharpness_keeps_geometry() {
        let buffer = buffer_from(RgbImage::from_fn(5, 7, |x, y| {
            image::Rgb([x as u8 * 30, y as u8 * 30, 0])
        }));
        let out = enhance(
            buffer,
            &EnhanceOptions {
                sharpness: 2.0,
                ..EnhanceOptions::default()
            },
        );
        assert_eq!((out.width, out.height), (5, 7));
        assert_eq!(out.data.len(), 5 * 7 * 3);
    }
}
