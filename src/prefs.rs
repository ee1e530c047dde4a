//! Rendering preferences.
//!
//! These types mirror the knobs a viewer exposes to the user: scaling
//! quality, alpha background, automatic rotation and color management.
//! They are plain data so callers can persist them however they like.

use std::sync::Arc;

/// ICC rendering intent used when building display transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderingIntent {
    /// Compress the gamut smoothly, best for photographic content.
    #[default]
    Perceptual,
    /// Map in-gamut colors exactly, clip the rest.
    RelativeColorimetric,
    /// Preserve saturation at the expense of hue accuracy.
    Saturation,
    /// Absolute colorimetric, including white point.
    AbsoluteColorimetric,
}

impl From<RenderingIntent> for moxcms::RenderingIntent {
    fn from(intent: RenderingIntent) -> Self {
        match intent {
            RenderingIntent::Perceptual => moxcms::RenderingIntent::Perceptual,
            RenderingIntent::RelativeColorimetric => moxcms::RenderingIntent::RelativeColorimetric,
            RenderingIntent::Saturation => moxcms::RenderingIntent::Saturation,
            RenderingIntent::AbsoluteColorimetric => moxcms::RenderingIntent::AbsoluteColorimetric,
        }
    }
}

/// Color management configuration for the display transform stage.
#[derive(Debug, Clone, Default)]
pub struct ColorConfig {
    /// Master switch. When off, pixels pass through untouched.
    pub enabled: bool,
    /// Raw ICC bytes of the display profile. `None` means sRGB.
    pub display_profile: Option<Arc<Vec<u8>>>,
    /// Intent for all transforms built from this config.
    pub intent: RenderingIntent,
}

impl ColorConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn srgb() -> Self {
        Self {
            enabled: true,
            display_profile: None,
            intent: RenderingIntent::default(),
        }
    }
}

/// What to composite transparent pixels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    /// 8px checkerboard of two grays, the classic alpha indicator.
    #[default]
    Checkerboard,
    /// A single solid color.
    Solid([u8; 3]),
}

/// Automatic rotation applied based on the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoRotate {
    #[default]
    Disabled,
    /// Rotate portrait images (height > width) clockwise.
    PortraitBy90,
    /// Rotate portrait images counterclockwise.
    PortraitBy270,
    /// Rotate landscape images (width > height) clockwise.
    LandscapeBy90,
    /// Rotate landscape images counterclockwise.
    LandscapeBy270,
}

/// Scaling quality preferences.
#[derive(Debug, Clone, Copy)]
pub struct ScalingPrefs {
    /// Filter for the image-crate resize path.
    pub quality: image::imageops::FilterType,
    /// When set, resize through fast_image_resize with this filter
    /// instead of the image crate.
    pub external_filter: Option<fast_image_resize::FilterType>,
    /// Force nearest-neighbor everywhere. Meant for pixel art where
    /// interpolation smears hard edges.
    pub pixel_art: bool,
}

impl Default for ScalingPrefs {
    fn default() -> Self {
        Self {
            quality: image::imageops::FilterType::Triangle,
            external_filter: None,
            pixel_art: false,
        }
    }
}
