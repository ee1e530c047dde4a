//! Display color management.
//!
//! Images carrying an embedded ICC profile are transformed into the
//! display's color space before presentation. The engine caches the
//! default sRGB-to-display transforms so the common case, many images
//! with no embedded profile shown on the same monitor, builds a
//! transform once. A display profile that fails to parse is also
//! cached, so the parse cost is paid a single time per configuration.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::pipeline::buffer::{ImageBuffer, PixelFormat};
use crate::prefs::{ColorConfig, RenderingIntent};

type SharedTransform = Arc<moxcms::Transform8BitExecutor>;

#[derive(Default)]
struct TransformCache {
    /// Display profile bytes and intent the cached transforms were
    /// built for. Compared by value, not pointer.
    key: Option<(Option<Arc<Vec<u8>>>, RenderingIntent)>,
    /// sRGB-to-display transforms per pixel layout. `None` with a set
    /// key records a display profile that failed to parse.
    rgb: Option<SharedTransform>,
    rgba: Option<SharedTransform>,
    rebuilds: u64,
}

impl TransformCache {
    fn matches(&self, config: &ColorConfig) -> bool {
        match &self.key {
            Some((profile, intent)) => {
                *intent == config.intent
                    && match (profile, &config.display_profile) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.as_slice() == b.as_slice(),
                        _ => false,
                    }
            }
            None => false,
        }
    }
}

/// Builds and caches display transforms, and applies them to buffers.
pub struct ColorEngine {
    cache: Mutex<TransformCache>,
}

impl Default for ColorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorEngine {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(TransformCache::default()),
        }
    }

    /// Number of times the cached transforms were rebuilt. One rebuild
    /// covers both pixel layouts.
    pub fn rebuild_count(&self) -> u64 {
        self.cache.lock().rebuilds
    }

    /// Transform a buffer into the display color space.
    ///
    /// Passthrough cases: color management disabled, or no display
    /// profile configured. Failures degrade to the untouched buffer
    /// with a warning rather than erroring, a wrong color is better
    /// than no page.
    pub fn apply_display_transform(
        &self,
        mut buffer: ImageBuffer,
        config: &ColorConfig,
    ) -> ImageBuffer {
        if !config.enabled || config.display_profile.is_none() {
            return buffer;
        }

        let transform = match &buffer.icc_profile {
            Some(embedded) => self.embedded_transform(embedded, buffer.format, config),
            None => self.cached_default(buffer.format, config),
        };
        let Some(transform) = transform else {
            return buffer;
        };

        let pixels = buffer.tight_pixels();
        let mut output = vec![0u8; pixels.len()];
        if let Err(err) = transform.transform(&pixels, &mut output) {
            warn!(error = ?err, "color transform failed, leaving pixels untouched");
            return buffer;
        }
        buffer.data = output;
        buffer.stride = buffer.width as usize * buffer.format.channels();
        // Pixels are in display space now, the embedded profile no
        // longer describes them.
        buffer.icc_profile = None;
        buffer
    }

    /// Build a one-off transform from an embedded source profile. Falls
    /// back to the cached sRGB default when the embedded profile is
    /// unusable.
    fn embedded_transform(
        &self,
        embedded: &[u8],
        format: PixelFormat,
        config: &ColorConfig,
    ) -> Option<SharedTransform> {
        match build_transform(Some(embedded), format, config) {
            Ok(transform) => Some(transform),
            Err(err) => {
                warn!(error = ?err, "embedded profile rejected, assuming sRGB source");
                self.cached_default(format, config)
            }
        }
    }

    /// The cached sRGB-to-display transform for a layout, rebuilding
    /// when the configuration changed since the last call.
    fn cached_default(&self, format: PixelFormat, config: &ColorConfig) -> Option<SharedTransform> {
        let mut cache = self.cache.lock();
        if !cache.matches(config) {
            debug!(intent = ?config.intent, "rebuilding display transforms");
            cache.rgb = build_transform(None, PixelFormat::Rgb8, config).ok();
            cache.rgba = build_transform(None, PixelFormat::Rgba8, config).ok();
            if cache.rgb.is_none() {
                warn!("display profile unusable, color management is a no-op");
            }
            cache.key = Some((config.display_profile.clone(), config.intent));
            cache.rebuilds += 1;
        }
        match format {
            PixelFormat::Rgb8 => cache.rgb.clone(),
            PixelFormat::Rgba8 => cache.rgba.clone(),
        }
    }
}

fn build_transform(
    source_profile: Option<&[u8]>,
    format: PixelFormat,
    config: &ColorConfig,
) -> Result<SharedTransform, moxcms::CmsError> {
    let source = match source_profile {
        Some(bytes) => moxcms::ColorProfile::new_from_slice(bytes)?,
        None => moxcms::ColorProfile::new_srgb(),
    };
    let display = match &config.display_profile {
        Some(bytes) => moxcms::ColorProfile::new_from_slice(bytes)?,
        None => moxcms::ColorProfile::new_srgb(),
    };
    let layout = match format {
        PixelFormat::Rgb8 => moxcms::Layout::Rgb,
        PixelFormat::Rgba8 => moxcms::Layout::Rgba,
    };
    let options = moxcms::TransformOptions {
        rendering_intent: config.intent.into(),
        ..Default::default()
    };
    let transform = source.create_transform_8bit(layout, &display, layout, options)?;
    Ok(Arc::from(transform))
}
