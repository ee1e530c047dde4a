//! Page rendering pipeline for comic and manga viewers.
//!
//! Takes encoded page bytes through decode, dimension fitting,
//! rotation, alpha compositing and display color management, producing
//! pixel buffers ready for presentation. Decoding is backed by
//! format-specific native decoders with the image crate as a fallback
//! chain, and ICC transforms are cached per display configuration.
//!
//! ```no_run
//! use page_render::pipeline::{fit_in_rectangle, ColorEngine, FitOptions, Loader, Source};
//!
//! # fn main() -> page_render::Result<()> {
//! let loader = Loader::default();
//! let engine = ColorEngine::new();
//! let page = loader.load(&Source::map_path("page_001.jpg")?)?;
//! let rendered = fit_in_rectangle(&engine, page, 1920, 1080, &FitOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipeline;
pub mod prefs;

pub use error::{RenderError, Result};
pub use pipeline::{
    add_border, combine_side_by_side, enhance, fit_in_rectangle, fit_to_rectangle,
    fitting_size, image_info, most_common_edge_color, ColorEngine, DecodedImage,
    EnhanceOptions, FitOptions, ImageBuffer, Loader, PixelFormat, ProbeInfo, Rotation, Source,
};
pub use prefs::{AutoRotate, Background, ColorConfig, RenderingIntent, ScalingPrefs};
