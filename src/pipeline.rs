//! Rendering pipeline: decode, fit, rotate, composite and color-correct
//! page images.
//!
//! The stages are independent modules. [`loader`] turns bytes into a
//! [`buffer::ImageBuffer`], [`compose`] runs the geometry and alpha
//! stages, and [`color`] applies the display transform last.

pub mod buffer;
pub mod color;
pub mod compose;
pub mod edge;
pub mod enhance;
pub mod fit;
pub mod loader;
pub mod orientation;

pub use buffer::{DecodedImage, ImageBuffer, PixelFormat};
pub use color::ColorEngine;
pub use compose::{add_border, combine_side_by_side, fit_in_rectangle, fit_to_rectangle, FitOptions};
pub use edge::{most_common_edge_color, rgb16_to_rgba8_int};
pub use enhance::{enhance, EnhanceOptions};
pub use fit::fitting_size;
pub use loader::{image_info, Loader, ProbeInfo, Source};
pub use orientation::Rotation;

/// Hard cap on either axis of a decoded image.
pub const MAX_DIMENSION: u32 = 32_768;

/// Hard cap on total pixel count of a decoded image.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Stand-in for "no constraint on this axis" when fitting. Large enough
/// that it never wins against a real screen dimension.
pub const UNBOUNDED_SIZE: u32 = 100_000;
