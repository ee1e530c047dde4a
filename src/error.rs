// src/error.rs
//
// Unified error handling for page-render
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Provider failures: a single decode backend failed, recoverable by fallback
// - Load failures: every backend failed, fatal to the load call
// - Caller errors: invalid parameters (rotation angle)
// Color transform failures are absorbed inside the pipeline and never surface.

use std::borrow::Cow;
use thiserror::Error;

/// page-render error types
///
/// All errors are type-safe and provide clear, actionable messages.
#[derive(Debug, Error)]
pub enum RenderError {
    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Decode provider '{provider}' failed: {message}")]
    DecodeFailed {
        provider: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Could not load image: all decode providers failed: {last}")]
    AllProvidersFailed {
        #[source]
        last: Box<RenderError>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Operation Errors
    #[error(
        "Unsupported rotation angle: {degrees}. Only 0, 90, 180, 270 (and negatives) are supported"
    )]
    InvalidRotationAngle { degrees: i32 },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },
}

// Constructor Helpers
impl RenderError {
    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn decode_failed(
        provider: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DecodeFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap the last recorded provider error, or a generic decode error when
    /// no provider even ran.
    pub fn all_providers_failed(last: Option<RenderError>) -> Self {
        Self::AllProvidersFailed {
            last: Box::new(
                last.unwrap_or_else(|| RenderError::decode_failed("none", "no providers available")),
            ),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_rotation_angle(degrees: i32) -> Self {
        Self::InvalidRotationAngle { degrees }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    /// True when this error came out of a single decode backend and the
    /// loader's fallback loop may try the next provider.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailed { .. }
                | Self::DimensionExceedsLimit { .. }
                | Self::PixelCountExceedsLimit { .. }
        )
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, RenderError>;
