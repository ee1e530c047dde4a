//! Orientation resolution: EXIF metadata and aspect-ratio auto-rotation.

use std::io::Cursor;

use crate::error::{RenderError, Result};
use crate::pipeline::buffer::ImageBuffer;
use crate::prefs::AutoRotate;

/// A rotation in quarter turns, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Parse a user-supplied angle in degrees. Any multiple of 90 is
    /// accepted, including negative values. Anything else is an error.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            _ => Err(RenderError::invalid_rotation_angle(degrees)),
        }
    }

    /// Map an EXIF orientation code to the rotation that uprights the
    /// image. Mirrored codes and out-of-range values map to no rotation.
    pub fn from_exif_code(code: u16) -> Self {
        match code {
            3 => Rotation::R180,
            6 => Rotation::R90,
            8 => Rotation::R270,
            _ => Rotation::R0,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Combine two rotations applied in sequence.
    pub fn compose(self, other: Rotation) -> Self {
        // Both are multiples of 90, so the sum always parses.
        Rotation::from_degrees(self.degrees() + other.degrees())
            .unwrap_or_else(|_| unreachable!("sum of right angles"))
    }
}

/// Extract the EXIF orientation code (1..=8) from encoded image bytes.
///
/// JPEG and friends are handled by the exif container reader. PNG files
/// that never made it into that path get a second chance through the
/// `Raw profile type exif` tEXt chunk some converters write.
pub fn orientation_from_bytes(bytes: &[u8]) -> Option<u16> {
    if let Some(code) = container_orientation(bytes) {
        return Some(code);
    }
    let raw = png_raw_exif_profile(bytes)?;
    let exif = exif::Reader::new().read_raw(raw).ok()?;
    orientation_field(&exif)
}

fn container_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    orientation_field(&exif)
}

fn orientation_field(exif: &exif::Exif) -> Option<u16> {
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let code = field.value.get_uint(0)?;
    if (1..=8).contains(&code) {
        Some(code as u16)
    } else {
        None
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const RAW_EXIF_KEYWORD: &[u8] = b"Raw profile type exif";

/// Pull EXIF bytes out of a PNG `Raw profile type exif` tEXt chunk.
///
/// The payload is the ImageMagick raw-profile format: a blank first
/// line, the profile name, the decoded byte count, then hex dump lines.
/// A count that disagrees with the decoded data invalidates the chunk.
fn png_raw_exif_profile(bytes: &[u8]) -> Option<Vec<u8>> {
    let rest = bytes.strip_prefix(PNG_SIGNATURE)?;
    let mut offset = 0usize;
    while offset + 8 <= rest.len() {
        let length = u32::from_be_bytes(rest[offset..offset + 4].try_into().ok()?) as usize;
        let chunk_type = &rest[offset + 4..offset + 8];
        let data_start = offset + 8;
        let data_end = data_start.checked_add(length)?;
        if data_end + 4 > rest.len() {
            return None;
        }
        if chunk_type == b"tEXt" {
            let data = &rest[data_start..data_end];
            if let Some(text) = data
                .strip_prefix(RAW_EXIF_KEYWORD)
                .and_then(|rest| rest.strip_prefix(&[0]))
            {
                return parse_raw_profile(text);
            }
        }
        if chunk_type == b"IEND" {
            break;
        }
        offset = data_end + 4;
    }
    None
}

fn parse_raw_profile(text: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(text).ok()?;
    let mut lines = text.split('\n');
    lines.next()?;
    if lines.next()?.trim() != "exif" {
        return None;
    }
    let declared: usize = lines.next()?.trim().parse().ok()?;
    let mut decoded = Vec::with_capacity(declared);
    for line in lines {
        let line = line.trim();
        if line.len() % 2 != 0 {
            return None;
        }
        for pair in line.as_bytes().chunks_exact(2) {
            let pair = std::str::from_utf8(pair).ok()?;
            decoded.push(u8::from_str_radix(pair, 16).ok()?);
        }
    }
    if decoded.len() != declared {
        return None;
    }
    // Some writers keep the JPEG APP1 prefix in the dump.
    if let Some(stripped) = decoded.strip_prefix(b"Exif\0\0") {
        return Some(stripped.to_vec());
    }
    Some(decoded)
}

/// The rotation implied by a buffer's EXIF orientation metadata.
pub fn implied_rotation(buffer: &ImageBuffer) -> Rotation {
    buffer
        .orientation
        .map(Rotation::from_exif_code)
        .unwrap_or_default()
}

/// The rotation an auto-rotate preference applies to an image of the
/// given size. Square images are never rotated.
pub fn size_rotation(width: u32, height: u32, auto: AutoRotate) -> Rotation {
    let portrait = height > width;
    let landscape = width > height;
    match auto {
        AutoRotate::Disabled => Rotation::R0,
        AutoRotate::PortraitBy90 if portrait => Rotation::R90,
        AutoRotate::PortraitBy270 if portrait => Rotation::R270,
        AutoRotate::LandscapeBy90 if landscape => Rotation::R90,
        AutoRotate::LandscapeBy270 if landscape => Rotation::R270,
        _ => Rotation::R0,
    }
}
