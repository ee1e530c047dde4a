//! Dimension fitting.

/// Compute the size an image should be scaled to so it fits inside a
/// target rectangle.
///
/// With `keep_ratio` the constraining axis is found by comparing the
/// source/target ratios and the other axis is derived from it, rounded
/// to the nearest pixel and floored at 1. Without it the target is
/// returned as-is, stretching the image. When `scale_up` is off and the
/// source already fits, the source size is returned unchanged.
pub fn fitting_size(
    source: (u32, u32),
    target: (u32, u32),
    keep_ratio: bool,
    scale_up: bool,
) -> (u32, u32) {
    let (src_width, src_height) = source;
    let (mut width, mut height) = target;

    if !scale_up && src_width <= width && src_height <= height {
        return (src_width, src_height);
    }
    if keep_ratio {
        if src_width as u64 * height as u64 > src_height as u64 * width as u64 {
            height = derive_axis(src_height, width, src_width);
        } else {
            width = derive_axis(src_width, height, src_height);
        }
    }
    (width, height)
}

/// Scale one source axis by the ratio the other axis was scaled by.
fn derive_axis(axis: u32, scaled_other: u32, other: u32) -> u32 {
    let scaled = (axis as f64 * scaled_other as f64 / other as f64).round() as u32;
    scaled.max(1)
}
