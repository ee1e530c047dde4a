//! Edge color analysis.
//!
//! Picks a background color that blends with the page content by
//! looking at the outer edge strips of the displayed pages. Colors are
//! bucketed so JPEG noise around a flat border does not fragment the
//! vote, then the most frequent exact color inside the winning bucket
//! is returned.

use std::collections::HashMap;

use crate::pipeline::buffer::ImageBuffer;

const QUANTIZE_STEP: u32 = 10;

/// The dominant color along the outward-facing edges, as 16-bit
/// channels.
///
/// One buffer contributes both its left and right edge strips. With two
/// or more buffers laid out side by side only the outer edges count:
/// the left strip of the first buffer and the right strip of the last.
pub fn most_common_edge_color(buffers: &[&ImageBuffer], edge_width: u32) -> [u16; 3] {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    match buffers {
        [] => return [0, 0, 0],
        [only] => {
            count_edge(only, Edge::Left, edge_width, &mut counts);
            count_edge(only, Edge::Right, edge_width, &mut counts);
        }
        [first, .., last] => {
            count_edge(first, Edge::Left, edge_width, &mut counts);
            count_edge(last, Edge::Right, edge_width, &mut counts);
        }
    }
    if counts.is_empty() {
        return [0, 0, 0];
    }

    // Vote per quantized bucket, then pick the most frequent exact
    // color inside the winning bucket.
    let mut buckets: HashMap<[u8; 3], u64> = HashMap::new();
    for (color, count) in &counts {
        *buckets.entry(quantize(*color)).or_insert(0) += count;
    }
    let winning_bucket = buckets
        .iter()
        .max_by_key(|(bucket, count)| (**count, *bucket))
        .map(|(bucket, _)| *bucket)
        .unwrap_or([0, 0, 0]);
    let winner = counts
        .iter()
        .filter(|(color, _)| quantize(**color) == winning_bucket)
        .max_by_key(|(color, count)| (**count, *color))
        .map(|(color, _)| *color)
        .unwrap_or([0, 0, 0]);

    [
        winner[0] as u16 * 257,
        winner[1] as u16 * 257,
        winner[2] as u16 * 257,
    ]
}

enum Edge {
    Left,
    Right,
}

fn count_edge(buffer: &ImageBuffer, edge: Edge, edge_width: u32, counts: &mut HashMap<[u8; 3], u64>) {
    let strip = edge_width.min(buffer.width).min(buffer.height);
    let x_range = match edge {
        Edge::Left => 0..strip,
        Edge::Right => buffer.width - strip..buffer.width,
    };
    let channels = buffer.format.channels();
    for y in 0..buffer.height {
        let row = &buffer.data[y as usize * buffer.stride..];
        for x in x_range.clone() {
            let px = &row[x as usize * channels..];
            *counts.entry([px[0], px[1], px[2]]).or_insert(0) += 1;
        }
    }
}

/// Snap each channel to the nearest multiple of the quantize step,
/// rounding halves up, clamped to the byte range.
fn quantize(color: [u8; 3]) -> [u8; 3] {
    color.map(|channel| {
        let value = channel as u32;
        let remainder = value % QUANTIZE_STEP;
        let base = value - remainder;
        let snapped = if remainder >= QUANTIZE_STEP / 2 {
            base + QUANTIZE_STEP
        } else {
            base
        };
        snapped.min(255) as u8
    })
}

/// Pack 16-bit channels into the 0xRRGGBBAA integer form used for
/// widget background colors, alpha forced opaque.
pub fn rgb16_to_rgba8_int(color: [u16; 3]) -> u32 {
    0x0000_00FF
        | ((color[0] as u32 >> 8) << 24)
        | ((color[1] as u32 >> 8) << 16)
        | ((color[2] as u32 >> 8) << 8)
}
