// ============================================================================
// FLOOD FILL: shared traversal for the paint bucket and the magic wand
// ============================================================================

use std::collections::HashSet;

use image::{GrayImage, Rgba};

use crate::canvas::{PixelBounds, PixelBuffer};

/// Per-channel RGB distance under which the paint bucket treats a pixel as
/// the same color (strict).
pub const DEFAULT_FILL_EPSILON: u8 = 5;
/// Per-channel RGBA distance the magic wand accepts (inclusive).
pub const DEFAULT_WAND_TOLERANCE: u8 = 30;

/// Walk the 4-connected region around `start` whose pixels satisfy `same`,
/// calling `action` once per accepted pixel. Returns the number of accepted
/// pixels; zero when `start` is off the canvas or itself rejected.
///
/// Uses an explicit stack and a visited bitmap, so region size is bounded by
/// memory rather than recursion depth.
pub fn flood_fill<S, A>(width: u32, height: u32, start: (u32, u32), mut same: S, mut action: A) -> usize
where
    S: FnMut(u32, u32) -> bool,
    A: FnMut(u32, u32),
{
    let (sx, sy) = start;
    if sx >= width || sy >= height {
        return 0;
    }
    let wu = width as usize;
    let mut visited = vec![false; wu * height as usize];
    let mut stack: Vec<(u32, u32)> = Vec::with_capacity(1024);
    let mut accepted = 0;

    visited[sy as usize * wu + sx as usize] = true;
    stack.push(start);

    while let Some((x, y)) = stack.pop() {
        if !same(x, y) {
            continue;
        }
        action(x, y);
        accepted += 1;

        let mut visit = |nx: u32, ny: u32, stack: &mut Vec<(u32, u32)>| {
            let idx = ny as usize * wu + nx as usize;
            if !visited[idx] {
                visited[idx] = true;
                stack.push((nx, ny));
            }
        };
        if x > 0 {
            visit(x - 1, y, &mut stack);
        }
        if x + 1 < width {
            visit(x + 1, y, &mut stack);
        }
        if y > 0 {
            visit(x, y - 1, &mut stack);
        }
        if y + 1 < height {
            visit(x, y + 1, &mut stack);
        }
    }
    accepted
}

fn rgb_within(a: Rgba<u8>, b: Rgba<u8>, epsilon: u8) -> bool {
    (0..3).all(|c| a[c].abs_diff(b[c]) < epsilon)
}

fn rgba_within(a: Rgba<u8>, b: Rgba<u8>, tolerance: u8) -> bool {
    (0..4).all(|c| a[c].abs_diff(b[c]) <= tolerance)
}

/// Paint-bucket fill: recolor the region matching the start pixel's RGB
/// within `epsilon`, writing `color` with forced full alpha. Pixels the
/// optional `clip` mask rejects are left alone. Returns pixels written.
pub fn paint_bucket(
    buffer: &mut PixelBuffer,
    start: (u32, u32),
    color: Rgba<u8>,
    epsilon: u8,
    clip: Option<&GrayImage>,
) -> usize {
    let (w, h) = (buffer.width(), buffer.height());
    if start.0 >= w || start.1 >= h {
        return 0;
    }
    let target = buffer.get_pixel(start.0, start.1);
    let mut region = Vec::new();
    {
        let src = &*buffer;
        flood_fill(
            w,
            h,
            start,
            |x, y| rgb_within(src.get_pixel(x, y), target, epsilon),
            |x, y| region.push((x, y)),
        );
    }

    let fill = Rgba([color[0], color[1], color[2], 255]);
    let mut written = 0;
    for (x, y) in region {
        if let Some(mask) = clip
            && mask.get_pixel(x, y)[0] == 0
        {
            continue;
        }
        buffer.put_pixel(x, y, fill);
        written += 1;
    }
    written
}

/// Result of a magic-wand traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct WandRegion {
    pub pixels: HashSet<(u32, u32)>,
    pub bounds: PixelBounds,
    /// Region pixels with at least one 4-neighbor outside the region (or off
    /// the canvas), in row-major order.
    pub boundary: Vec<(u32, u32)>,
}

/// Magic wand: collect the region whose RGBA channels each stay within
/// `tolerance` of the start pixel. `None` when nothing was collected.
pub fn magic_wand(buffer: &PixelBuffer, start: (u32, u32), tolerance: u8) -> Option<WandRegion> {
    let (w, h) = (buffer.width(), buffer.height());
    if start.0 >= w || start.1 >= h {
        return None;
    }
    let target = buffer.get_pixel(start.0, start.1);
    let mut pixels = HashSet::new();
    let mut bounds = PixelBounds::single(start.0, start.1);
    flood_fill(
        w,
        h,
        start,
        |x, y| rgba_within(buffer.get_pixel(x, y), target, tolerance),
        |x, y| {
            pixels.insert((x, y));
            bounds.include(x, y);
        },
    );
    if pixels.is_empty() {
        return None;
    }
    let boundary = boundary_of(&pixels, bounds);
    Some(WandRegion { pixels, bounds, boundary })
}

/// Pixels of `set` with a 4-neighbor that is not in `set`.
pub fn boundary_of(set: &HashSet<(u32, u32)>, bounds: PixelBounds) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for y in bounds.min_y..=bounds.max_y {
        for x in bounds.min_x..=bounds.max_x {
            if !set.contains(&(x, y)) {
                continue;
            }
            let edge = x == 0
                || y == 0
                || !set.contains(&(x - 1, y))
                || !set.contains(&(x + 1, y))
                || !set.contains(&(x, y - 1))
                || !set.contains(&(x, y + 1));
            if edge {
                out.push((x, y));
            }
        }
    }
    out
}
