// ============================================================================
// STROKES: brush dabs, SDF shape outlines, coverage compositing
// ============================================================================
//
// Every painting gesture accumulates into a per-stroke `CoverageMask` (max,
// not sum, so overlapping dabs never darken) and is then composited from the
// layer's pixels as they were at stroke start.

use egui::{Pos2, Rect};
use image::{GrayImage, Rgba};

use crate::canvas::{blend_over, PixelBounds, PixelBuffer, TRANSPARENT};

/// Brush edge profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushStyle {
    #[default]
    Normal,
    /// Wide feathered edge
    Soft,
    /// Aliased disc
    Hard,
    /// Scattered single-pixel dots
    Spray,
}

impl BrushStyle {
    pub fn label(&self) -> &'static str {
        match self {
            BrushStyle::Normal => "Normal",
            BrushStyle::Soft => "Soft",
            BrushStyle::Hard => "Hard",
            BrushStyle::Spray => "Spray",
        }
    }

    pub fn all() -> &'static [BrushStyle] {
        &[BrushStyle::Normal, BrushStyle::Soft, BrushStyle::Hard, BrushStyle::Spray]
    }

    fn hardness(self) -> f32 {
        match self {
            BrushStyle::Normal => 0.75,
            BrushStyle::Soft => 0.0,
            BrushStyle::Hard | BrushStyle::Spray => 1.0,
        }
    }
}

/// Dots scattered per spray dab.
pub const SPRAY_DOTS: u32 = 10;

/// How accumulated coverage lands on the layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintMode {
    /// Source-over with the stroke color
    Paint,
    /// Destination-out: coverage removes alpha
    Erase,
}

// ---------------------------------------------------------------------------
//  Coverage mask
// ---------------------------------------------------------------------------

/// Canvas-sized single-channel coverage in 0..=1 with a running dirty box.
#[derive(Clone, Debug)]
pub struct CoverageMask {
    width: u32,
    height: u32,
    data: Vec<f32>,
    touched: Option<PixelBounds>,
}

impl CoverageMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
            touched: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize]
        } else {
            0.0
        }
    }

    /// Raise coverage at `(x, y)` to at least `v`.
    pub fn accumulate(&mut self, x: i64, y: i64, v: f32) {
        if v <= 0.0 || x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        let idx = y as usize * self.width as usize + x as usize;
        let v = v.min(1.0);
        if v > self.data[idx] {
            self.data[idx] = v;
            match self.touched.as_mut() {
                Some(b) => b.include(x, y),
                None => self.touched = Some(PixelBounds::single(x, y)),
            }
        }
    }

    /// Every pixel that has ever received coverage.
    pub fn touched(&self) -> Option<PixelBounds> {
        self.touched
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_none()
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.touched = None;
    }

    /// Evaluate `f` at every pixel centre in `bounds` (canvas-clamped) and
    /// accumulate the result.
    fn splat<F: Fn(f32, f32) -> f32>(&mut self, bounds: Rect, f: F) {
        let Some(b) = PixelBounds::covering(bounds, self.width, self.height) else { return };
        for y in b.min_y..=b.max_y {
            for x in b.min_x..=b.max_x {
                let v = f(x as f32 + 0.5, y as f32 + 0.5);
                if v > 0.001 {
                    self.accumulate(x as i64, y as i64, v);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
//  Brush dabs
// ---------------------------------------------------------------------------

/// Alpha of a round dab at `dist` from its centre. Hardness is remapped so
/// 0 gives an airbrush fade and 1 a crisp edge; small tips get extra AA width.
pub fn brush_alpha(dist: f32, radius: f32, style: BrushStyle) -> f32 {
    if style == BrushStyle::Hard {
        return if dist <= radius { 1.0 } else { 0.0 };
    }
    let hardness = (0.02 + style.hardness() * 0.98).clamp(0.0, 0.99);
    let (outer, fade) = if radius < 3.0 {
        let extend = 1.5;
        (radius + extend, extend + radius * (1.0 - hardness))
    } else {
        (radius, (radius * (1.0 - hardness)).max(1.0))
    };
    let solid = outer - fade;
    if dist <= solid {
        1.0
    } else if dist >= outer {
        0.0
    } else {
        smoothstep(1.0, 0.0, (dist - solid) / fade)
    }
}

/// Splitmix-style step; deterministic scatter for the spray style.
pub fn next_random(state: &mut u64) -> f32 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}

/// Stamp one dab of diameter `size` centred on `center`.
pub fn stamp_dab(mask: &mut CoverageMask, center: Pos2, size: f32, style: BrushStyle, seed: &mut u64) {
    if style == BrushStyle::Spray {
        for _ in 0..SPRAY_DOTS {
            let ox = (next_random(seed) - 0.5) * size;
            let oy = (next_random(seed) - 0.5) * size;
            mask.accumulate(
                (center.x + ox).floor() as i64,
                (center.y + oy).floor() as i64,
                1.0,
            );
        }
        return;
    }
    let radius = (size * 0.5).max(0.5);
    let reach = radius + 2.0;
    let bounds = Rect::from_center_size(center, egui::vec2(reach * 2.0, reach * 2.0));
    mask.splat(bounds, |x, y| brush_alpha(Pos2::new(x, y).distance(center), radius, style));
}

/// Dabs along `from → to`, spaced at a quarter of the diameter. Spray lays a
/// single scatter at `to` per call.
pub fn stroke_segment(
    mask: &mut CoverageMask,
    from: Pos2,
    to: Pos2,
    size: f32,
    style: BrushStyle,
    seed: &mut u64,
) {
    if style == BrushStyle::Spray {
        stamp_dab(mask, to, size, style, seed);
        return;
    }
    let spacing = (size * 0.25).max(1.0);
    let len = from.distance(to);
    let steps = (len / spacing).ceil().max(1.0) as u32;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        stamp_dab(mask, from.lerp(to, t), size, style, seed);
    }
}

// ---------------------------------------------------------------------------
//  SDF outlines
// ---------------------------------------------------------------------------

fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

fn sdf_line_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq < 1e-12 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Anti-aliased coverage of a band `half` wide around an SDF zero set.
fn outline_coverage(d: f32, half: f32) -> f32 {
    smoothstep(0.5, -0.5, d.abs() - half)
}

/// Straight line of thickness `width` with round caps.
pub fn stroke_line(mask: &mut CoverageMask, a: Pos2, b: Pos2, width: f32) {
    let half = (width * 0.5).max(0.5);
    let bounds = Rect::from_two_pos(a, b).expand(half + 2.0);
    mask.splat(bounds, |x, y| smoothstep(0.5, -0.5, sdf_line_segment(Pos2::new(x, y), a, b) - half));
}

/// Outline of `rect`, centred on its edges.
pub fn stroke_rect(mask: &mut CoverageMask, rect: Rect, width: f32) {
    let half = (width * 0.5).max(0.5);
    let c = rect.center();
    let (hx, hy) = (rect.width() * 0.5, rect.height() * 0.5);
    mask.splat(rect.expand(half + 2.0), |x, y| {
        outline_coverage(sdf_box(x - c.x, y - c.y, hx, hy), half)
    });
}

/// Outline of the ellipse inscribed in `rect`.
pub fn stroke_ellipse(mask: &mut CoverageMask, rect: Rect, width: f32) {
    let half = (width * 0.5).max(0.5);
    let c = rect.center();
    let (rx, ry) = (rect.width() * 0.5, rect.height() * 0.5);
    if rx < 1e-3 || ry < 1e-3 {
        // Collapsed to a segment
        stroke_line(mask, rect.min, rect.max, width);
        return;
    }
    mask.splat(rect.expand(half + 2.0), |x, y| {
        outline_coverage(sdf_ellipse(x - c.x, y - c.y, rx, ry), half)
    });
}

// ---------------------------------------------------------------------------
//  Compositing
// ---------------------------------------------------------------------------

/// Recompute `region` of `target` from `base` plus the stroke `mask`.
///
/// `clip` (a selection mask, 255 = editable) scales coverage per pixel.
/// Returns the number of pixels whose value changed from `base`.
pub fn apply_coverage(
    base: &PixelBuffer,
    target: &mut PixelBuffer,
    mask: &CoverageMask,
    region: PixelBounds,
    color: Rgba<u8>,
    opacity: f32,
    mode: PaintMode,
    clip: Option<&GrayImage>,
) -> usize {
    let mut changed = 0;
    let max_x = region.max_x.min(target.width().saturating_sub(1));
    let max_y = region.max_y.min(target.height().saturating_sub(1));
    for y in region.min_y..=max_y {
        for x in region.min_x..=max_x {
            let mut cov = mask.get(x, y);
            if let Some(m) = clip {
                cov *= m.get_pixel(x, y)[0] as f32 / 255.0;
            }
            let src = base.get_pixel(x, y);
            let out = if cov <= 0.0 {
                src
            } else {
                match mode {
                    PaintMode::Paint => blend_over(src, color, cov * opacity),
                    PaintMode::Erase => {
                        let a = (src[3] as f32 * (1.0 - cov)).round() as u8;
                        if a == 0 { TRANSPARENT } else { Rgba([src[0], src[1], src[2], a]) }
                    }
                }
            };
            if out != src {
                changed += 1;
            }
            target.put_pixel(x, y, out);
        }
    }
    changed
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
