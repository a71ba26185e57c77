// ============================================================================
// TRANSFORM OPERATIONS: affine resampling and the interactive transform box
// ============================================================================

use egui::{Pos2, Rect, Vec2};
use image::{imageops, Rgba, RgbaImage};

use crate::canvas::{Layer, LayerId, PixelBounds};

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest  => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic  => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

// ---------------------------------------------------------------------------
//  Affine resampling
// ---------------------------------------------------------------------------

/// Render `src` through the forward matrix `m` (source → destination) into a
/// fresh `out_w`×`out_h` image, bilinear sampling against transparency.
/// Pixel centres sit at +0.5, so pure integer translations copy exactly.
pub fn apply_affine(src: &RgbaImage, out_w: u32, out_h: u32, m: [[f32; 3]; 3]) -> RgbaImage {
    let mut dst = RgbaImage::new(out_w, out_h);
    let hi = invert_3x3(m);
    let (h00, h01, h02) = (hi[0][0], hi[0][1], hi[0][2]);
    let (h10, h11, h12) = (hi[1][0], hi[1][1], hi[1][2]);

    let src_w = src.width() as i32;
    let src_h = src.height() as i32;
    let row_bytes = out_w as usize * 4;
    if row_bytes == 0 {
        return dst;
    }

    for (dy, row) in dst.chunks_mut(row_bytes).enumerate() {
        let v = dy as f32 + 0.5;
        for dx in 0..out_w as usize {
            let u = dx as f32 + 0.5;
            let src_x = h00 * u + h01 * v + h02 - 0.5;
            let src_y = h10 * u + h11 * v + h12 - 0.5;

            let x0 = src_x.floor() as i32;
            let y0 = src_y.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= src_w || y0 >= src_h {
                continue;
            }

            let px = bilinear_sample(src, src_x, src_y);
            row[dx * 4..dx * 4 + 4].copy_from_slice(&px.0);
        }
    }
    dst
}

/// Invert a 3×3 matrix. Returns identity on singular input.
pub fn invert_3x3(m: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
    let (d, e, f) = (m[1][0], m[1][1], m[1][2]);
    let (g, h, i) = (m[2][0], m[2][1], m[2][2]);

    let det = a * (e * i - f * h)
            - b * (d * i - f * g)
            + c * (d * h - e * g);
    if det.abs() < 1e-12 {
        return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    }
    let inv = 1.0 / det;
    [
        [(e*i - f*h) * inv, (c*h - b*i) * inv, (b*f - c*e) * inv],
        [(f*g - d*i) * inv, (a*i - c*g) * inv, (c*d - a*f) * inv],
        [(d*h - e*g) * inv, (b*g - a*h) * inv, (a*e - b*d) * inv],
    ]
}

/// Bilinear interpolation sampling from an RgbaImage.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Rotate `src` by `degrees` about its centre, keeping the same canvas size.
pub fn rotate_about_center(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let cx = src.width() as f32 * 0.5;
    let cy = src.height() as f32 * 0.5;
    let (s, c) = degrees.to_radians().sin_cos();
    let m = [
        [c, -s, cx - (c * cx - s * cy)],
        [s, c, cy - (s * cx + c * cy)],
        [0.0, 0.0, 1.0],
    ];
    apply_affine(src, src.width(), src.height(), m)
}

// ---------------------------------------------------------------------------
//  Interactive transform box
// ---------------------------------------------------------------------------

/// A grab point on the transform box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handle {
    Nw,
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Move,
}

impl Handle {
    pub const RESIZE: [Handle; 8] = [
        Handle::Nw, Handle::N, Handle::Ne, Handle::E,
        Handle::Se, Handle::S, Handle::Sw, Handle::W,
    ];

    /// Which box edges this handle drags: (left, top, right, bottom).
    fn edges(self) -> (bool, bool, bool, bool) {
        match self {
            Handle::Nw => (true, true, false, false),
            Handle::N => (false, true, false, false),
            Handle::Ne => (false, true, true, false),
            Handle::E => (false, false, true, false),
            Handle::Se => (false, false, true, true),
            Handle::S => (false, false, false, true),
            Handle::Sw => (true, false, false, true),
            Handle::W => (true, false, false, false),
            Handle::Move => (false, false, false, false),
        }
    }

    /// Hotspot centre for this handle on `rect`.
    fn anchor(self, rect: Rect) -> Pos2 {
        let c = rect.center();
        match self {
            Handle::Nw => rect.left_top(),
            Handle::N => Pos2::new(c.x, rect.top()),
            Handle::Ne => rect.right_top(),
            Handle::E => Pos2::new(rect.right(), c.y),
            Handle::Se => rect.right_bottom(),
            Handle::S => Pos2::new(c.x, rect.bottom()),
            Handle::Sw => rect.left_bottom(),
            Handle::W => Pos2::new(rect.left(), c.y),
            Handle::Move => c,
        }
    }
}

/// An in-progress resize/move of one layer's content.
///
/// Every drag re-derives the box from the box at drag start, and commit
/// always resamples from `original`, never from an earlier preview.
#[derive(Clone, Debug)]
pub struct TransformSession {
    pub layer_id: LayerId,
    pub bounds: Rect,
    /// Degrees, applied about the box centre on commit.
    pub rotation: f32,
    original: RgbaImage,
    source: PixelBounds,
    drag_start: Option<Rect>,
    min_size: f32,
    handle_size: f32,
}

impl TransformSession {
    /// Capture the layer's non-transparent content (or the whole surface if
    /// it is empty) and open a session around it.
    pub fn activate(layer: &Layer, min_size: f32, handle_size: f32) -> Self {
        let source = layer
            .pixels
            .content_bounds()
            .unwrap_or_else(|| PixelBounds::full(layer.pixels.width(), layer.pixels.height()));
        let original = layer.pixels.extract_region(source);
        Self {
            layer_id: layer.id,
            bounds: source.to_rect(),
            rotation: 0.0,
            original,
            source,
            drag_start: None,
            min_size,
            handle_size,
        }
    }

    pub fn original_pixels(&self) -> &RgbaImage {
        &self.original
    }

    pub fn source_bounds(&self) -> PixelBounds {
        self.source
    }

    /// Resize handles win over the interior; outside everything is `None`.
    pub fn hit_test(&self, p: Pos2) -> Option<Handle> {
        let half = self.handle_size * 0.5;
        for handle in Handle::RESIZE {
            let a = handle.anchor(self.bounds);
            if (p.x - a.x).abs() <= half && (p.y - a.y).abs() <= half {
                return Some(handle);
            }
        }
        let b = self.bounds;
        if p.x >= b.left() && p.x <= b.right() && p.y >= b.top() && p.y <= b.bottom() {
            return Some(Handle::Move);
        }
        None
    }

    pub fn begin_drag(&mut self) {
        self.drag_start = Some(self.bounds);
    }

    pub fn end_drag(&mut self) {
        self.drag_start = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_start.is_some()
    }

    /// Apply `delta` (total pointer travel since `begin_drag`) to `handle`.
    /// A side that would drop below the minimum is clamped with its opposite
    /// edge held fixed, so the box never inverts.
    pub fn drag(&mut self, handle: Handle, delta: Vec2) {
        let start = self.drag_start.unwrap_or(self.bounds);
        if handle == Handle::Move {
            self.bounds = start.translate(delta);
            return;
        }

        let (left, top, right, bottom) = handle.edges();
        let min = self.min_size;
        let mut r = start;
        if left {
            r.min.x = (start.min.x + delta.x).min(start.max.x - min);
        }
        if right {
            r.max.x = (start.max.x + delta.x).max(start.min.x + min);
        }
        if top {
            r.min.y = (start.min.y + delta.y).min(start.max.y - min);
        }
        if bottom {
            r.max.y = (start.max.y + delta.y).max(start.min.y + min);
        }
        self.bounds = r;
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.rotation = (self.rotation + degrees) % 360.0;
    }

    /// The original pixels resampled to the current box size.
    pub fn render(&self, interp: Interpolation) -> RgbaImage {
        let w = self.bounds.width().round().max(1.0) as u32;
        let h = self.bounds.height().round().max(1.0) as u32;
        let scaled = if w == self.original.width() && h == self.original.height() {
            self.original.clone()
        } else {
            imageops::resize(&self.original, w, h, interp.to_filter())
        };
        if self.rotation != 0.0 {
            rotate_about_center(&scaled, self.rotation)
        } else {
            scaled
        }
    }

    /// Write the transformed content into `layer` and end the session.
    pub fn commit(self, layer: &mut Layer, interp: Interpolation) {
        debug_assert_eq!(layer.id, self.layer_id);
        let rendered = self.render(interp);
        layer.pixels.clear_region(self.source);
        layer.pixels.blit(
            &rendered,
            self.bounds.min.x.round() as i64,
            self.bounds.min.y.round() as i64,
        );
        layer.dirty = true;
        log_info!(
            "Committed transform on layer {} to {}x{} at ({}, {})",
            self.layer_id,
            rendered.width(),
            rendered.height(),
            self.bounds.min.x,
            self.bounds.min.y
        );
    }

    /// Drop the session. The layer was never touched.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PixelBuffer;

    fn layer_with_square(x: u32, y: u32, size: u32) -> Layer {
        let mut layer = Layer::new(1, "t", 100, 100);
        for yy in y..y + size {
            for xx in x..x + size {
                layer.pixels.put_pixel(xx, yy, Rgba([255, 0, 0, 255]));
            }
        }
        layer
    }

    #[test]
    fn activate_captures_content_bounds() {
        let layer = layer_with_square(20, 30, 40);
        let session = TransformSession::activate(&layer, 10.0, 8.0);
        assert_eq!(session.bounds, Rect::from_min_max(Pos2::new(20.0, 30.0), Pos2::new(60.0, 70.0)));
        assert_eq!(session.original_pixels().dimensions(), (40, 40));

        let empty = Layer::new(2, "e", 16, 8);
        let session = TransformSession::activate(&empty, 10.0, 8.0);
        assert_eq!(session.source_bounds(), PixelBounds::full(16, 8));
    }

    #[test]
    fn hit_test_handles_then_interior() {
        let layer = layer_with_square(20, 30, 40);
        let session = TransformSession::activate(&layer, 10.0, 8.0);
        assert_eq!(session.hit_test(Pos2::new(17.0, 27.0)), Some(Handle::Nw));
        assert_eq!(session.hit_test(Pos2::new(40.0, 30.0)), Some(Handle::N));
        assert_eq!(session.hit_test(Pos2::new(60.0, 50.0)), Some(Handle::E));
        assert_eq!(session.hit_test(Pos2::new(63.0, 73.0)), Some(Handle::Se));
        assert_eq!(session.hit_test(Pos2::new(40.0, 50.0)), Some(Handle::Move));
        assert_eq!(session.hit_test(Pos2::new(5.0, 5.0)), None);
    }

    #[test]
    fn each_handle_moves_only_its_edges() {
        let layer = layer_with_square(20, 20, 40);
        let mut session = TransformSession::activate(&layer, 10.0, 8.0);
        let start = session.bounds;
        let d = Vec2::new(5.0, 7.0);
        for handle in Handle::RESIZE {
            session.bounds = start;
            session.begin_drag();
            session.drag(handle, d);
            session.end_drag();
            let (l, t, r, b) = handle.edges();
            let r2 = session.bounds;
            assert_eq!(r2.min.x, if l { start.min.x + 5.0 } else { start.min.x }, "{:?}", handle);
            assert_eq!(r2.max.x, if r { start.max.x + 5.0 } else { start.max.x }, "{:?}", handle);
            assert_eq!(r2.min.y, if t { start.min.y + 7.0 } else { start.min.y }, "{:?}", handle);
            assert_eq!(r2.max.y, if b { start.max.y + 7.0 } else { start.max.y }, "{:?}", handle);
        }
    }

    #[test]
    fn resize_clamps_to_minimum_with_opposite_edge_fixed() {
        let layer = layer_with_square(20, 20, 40);
        for handle in Handle::RESIZE {
            let mut session = TransformSession::activate(&layer, 10.0, 8.0);
            let start = session.bounds;
            session.begin_drag();
            // Push every edge far past its opposite
            let (l, t, _, _) = handle.edges();
            let dx = if l { 500.0 } else { -500.0 };
            let dy = if t { 500.0 } else { -500.0 };
            session.drag(handle, Vec2::new(dx, dy));
            let b = session.bounds;
            assert!(b.width() >= 10.0 && b.height() >= 10.0, "{:?}", handle);
            match handle {
                Handle::W | Handle::Nw | Handle::Sw => {
                    assert_eq!(b.max.x, start.max.x);
                    assert_eq!(b.width(), 10.0);
                }
                Handle::E | Handle::Ne | Handle::Se => {
                    assert_eq!(b.min.x, start.min.x);
                    assert_eq!(b.width(), 10.0);
                }
                _ => assert_eq!(b.width(), start.width()),
            }
            match handle {
                Handle::N | Handle::Nw | Handle::Ne => {
                    assert_eq!(b.max.y, start.max.y);
                    assert_eq!(b.height(), 10.0);
                }
                Handle::S | Handle::Sw | Handle::Se => {
                    assert_eq!(b.min.y, start.min.y);
                    assert_eq!(b.height(), 10.0);
                }
                _ => assert_eq!(b.height(), start.height()),
            }
        }
    }

    #[test]
    fn repeated_resizes_sample_the_original() {
        let mut layer = layer_with_square(10, 10, 20);
        // Checker detail that a shrink-then-grow round trip through an
        // intermediate would blur away.
        layer.pixels.put_pixel(10, 10, Rgba([0, 0, 255, 255]));
        let mut session = TransformSession::activate(&layer, 10.0, 8.0);
        session.begin_drag();
        session.drag(Handle::Se, Vec2::new(-10.0, -10.0));
        session.end_drag();
        session.begin_drag();
        session.drag(Handle::Se, Vec2::new(10.0, 10.0));
        session.end_drag();

        session.commit(&mut layer, Interpolation::Nearest);
        assert_eq!(layer.pixels.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert_eq!(layer.pixels.get_pixel(29, 29), Rgba([255, 0, 0, 255]));
        assert!(layer.dirty);
    }

    #[test]
    fn commit_moves_and_scales() {
        let mut layer = layer_with_square(0, 0, 10);
        let mut session = TransformSession::activate(&layer, 10.0, 8.0);
        session.begin_drag();
        session.drag(Handle::Move, Vec2::new(50.0, 50.0));
        session.end_drag();
        session.begin_drag();
        session.drag(Handle::Se, Vec2::new(10.0, 10.0));
        session.end_drag();
        session.commit(&mut layer, Interpolation::Nearest);

        assert_eq!(layer.pixels.get_pixel(0, 0)[3], 0);
        assert_eq!(
            layer.pixels.content_bounds(),
            Some(PixelBounds { min_x: 50, min_y: 50, max_x: 69, max_y: 69 })
        );
    }

    #[test]
    fn cancel_leaves_layer_untouched() {
        let layer = layer_with_square(5, 5, 12);
        let before = layer.pixels.clone();
        let mut session = TransformSession::activate(&layer, 10.0, 8.0);
        session.begin_drag();
        session.drag(Handle::Move, Vec2::new(30.0, 0.0));
        session.cancel();
        assert_eq!(layer.pixels, before);
    }

    #[test]
    fn integer_translation_is_exact() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.put_pixel(1, 1, Rgba([7, 8, 9, 255]));
        let m = [[1.0, 0.0, 2.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]];
        let out = apply_affine(buf.image(), 4, 4, m);
        assert_eq!(*out.get_pixel(3, 2), Rgba([7, 8, 9, 255]));
        assert_eq!(out.get_pixel(1, 1)[3], 0);
    }
}
