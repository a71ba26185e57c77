// ============================================================================
// SELECTION ENGINE: rect / ellipse / lasso / magic-wand regions
// ============================================================================

use std::collections::HashSet;

use egui::{Pos2, Rect};
use image::{GrayImage, Luma};

use crate::canvas::{Layer, PixelBounds};
use crate::ops::fill::{self, WandRegion};

/// Distance under which a point counts as lying on a lasso edge.
const EDGE_EPSILON: f32 = 1e-4;

/// The active region. Exactly one variant, handled exhaustively everywhere.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Rect(Rect),
    /// Ellipse inscribed in the rect.
    Ellipse(Rect),
    Lasso {
        bounds: Rect,
        path: Vec<Pos2>,
    },
    MagicWand {
        bounds: PixelBounds,
        pixels: HashSet<(u32, u32)>,
        boundary: Vec<(u32, u32)>,
    },
}

/// Draw-time clip geometry for a selection.
#[derive(Clone, Copy, Debug)]
pub enum ClipPath<'a> {
    Rect(Rect),
    Ellipse { center: Pos2, radii: egui::Vec2 },
    Polygon(&'a [Pos2]),
    Pixels(&'a HashSet<(u32, u32)>),
}

impl Selection {
    pub fn lasso(path: Vec<Pos2>) -> Self {
        let bounds = Rect::from_points(&path);
        Selection::Lasso { bounds, path }
    }

    pub fn from_wand(region: WandRegion) -> Self {
        Selection::MagicWand {
            bounds: region.bounds,
            pixels: region.pixels,
            boundary: region.boundary,
        }
    }

    /// Float bounding box in canvas space.
    pub fn bounding_rect(&self) -> Rect {
        match self {
            Selection::Rect(r) | Selection::Ellipse(r) => *r,
            Selection::Lasso { bounds, .. } => *bounds,
            Selection::MagicWand { bounds, .. } => bounds.to_rect(),
        }
    }

    pub fn contains_point(&self, p: Pos2) -> bool {
        match self {
            Selection::Rect(r) => r.contains(p),
            Selection::Ellipse(r) => ellipse_contains(*r, p),
            Selection::Lasso { bounds, path } => {
                bounds.expand(EDGE_EPSILON).contains(p) && polygon_contains(path, p)
            }
            Selection::MagicWand { pixels, .. } => {
                p.x >= 0.0 && p.y >= 0.0 && pixels.contains(&(p.x as u32, p.y as u32))
            }
        }
    }

    /// Whether the pixel at `(x, y)` is selected, sampled at its centre.
    pub fn contains_pixel(&self, x: u32, y: u32) -> bool {
        match self {
            Selection::MagicWand { pixels, .. } => pixels.contains(&(x, y)),
            _ => self.contains_point(Pos2::new(x as f32 + 0.5, y as f32 + 0.5)),
        }
    }

    pub fn clip_path(&self) -> ClipPath<'_> {
        match self {
            Selection::Rect(r) => ClipPath::Rect(*r),
            Selection::Ellipse(r) => ClipPath::Ellipse {
                center: r.center(),
                radii: r.size() * 0.5,
            },
            Selection::Lasso { path, .. } => ClipPath::Polygon(path),
            Selection::MagicWand { pixels, .. } => ClipPath::Pixels(pixels),
        }
    }

    /// Rasterize into a `width`×`height` coverage mask (255 selected, 0 not).
    pub fn clip_mask(&self, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        match self {
            Selection::MagicWand { pixels, .. } => {
                for &(x, y) in pixels {
                    if x < width && y < height {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
            }
            _ => {
                let Some(b) = PixelBounds::covering(self.bounding_rect(), width, height) else {
                    return mask;
                };
                for y in b.min_y..=b.max_y {
                    for x in b.min_x..=b.max_x {
                        if self.contains_pixel(x, y) {
                            mask.put_pixel(x, y, Luma([255]));
                        }
                    }
                }
            }
        }
        mask
    }

    /// The selection expressed over `layer`'s own pixels. Each layer pixel
    /// centre is carried to canvas space through the placement and tested
    /// there.
    pub fn layer_mask(&self, layer: &Layer) -> GrayImage {
        let (w, h) = (layer.pixels.width(), layer.pixels.height());
        if layer.placement.is_identity() {
            return self.clip_mask(w, h);
        }
        let m = layer.placement.matrix(w, h);
        let mut mask = GrayImage::new(w, h);
        for (x, y, px) in mask.enumerate_pixels_mut() {
            let lx = x as f32 + 0.5;
            let ly = y as f32 + 0.5;
            let cp = Pos2::new(
                m[0][0] * lx + m[0][1] * ly + m[0][2],
                m[1][0] * lx + m[1][1] * ly + m[1][2],
            );
            if self.contains_point(cp) {
                *px = Luma([255]);
            }
        }
        mask
    }

    /// Offset the selection. Wand pixel sets move by the rounded delta and
    /// pixels pushed past the top or left edge are dropped.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        let delta = egui::vec2(dx, dy);
        match self {
            Selection::Rect(r) | Selection::Ellipse(r) => *r = r.translate(delta),
            Selection::Lasso { bounds, path } => {
                *bounds = bounds.translate(delta);
                for p in path.iter_mut() {
                    *p += delta;
                }
            }
            Selection::MagicWand { bounds, pixels, boundary } => {
                let (ox, oy) = (dx.round() as i64, dy.round() as i64);
                if ox == 0 && oy == 0 {
                    return;
                }
                let moved: HashSet<(u32, u32)> = pixels
                    .iter()
                    .filter_map(|&(x, y)| {
                        let nx = x as i64 + ox;
                        let ny = y as i64 + oy;
                        (nx >= 0 && ny >= 0 && nx <= u32::MAX as i64 && ny <= u32::MAX as i64)
                            .then_some((nx as u32, ny as u32))
                    })
                    .collect();
                let Some(moved_bounds) = bounds_of(&moved) else {
                    pixels.clear();
                    boundary.clear();
                    return;
                };
                *boundary = fill::boundary_of(&moved, moved_bounds);
                *bounds = moved_bounds;
                *pixels = moved;
            }
        }
    }
}

fn bounds_of(pixels: &HashSet<(u32, u32)>) -> Option<PixelBounds> {
    let mut iter = pixels.iter();
    let &(x0, y0) = iter.next()?;
    let mut bounds = PixelBounds::single(x0, y0);
    for &(x, y) in iter {
        bounds.include(x, y);
    }
    Some(bounds)
}

/// Carry a wand region collected over `layer`'s pixels into canvas space.
/// Canvas pixels are kept when their centre maps back onto a region pixel.
/// `None` when the placed region misses the canvas entirely.
fn place_region(region: WandRegion, layer: &Layer) -> Option<WandRegion> {
    if layer.placement.is_identity() {
        return Some(region);
    }
    let (w, h) = (layer.pixels.width(), layer.pixels.height());
    let m = layer.placement.matrix(w, h);
    let b = region.bounds;
    let corners = [
        (b.min_x as f32, b.min_y as f32),
        ((b.max_x + 1) as f32, b.min_y as f32),
        (b.min_x as f32, (b.max_y + 1) as f32),
        ((b.max_x + 1) as f32, (b.max_y + 1) as f32),
    ]
    .map(|(x, y)| Pos2::new(m[0][0] * x + m[0][1] * y + m[0][2], m[1][0] * x + m[1][1] * y + m[1][2]));
    let area = PixelBounds::covering(Rect::from_points(&corners), w, h)?;

    let mut pixels = HashSet::new();
    for y in area.min_y..=area.max_y {
        for x in area.min_x..=area.max_x {
            let lp = layer
                .placement
                .to_layer_space(Pos2::new(x as f32 + 0.5, y as f32 + 0.5), w, h);
            if lp.x < 0.0 || lp.y < 0.0 {
                continue;
            }
            if region.pixels.contains(&(lp.x.floor() as u32, lp.y.floor() as u32)) {
                pixels.insert((x, y));
            }
        }
    }
    let bounds = bounds_of(&pixels)?;
    let boundary = fill::boundary_of(&pixels, bounds);
    Some(WandRegion { pixels, bounds, boundary })
}

fn ellipse_contains(r: Rect, p: Pos2) -> bool {
    let rx = r.width() * 0.5;
    let ry = r.height() * 0.5;
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let c = r.center();
    let dx = (p.x - c.x) / rx;
    let dy = (p.y - c.y) / ry;
    dx * dx + dy * dy <= 1.0
}

/// Ray-casting point-in-polygon with the half-open edge rule. Points lying on
/// an edge count as inside.
pub fn polygon_contains(path: &[Pos2], p: Pos2) -> bool {
    if path.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = path.len() - 1;
    for i in 0..path.len() {
        let (a, b) = (path[i], path[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Pos2, b: Pos2, p: Pos2) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len_sq = ab.length_sq();
    if len_sq == 0.0 {
        return ap.length() <= EDGE_EPSILON;
    }
    let t = (ap.x * ab.x + ap.y * ab.y) / len_sq;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let closest = a + ab * t;
    (p - closest).length() <= EDGE_EPSILON
}

// ----------------------------------------------------------------------------
//  Engine
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum DragState {
    Rect { origin: Pos2, current: Pos2 },
    Ellipse { origin: Pos2, current: Pos2 },
    Lasso { points: Vec<Pos2> },
}

/// What a commit did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Degenerate geometry (zero-size box, lasso under three points).
    Discarded,
    /// No gesture was in progress.
    NoGesture,
}

/// Outcome of a magic-wand click.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WandResult {
    Selected { pixel_count: usize },
    NothingSelected,
}

/// Owns the single engine-wide selection and any in-progress selection drag.
#[derive(Clone, Debug, Default)]
pub struct SelectionEngine {
    active: Option<Selection>,
    drag: Option<DragState>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Selection> {
        self.active.as_ref()
    }

    pub fn has_selection(&self) -> bool {
        self.active.is_some()
    }

    pub fn set(&mut self, selection: Selection) {
        self.active = Some(selection);
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn begin_rect(&mut self, origin: Pos2) {
        self.active = None;
        self.drag = Some(DragState::Rect { origin, current: origin });
    }

    pub fn begin_ellipse(&mut self, origin: Pos2) {
        self.active = None;
        self.drag = Some(DragState::Ellipse { origin, current: origin });
    }

    pub fn begin_lasso(&mut self, origin: Pos2) {
        self.active = None;
        self.drag = Some(DragState::Lasso { points: vec![origin] });
    }

    /// Move the free corner of a rect/ellipse drag.
    pub fn update_drag(&mut self, point: Pos2) {
        match self.drag.as_mut() {
            Some(DragState::Rect { current, .. }) | Some(DragState::Ellipse { current, .. }) => {
                *current = point;
            }
            Some(DragState::Lasso { points }) => points.push(point),
            None => {}
        }
    }

    /// Add a pointer sample to a lasso drag. Consecutive duplicates are skipped.
    pub fn append_point(&mut self, point: Pos2) {
        if let Some(DragState::Lasso { points }) = self.drag.as_mut()
            && points.last() != Some(&point)
        {
            points.push(point);
        }
    }

    /// The selection the current drag would produce, for outline previews.
    pub fn preview(&self) -> Option<Selection> {
        match self.drag.as_ref()? {
            DragState::Rect { origin, current } => {
                Some(Selection::Rect(Rect::from_two_pos(*origin, *current)))
            }
            DragState::Ellipse { origin, current } => {
                Some(Selection::Ellipse(Rect::from_two_pos(*origin, *current)))
            }
            DragState::Lasso { points } if points.len() >= 3 => {
                Some(Selection::lasso(points.clone()))
            }
            DragState::Lasso { .. } => None,
        }
    }

    /// Finish the drag. Degenerate shapes are discarded and leave no selection.
    pub fn commit(&mut self) -> CommitOutcome {
        let Some(drag) = self.drag.take() else { return CommitOutcome::NoGesture };
        let selection = match drag {
            DragState::Rect { origin, current } => {
                let r = Rect::from_two_pos(origin, current);
                (r.width() > 0.0 && r.height() > 0.0).then_some(Selection::Rect(r))
            }
            DragState::Ellipse { origin, current } => {
                let r = Rect::from_two_pos(origin, current);
                (r.width() > 0.0 && r.height() > 0.0).then_some(Selection::Ellipse(r))
            }
            DragState::Lasso { points } => {
                (points.len() >= 3).then(|| Selection::lasso(points))
            }
        };
        match selection {
            Some(sel) => {
                self.active = Some(sel);
                CommitOutcome::Committed
            }
            None => CommitOutcome::Discarded,
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Select the region around the canvas point `click` on `layer`. The
    /// flood runs over the layer's pixels and the result is stored in canvas
    /// space. On a miss the current selection is left as it was.
    pub fn magic_wand(&mut self, layer: &Layer, click: Pos2, tolerance: u8) -> WandResult {
        let lp = layer
            .placement
            .to_layer_space(click, layer.pixels.width(), layer.pixels.height());
        if lp.x < 0.0 || lp.y < 0.0 {
            return WandResult::NothingSelected;
        }
        let start = (lp.x.floor() as u32, lp.y.floor() as u32);
        let Some(region) = fill::magic_wand(&layer.pixels, start, tolerance) else {
            return WandResult::NothingSelected;
        };
        match place_region(region, layer) {
            Some(region) => {
                let pixel_count = region.pixels.len();
                self.drag = None;
                self.active = Some(Selection::from_wand(region));
                WandResult::Selected { pixel_count }
            }
            None => WandResult::NothingSelected,
        }
    }

    /// True when `p` is inside the active selection (false with none).
    pub fn contains_point(&self, p: Pos2) -> bool {
        self.active.as_ref().is_some_and(|s| s.contains_point(p))
    }

    /// True when an edit at `p` is allowed: no selection, or inside it.
    pub fn permits(&self, p: Pos2) -> bool {
        self.active.as_ref().is_none_or(|s| s.contains_point(p))
    }

    pub fn clip_path(&self) -> Option<ClipPath<'_>> {
        self.active.as_ref().map(Selection::clip_path)
    }

    pub fn clip_mask(&self, width: u32, height: u32) -> Option<GrayImage> {
        self.active.as_ref().map(|s| s.clip_mask(width, height))
    }

    /// The active selection over `layer`'s pixels, honoring its placement.
    pub fn layer_mask(&self, layer: &Layer) -> Option<GrayImage> {
        self.active.as_ref().map(|s| s.layer_mask(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Deterministic LCG so the sampled points are identical on every run.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / (1u64 << 24) as f32
        }
    }

    /// Reference test for convex polygons: inside iff on the same side of
    /// every edge.
    fn convex_reference(poly: &[Pos2], p: Pos2) -> bool {
        let mut sign = 0.0f32;
        for i in 0..poly.len() {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            if cross != 0.0 {
                if sign == 0.0 {
                    sign = cross.signum();
                } else if cross.signum() != sign {
                    return false;
                }
            }
        }
        true
    }

    fn distance_to_edges(poly: &[Pos2], p: Pos2) -> f32 {
        let mut best = f32::MAX;
        for i in 0..poly.len() {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            let ab = b - a;
            let t = (((p - a).x * ab.x + (p - a).y * ab.y) / ab.length_sq()).clamp(0.0, 1.0);
            best = best.min((p - (a + ab * t)).length());
        }
        best
    }

    fn regular_polygon(cx: f32, cy: f32, r: f32, n: usize, phase: f32) -> Vec<Pos2> {
        (0..n)
            .map(|i| {
                let a = phase + i as f32 / n as f32 * std::f32::consts::TAU;
                Pos2::new(cx + r * a.cos(), cy + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn lasso_agrees_with_reference_on_convex_polygons() {
        let polygons = vec![
            vec![Pos2::new(10.0, 10.0), Pos2::new(90.0, 20.0), Pos2::new(40.0, 80.0)],
            vec![
                Pos2::new(5.0, 5.0),
                Pos2::new(95.0, 5.0),
                Pos2::new(95.0, 60.0),
                Pos2::new(5.0, 60.0),
            ],
            regular_polygon(50.0, 50.0, 40.0, 7, 0.3),
            regular_polygon(60.0, 40.0, 25.0, 12, 0.0),
        ];
        let mut rng = Lcg(0x5eed);
        for poly in &polygons {
            let sel = Selection::lasso(poly.clone());
            let mut checked = 0;
            while checked < 1000 {
                let p = Pos2::new(rng.next_f32() * 110.0 - 5.0, rng.next_f32() * 110.0 - 5.0);
                if distance_to_edges(poly, p) <= 1.0 {
                    continue;
                }
                assert_eq!(
                    sel.contains_point(p),
                    convex_reference(poly, p),
                    "disagreement at {:?}",
                    p
                );
                checked += 1;
            }
        }
    }

    #[test]
    fn lasso_points_on_edges_and_vertices_are_inside() {
        let sel = Selection::lasso(vec![
            Pos2::new(0.0, 0.0),
            Pos2::new(10.0, 0.0),
            Pos2::new(10.0, 10.0),
            Pos2::new(0.0, 10.0),
        ]);
        for p in [
            Pos2::new(5.0, 0.0),
            Pos2::new(10.0, 5.0),
            Pos2::new(0.0, 7.5),
            Pos2::new(10.0, 10.0),
            Pos2::new(0.0, 0.0),
        ] {
            assert!(sel.contains_point(p), "{:?}", p);
        }
        assert!(!sel.contains_point(Pos2::new(10.5, 5.0)));
    }

    #[test]
    fn lasso_concave_shape() {
        // A "U": the notch between the arms is outside
        let sel = Selection::lasso(vec![
            Pos2::new(0.0, 0.0),
            Pos2::new(3.0, 0.0),
            Pos2::new(3.0, 6.0),
            Pos2::new(6.0, 6.0),
            Pos2::new(6.0, 0.0),
            Pos2::new(9.0, 0.0),
            Pos2::new(9.0, 9.0),
            Pos2::new(0.0, 9.0),
        ]);
        assert!(sel.contains_point(Pos2::new(1.5, 3.0)));
        assert!(!sel.contains_point(Pos2::new(4.5, 3.0)));
        assert!(sel.contains_point(Pos2::new(4.5, 7.5)));
    }

    #[test]
    fn lasso_bounds_enclose_path() {
        let path = vec![Pos2::new(3.0, 9.0), Pos2::new(-2.0, 4.0), Pos2::new(7.0, 1.0)];
        match Selection::lasso(path) {
            Selection::Lasso { bounds, .. } => {
                assert_eq!(bounds, Rect::from_min_max(Pos2::new(-2.0, 1.0), Pos2::new(7.0, 9.0)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lasso_needs_three_points() {
        let mut engine = SelectionEngine::new();
        engine.begin_lasso(Pos2::new(0.0, 0.0));
        engine.append_point(Pos2::new(5.0, 0.0));
        engine.append_point(Pos2::new(5.0, 0.0));
        assert_eq!(engine.commit(), CommitOutcome::Discarded);
        assert!(!engine.has_selection());

        engine.begin_lasso(Pos2::new(0.0, 0.0));
        engine.append_point(Pos2::new(5.0, 0.0));
        engine.append_point(Pos2::new(5.0, 5.0));
        assert_eq!(engine.commit(), CommitOutcome::Committed);
        assert!(engine.contains_point(Pos2::new(4.0, 1.0)));
    }

    #[test]
    fn rect_drag_normalizes_and_new_gesture_clears() {
        let mut engine = SelectionEngine::new();
        engine.begin_rect(Pos2::new(20.0, 20.0));
        engine.update_drag(Pos2::new(10.0, 5.0));
        assert_eq!(engine.commit(), CommitOutcome::Committed);
        assert_eq!(
            engine.active(),
            Some(&Selection::Rect(Rect::from_min_max(Pos2::new(10.0, 5.0), Pos2::new(20.0, 20.0))))
        );
        assert!(engine.contains_point(Pos2::new(20.0, 20.0)));

        engine.begin_ellipse(Pos2::new(0.0, 0.0));
        assert!(!engine.has_selection());
        // Click without drag
        assert_eq!(engine.commit(), CommitOutcome::Discarded);
        assert!(!engine.has_selection());
        assert_eq!(engine.commit(), CommitOutcome::NoGesture);
    }

    #[test]
    fn ellipse_membership() {
        let sel = Selection::Ellipse(Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(20.0, 10.0)));
        assert!(sel.contains_point(Pos2::new(10.0, 5.0)));
        assert!(sel.contains_point(Pos2::new(20.0, 5.0)));
        assert!(!sel.contains_point(Pos2::new(1.0, 1.0)));
    }

    #[test]
    fn clip_mask_matches_contains_pixel() {
        let sel = Selection::Ellipse(Rect::from_min_max(Pos2::new(2.0, 2.0), Pos2::new(14.0, 10.0)));
        let mask = sel.clip_mask(16, 12);
        for (x, y, m) in mask.enumerate_pixels() {
            assert_eq!(m[0] == 255, sel.contains_pixel(x, y));
        }
        assert!(matches!(sel.clip_path(), ClipPath::Ellipse { .. }));
    }

    #[test]
    fn wand_miss_keeps_selection() {
        let layer = Layer::new(1, "base", 8, 8);
        let mut engine = SelectionEngine::new();
        engine.set(Selection::Rect(Rect::from_min_max(Pos2::ZERO, Pos2::new(2.0, 2.0))));
        assert_eq!(engine.magic_wand(&layer, Pos2::new(40.0, 1.0), 30), WandResult::NothingSelected);
        assert!(engine.has_selection());
        assert_eq!(
            engine.magic_wand(&layer, Pos2::new(1.0, 1.0), 30),
            WandResult::Selected { pixel_count: 64 }
        );
        match engine.active() {
            Some(Selection::MagicWand { bounds, .. }) => assert_eq!(*bounds, PixelBounds::full(8, 8)),
            other => panic!("unexpected {:?}", other),
        }
    }

    /// 40x20 layer with a red 4x4 square in its top-left corner, moved 10px right.
    fn moved_square_layer() -> Layer {
        let mut layer = Layer::new(1, "square", 40, 20);
        for y in 0..4 {
            for x in 0..4 {
                layer.pixels.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        layer.placement.x = 10.0;
        layer
    }

    #[test]
    fn wand_on_moved_layer_selects_where_the_pixels_are_drawn() {
        let layer = moved_square_layer();
        let mut engine = SelectionEngine::new();
        assert_eq!(
            engine.magic_wand(&layer, Pos2::new(11.5, 1.5), 0),
            WandResult::Selected { pixel_count: 16 }
        );
        assert!(engine.contains_point(Pos2::new(11.5, 1.5)));
        assert!(!engine.contains_point(Pos2::new(1.5, 1.5)));
        match engine.active() {
            Some(Selection::MagicWand { bounds, boundary, .. }) => {
                assert_eq!(*bounds, PixelBounds { min_x: 10, min_y: 0, max_x: 13, max_y: 3 });
                assert_eq!(boundary.len(), 12);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Left of the moved layer there is nothing to flood
        assert_eq!(engine.magic_wand(&layer, Pos2::new(1.5, 1.5), 0), WandResult::NothingSelected);
        assert!(engine.contains_point(Pos2::new(11.5, 1.5)));

        // The transparent area is clipped to the canvas the layer is drawn on
        assert_eq!(
            engine.magic_wand(&layer, Pos2::new(20.5, 1.5), 0),
            WandResult::Selected { pixel_count: 30 * 20 - 16 }
        );
        assert!(!engine.contains_point(Pos2::new(11.5, 1.5)));
    }

    #[test]
    fn layer_mask_follows_placement() {
        let layer = moved_square_layer();
        let left = Selection::Rect(Rect::from_min_max(Pos2::ZERO, Pos2::new(5.0, 5.0)));
        assert!(left.layer_mask(&layer).pixels().all(|m| m[0] == 0));

        let over = Selection::Rect(Rect::from_min_max(Pos2::new(10.0, 0.0), Pos2::new(15.0, 5.0)));
        let mask = over.layer_mask(&layer);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(4, 4)[0], 255);
        assert_eq!(mask.get_pixel(5, 0)[0], 0);
        assert_eq!(mask.get_pixel(10, 0)[0], 0);
    }

    #[test]
    fn wand_selection_translates_by_whole_pixels() {
        let mut layer = Layer::new(1, "base", 6, 6);
        layer.pixels.put_pixel(0, 0, Rgba([0, 0, 255, 255]));
        layer.pixels.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        layer.pixels.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        let mut engine = SelectionEngine::new();
        engine.magic_wand(&layer, Pos2::new(0.5, 0.5), 0);
        let Some(mut sel) = engine.active().cloned() else { panic!("no selection") };

        sel.translate(2.4, -1.0);
        match &sel {
            Selection::MagicWand { pixels, bounds, boundary } => {
                let mut got: Vec<_> = pixels.iter().copied().collect();
                got.sort();
                assert_eq!(got, vec![(3, 0)]);
                assert_eq!(*bounds, PixelBounds::single(3, 0));
                assert_eq!(boundary, &vec![(3, 0)]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(sel.contains_pixel(3, 0));
        assert!(!sel.contains_pixel(1, 1));
    }

    #[test]
    fn permits_everything_without_selection() {
        let mut engine = SelectionEngine::new();
        assert!(engine.permits(Pos2::new(-100.0, 3.0)));
        assert!(!engine.contains_point(Pos2::new(1.0, 1.0)));
        engine.set(Selection::Rect(Rect::from_min_max(Pos2::ZERO, Pos2::new(2.0, 2.0))));
        assert!(!engine.permits(Pos2::new(3.0, 3.0)));
    }
}
