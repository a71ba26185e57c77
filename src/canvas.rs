use egui::Pos2;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::components::layers::{Group, GroupId};
use crate::ops::transform;

/// Stable layer identifier. Handed out by [`CanvasState`] and never reused.
pub type LayerId = u64;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// PIXEL BOUNDS
// ============================================================================

/// Inclusive integer bounding box in canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelBounds {
    pub fn single(x: u32, y: u32) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: width.saturating_sub(1),
            max_y: height.saturating_sub(1),
        }
    }

    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn to_rect(&self) -> egui::Rect {
        egui::Rect::from_min_max(
            Pos2::new(self.min_x as f32, self.min_y as f32),
            Pos2::new(self.max_x as f32 + 1.0, self.max_y as f32 + 1.0),
        )
    }

    /// Pixels whose area intersects `rect`, clamped to the canvas. `None` when
    /// nothing of the rect lies on the canvas.
    pub fn covering(rect: egui::Rect, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let min_x = rect.min.x.floor().max(0.0);
        let min_y = rect.min.y.floor().max(0.0);
        let max_x = (rect.max.x.ceil() - 1.0).min(width as f32 - 1.0);
        let max_y = (rect.max.y.ceil() - 1.0).min(height as f32 - 1.0);
        if max_x < min_x || max_y < min_y {
            return None;
        }
        Some(Self {
            min_x: min_x as u32,
            min_y: min_y as u32,
            max_x: max_x as u32,
            max_y: max_y as u32,
        })
    }
}

// ============================================================================
// PIXEL BUFFER: one exclusively owned RGBA surface
// ============================================================================

/// A fixed-size RGBA raster. Out-of-range reads return transparent and
/// out-of-range writes are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: RgbaImage::new(width, height) }
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self { image: RgbaImage::from_pixel(width, height, color) }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        if x < self.width() && y < self.height() {
            *self.image.get_pixel(x, y)
        } else {
            TRANSPARENT
        }
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, px: Rgba<u8>) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, px);
        }
    }

    /// Copy a sub-region out as a standalone image.
    pub fn extract_region(&self, bounds: PixelBounds) -> RgbaImage {
        let mut out = RgbaImage::new(bounds.width(), bounds.height());
        for (ox, oy, px) in out.enumerate_pixels_mut() {
            *px = self.get_pixel(bounds.min_x + ox, bounds.min_y + oy);
        }
        out
    }

    /// Overwrite pixels with `src` placed at `(x, y)`. Parts falling off the
    /// surface are dropped.
    pub fn blit(&mut self, src: &RgbaImage, x: i64, y: i64) {
        for (sx, sy, px) in src.enumerate_pixels() {
            let dx = x + sx as i64;
            let dy = y + sy as i64;
            if self.in_bounds(dx, dy) {
                self.image.put_pixel(dx as u32, dy as u32, *px);
            }
        }
    }

    pub fn clear_region(&mut self, bounds: PixelBounds) {
        for y in bounds.min_y..=bounds.max_y.min(self.height().saturating_sub(1)) {
            for x in bounds.min_x..=bounds.max_x.min(self.width().saturating_sub(1)) {
                self.image.put_pixel(x, y, TRANSPARENT);
            }
        }
    }

    pub fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    /// Bounding box of every pixel with non-zero alpha.
    pub fn content_bounds(&self) -> Option<PixelBounds> {
        let mut bounds: Option<PixelBounds> = None;
        for (x, y, px) in self.image.enumerate_pixels() {
            if px[3] > 0 {
                match bounds.as_mut() {
                    Some(b) => b.include(x, y),
                    None => bounds = Some(PixelBounds::single(x, y)),
                }
            }
        }
        bounds
    }

    pub fn memory_bytes(&self) -> usize {
        self.image.as_raw().len()
    }
}

// ============================================================================
// PLACEMENT: affine offset applied at composite time
// ============================================================================

/// Translate/rotate/scale applied when the layer is composited. Rotation
/// (degrees) and scale act about the layer centre, then the translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, rotation: 0.0, scale_x: 1.0, scale_y: 1.0 }
    }
}

impl Placement {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_translation_only(&self) -> bool {
        self.rotation == 0.0 && self.scale_x == 1.0 && self.scale_y == 1.0
    }

    /// Layer space → canvas space for a `width`×`height` layer.
    pub fn matrix(&self, width: u32, height: u32) -> [[f32; 3]; 3] {
        let cx = width as f32 * 0.5;
        let cy = height as f32 * 0.5;
        let (s, c) = self.rotation.to_radians().sin_cos();
        let a = c * self.scale_x;
        let b = -s * self.scale_y;
        let d = s * self.scale_x;
        let e = c * self.scale_y;
        [
            [a, b, cx + self.x - (a * cx + b * cy)],
            [d, e, cy + self.y - (d * cx + e * cy)],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Map a canvas-space point back into layer space.
    pub fn to_layer_space(&self, p: Pos2, width: u32, height: u32) -> Pos2 {
        if self.is_translation_only() {
            return Pos2::new(p.x - self.x, p.y - self.y);
        }
        let inv = transform::invert_3x3(self.matrix(width, height));
        Pos2::new(
            inv[0][0] * p.x + inv[0][1] * p.y + inv[0][2],
            inv[1][0] * p.x + inv[1][1] * p.y + inv[1][2],
        )
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub pixels: PixelBuffer,
    pub placement: Placement,
    pub visible: bool,
    pub locked: bool,
    pub group_id: Option<GroupId>,
    /// External scene this layer was created from; only the exporter reads it.
    pub origin_scene_ref: Option<String>,
    /// Edited since the last confirmed export.
    pub dirty: bool,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id,
            name: name.into(),
            pixels: PixelBuffer::new(width, height),
            placement: Placement::default(),
            visible: true,
            locked: false,
            group_id: None,
            origin_scene_ref: None,
            dirty: false,
        }
    }

    /// Tools may only write into visible, unlocked layers.
    pub fn is_writable(&self) -> bool {
        self.visible && !self.locked
    }

    /// Pixel under a canvas-space point, honoring placement.
    pub fn sample_canvas_point(&self, p: Pos2) -> Rgba<u8> {
        let lp = self
            .placement
            .to_layer_space(p, self.pixels.width(), self.pixels.height());
        if lp.x < 0.0 || lp.y < 0.0 {
            return TRANSPARENT;
        }
        self.pixels.get_pixel(lp.x.floor() as u32, lp.y.floor() as u32)
    }
}

// ============================================================================
// CANVAS STATE: the layer stack plus groups
// ============================================================================

/// Ordered layer stack (index 0 is the bottom) with groups and the active layer.
#[derive(Clone, Debug)]
pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub groups: Vec<Group>,
    pub(crate) active_layer: Option<LayerId>,
    pub(crate) next_layer_id: LayerId,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
            groups: Vec::new(),
            active_layer: None,
            next_layer_id: 1,
        }
    }

    fn alloc_id(&mut self) -> LayerId {
        let id = self.next_layer_id;
        self.next_layer_id += 1;
        id
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active_layer
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer.and_then(|id| self.layer(id))
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        let id = self.active_layer?;
        self.layer_mut(id)
    }

    /// Make `id` the active layer. Unknown ids are ignored.
    pub fn set_active(&mut self, id: LayerId) -> bool {
        if self.index_of(id).is_some() {
            self.active_layer = Some(id);
            true
        } else {
            false
        }
    }

    /// Add a layer. With `source` the raster is copied in at the origin
    /// (cropped to the canvas). The new layer joins the active layer's group,
    /// becomes active, and defaults to the top of the stack.
    pub fn add_layer(
        &mut self,
        source: Option<&RgbaImage>,
        name: Option<&str>,
        insert_index: Option<usize>,
        origin_scene_ref: Option<String>,
    ) -> LayerId {
        let id = self.alloc_id();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Layer {}", self.layers.len() + 1));
        let mut layer = Layer::new(id, name, self.width, self.height);
        if let Some(src) = source {
            layer.pixels.blit(src, 0, 0);
        }
        layer.dirty = source.is_some() && origin_scene_ref.is_some();
        layer.origin_scene_ref = origin_scene_ref;

        let group = self.active_layer().and_then(|l| l.group_id);
        let index = insert_index.unwrap_or(self.layers.len()).min(self.layers.len());
        self.layers.insert(index, layer);
        if let Some(gid) = group {
            self.attach_to_group(id, gid);
        }
        self.active_layer = Some(id);
        log_info!("Added layer {} at index {}", id, index);
        id
    }

    /// Remove a layer. Refuses to remove the last remaining layer.
    pub fn delete_layer(&mut self, id: LayerId) -> bool {
        if self.layers.len() <= 1 {
            log_warn!("Refusing to delete the last layer");
            return false;
        }
        let Some(idx) = self.index_of(id) else { return false };
        self.layers.remove(idx);
        self.detach_from_group(id);
        self.prune_empty_groups();
        if self.active_layer == Some(id) {
            let next = idx.saturating_sub(1).min(self.layers.len() - 1);
            self.active_layer = Some(self.layers[next].id);
        }
        log_info!("Deleted layer {}", id);
        true
    }

    /// Move the layer at `from` to `to`. Ids are stable so the active layer
    /// follows automatically.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.layers.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        true
    }

    /// Flatten the listed layers into one new layer at the lowest listed index.
    ///
    /// Hidden layers contribute nothing. The result carries the scene ref (and
    /// name) of the lowest layer that has one, otherwise it is "Merged layer".
    /// Fewer than two live ids is a no-op.
    pub fn merge(&mut self, ids: &[LayerId]) -> Option<LayerId> {
        let mut indices: Vec<usize> = ids.iter().filter_map(|id| self.index_of(*id)).collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.len() < 2 {
            return None;
        }

        let merged = flatten(
            self.width,
            self.height,
            indices.iter().map(|&i| &self.layers[i]).filter(|l| l.visible),
        );
        let carrier = indices
            .iter()
            .map(|&i| &self.layers[i])
            .find(|l| l.origin_scene_ref.is_some());
        let (name, scene_ref) = match carrier {
            Some(l) => (l.name.clone(), l.origin_scene_ref.clone()),
            None => ("Merged layer".to_string(), None),
        };

        let insert_at = indices[0];
        let removed: Vec<LayerId> = indices.iter().map(|&i| self.layers[i].id).collect();
        for &i in indices.iter().rev() {
            self.layers.remove(i);
        }
        for id in &removed {
            self.detach_from_group(*id);
        }
        self.prune_empty_groups();

        let id = self.alloc_id();
        let mut layer = Layer::new(id, name, self.width, self.height);
        layer.pixels = PixelBuffer::from_image(merged);
        layer.origin_scene_ref = scene_ref;
        layer.dirty = true;
        self.layers.insert(insert_at, layer);
        self.active_layer = Some(id);
        log_info!("Merged {} layers into {}", removed.len(), id);
        Some(id)
    }

    /// Flatten every visible layer.
    pub fn composite(&self) -> RgbaImage {
        flatten(self.width, self.height, self.layers.iter().filter(|l| l.visible))
    }

    /// Topmost visible layer with a non-transparent pixel under `p`.
    pub fn layer_at_point(&self, p: Pos2) -> Option<LayerId> {
        self.layers
            .iter()
            .rev()
            .filter(|l| l.visible)
            .find(|l| l.sample_canvas_point(p)[3] > 0)
            .map(|l| l.id)
    }

    /// Set the RGB of every non-transparent pixel, keeping alpha.
    pub fn recolor_layer(&mut self, id: LayerId, color: Rgba<u8>) -> bool {
        let Some(layer) = self.layer_mut(id) else { return false };
        if layer.locked {
            log_warn!("Recolor rejected: layer {} is locked", id);
            return false;
        }
        for px in layer.pixels.image_mut().pixels_mut() {
            if px[3] > 0 {
                px[0] = color[0];
                px[1] = color[1];
                px[2] = color[2];
            }
        }
        layer.dirty = true;
        true
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> bool {
        match self.layer_mut(id) {
            Some(layer) => {
                layer.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) -> bool {
        match self.layer_mut(id) {
            Some(layer) => {
                layer.locked = locked;
                true
            }
            None => false,
        }
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> bool {
        match self.layer_mut(id) {
            Some(layer) => {
                layer.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Replace a layer's placement. Locked layers refuse.
    pub fn set_placement(&mut self, id: LayerId, placement: Placement) -> bool {
        match self.layer_mut(id) {
            Some(layer) if !layer.locked => {
                layer.placement = placement;
                layer.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.pixels.memory_bytes()).sum()
    }
}

// ============================================================================
// COMPOSITING
// ============================================================================

/// Source-over composite of `layers` (bottom first) onto a transparent canvas.
/// Visibility is the caller's filter; placement is honored here.
pub fn flatten<'a>(
    width: u32,
    height: u32,
    layers: impl Iterator<Item = &'a Layer>,
) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    for layer in layers {
        composite_layer_into(&mut out, layer);
    }
    out
}

fn composite_layer_into(dst: &mut RgbaImage, layer: &Layer) {
    let src = layer.pixels.image();
    if layer.placement.is_identity() {
        for (d, s) in dst.pixels_mut().zip(src.pixels()) {
            *d = blend_over(*d, *s, 1.0);
        }
        return;
    }
    let placed = transform::apply_affine(
        src,
        dst.width(),
        dst.height(),
        layer.placement.matrix(src.width(), src.height()),
    );
    for (d, s) in dst.pixels_mut().zip(placed.pixels()) {
        *d = blend_over(*d, *s, 1.0);
    }
}

/// Porter-Duff source-over with an extra opacity multiplier on `top`.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
