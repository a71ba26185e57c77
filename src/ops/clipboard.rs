// ============================================================================
// CLIPBOARD OPERATIONS: copy, paste-as-layer, delete selected pixels
// ============================================================================

use egui::Pos2;
use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{CanvasState, Layer, LayerId, PixelBounds, TRANSPARENT};
use crate::selection::Selection;

/// Name given to layers created by paste.
pub const PASTE_LAYER_NAME: &str = "Paste";

/// In-app clipboard contents. Carries the source selection so a paste can
/// re-select exactly what was copied.
#[derive(Clone, Debug)]
pub struct ClipboardImage {
    pub image: RgbaImage,
    /// Canvas position of the image's top-left pixel.
    pub origin: (i64, i64),
    pub selection: Selection,
}

/// Copy what `layer` draws under the selection, sampled in canvas space so
/// a moved layer copies its visible pixels. Pixels inside the selection's
/// bounding box but outside the selection itself copy as transparent.
/// `None` when the selection lies entirely off the canvas.
pub fn copy_selection(layer: &Layer, selection: &Selection) -> Option<ClipboardImage> {
    let (w, h) = (layer.pixels.width(), layer.pixels.height());
    let bounds = PixelBounds::covering(selection.bounding_rect(), w, h)?;
    let mut image = RgbaImage::new(bounds.width(), bounds.height());
    for (ox, oy, px) in image.enumerate_pixels_mut() {
        let (x, y) = (bounds.min_x + ox, bounds.min_y + oy);
        if selection.contains_pixel(x, y) {
            *px = layer.sample_canvas_point(Pos2::new(x as f32 + 0.5, y as f32 + 0.5));
        }
    }
    log_info!(
        "Copied {}x{} from layer {}",
        image.width(),
        image.height(),
        layer.id
    );
    Some(ClipboardImage {
        image,
        origin: (bounds.min_x as i64, bounds.min_y as i64),
        selection: selection.clone(),
    })
}

/// Paste `clip` onto a new top layer at its original position. The layer
/// gets a fresh scene ref so it exports as its own item.
pub fn paste_as_layer(canvas: &mut CanvasState, clip: &ClipboardImage) -> LayerId {
    let mut full = RgbaImage::new(canvas.width, canvas.height);
    for (sx, sy, px) in clip.image.enumerate_pixels() {
        let dx = clip.origin.0 + sx as i64;
        let dy = clip.origin.1 + sy as i64;
        if dx >= 0 && dy >= 0 && dx < canvas.width as i64 && dy < canvas.height as i64 {
            full.put_pixel(dx as u32, dy as u32, *px);
        }
    }
    let scene_ref = format!("new_scene_{}", Uuid::new_v4());
    let id = canvas.add_layer(Some(&full), Some(PASTE_LAYER_NAME), None, Some(scene_ref));
    log_info!("Pasted clipboard as layer {}", id);
    id
}

/// Clear every layer pixel drawn inside the selection to transparent.
/// Returns the number of pixels that changed; the layer is marked dirty only
/// when that is > 0.
pub fn delete_selected(layer: &mut Layer, selection: &Selection) -> usize {
    let mask = selection.layer_mask(layer);
    let mut cleared = 0;
    for (x, y, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        if layer.pixels.get_pixel(x, y) != TRANSPARENT {
            layer.pixels.put_pixel(x, y, TRANSPARENT);
            cleared += 1;
        }
    }
    if cleared > 0 {
        layer.dirty = true;
    }
    cleared
}
