use ab_glyph::FontArc;
use egui::{Pos2, Rect};
use image::{GrayImage, Rgba};

use crate::canvas::{CanvasState, Layer, LayerId, PixelBounds, PixelBuffer, Placement};
use crate::ops::fill;
use crate::ops::shapes::{self, BrushStyle, CoverageMask, PaintMode};
use crate::ops::text;
use crate::ops::transform::{Handle, Interpolation, TransformSession};
use crate::selection::{CommitOutcome, SelectionEngine, WandResult};
use crate::settings::EditorSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    Move,
    #[default]
    Brush,
    Eraser,
    PaintBucket,
    Eyedropper,
    Text,
    RectSelect,
    EllipseSelect,
    Lasso,
    MagicWand,
    Line,
    RectShape,
    EllipseShape,
    Transform,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Move => "Move",
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::PaintBucket => "Paint Bucket",
            Tool::Eyedropper => "Eyedropper",
            Tool::Text => "Text",
            Tool::RectSelect => "Rectangle Select",
            Tool::EllipseSelect => "Ellipse Select",
            Tool::Lasso => "Lasso",
            Tool::MagicWand => "Magic Wand",
            Tool::Line => "Line",
            Tool::RectShape => "Rectangle",
            Tool::EllipseShape => "Ellipse",
            Tool::Transform => "Transform",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[
            Tool::Move,
            Tool::Brush,
            Tool::Eraser,
            Tool::PaintBucket,
            Tool::Eyedropper,
            Tool::Text,
            Tool::RectSelect,
            Tool::EllipseSelect,
            Tool::Lasso,
            Tool::MagicWand,
            Tool::Line,
            Tool::RectShape,
            Tool::EllipseShape,
            Tool::Transform,
        ]
    }

    /// Tools whose gestures build a selection rather than edit pixels.
    pub fn is_selection_tool(&self) -> bool {
        matches!(self, Tool::RectSelect | Tool::EllipseSelect | Tool::Lasso | Tool::MagicWand)
    }
}

/// Host-supplied values the tools paint with.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolProperties {
    /// Brush diameter in pixels
    pub size: f32,
    pub color: Rgba<u8>,
    /// 0..=1, brush, shapes and text only
    pub opacity: f32,
    pub style: BrushStyle,
    /// Content stamped by the text tool
    pub text: String,
    pub wand_tolerance: u8,
    pub fill_epsilon: u8,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            size: 10.0,
            color: Rgba([0, 0, 0, 255]),
            opacity: 1.0,
            style: BrushStyle::Normal,
            text: String::new(),
            wand_tolerance: fill::DEFAULT_WAND_TOLERANCE,
            fill_epsilon: fill::DEFAULT_FILL_EPSILON,
        }
    }
}

/// Result of one pointer event. Only `Edited` asks the owner for a history
/// snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureOutcome {
    /// Nothing happened
    Idle,
    /// A gesture is running; no history yet
    InProgress,
    /// Pixels or placement changed; carries the history description
    Edited(&'static str),
    SelectionChanged,
    SelectionCleared,
    /// Magic wand collected nothing
    NothingSelected,
    /// Locked, hidden or missing target layer
    Rejected,
    ColorSampled(Rgba<u8>),
}

impl GestureOutcome {
    pub fn needs_snapshot(&self) -> bool {
        matches!(self, GestureOutcome::Edited(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShapeKind {
    Line,
    Rect,
    Ellipse,
}

/// State carried between pointer down and up.
#[derive(Debug, Default)]
enum Gesture {
    #[default]
    None,
    /// Down was fully handled; swallow moves until up
    Consumed,
    Selecting,
    Stroke(Stroke),
    Shape {
        layer_id: LayerId,
        kind: ShapeKind,
        start: Pos2,
        current: Pos2,
    },
    Move {
        layer_id: LayerId,
        start: Pos2,
        origin: Placement,
    },
    TransformDrag {
        handle: Handle,
        start: Pos2,
    },
}

/// A brush or eraser stroke in progress. Coverage accumulates over the whole
/// stroke and is re-applied from `base`, so overlapping dabs never stack.
#[derive(Debug)]
struct Stroke {
    layer_id: LayerId,
    base: PixelBuffer,
    coverage: CoverageMask,
    clip: Option<GrayImage>,
    last: Pos2,
    mode: PaintMode,
    changed: bool,
}

impl Stroke {
    /// Extend the stroke from its last point to the layer-space point `to`.
    fn extend(&mut self, layer: &mut Layer, to: Pos2, props: &ToolProperties, seed: &mut u64) {
        if to == self.last {
            return;
        }
        shapes::stroke_segment(&mut self.coverage, self.last, to, props.size, props.style, seed);
        let area = Rect::from_two_pos(self.last, to).expand(props.size * 0.5 + 3.0);
        if let Some(region) = PixelBounds::covering(area, layer.pixels.width(), layer.pixels.height()) {
            let n = shapes::apply_coverage(
                &self.base,
                &mut layer.pixels,
                &self.coverage,
                region,
                props.color,
                props.opacity,
                self.mode,
                self.clip.as_ref(),
            );
            self.changed |= n > 0;
        }
        self.last = to;
    }
}

// ============================================================================
// TOOL DISPATCHER: one active tool, one gesture at a time
// ============================================================================

/// Routes pointer gestures to the active tool. Owns the selection and any
/// open transform session; the layer stack is borrowed per event.
pub struct ToolDispatcher {
    tool: Tool,
    pub properties: ToolProperties,
    pub selection: SelectionEngine,
    transform: Option<TransformSession>,
    gesture: Gesture,
    interpolation: Interpolation,
    min_transform_size: f32,
    handle_size: f32,
    size_range: (f32, f32),
    font_family: String,
    font: Option<FontArc>,
    font_looked_up: bool,
    spray_seed: u64,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(&EditorSettings::default())
    }
}

impl ToolDispatcher {
    pub fn new(settings: &EditorSettings) -> Self {
        let properties = ToolProperties {
            size: settings.brush_size.clamp(settings.brush_size_min, settings.brush_size_max),
            wand_tolerance: settings.magic_wand_tolerance,
            fill_epsilon: settings.fill_epsilon,
            ..ToolProperties::default()
        };
        Self {
            tool: Tool::default(),
            properties,
            selection: SelectionEngine::new(),
            transform: None,
            gesture: Gesture::None,
            interpolation: settings.interpolation,
            min_transform_size: settings.min_transform_size,
            handle_size: settings.transform_handle_size,
            size_range: (settings.brush_size_min, settings.brush_size_max),
            font_family: settings.font_family.clone(),
            font: None,
            font_looked_up: false,
            spray_seed: 0x5EED_0F_5A_11,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. Any running gesture is rolled back and an open transform
    /// session is cancelled, leaving its layer untouched.
    pub fn change_tool(&mut self, canvas: &mut CanvasState, tool: Tool) {
        if tool == self.tool {
            return;
        }
        self.abort_gesture_on(canvas);
        if self.cancel_transform() {
            log_info!("Transform cancelled by switching to {}", tool.label());
        }
        self.tool = tool;
    }

    pub fn is_gesture_active(&self) -> bool {
        !matches!(self.gesture, Gesture::None)
    }

    pub fn transform_session(&self) -> Option<&TransformSession> {
        self.transform.as_ref()
    }

    /// Supply the text tool's font directly instead of a system lookup.
    pub fn set_font(&mut self, font: FontArc) {
        self.font = Some(font);
        self.font_looked_up = true;
    }

    /// Nudge the brush size, clamped to the configured range.
    pub fn adjust_brush_size(&mut self, delta: f32) -> f32 {
        let (lo, hi) = self.size_range;
        self.properties.size = (self.properties.size + delta).clamp(lo, hi);
        self.properties.size
    }

    // ------------------------------------------------------------------
    //  Pointer events
    // ------------------------------------------------------------------

    /// Start a gesture. A gesture still running (its pointer up was never
    /// delivered) is rolled back first.
    pub fn pointer_down(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        if !matches!(self.gesture, Gesture::None | Gesture::Consumed) {
            log_warn!("Pointer down during a running gesture; rolling it back");
        }
        self.abort_gesture_on(canvas);

        if !self.tool.is_selection_tool()
            && self.tool != Tool::Transform
            && self.selection.has_selection()
            && !self.selection.contains_point(p)
        {
            // Clicking off the selection only dismisses it
            self.selection.clear();
            self.gesture = Gesture::Consumed;
            return GestureOutcome::SelectionCleared;
        }

        match self.tool {
            Tool::RectSelect => {
                self.selection.begin_rect(p);
                self.gesture = Gesture::Selecting;
                GestureOutcome::InProgress
            }
            Tool::EllipseSelect => {
                self.selection.begin_ellipse(p);
                self.gesture = Gesture::Selecting;
                GestureOutcome::InProgress
            }
            Tool::Lasso => {
                self.selection.begin_lasso(p);
                self.gesture = Gesture::Selecting;
                GestureOutcome::InProgress
            }
            Tool::MagicWand => self.magic_wand(canvas, p),
            Tool::Eyedropper => self.eyedropper(canvas, p),
            Tool::Brush | Tool::Eraser => self.begin_stroke(canvas, p),
            Tool::PaintBucket => self.paint_bucket(canvas, p),
            Tool::Text => self.stamp_text(canvas, p),
            Tool::Line => self.begin_shape(canvas, p, ShapeKind::Line),
            Tool::RectShape => self.begin_shape(canvas, p, ShapeKind::Rect),
            Tool::EllipseShape => self.begin_shape(canvas, p, ShapeKind::Ellipse),
            Tool::Move => self.begin_move(canvas, p),
            Tool::Transform => self.begin_transform_drag(canvas, p),
        }
    }

    pub fn pointer_move(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        match &mut self.gesture {
            Gesture::None => GestureOutcome::Idle,
            Gesture::Consumed => GestureOutcome::Idle,
            Gesture::Selecting => {
                if self.tool == Tool::Lasso {
                    self.selection.append_point(p);
                } else {
                    self.selection.update_drag(p);
                }
                GestureOutcome::InProgress
            }
            Gesture::Stroke(stroke) => {
                let Some(layer) = canvas.layer_mut(stroke.layer_id) else { return GestureOutcome::Idle };
                let lp = to_layer_space(layer, p);
                stroke.extend(layer, lp, &self.properties, &mut self.spray_seed);
                GestureOutcome::InProgress
            }
            Gesture::Shape { current, .. } => {
                *current = p;
                GestureOutcome::InProgress
            }
            Gesture::Move { layer_id, start, origin } => {
                let placement = Placement {
                    x: origin.x + (p.x - start.x),
                    y: origin.y + (p.y - start.y),
                    ..*origin
                };
                if let Some(layer) = canvas.layer_mut(*layer_id) {
                    layer.placement = placement;
                }
                GestureOutcome::InProgress
            }
            Gesture::TransformDrag { handle, start } => {
                if let Some(session) = self.transform.as_mut() {
                    session.drag(*handle, p - *start);
                }
                GestureOutcome::InProgress
            }
        }
    }

    pub fn pointer_up(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::None | Gesture::Consumed => GestureOutcome::Idle,
            Gesture::Selecting => {
                if self.tool == Tool::Lasso {
                    self.selection.append_point(p);
                } else {
                    self.selection.update_drag(p);
                }
                match self.selection.commit() {
                    CommitOutcome::Committed => GestureOutcome::SelectionChanged,
                    CommitOutcome::Discarded => GestureOutcome::SelectionCleared,
                    CommitOutcome::NoGesture => GestureOutcome::Idle,
                }
            }
            Gesture::Stroke(mut stroke) => {
                let Some(layer) = canvas.layer_mut(stroke.layer_id) else { return GestureOutcome::Idle };
                let lp = to_layer_space(layer, p);
                stroke.extend(layer, lp, &self.properties, &mut self.spray_seed);
                if !stroke.changed {
                    return GestureOutcome::Idle;
                }
                layer.dirty = true;
                match stroke.mode {
                    PaintMode::Paint => GestureOutcome::Edited("Brush Stroke"),
                    PaintMode::Erase => GestureOutcome::Edited("Eraser Stroke"),
                }
            }
            Gesture::Shape { layer_id, kind, start, .. } => self.finish_shape(canvas, layer_id, kind, start, p),
            Gesture::Move { layer_id, start, origin } => {
                let Some(layer) = canvas.layer_mut(layer_id) else { return GestureOutcome::Idle };
                layer.placement = Placement {
                    x: origin.x + (p.x - start.x),
                    y: origin.y + (p.y - start.y),
                    ..origin
                };
                if layer.placement == origin {
                    return GestureOutcome::Idle;
                }
                layer.dirty = true;
                GestureOutcome::Edited("Move Layer")
            }
            Gesture::TransformDrag { handle, start } => {
                if let Some(session) = self.transform.as_mut() {
                    session.drag(handle, p - start);
                    session.end_drag();
                }
                GestureOutcome::InProgress
            }
        }
    }

    // ------------------------------------------------------------------
    //  Transform session
    // ------------------------------------------------------------------

    /// Resample the open session into its layer. `Idle` without a session.
    pub fn commit_transform(&mut self, canvas: &mut CanvasState) -> GestureOutcome {
        let Some(session) = self.transform.take() else { return GestureOutcome::Idle };
        if matches!(self.gesture, Gesture::TransformDrag { .. }) {
            self.gesture = Gesture::None;
        }
        match canvas.layer_mut(session.layer_id) {
            Some(layer) if layer.is_writable() => {
                session.commit(layer, self.interpolation);
                GestureOutcome::Edited("Transform")
            }
            _ => {
                log_warn!("Transform commit rejected: layer {} is not writable", session.layer_id);
                session.cancel();
                GestureOutcome::Rejected
            }
        }
    }

    /// Drop the open session, if any. The layer was never modified.
    pub fn cancel_transform(&mut self) -> bool {
        if matches!(self.gesture, Gesture::TransformDrag { .. }) {
            self.gesture = Gesture::None;
        }
        match self.transform.take() {
            Some(session) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    fn begin_transform_drag(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        if self.transform.is_none() {
            let Some(layer) = writable_active(canvas) else { return self.reject("transform") };
            self.transform = Some(TransformSession::activate(layer, self.min_transform_size, self.handle_size));
            log_info!("Transform session opened on layer {}", layer.id);
        }
        let Some(session) = self.transform.as_mut() else { return GestureOutcome::Idle };
        match session.hit_test(p) {
            Some(handle) => {
                session.begin_drag();
                self.gesture = Gesture::TransformDrag { handle, start: p };
                GestureOutcome::InProgress
            }
            None => GestureOutcome::Idle,
        }
    }

    // ------------------------------------------------------------------
    //  Single-click tools
    // ------------------------------------------------------------------

    fn magic_wand(&mut self, canvas: &CanvasState, p: Pos2) -> GestureOutcome {
        self.gesture = Gesture::Consumed;
        // Locked layers are still readable
        let Some(layer) = canvas.active_layer() else { return self.reject("magic wand") };
        match self.selection.magic_wand(layer, p, self.properties.wand_tolerance) {
            WandResult::Selected { pixel_count } => {
                log_info!("Magic wand selected {} pixels", pixel_count);
                GestureOutcome::SelectionChanged
            }
            WandResult::NothingSelected => GestureOutcome::NothingSelected,
        }
    }

    fn eyedropper(&mut self, canvas: &CanvasState, p: Pos2) -> GestureOutcome {
        self.gesture = Gesture::Consumed;
        let Some(layer) = canvas.active_layer() else { return GestureOutcome::Rejected };
        let color = layer.sample_canvas_point(p);
        self.properties.color = color;
        GestureOutcome::ColorSampled(color)
    }

    fn paint_bucket(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        self.gesture = Gesture::Consumed;
        let Some(layer) = writable_active_mut(canvas) else { return self.reject("fill") };
        let lp = to_layer_space(layer, p);
        if lp.x < 0.0 || lp.y < 0.0 {
            return GestureOutcome::Idle;
        }
        let clip = self.selection.layer_mask(layer);
        let written = fill::paint_bucket(
            &mut layer.pixels,
            (lp.x.floor() as u32, lp.y.floor() as u32),
            self.properties.color,
            self.properties.fill_epsilon,
            clip.as_ref(),
        );
        if written == 0 {
            return GestureOutcome::Idle;
        }
        layer.dirty = true;
        GestureOutcome::Edited("Fill")
    }

    /// Stamp `properties.text` with its top-left corner at `p`.
    pub fn stamp_text(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        self.gesture = Gesture::Consumed;
        if self.properties.text.is_empty() {
            return GestureOutcome::Idle;
        }
        if writable_active(canvas).is_none() {
            return self.reject("text");
        }
        let Some(font) = self.font() else {
            log_warn!("Text tool has no usable font");
            return GestureOutcome::Rejected;
        };
        let Some(layer) = writable_active_mut(canvas) else { return GestureOutcome::Rejected };

        let (w, h) = (layer.pixels.width(), layer.pixels.height());
        let mut coverage = CoverageMask::new(w, h);
        let size = self.properties.size * 2.0;
        if !text::rasterize_text(&mut coverage, &font, &self.properties.text, size, to_layer_space(layer, p)) {
            return GestureOutcome::Idle;
        }
        let Some(region) = coverage.touched() else { return GestureOutcome::Idle };
        let clip = self.selection.layer_mask(layer);
        let base = layer.pixels.clone();
        let changed = shapes::apply_coverage(
            &base,
            &mut layer.pixels,
            &coverage,
            region,
            self.properties.color,
            self.properties.opacity,
            PaintMode::Paint,
            clip.as_ref(),
        );
        if changed == 0 {
            return GestureOutcome::Idle;
        }
        layer.dirty = true;
        GestureOutcome::Edited("Text")
    }

    // ------------------------------------------------------------------
    //  Drag tools
    // ------------------------------------------------------------------

    fn begin_stroke(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        let mode = if self.tool == Tool::Eraser { PaintMode::Erase } else { PaintMode::Paint };
        let Some(layer) = writable_active_mut(canvas) else {
            self.gesture = Gesture::Consumed;
            return self.reject(self.tool.label());
        };
        let (w, h) = (layer.pixels.width(), layer.pixels.height());
        let lp = to_layer_space(layer, p);
        let base = layer.pixels.clone();
        let clip = self.selection.layer_mask(layer);
        let mut coverage = CoverageMask::new(w, h);
        let size = self.properties.size;
        shapes::stamp_dab(&mut coverage, lp, size, self.properties.style, &mut self.spray_seed);
        let mut changed = false;
        if let Some(region) = coverage.touched() {
            changed = shapes::apply_coverage(
                &base,
                &mut layer.pixels,
                &coverage,
                region,
                self.properties.color,
                self.properties.opacity,
                mode,
                clip.as_ref(),
            ) > 0;
        }
        self.gesture = Gesture::Stroke(Stroke {
            layer_id: layer.id,
            base,
            coverage,
            clip,
            last: lp,
            mode,
            changed,
        });
        GestureOutcome::InProgress
    }

    fn begin_shape(&mut self, canvas: &mut CanvasState, p: Pos2, kind: ShapeKind) -> GestureOutcome {
        let Some(layer) = writable_active(canvas) else {
            self.gesture = Gesture::Consumed;
            return self.reject(self.tool.label());
        };
        self.gesture = Gesture::Shape { layer_id: layer.id, kind, start: p, current: p };
        GestureOutcome::InProgress
    }

    fn finish_shape(
        &mut self,
        canvas: &mut CanvasState,
        layer_id: LayerId,
        kind: ShapeKind,
        start: Pos2,
        end: Pos2,
    ) -> GestureOutcome {
        let Some(layer) = canvas.layer_mut(layer_id).filter(|l| l.is_writable()) else {
            return self.reject("shape");
        };
        let (w, h) = (layer.pixels.width(), layer.pixels.height());
        let a = to_layer_space(layer, start);
        let b = to_layer_space(layer, end);
        let width = self.properties.size;
        let mut coverage = CoverageMask::new(w, h);
        let description = match kind {
            ShapeKind::Line => {
                shapes::stroke_line(&mut coverage, a, b, width);
                "Line"
            }
            ShapeKind::Rect => {
                shapes::stroke_rect(&mut coverage, Rect::from_two_pos(a, b), width);
                "Rectangle"
            }
            ShapeKind::Ellipse => {
                shapes::stroke_ellipse(&mut coverage, Rect::from_two_pos(a, b), width);
                "Ellipse"
            }
        };
        let Some(region) = coverage.touched() else { return GestureOutcome::Idle };
        let clip = self.selection.layer_mask(layer);
        let base = layer.pixels.clone();
        let changed = shapes::apply_coverage(
            &base,
            &mut layer.pixels,
            &coverage,
            region,
            self.properties.color,
            self.properties.opacity,
            PaintMode::Paint,
            clip.as_ref(),
        );
        if changed == 0 {
            return GestureOutcome::Idle;
        }
        layer.dirty = true;
        GestureOutcome::Edited(description)
    }

    fn begin_move(&mut self, canvas: &mut CanvasState, p: Pos2) -> GestureOutcome {
        let Some(layer) = writable_active(canvas) else {
            self.gesture = Gesture::Consumed;
            return self.reject("move");
        };
        self.gesture = Gesture::Move { layer_id: layer.id, start: p, origin: layer.placement };
        GestureOutcome::InProgress
    }

    // ------------------------------------------------------------------
    //  Helpers
    // ------------------------------------------------------------------

    /// Abandon a running gesture. A half-finished stroke is rolled back to
    /// its base pixels and a move to its starting placement.
    pub fn abort_gesture_on(&mut self, canvas: &mut CanvasState) {
        match std::mem::take(&mut self.gesture) {
            Gesture::Stroke(stroke) => {
                if let Some(layer) = canvas.layer_mut(stroke.layer_id) {
                    layer.pixels = stroke.base;
                }
            }
            Gesture::Move { layer_id, origin, .. } => {
                if let Some(layer) = canvas.layer_mut(layer_id) {
                    layer.placement = origin;
                }
            }
            Gesture::Selecting => self.selection.cancel_drag(),
            Gesture::TransformDrag { .. } => {
                if let Some(session) = self.transform.as_mut() {
                    session.end_drag();
                }
            }
            Gesture::None | Gesture::Consumed | Gesture::Shape { .. } => {}
        }
    }

    fn font(&mut self) -> Option<FontArc> {
        if !self.font_looked_up {
            self.font_looked_up = true;
            self.font = text::load_system_font(&self.font_family);
        }
        self.font.clone()
    }

    fn reject(&self, what: &str) -> GestureOutcome {
        log_warn!("{} rejected: active layer is missing, hidden or locked", what);
        GestureOutcome::Rejected
    }
}

fn writable_active(canvas: &CanvasState) -> Option<&Layer> {
    canvas.active_layer().filter(|l| l.is_writable())
}

fn writable_active_mut(canvas: &mut CanvasState) -> Option<&mut Layer> {
    canvas.active_layer_mut().filter(|l| l.is_writable())
}

fn to_layer_space(layer: &Layer, p: Pos2) -> Pos2 {
    layer
        .placement
        .to_layer_space(p, layer.pixels.width(), layer.pixels.height())
}
