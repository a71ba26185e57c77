// ============================================================================
// EDITOR SESSION: one open document: stack, history, tools, clipboard
// ============================================================================

use egui::Pos2;
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{CanvasState, LayerId, PixelBuffer, Placement};
use crate::components::history::HistoryManager;
use crate::components::layers::GroupId;
use crate::components::tools::{GestureOutcome, Tool, ToolDispatcher};
use crate::ops::clipboard::{self, ClipboardImage};
use crate::ops::line_art;
use crate::settings::EditorSettings;

/// The owner of everything an editing session touches. Every structural
/// change and every `Edited` gesture is followed by a history snapshot here.
pub struct EditorSession {
    pub id: Uuid,
    pub canvas: CanvasState,
    pub history: HistoryManager,
    pub tools: ToolDispatcher,
    pub settings: EditorSettings,
    pub clipboard: Option<ClipboardImage>,
    /// Multi-layer pick used by group and merge
    selected_layers: Vec<LayerId>,
}

impl EditorSession {
    /// An empty session. Call [`EditorSession::reset_history`] once the stack
    /// has been populated.
    pub fn new(width: u32, height: u32, settings: EditorSettings) -> Self {
        let canvas = CanvasState::new(width, height);
        let mut history = HistoryManager::new(settings.history_capacity);
        history.reset(&canvas);
        Self {
            id: Uuid::new_v4(),
            canvas,
            history,
            tools: ToolDispatcher::new(&settings),
            settings,
            clipboard: None,
            selected_layers: Vec::new(),
        }
    }

    /// Install the current stack as the undo baseline.
    pub fn reset_history(&mut self) {
        self.history.reset(&self.canvas);
    }

    fn record(&mut self, description: &str) {
        self.history.snapshot(description, &self.canvas);
    }

    fn after_gesture(&mut self, outcome: GestureOutcome) -> GestureOutcome {
        if let GestureOutcome::Edited(description) = outcome {
            self.record(description);
        }
        outcome
    }

    // ------------------------------------------------------------------
    //  Pointer input
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, p: Pos2) -> GestureOutcome {
        let outcome = self.tools.pointer_down(&mut self.canvas, p);
        self.after_gesture(outcome)
    }

    pub fn pointer_move(&mut self, p: Pos2) -> GestureOutcome {
        let outcome = self.tools.pointer_move(&mut self.canvas, p);
        self.after_gesture(outcome)
    }

    pub fn pointer_up(&mut self, p: Pos2) -> GestureOutcome {
        let outcome = self.tools.pointer_up(&mut self.canvas, p);
        self.after_gesture(outcome)
    }

    /// Ctrl+click: activate the topmost visible layer painted under `p`
    /// and expand its group.
    pub fn select_layer_at(&mut self, p: Pos2) -> Option<LayerId> {
        let id = self.canvas.layer_at_point(p)?;
        self.canvas.set_active(id);
        if let Some(gid) = self.canvas.group_of(id) {
            self.canvas.set_group_collapsed(gid, false);
        }
        Some(id)
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tools.change_tool(&mut self.canvas, tool);
    }

    // ------------------------------------------------------------------
    //  History
    // ------------------------------------------------------------------

    /// Undo one step. An open transform session is cancelled first.
    pub fn undo(&mut self) -> Option<String> {
        self.tools.cancel_transform();
        self.tools.abort_gesture_on(&mut self.canvas);
        let undone = self.history.undo(&mut self.canvas);
        self.prune_selected();
        undone
    }

    pub fn redo(&mut self) -> Option<String> {
        self.tools.cancel_transform();
        self.tools.abort_gesture_on(&mut self.canvas);
        let redone = self.history.redo(&mut self.canvas);
        self.prune_selected();
        redone
    }

    // ------------------------------------------------------------------
    //  Transform
    // ------------------------------------------------------------------

    pub fn commit_transform(&mut self) -> GestureOutcome {
        let outcome = self.tools.commit_transform(&mut self.canvas);
        self.after_gesture(outcome)
    }

    pub fn cancel_transform(&mut self) -> bool {
        self.tools.cancel_transform()
    }

    // ------------------------------------------------------------------
    //  Clipboard
    // ------------------------------------------------------------------

    /// Copy the selected region of the active layer. False without a
    /// selection or active layer.
    pub fn copy(&mut self) -> bool {
        let (Some(layer), Some(selection)) = (self.canvas.active_layer(), self.tools.selection.active()) else {
            return false;
        };
        match clipboard::copy_selection(layer, selection) {
            Some(clip) => {
                self.clipboard = Some(clip);
                true
            }
            None => false,
        }
    }

    /// Paste the clipboard as a new top layer and re-select the pasted area.
    pub fn paste(&mut self) -> Option<LayerId> {
        let clip = self.clipboard.as_ref()?;
        let id = clipboard::paste_as_layer(&mut self.canvas, clip);
        self.tools.selection.set(clip.selection.clone());
        self.record("Paste");
        Some(id)
    }

    /// Clear the selected pixels of the active layer.
    pub fn delete_selection(&mut self) -> GestureOutcome {
        let Some(selection) = self.tools.selection.active() else { return GestureOutcome::Idle };
        let Some(layer) = self.canvas.active_layer_mut() else { return GestureOutcome::Rejected };
        if !layer.is_writable() {
            log_warn!("Delete rejected: layer {} is hidden or locked", layer.id);
            return GestureOutcome::Rejected;
        }
        if clipboard::delete_selected(layer, selection) == 0 {
            return GestureOutcome::Idle;
        }
        self.after_gesture(GestureOutcome::Edited("Delete Selection"))
    }

    pub fn deselect(&mut self) {
        self.tools.selection.clear();
    }

    // ------------------------------------------------------------------
    //  Layer stack
    // ------------------------------------------------------------------

    /// Add a layer above the stack. It gets a fresh scene ref so whatever is
    /// painted on it exports as its own item.
    pub fn add_layer(&mut self, source: Option<&RgbaImage>, name: Option<&str>) -> LayerId {
        let scene_ref = format!("new_scene_{}", Uuid::new_v4());
        let id = self.canvas.add_layer(source, name, None, Some(scene_ref));
        self.record("New Layer");
        id
    }

    pub fn delete_layer(&mut self, id: LayerId) -> bool {
        if self.tools.transform_session().is_some_and(|s| s.layer_id == id) {
            self.tools.cancel_transform();
        }
        if !self.canvas.delete_layer(id) {
            return false;
        }
        self.prune_selected();
        self.record("Delete Layer");
        true
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if !self.canvas.reorder(from, to) {
            return false;
        }
        self.record("Reorder Layers");
        true
    }

    /// Merge the multi-selected layers (or `ids` if given).
    pub fn merge(&mut self, ids: &[LayerId]) -> Option<LayerId> {
        let ids = if ids.is_empty() { self.selected_layers.clone() } else { ids.to_vec() };
        let merged = self.canvas.merge(&ids)?;
        self.selected_layers.clear();
        self.record("Merge Layers");
        Some(merged)
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> bool {
        let changed = self.canvas.layer(id).is_some_and(|l| l.visible != visible);
        if !changed {
            return false;
        }
        self.canvas.set_layer_visible(id, visible);
        self.record(if visible { "Show Layer" } else { "Hide Layer" });
        true
    }

    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) -> bool {
        let changed = self.canvas.layer(id).is_some_and(|l| l.locked != locked);
        if !changed {
            return false;
        }
        self.canvas.set_layer_locked(id, locked);
        self.record(if locked { "Lock Layer" } else { "Unlock Layer" });
        true
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> bool {
        if !self.canvas.rename_layer(id, name) {
            return false;
        }
        self.record("Rename Layer");
        true
    }

    pub fn recolor_layer(&mut self, id: LayerId, color: Rgba<u8>) -> bool {
        if !self.canvas.recolor_layer(id, color) {
            return false;
        }
        self.record("Recolor Layer");
        true
    }

    pub fn set_placement(&mut self, id: LayerId, placement: Placement) -> bool {
        if !self.canvas.set_placement(id, placement) {
            return false;
        }
        self.record("Place Layer");
        true
    }

    /// Pull the active layer's dark line work onto a new layer just above it,
    /// in the same group and at the same placement. The new layer exports as
    /// its own scene. With `strip_source` the source keeps only the fill.
    /// `None` when nothing is darker than `threshold`.
    pub fn extract_line_art(&mut self, threshold: u8, strip_source: bool) -> Option<LayerId> {
        let source = self.canvas.active_layer()?;
        if strip_source && !source.is_writable() {
            log_warn!("Line extraction rejected: layer {} is hidden or locked", source.id);
            return None;
        }
        let split = line_art::separate_line_and_fill(&source.pixels, threshold);
        if split.line_pixels == 0 {
            log_info!("No line work below brightness {} on layer {}", threshold, source.id);
            return None;
        }
        let source_id = source.id;
        let name = format!("{} - Lines", source.name);
        let placement = source.placement;
        let index = self.canvas.index_of(source_id)? + 1;

        if strip_source && let Some(layer) = self.canvas.layer_mut(source_id) {
            layer.pixels = PixelBuffer::from_image(split.fill);
            layer.dirty = true;
        }
        let scene_ref = format!("new_line_{}", Uuid::new_v4());
        let id = self.canvas.add_layer(Some(&split.lines), Some(&name), Some(index), Some(scene_ref));
        if let Some(layer) = self.canvas.layer_mut(id) {
            layer.placement = placement;
        }
        log_info!("Extracted {} line pixels from layer {} into {}", split.line_pixels, source_id, id);
        self.record("Extract Lines");
        Some(id)
    }

    // ------------------------------------------------------------------
    //  Multi-selection and groups
    // ------------------------------------------------------------------

    /// Toggle `id` in the multi-layer pick. Returns whether it is now picked.
    pub fn toggle_layer_selected(&mut self, id: LayerId) -> bool {
        if self.canvas.index_of(id).is_none() {
            return false;
        }
        if let Some(pos) = self.selected_layers.iter().position(|l| *l == id) {
            self.selected_layers.remove(pos);
            false
        } else {
            self.selected_layers.push(id);
            true
        }
    }

    pub fn selected_layers(&self) -> &[LayerId] {
        &self.selected_layers
    }

    /// Group the multi-selected layers. Needs at least two.
    pub fn group_selected(&mut self) -> Option<GroupId> {
        if self.selected_layers.len() < 2 {
            log_warn!("Group needs at least two selected layers");
            return None;
        }
        let name = format!("Group {}", self.canvas.groups.len() + 1);
        let ids = std::mem::take(&mut self.selected_layers);
        let gid = self.canvas.create_group(&name, &ids)?;
        self.record("Group Layers");
        Some(gid)
    }

    /// Dissolve the active layer's group.
    pub fn ungroup_active(&mut self) -> bool {
        let Some(gid) = self.canvas.active_layer_id().and_then(|id| self.canvas.group_of(id)) else {
            return false;
        };
        if !self.canvas.ungroup(gid) {
            return false;
        }
        self.record("Ungroup");
        true
    }

    pub fn set_group_visible(&mut self, gid: GroupId, visible: bool) -> bool {
        if !self.canvas.set_group_visible(gid, visible) {
            return false;
        }
        self.record(if visible { "Show Group" } else { "Hide Group" });
        true
    }

    pub fn toggle_group_collapsed(&mut self, gid: GroupId) -> bool {
        self.canvas.toggle_group_collapsed(gid)
    }

    fn prune_selected(&mut self) {
        let canvas = &self.canvas;
        self.selected_layers.retain(|id| canvas.index_of(*id).is_some());
    }
}
