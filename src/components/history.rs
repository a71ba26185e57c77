use std::collections::VecDeque;

use crate::canvas::{CanvasState, Layer, LayerId};
use crate::components::layers::Group;

// ============================================================================
// CANVAS SNAPSHOT: deep copy of the whole layer stack
// ============================================================================

/// Everything needed to put the stack back exactly: rasters, flags,
/// placement, ids, groups and the active layer.
#[derive(Clone, Debug)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub groups: Vec<Group>,
    pub active_layer: Option<LayerId>,
    pub next_layer_id: LayerId,
}

impl CanvasSnapshot {
    pub fn capture(state: &CanvasState) -> Self {
        Self {
            width: state.width,
            height: state.height,
            layers: state.layers.clone(),
            groups: state.groups.clone(),
            active_layer: state.active_layer,
            next_layer_id: state.next_layer_id,
        }
    }

    /// Replace `state` with this snapshot.
    ///
    /// Dirty flags are not rolled back: a layer whose pixels or placement
    /// change during the restore becomes dirty, an unchanged layer keeps its
    /// current flag, and a layer with no live counterpart keeps the flag it
    /// was captured with.
    pub fn restore_into(&self, state: &mut CanvasState) {
        let mut layers = self.layers.clone();
        for layer in &mut layers {
            if let Some(current) = state.layer(layer.id) {
                let unchanged =
                    current.pixels == layer.pixels && current.placement == layer.placement;
                layer.dirty = if unchanged { current.dirty } else { true };
            }
        }
        state.width = self.width;
        state.height = self.height;
        state.layers = layers;
        state.groups = self.groups.clone();
        state.active_layer = self.active_layer;
        // Ids handed out after this snapshot must stay retired
        state.next_layer_id = state.next_layer_id.max(self.next_layer_id);
    }

    fn memory_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.pixels.memory_bytes() + l.name.len())
            .sum()
    }
}

// ============================================================================
// HISTORY MANAGER: linear snapshot list with a cursor
// ============================================================================

#[derive(Clone, Debug)]
struct HistoryEntry {
    description: String,
    snapshot: CanvasSnapshot,
}

/// Bounded undo/redo over whole-stack snapshots. Entry `cursor` is the state
/// currently on screen; the oldest entry is the baseline.
#[derive(Clone, Debug)]
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    /// `capacity` counts every entry including the baseline; at least 2.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(2),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything and install `state` as the baseline.
    pub fn reset(&mut self, state: &CanvasState) {
        self.entries.clear();
        self.entries.push_back(HistoryEntry {
            description: "Open".to_string(),
            snapshot: CanvasSnapshot::capture(state),
        });
        self.cursor = 0;
    }

    /// Record `state` after a completed change. Anything past the cursor is
    /// discarded; past capacity the oldest entry is evicted.
    pub fn snapshot(&mut self, description: &str, state: &CanvasState) {
        if self.entries.is_empty() {
            self.reset(state);
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(HistoryEntry {
            description: description.to_string(),
            snapshot: CanvasSnapshot::capture(state),
        });
        self.cursor = self.entries.len() - 1;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    /// Step back one entry. Returns the description of the undone change.
    pub fn undo(&mut self, state: &mut CanvasState) -> Option<String> {
        if !self.can_undo() {
            return None;
        }
        let undone = self.entries[self.cursor].description.clone();
        self.cursor -= 1;
        self.entries[self.cursor].snapshot.restore_into(state);
        log_info!("Undo: {}", undone);
        Some(undone)
    }

    /// Step forward one entry. Returns the description of the redone change.
    pub fn redo(&mut self, state: &mut CanvasState) -> Option<String> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        let entry = &self.entries[self.cursor];
        entry.snapshot.restore_into(state);
        log_info!("Redo: {}", entry.description);
        Some(entry.description.clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0 && !self.entries.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            Some(self.entries[self.cursor].description.as_str())
        } else {
            None
        }
    }

    /// Descriptions oldest first.
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.description.as_str()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.entries.iter().map(|e| e.snapshot.memory_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Placement;
    use image::{Rgba, RgbaImage};

    fn paint(state: &mut CanvasState, id: LayerId, x: u32, c: u8) {
        let layer = state.layer_mut(id).unwrap();
        layer.pixels.put_pixel(x, 0, Rgba([c, c, c, 255]));
        layer.dirty = true;
    }

    #[test]
    fn undo_redo_restore_exact_state() {
        let mut state = CanvasState::new(8, 1);
        let id = state.add_layer(None, None, None, None);
        let mut history = HistoryManager::new(50);
        history.reset(&state);

        let mut states = vec![state.layer(id).unwrap().pixels.clone()];
        for i in 0..5 {
            paint(&mut state, id, i, 10 * (i as u8 + 1));
            history.snapshot("Brush", &state);
            states.push(state.layer(id).unwrap().pixels.clone());
        }

        for expected in states.iter().rev().skip(1) {
            assert!(history.undo(&mut state).is_some());
            assert_eq!(&state.layer(id).unwrap().pixels, expected);
        }
        assert!(!history.can_undo());
        assert!(history.undo(&mut state).is_none());

        for expected in states.iter().skip(1) {
            assert!(history.redo(&mut state).is_some());
            assert_eq!(&state.layer(id).unwrap().pixels, expected);
        }
        assert!(!history.can_redo());
    }

    #[test]
    fn new_snapshot_truncates_redo() {
        let mut state = CanvasState::new(4, 1);
        let id = state.add_layer(None, None, None, None);
        let mut history = HistoryManager::new(10);
        history.reset(&state);
        paint(&mut state, id, 0, 1);
        history.snapshot("a", &state);
        paint(&mut state, id, 1, 2);
        history.snapshot("b", &state);
        history.undo(&mut state);
        paint(&mut state, id, 2, 3);
        history.snapshot("c", &state);
        assert!(!history.can_redo());
        assert_eq!(history.descriptions(), vec!["Open", "a", "c"]);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut state = CanvasState::new(2, 1);
        let id = state.add_layer(None, None, None, None);
        let mut history = HistoryManager::new(50);
        history.reset(&state);
        for i in 0..60u32 {
            paint(&mut state, id, i % 2, i as u8);
            history.snapshot(&format!("step {}", i), &state);
        }
        assert_eq!(history.len(), 50);
        let mut undos = 0;
        while history.undo(&mut state).is_some() {
            undos += 1;
        }
        assert_eq!(undos, 49);
        assert_eq!(history.descriptions()[0], "step 10");
    }

    #[test]
    fn structural_undo_restores_deleted_layer_and_group() {
        let mut state = CanvasState::new(2, 2);
        let a = state.add_layer(Some(&RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255]))), None, None, None);
        let b = state.add_layer(None, None, None, None);
        let gid = state.create_group("G", &[a, b]).unwrap();
        let mut history = HistoryManager::default();
        history.reset(&state);

        state.delete_layer(a);
        history.snapshot("Delete layer", &state);
        assert!(state.layer(a).is_none());

        history.undo(&mut state);
        assert_eq!(state.layer(a).unwrap().pixels.get_pixel(0, 0), Rgba([1, 1, 1, 255]));
        assert_eq!(state.group(gid).unwrap().member_layer_ids, vec![a, b]);
        // Restored ids stay unique against future allocations
        let c = state.add_layer(None, None, None, None);
        assert!(c > b);
    }

    #[test]
    fn restore_marks_changed_layers_dirty_only() {
        let mut state = CanvasState::new(2, 1);
        let a = state.add_layer(None, None, None, None);
        let b = state.add_layer(None, None, None, None);
        let mut history = HistoryManager::default();
        history.reset(&state);
        paint(&mut state, a, 0, 9);
        history.snapshot("paint", &state);
        // An export clears every flag
        for layer in &mut state.layers {
            layer.dirty = false;
        }
        history.undo(&mut state);
        assert!(state.layer(a).unwrap().dirty);
        assert!(!state.layer(b).unwrap().dirty);
    }

    #[test]
    fn undo_redo_restore_visibility_and_placement() {
        let mut state = CanvasState::new(4, 4);
        let id = state.add_layer(Some(&RgbaImage::from_pixel(4, 4, Rgba([7, 7, 7, 255]))), None, None, None);
        let mut history = HistoryManager::default();
        history.reset(&state);
        let original = state.layer(id).unwrap().clone();

        state.set_layer_visible(id, false);
        history.snapshot("Hide Layer", &state);
        let moved = Placement { x: 3.0, y: -2.0, rotation: 30.0, scale_x: 1.5, scale_y: 0.5 };
        assert!(state.set_placement(id, moved));
        history.snapshot("Place Layer", &state);

        assert_eq!(history.undo(&mut state).as_deref(), Some("Place Layer"));
        let layer = state.layer(id).unwrap();
        assert!(!layer.visible);
        assert_eq!(layer.placement, original.placement);

        assert_eq!(history.undo(&mut state).as_deref(), Some("Hide Layer"));
        let layer = state.layer(id).unwrap();
        assert!(layer.visible);
        assert_eq!(layer.placement, original.placement);
        assert_eq!(layer.pixels, original.pixels);

        history.redo(&mut state);
        let layer = state.layer(id).unwrap();
        assert!(!layer.visible);
        assert_eq!(layer.placement, original.placement);

        history.redo(&mut state);
        let layer = state.layer(id).unwrap();
        assert!(!layer.visible);
        assert_eq!(layer.placement, moved);
        assert_eq!(layer.pixels, original.pixels);
    }
}
