use egui::{Key, Modifiers};

use crate::components::tools::{GestureOutcome, Tool};
use crate::project::EditorSession;
use crate::settings::{BindableAction, KeyBindings, KeyCombo};

/// One key event as the host saw it. Printable characters without an
/// `egui::Key` (brackets) arrive through `text`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyPress {
    pub key: Option<Key>,
    pub text: Option<String>,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn key(key: Key) -> Self {
        Self { key: Some(key), text: None, modifiers: Modifiers::NONE }
    }

    pub fn ctrl(key: Key) -> Self {
        Self { key: Some(key), text: None, modifiers: Modifiers::COMMAND }
    }

    pub fn ctrl_shift(key: Key) -> Self {
        Self {
            key: Some(key),
            text: None,
            modifiers: Modifiers { shift: true, ..Modifiers::COMMAND },
        }
    }

    pub fn text(s: &str) -> Self {
        Self { key: None, text: Some(s.to_string()), modifiers: Modifiers::NONE }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Exact modifier match. Ctrl and Cmd are interchangeable.
fn combo_matches(combo: &KeyCombo, press: &KeyPress) -> bool {
    let ctrl = press.modifiers.command || press.modifiers.ctrl;
    if combo.ctrl != ctrl || combo.shift != press.modifiers.shift || combo.alt != press.modifiers.alt {
        return false;
    }
    match (&combo.key, &combo.text_char) {
        (Some(k), _) => press.key == Some(*k),
        (None, Some(t)) => press.text.as_deref() == Some(t.as_str()),
        (None, None) => false,
    }
}

/// The first action (in display order) bound to `press`.
pub fn resolve(bindings: &KeyBindings, press: &KeyPress) -> Option<BindableAction> {
    BindableAction::all()
        .iter()
        .copied()
        .find(|action| bindings.get(*action).iter().any(|combo| combo_matches(combo, press)))
}

fn tool_for(action: BindableAction) -> Option<Tool> {
    use BindableAction::*;
    Some(match action {
        ToolBrush => Tool::Brush,
        ToolEraser => Tool::Eraser,
        ToolFill => Tool::PaintBucket,
        ToolEyedropper => Tool::Eyedropper,
        ToolText => Tool::Text,
        ToolLasso => Tool::Lasso,
        ToolMagicWand => Tool::MagicWand,
        ToolMove => Tool::Move,
        ToolLine => Tool::Line,
        ToolRectSelect => Tool::RectSelect,
        ToolEllipseSelect => Tool::EllipseSelect,
        ToolRectShape => Tool::RectShape,
        ToolEllipseShape => Tool::EllipseShape,
        ToolTransform => Tool::Transform,
        _ => return None,
    })
}

impl EditorSession {
    /// Run the action bound to `press`. The host only calls this while the
    /// editor has keyboard focus. Returns the action that fired.
    pub fn handle_key(&mut self, press: &KeyPress) -> Option<BindableAction> {
        let action = resolve(&self.settings.keybindings, press)?;
        match action {
            BindableAction::Undo => {
                self.undo();
            }
            BindableAction::Redo => {
                self.redo();
            }
            BindableAction::Copy => {
                self.copy();
            }
            BindableAction::Paste => {
                self.paste();
            }
            BindableAction::Group => {
                self.group_selected();
            }
            BindableAction::Ungroup => {
                self.ungroup_active();
            }
            BindableAction::Deselect => self.deselect(),
            BindableAction::DeleteSelection => {
                self.delete_selection();
            }
            BindableAction::CommitTransform => {
                if self.commit_transform() == GestureOutcome::Idle {
                    return None;
                }
            }
            BindableAction::CancelTransform => {
                if !self.cancel_transform() {
                    // No session open: Escape drops a half-finished gesture
                    self.tools.abort_gesture_on(&mut self.canvas);
                }
            }
            BindableAction::BrushSizeDecrease => {
                self.tools.adjust_brush_size(-1.0);
            }
            BindableAction::BrushSizeIncrease => {
                self.tools.adjust_brush_size(1.0);
            }
            other => {
                let tool = tool_for(other)?;
                self.set_tool(tool);
            }
        }
        log_info!("Shortcut: {:?}", action);
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::LayerId;
    use crate::selection::Selection;
    use crate::settings::EditorSettings;
    use egui::{Pos2, Rect};
    use image::{Rgba, RgbaImage};

    fn session() -> (EditorSession, LayerId) {
        let mut session = EditorSession::new(16, 16, EditorSettings::default());
        let id = session
            .canvas
            .add_layer(Some(&RgbaImage::from_pixel(16, 16, Rgba([9, 9, 9, 255]))), None, None, None);
        session.reset_history();
        (session, id)
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let bindings = KeyBindings::default();
        assert_eq!(resolve(&bindings, &KeyPress::key(Key::G)), Some(BindableAction::ToolFill));
        assert_eq!(resolve(&bindings, &KeyPress::ctrl(Key::G)), Some(BindableAction::Group));
        assert_eq!(resolve(&bindings, &KeyPress::ctrl_shift(Key::G)), Some(BindableAction::Ungroup));
        assert_eq!(resolve(&bindings, &KeyPress::ctrl(Key::D)), Some(BindableAction::Deselect));
        assert_eq!(resolve(&bindings, &KeyPress::key(Key::D)), Some(BindableAction::ToolLine));
        assert_eq!(resolve(&bindings, &KeyPress::ctrl_shift(Key::Z)), Some(BindableAction::Redo));
        assert_eq!(resolve(&bindings, &KeyPress::ctrl(Key::Y)), Some(BindableAction::Redo));
        assert_eq!(resolve(&bindings, &KeyPress::text("]")), Some(BindableAction::BrushSizeIncrease));
        let alt_b = KeyPress::key(Key::B).with_modifiers(Modifiers::ALT);
        assert_eq!(resolve(&bindings, &alt_b), None);
    }

    #[test]
    fn raw_ctrl_counts_as_command() {
        let bindings = KeyBindings::default();
        let press = KeyPress::key(Key::Z).with_modifiers(Modifiers { ctrl: true, ..Modifiers::NONE });
        assert_eq!(resolve(&bindings, &press), Some(BindableAction::Undo));
    }

    #[test]
    fn tool_mnemonics_switch_tools() {
        let (mut s, _) = session();
        for (key, tool) in [
            (Key::B, Tool::Brush),
            (Key::E, Tool::Eraser),
            (Key::G, Tool::PaintBucket),
            (Key::I, Tool::Eyedropper),
            (Key::T, Tool::Text),
            (Key::L, Tool::Lasso),
            (Key::W, Tool::MagicWand),
            (Key::V, Tool::Move),
            (Key::D, Tool::Line),
            (Key::Q, Tool::Transform),
        ] {
            s.handle_key(&KeyPress::key(key));
            assert_eq!(s.tools.tool(), tool);
        }
    }

    #[test]
    fn brackets_adjust_brush_size() {
        let (mut s, _) = session();
        let start = s.tools.properties.size;
        s.handle_key(&KeyPress::text("]"));
        s.handle_key(&KeyPress::text("]"));
        s.handle_key(&KeyPress::text("["));
        assert_eq!(s.tools.properties.size, start + 1.0);
    }

    #[test]
    fn undo_redo_and_delete_through_keys() {
        let (mut s, id) = s_with_selection();
        assert_eq!(s.handle_key(&KeyPress::key(Key::Delete)), Some(BindableAction::DeleteSelection));
        assert_eq!(s.canvas.layer(id).unwrap().pixels.get_pixel(2, 2)[3], 0);
        s.handle_key(&KeyPress::ctrl(Key::Z));
        assert_eq!(s.canvas.layer(id).unwrap().pixels.get_pixel(2, 2)[3], 255);
        s.handle_key(&KeyPress::ctrl(Key::Y));
        assert_eq!(s.canvas.layer(id).unwrap().pixels.get_pixel(2, 2)[3], 0);
    }

    fn s_with_selection() -> (EditorSession, LayerId) {
        let (mut s, id) = session();
        s.tools.selection.set(Selection::Rect(Rect::from_min_max(Pos2::ZERO, Pos2::new(4.0, 4.0))));
        (s, id)
    }

    #[test]
    fn copy_paste_and_deselect_through_keys() {
        let (mut s, _) = s_with_selection();
        s.handle_key(&KeyPress::ctrl(Key::C));
        s.handle_key(&KeyPress::ctrl(Key::D));
        assert!(!s.tools.selection.has_selection());
        s.handle_key(&KeyPress::ctrl(Key::V));
        assert_eq!(s.canvas.layers.len(), 2);
        assert!(s.tools.selection.has_selection());
    }

    #[test]
    fn enter_commits_and_escape_cancels_transform() {
        let (mut s, id) = session();
        s.handle_key(&KeyPress::key(Key::Q));
        assert_eq!(s.handle_key(&KeyPress::key(Key::Enter)), None);

        s.pointer_down(Pos2::new(8.0, 8.0));
        s.pointer_up(Pos2::new(8.0, 8.0));
        assert!(s.tools.transform_session().is_some());
        s.handle_key(&KeyPress::key(Key::Escape));
        assert!(s.tools.transform_session().is_none());
        assert_eq!(s.history.len(), 1);

        s.pointer_down(Pos2::new(8.0, 8.0));
        s.pointer_up(Pos2::new(8.0, 8.0));
        assert_eq!(s.handle_key(&KeyPress::key(Key::Enter)), Some(BindableAction::CommitTransform));
        assert_eq!(s.history.undo_description(), Some("Transform"));
        assert!(s.canvas.layer(id).unwrap().dirty);
    }

    #[test]
    fn escape_rolls_back_running_stroke() {
        let (mut s, id) = session();
        s.tools.properties.color = Rgba([255, 0, 0, 255]);
        s.pointer_down(Pos2::new(8.0, 8.0));
        assert_ne!(s.canvas.layer(id).unwrap().pixels.get_pixel(8, 8), Rgba([9, 9, 9, 255]));
        s.handle_key(&KeyPress::key(Key::Escape));
        assert_eq!(s.canvas.layer(id).unwrap().pixels.get_pixel(8, 8), Rgba([9, 9, 9, 255]));
        assert_eq!(s.pointer_up(Pos2::new(8.0, 8.0)), GestureOutcome::Idle);
    }

    #[test]
    fn remapped_binding_takes_effect() {
        let (mut s, _) = session();
        s.settings.keybindings.set(BindableAction::ToolEraser, vec![KeyCombo::key(Key::X)]);
        assert_eq!(s.handle_key(&KeyPress::key(Key::E)), None);
        s.handle_key(&KeyPress::key(Key::X));
        assert_eq!(s.tools.tool(), Tool::Eraser);
    }
}
