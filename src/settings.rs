// ============================================================================
// EDITOR SETTINGS: key=value config file + keybindings
// ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ops::transform::Interpolation;

/// Editor settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Maximum number of history entries (including the baseline)
    pub history_capacity: usize,
    /// Per-channel tolerance for the magic wand (inclusive)
    pub magic_wand_tolerance: u8,
    /// Per-channel RGB epsilon for the paint bucket (strict)
    pub fill_epsilon: u8,
    /// Smallest transform box edge in pixels
    pub min_transform_size: f32,
    /// Side of the square transform handle hotspots
    pub transform_handle_size: f32,
    /// Layers per group when bootstrapping a session
    pub bootstrap_batch: usize,
    pub brush_size: f32,
    pub brush_size_min: f32,
    pub brush_size_max: f32,
    /// Resampling filter used when a transform is committed
    pub interpolation: Interpolation,
    /// Family name handed to the system font lookup for the text tool
    pub font_family: String,

    pub keybindings: KeyBindings,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            magic_wand_tolerance: 30,
            fill_epsilon: 5,
            min_transform_size: 10.0,
            transform_handle_size: 8.0,
            bootstrap_batch: 8,
            brush_size: 10.0,
            brush_size_min: 1.0,
            brush_size_max: 200.0,
            interpolation: Interpolation::Bilinear,
            font_family: "sans-serif".to_string(),
            keybindings: KeyBindings::default(),
        }
    }
}

impl EditorSettings {
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("stickerpaint");
            return Some(config_dir.join("stickerpaint_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(
                PathBuf::from(appdata)
                    .join("StickerPaint")
                    .join("stickerpaint_settings.cfg"),
            );
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("StickerPaint")
                    .join("stickerpaint_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("stickerpaint_settings.cfg")))
        }
    }

    /// Load from the platform config path, falling back to defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit file. A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys and malformed values are skipped.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "history_capacity" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.history_capacity = v.max(2);
                    }
                }
                "magic_wand_tolerance" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.magic_wand_tolerance = v;
                    }
                }
                "fill_epsilon" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.fill_epsilon = v.max(1);
                    }
                }
                "min_transform_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.min_transform_size = v.clamp(1.0, 1000.0);
                    }
                }
                "transform_handle_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.transform_handle_size = v.clamp(2.0, 64.0);
                    }
                }
                "bootstrap_batch" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.bootstrap_batch = v.max(1);
                    }
                }
                "brush_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.brush_size = v;
                    }
                }
                "brush_size_min" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.brush_size_min = v.max(1.0);
                    }
                }
                "brush_size_max" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.brush_size_max = v;
                    }
                }
                "interpolation" => {
                    s.interpolation = match val {
                        "nearest" => Interpolation::Nearest,
                        "bicubic" => Interpolation::Bicubic,
                        "lanczos3" => Interpolation::Lanczos3,
                        _ => Interpolation::Bilinear,
                    };
                }
                "font_family" => {
                    if !val.is_empty() {
                        s.font_family = val.to_string();
                    }
                }
                _ => {
                    if let Some(action_name) = key.strip_prefix("keybind.") {
                        s.keybindings.load_config_line(action_name, val);
                    }
                }
            }
        }
        if s.brush_size_max < s.brush_size_min {
            s.brush_size_max = s.brush_size_min;
        }
        s.brush_size = s.brush_size.clamp(s.brush_size_min, s.brush_size_max);
        s
    }

    /// Serialize into the config file format.
    pub fn to_config_string(&self) -> String {
        let interp = match self.interpolation {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        };
        let mut content = format!(
            "history_capacity={}\n\
             magic_wand_tolerance={}\n\
             fill_epsilon={}\n\
             min_transform_size={}\n\
             transform_handle_size={}\n\
             bootstrap_batch={}\n\
             brush_size={}\n\
             brush_size_min={}\n\
             brush_size_max={}\n\
             interpolation={interp}\n\
             font_family={}\n",
            self.history_capacity,
            self.magic_wand_tolerance,
            self.fill_epsilon,
            self.min_transform_size,
            self.transform_handle_size,
            self.bootstrap_batch,
            self.brush_size,
            self.brush_size_min,
            self.brush_size_max,
            self.font_family,
        );
        for line in self.keybindings.to_config_lines() {
            content.push_str(&line);
            content.push('\n');
        }
        content
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Save to the platform config path. Failures are logged, not returned.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// KEYBINDINGS
// ═══════════════════════════════════════════════════════════════════════════

/// A single key combination (modifier flags + optional key + optional text char)
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCombo {
    /// Ctrl on Windows/Linux, Cmd on macOS
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    /// Named key (letters, Enter, Escape, ...)
    pub key: Option<egui::Key>,
    /// Text character for keys without an `egui::Key`, like `[` and `]`
    pub text_char: Option<String>,
}

impl KeyCombo {
    pub fn key(k: egui::Key) -> Self {
        Self { ctrl: false, shift: false, alt: false, key: Some(k), text_char: None }
    }
    pub fn ctrl_key(k: egui::Key) -> Self {
        Self { ctrl: true, shift: false, alt: false, key: Some(k), text_char: None }
    }
    pub fn ctrl_shift_key(k: egui::Key) -> Self {
        Self { ctrl: true, shift: true, alt: false, key: Some(k), text_char: None }
    }
    pub fn text(s: &str) -> Self {
        Self { ctrl: false, shift: false, alt: false, key: None, text_char: Some(s.to_string()) }
    }

    /// Human-readable display string
    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl { parts.push("Ctrl"); }
        if self.shift { parts.push("Shift"); }
        if self.alt { parts.push("Alt"); }
        if let Some(k) = self.key {
            parts.push(key_name(k));
        } else if let Some(ref t) = self.text_char {
            parts.push(t.as_str());
        }
        parts.join("+")
    }

    pub fn to_config_string(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl { parts.push("ctrl".to_string()); }
        if self.shift { parts.push("shift".to_string()); }
        if self.alt { parts.push("alt".to_string()); }
        if let Some(k) = self.key {
            parts.push(format!("key:{}", key_name(k)));
        } else if let Some(ref t) = self.text_char {
            parts.push(format!("text:{}", t));
        }
        parts.join("+")
    }

    pub fn from_config_string(s: &str) -> Option<Self> {
        let mut combo = Self { ctrl: false, shift: false, alt: false, key: None, text_char: None };
        for part in s.split('+') {
            let part = part.trim();
            match part {
                "ctrl" => combo.ctrl = true,
                "shift" => combo.shift = true,
                "alt" => combo.alt = true,
                _ => {
                    if let Some(name) = part.strip_prefix("key:") {
                        combo.key = parse_key_name(name);
                    } else if let Some(text) = part.strip_prefix("text:") {
                        combo.text_char = Some(text.to_string());
                    }
                }
            }
        }
        if combo.key.is_some() || combo.text_char.is_some() {
            Some(combo)
        } else {
            None
        }
    }
}

/// Every action a key can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindableAction {
    // Edit
    Undo,
    Redo,
    Copy,
    Paste,
    Group,
    Ungroup,
    Deselect,
    DeleteSelection,
    CommitTransform,
    CancelTransform,
    // Brush
    BrushSizeDecrease,
    BrushSizeIncrease,
    // Tools
    ToolBrush,
    ToolEraser,
    ToolFill,
    ToolEyedropper,
    ToolText,
    ToolLasso,
    ToolMagicWand,
    ToolMove,
    ToolLine,
    ToolRectSelect,
    ToolEllipseSelect,
    ToolRectShape,
    ToolEllipseShape,
    ToolTransform,
}

impl BindableAction {
    /// All actions in display order
    pub fn all() -> &'static [BindableAction] {
        use BindableAction::*;
        &[
            Undo, Redo, Copy, Paste, Group, Ungroup, Deselect, DeleteSelection,
            CommitTransform, CancelTransform,
            BrushSizeDecrease, BrushSizeIncrease,
            ToolBrush, ToolEraser, ToolFill, ToolEyedropper, ToolText, ToolLasso,
            ToolMagicWand, ToolMove, ToolLine, ToolRectSelect, ToolEllipseSelect,
            ToolRectShape, ToolEllipseShape, ToolTransform,
        ]
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| format!("{:?}", a) == name)
    }
}

/// Keybinding map. An action may carry several combos (Redo has two).
#[derive(Clone, Debug, PartialEq)]
pub struct KeyBindings {
    pub bindings: HashMap<BindableAction, Vec<KeyCombo>>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use egui::Key;
        use BindableAction::*;
        let mut map = HashMap::new();
        // Edit
        map.insert(Undo,              vec![KeyCombo::ctrl_key(Key::Z)]);
        map.insert(Redo,              vec![KeyCombo::ctrl_shift_key(Key::Z), KeyCombo::ctrl_key(Key::Y)]);
        map.insert(Copy,              vec![KeyCombo::ctrl_key(Key::C)]);
        map.insert(Paste,             vec![KeyCombo::ctrl_key(Key::V)]);
        map.insert(Group,             vec![KeyCombo::ctrl_key(Key::G)]);
        map.insert(Ungroup,           vec![KeyCombo::ctrl_shift_key(Key::G)]);
        map.insert(Deselect,          vec![KeyCombo::ctrl_key(Key::D)]);
        map.insert(DeleteSelection,   vec![KeyCombo::key(Key::Delete), KeyCombo::key(Key::Backspace)]);
        map.insert(CommitTransform,   vec![KeyCombo::key(Key::Enter)]);
        map.insert(CancelTransform,   vec![KeyCombo::key(Key::Escape)]);
        // Brush size
        map.insert(BrushSizeDecrease, vec![KeyCombo::text("[")]);
        map.insert(BrushSizeIncrease, vec![KeyCombo::text("]")]);
        // Tools
        map.insert(ToolBrush,         vec![KeyCombo::key(Key::B)]);
        map.insert(ToolEraser,        vec![KeyCombo::key(Key::E)]);
        map.insert(ToolFill,          vec![KeyCombo::key(Key::G)]);
        map.insert(ToolEyedropper,    vec![KeyCombo::key(Key::I)]);
        map.insert(ToolText,          vec![KeyCombo::key(Key::T)]);
        map.insert(ToolLasso,         vec![KeyCombo::key(Key::L)]);
        map.insert(ToolMagicWand,     vec![KeyCombo::key(Key::W)]);
        map.insert(ToolMove,          vec![KeyCombo::key(Key::V)]);
        map.insert(ToolLine,          vec![KeyCombo::key(Key::D)]);
        map.insert(ToolRectSelect,    vec![KeyCombo::key(Key::M)]);
        map.insert(ToolEllipseSelect, vec![KeyCombo::key(Key::O)]);
        map.insert(ToolRectShape,     vec![KeyCombo::key(Key::U)]);
        map.insert(ToolEllipseShape,  vec![KeyCombo::key(Key::K)]);
        map.insert(ToolTransform,     vec![KeyCombo::key(Key::Q)]);

        Self { bindings: map }
    }
}

impl KeyBindings {
    pub fn get(&self, action: BindableAction) -> &[KeyCombo] {
        self.bindings.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace every combo bound to `action`.
    pub fn set(&mut self, action: BindableAction, combos: Vec<KeyCombo>) {
        self.bindings.insert(action, combos);
    }

    /// One `keybind.<Action>=combo|combo` line per bound action.
    pub fn to_config_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for action in BindableAction::all() {
            if let Some(combos) = self.bindings.get(action)
                && !combos.is_empty()
            {
                let joined: Vec<String> = combos.iter().map(KeyCombo::to_config_string).collect();
                lines.push(format!("keybind.{:?}={}", action, joined.join("|")));
            }
        }
        lines
    }

    /// Load a single keybind line from config. Unparseable combos keep the default.
    pub fn load_config_line(&mut self, action_name: &str, combo_str: &str) {
        let Some(action) = BindableAction::from_name(action_name) else { return };
        let combos: Vec<KeyCombo> = combo_str
            .split('|')
            .filter_map(KeyCombo::from_config_string)
            .collect();
        if !combos.is_empty() {
            self.bindings.insert(action, combos);
        }
    }
}

/// Convert egui::Key to its config/display name
fn key_name(k: egui::Key) -> &'static str {
    match k {
        egui::Key::ArrowDown => "Down",
        egui::Key::ArrowLeft => "Left",
        egui::Key::ArrowRight => "Right",
        egui::Key::ArrowUp => "Up",
        egui::Key::Escape => "Esc",
        egui::Key::Tab => "Tab",
        egui::Key::Backspace => "Backspace",
        egui::Key::Enter => "Enter",
        egui::Key::Space => "Space",
        egui::Key::Insert => "Insert",
        egui::Key::Delete => "Delete",
        egui::Key::Home => "Home",
        egui::Key::End => "End",
        egui::Key::PageUp => "PageUp",
        egui::Key::PageDown => "PageDown",
        egui::Key::Minus => "-",
        egui::Key::PlusEquals => "+",
        egui::Key::Num0 => "0", egui::Key::Num1 => "1", egui::Key::Num2 => "2",
        egui::Key::Num3 => "3", egui::Key::Num4 => "4", egui::Key::Num5 => "5",
        egui::Key::Num6 => "6", egui::Key::Num7 => "7", egui::Key::Num8 => "8",
        egui::Key::Num9 => "9",
        egui::Key::A => "A", egui::Key::B => "B", egui::Key::C => "C",
        egui::Key::D => "D", egui::Key::E => "E", egui::Key::F => "F",
        egui::Key::G => "G", egui::Key::H => "H", egui::Key::I => "I",
        egui::Key::J => "J", egui::Key::K => "K", egui::Key::L => "L",
        egui::Key::M => "M", egui::Key::N => "N", egui::Key::O => "O",
        egui::Key::P => "P", egui::Key::Q => "Q", egui::Key::R => "R",
        egui::Key::S => "S", egui::Key::T => "T", egui::Key::U => "U",
        egui::Key::V => "V", egui::Key::W => "W", egui::Key::X => "X",
        egui::Key::Y => "Y", egui::Key::Z => "Z",
        _ => "?",
    }
}

fn parse_key_name(s: &str) -> Option<egui::Key> {
    match s {
        "Down" => Some(egui::Key::ArrowDown),
        "Left" => Some(egui::Key::ArrowLeft),
        "Right" => Some(egui::Key::ArrowRight),
        "Up" => Some(egui::Key::ArrowUp),
        "Esc" => Some(egui::Key::Escape),
        "Tab" => Some(egui::Key::Tab),
        "Backspace" => Some(egui::Key::Backspace),
        "Enter" => Some(egui::Key::Enter),
        "Space" => Some(egui::Key::Space),
        "Insert" => Some(egui::Key::Insert),
        "Delete" => Some(egui::Key::Delete),
        "Home" => Some(egui::Key::Home),
        "End" => Some(egui::Key::End),
        "PageUp" => Some(egui::Key::PageUp),
        "PageDown" => Some(egui::Key::PageDown),
        "-" => Some(egui::Key::Minus),
        "+" => Some(egui::Key::PlusEquals),
        "0" => Some(egui::Key::Num0), "1" => Some(egui::Key::Num1), "2" => Some(egui::Key::Num2),
        "3" => Some(egui::Key::Num3), "4" => Some(egui::Key::Num4), "5" => Some(egui::Key::Num5),
        "6" => Some(egui::Key::Num6), "7" => Some(egui::Key::Num7), "8" => Some(egui::Key::Num8),
        "9" => Some(egui::Key::Num9),
        "A" => Some(egui::Key::A), "B" => Some(egui::Key::B), "C" => Some(egui::Key::C),
        "D" => Some(egui::Key::D), "E" => Some(egui::Key::E), "F" => Some(egui::Key::F),
        "G" => Some(egui::Key::G), "H" => Some(egui::Key::H), "I" => Some(egui::Key::I),
        "J" => Some(egui::Key::J), "K" => Some(egui::Key::K), "L" => Some(egui::Key::L),
        "M" => Some(egui::Key::M), "N" => Some(egui::Key::N), "O" => Some(egui::Key::O),
        "P" => Some(egui::Key::P), "Q" => Some(egui::Key::Q), "R" => Some(egui::Key::R),
        "S" => Some(egui::Key::S), "T" => Some(egui::Key::T), "U" => Some(egui::Key::U),
        "V" => Some(egui::Key::V), "W" => Some(egui::Key::W), "X" => Some(egui::Key::X),
        "Y" => Some(egui::Key::Y), "Z" => Some(egui::Key::Z),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let s = EditorSettings::default();
        assert_eq!(s.history_capacity, 50);
        assert_eq!(s.magic_wand_tolerance, 30);
        assert_eq!(s.fill_epsilon, 5);
        assert_eq!(s.min_transform_size, 10.0);
        assert_eq!(s.bootstrap_batch, 8);
    }

    #[test]
    fn config_string_round_trips() {
        let mut s = EditorSettings::default();
        s.history_capacity = 12;
        s.magic_wand_tolerance = 0;
        s.interpolation = Interpolation::Nearest;
        s.font_family = "DejaVu Sans".into();
        s.keybindings.set(BindableAction::Undo, vec![KeyCombo::ctrl_key(egui::Key::U)]);

        let parsed = EditorSettings::parse(&s.to_config_string());
        assert_eq!(parsed, s);
    }

    #[test]
    fn corrupt_values_fall_back_to_defaults() {
        let parsed = EditorSettings::parse(
            "history_capacity=lots\nfill_epsilon=-3\nnot a line\nunknown_key=1\nbrush_size=900\n",
        );
        let d = EditorSettings::default();
        assert_eq!(parsed.history_capacity, d.history_capacity);
        assert_eq!(parsed.fill_epsilon, d.fill_epsilon);
        // Clamped into [min, max]
        assert_eq!(parsed.brush_size, 200.0);
    }

    #[test]
    fn key_combo_parsing() {
        let combo = KeyCombo::from_config_string("ctrl+shift+key:Z").unwrap();
        assert_eq!(combo, KeyCombo::ctrl_shift_key(egui::Key::Z));
        assert_eq!(combo.display(), "Ctrl+Shift+Z");
        assert_eq!(KeyCombo::from_config_string("text:]").unwrap(), KeyCombo::text("]"));
        assert!(KeyCombo::from_config_string("ctrl+shift").is_none());
    }

    #[test]
    fn keybind_line_with_alternatives() {
        let mut kb = KeyBindings::default();
        kb.load_config_line("Redo", "ctrl+key:R|alt+key:Y");
        assert_eq!(kb.get(BindableAction::Redo).len(), 2);
        assert!(kb.get(BindableAction::Redo)[1].alt);

        // Garbage keeps the previous binding
        kb.load_config_line("Undo", "nonsense");
        assert_eq!(kb.get(BindableAction::Undo), &[KeyCombo::ctrl_key(egui::Key::Z)]);
        // Unknown action is ignored
        kb.load_config_line("Explode", "key:X");
    }
}
