use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::{flatten, CanvasState, Layer, LayerId, PixelBuffer, Placement};
use crate::components::layers::{Group, GroupId};
use crate::ops::transform::Interpolation;
use crate::project::EditorSession;
use crate::settings::EditorSettings;

// ============================================================================
// SESSION BOOTSTRAP
// ============================================================================

/// One externally owned image that becomes a layer.
#[derive(Clone, Debug)]
pub struct SceneRecord {
    pub external_id: String,
    pub display_title: String,
    pub source_image: RgbaImage,
}

/// Scale `src` to fit inside `width`x`height` keeping its aspect ratio and
/// centre it on a transparent canvas.
pub fn fit_and_centre(src: &RgbaImage, width: u32, height: u32, interp: Interpolation) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    if src.width() == 0 || src.height() == 0 || width == 0 || height == 0 {
        return out;
    }
    let scale = (width as f32 / src.width() as f32).min(height as f32 / src.height() as f32);
    let w = ((src.width() as f32 * scale).round() as u32).clamp(1, width);
    let h = ((src.height() as f32 * scale).round() as u32).clamp(1, height);
    let scaled = if (w, h) == src.dimensions() {
        src.clone()
    } else {
        image::imageops::resize(src, w, h, interp.to_filter())
    };
    let x = (width - w) / 2;
    let y = (height - h) / 2;
    image::imageops::replace(&mut out, &scaled, x as i64, y as i64);
    out
}

/// Build a fresh session with one clean layer per record, bottom first.
///
/// Layers are grouped in batches of `settings.bootstrap_batch`. The first
/// group is visible and expanded, the rest hidden and collapsed. The first
/// layer is active and the history baseline is the bootstrapped stack.
pub fn bootstrap_session(
    width: u32,
    height: u32,
    records: &[SceneRecord],
    settings: EditorSettings,
) -> EditorSession {
    let batch = settings.bootstrap_batch.max(1);
    let interp = settings.interpolation;
    let mut session = EditorSession::new(width, height, settings);
    let canvas = &mut session.canvas;

    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        let fitted = fit_and_centre(&record.source_image, width, height, interp);
        let id = canvas.add_layer(
            Some(&fitted),
            Some(&record.display_title),
            None,
            Some(record.external_id.clone()),
        );
        if let Some(layer) = canvas.layer_mut(id) {
            layer.dirty = false;
        }
        ids.push(id);
    }

    for (i, chunk) in ids.chunks(batch).enumerate() {
        let start = i * batch + 1;
        let end = start + chunk.len() - 1;
        let name = format!("Group {} ({}-{})", i + 1, start, end);
        if let Some(gid) = canvas.create_group(&name, chunk) {
            canvas.set_group_visible(gid, i == 0);
            canvas.set_group_collapsed(gid, i != 0);
        }
    }

    if let Some(first) = ids.first() {
        canvas.set_active(*first);
    }
    session.reset_history();
    log_info!(
        "Bootstrapped {} layers into {} groups ({}x{})",
        ids.len(),
        session.canvas.groups.len(),
        width,
        height
    );
    session
}

// ============================================================================
// EXPORT: per-scene flatten with a dirty-flag handshake
// ============================================================================

/// Error type for export operations
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Image(ImageError),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<ImageError> for ExportError {
    fn from(e: ImageError) -> Self {
        ExportError::Image(e)
    }
}

/// One flattened scene ready to hand to persistence.
#[derive(Clone, Debug)]
pub struct ExportItem {
    pub external_id: String,
    pub image: RgbaImage,
    /// Name of the partition's bottom-most layer
    pub display_name: String,
    layer_ids: Vec<LayerId>,
}

impl ExportItem {
    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layer_ids
    }
}

/// Partition layers by scene ref and flatten every partition that has a
/// dirty layer and at least one visible layer. Partitions come out in order
/// of their first layer in the stack. Nothing is mutated.
pub fn prepare_export(canvas: &CanvasState) -> Vec<ExportItem> {
    let mut partitions: Vec<(&str, Vec<&Layer>)> = Vec::new();
    for layer in &canvas.layers {
        let Some(scene) = layer.origin_scene_ref.as_deref() else { continue };
        match partitions.iter_mut().find(|(s, _)| *s == scene) {
            Some((_, members)) => members.push(layer),
            None => partitions.push((scene, vec![layer])),
        }
    }

    let mut items = Vec::new();
    for (scene, members) in partitions {
        if !members.iter().any(|l| l.dirty) {
            continue;
        }
        if !members.iter().any(|l| l.visible) {
            log_warn!("Scene {} has no visible layers, skipping", scene);
            continue;
        }
        let image = flatten(
            canvas.width,
            canvas.height,
            members.iter().copied().filter(|l| l.visible),
        );
        items.push(ExportItem {
            external_id: scene.to_string(),
            image,
            display_name: members[0].name.clone(),
            layer_ids: members.iter().map(|l| l.id).collect(),
        });
    }
    items
}

/// Persistence succeeded: clear dirty on every layer of the exported items.
pub fn confirm_export(canvas: &mut CanvasState, items: &[ExportItem]) {
    for item in items {
        for id in &item.layer_ids {
            if let Some(layer) = canvas.layer_mut(*id) {
                layer.dirty = false;
            }
        }
    }
    log_info!("Export confirmed for {} scenes", items.len());
}

/// Prepare, hand each item to `sink`, and confirm only if every item went
/// through. Returns the number of exported scenes.
pub fn export_with<F>(session: &mut EditorSession, mut sink: F) -> Result<usize, ExportError>
where
    F: FnMut(&ExportItem) -> std::io::Result<()>,
{
    let items = prepare_export(&session.canvas);
    for item in &items {
        if let Err(e) = sink(item) {
            log_err!("Export of scene {} failed: {}", item.external_id, e);
            return Err(e.into());
        }
    }
    confirm_export(&mut session.canvas, &items);
    Ok(items.len())
}

/// Write each dirty scene to `dir/<external_id>.png`.
pub fn write_exports(session: &mut EditorSession, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let items = prepare_export(&session.canvas);
    let mut written = Vec::with_capacity(items.len());
    for item in &items {
        let path = dir.join(format!("{}.png", file_stem_for(&item.external_id)));
        if let Err(e) = item.image.save_with_format(&path, image::ImageFormat::Png) {
            log_err!("Export of scene {} to {} failed: {}", item.external_id, path.display(), e);
            return Err(e.into());
        }
        written.push(path);
    }
    confirm_export(&mut session.canvas, &items);
    log_info!("Wrote {} scenes to {}", written.len(), dir.display());
    Ok(written)
}

/// Replace path-hostile characters in an external id.
fn file_stem_for(external_id: &str) -> String {
    external_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// RECOVERY FILE: crash-recovery snapshot, no versioning guarantee
// ============================================================================

const RECOVERY_MAGIC: &str = "SPR1";
/// Maximum canvas dimension accepted from a recovery file (per axis).
const MAX_CANVAS_DIM: u32 = 32_768;
/// Maximum number of layers accepted from a recovery file.
const MAX_LAYERS: usize = 256;

#[derive(Serialize, Deserialize)]
struct RecoveryFile {
    magic: String,
    width: u32,
    height: u32,
    /// Unix seconds at save time
    timestamp: u64,
    active_layer: Option<LayerId>,
    next_layer_id: LayerId,
    layers: Vec<RecoveredLayer>,
    groups: Vec<RecoveredGroup>,
}

#[derive(Serialize, Deserialize)]
struct RecoveredLayer {
    id: LayerId,
    name: String,
    visible: bool,
    locked: bool,
    group_id: Option<GroupId>,
    origin_scene_ref: Option<String>,
    dirty: bool,
    placement: Placement,
    /// PNG-encoded raster
    png: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RecoveredGroup {
    id: GroupId,
    name: String,
    members: Vec<LayerId>,
    visible: bool,
    collapsed: bool,
}

/// Error type for recovery file operations
#[derive(Debug)]
pub enum RecoveryError {
    Io(std::io::Error),
    Serialize(String),
    Image(ImageError),
    InvalidFormat(String),
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryError::Io(e) => write!(f, "I/O error: {}", e),
            RecoveryError::Serialize(e) => write!(f, "Serialization error: {}", e),
            RecoveryError::Image(e) => write!(f, "Image error: {}", e),
            RecoveryError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for RecoveryError {}

impl From<std::io::Error> for RecoveryError {
    fn from(e: std::io::Error) -> Self {
        RecoveryError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for RecoveryError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        RecoveryError::Serialize(e.to_string())
    }
}

impl From<ImageError> for RecoveryError {
    fn from(e: ImageError) -> Self {
        RecoveryError::Image(e)
    }
}

/// Returns the platform-specific directory used for recovery files.
///
/// `%APPDATA%\StickerPaint\recovery\`       (Windows)
/// `~/.local/share/StickerPaint/recovery/`  (Linux)
/// `~/Library/Application Support/StickerPaint/recovery/`  (macOS)
pub fn recovery_dir() -> PathBuf {
    crate::logger::data_dir().join("StickerPaint").join("recovery")
}

/// Recovery file path for a session keyed by `key` (a series or document id).
pub fn recovery_path(key: &str) -> PathBuf {
    recovery_dir().join(format!("editor_{}.spr", file_stem_for(key)))
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    PngEncoder::new(Cursor::new(&mut bytes)).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}

/// Write the full layer stack and group list of `session` to `path`.
pub fn save_recovery(session: &EditorSession, path: &Path) -> Result<(), RecoveryError> {
    let canvas = &session.canvas;
    let mut layers = Vec::with_capacity(canvas.layers.len());
    for layer in &canvas.layers {
        layers.push(RecoveredLayer {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            locked: layer.locked,
            group_id: layer.group_id,
            origin_scene_ref: layer.origin_scene_ref.clone(),
            dirty: layer.dirty,
            placement: layer.placement,
            png: encode_png(layer.pixels.image())?,
        });
    }
    let groups = canvas
        .groups
        .iter()
        .map(|g| RecoveredGroup {
            id: g.id,
            name: g.name.clone(),
            members: g.member_layer_ids.clone(),
            visible: g.visible,
            collapsed: g.collapsed,
        })
        .collect();
    let file = RecoveryFile {
        magic: RECOVERY_MAGIC.to_string(),
        width: canvas.width,
        height: canvas.height,
        timestamp: crate::logger::unix_seconds(),
        active_layer: canvas.active_layer,
        next_layer_id: canvas.next_layer_id,
        layers,
        groups,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &file)?;
    log_info!("Saved recovery file {} ({} layers)", path.display(), canvas.layers.len());
    Ok(())
}

/// Rebuild a session from a recovery file. History starts fresh with the
/// recovered stack as its baseline.
pub fn load_recovery(path: &Path, settings: EditorSettings) -> Result<EditorSession, RecoveryError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(RecoveryError::InvalidFormat("File too small".into()));
    }
    // bincode writes a String as an 8-byte length prefix + UTF-8 data
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != RECOVERY_MAGIC {
        return Err(RecoveryError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let file: RecoveryFile = bincode::deserialize(&raw)?;
    if file.width == 0 || file.height == 0 {
        return Err(RecoveryError::InvalidFormat("Canvas dimensions cannot be zero".into()));
    }
    if file.width > MAX_CANVAS_DIM || file.height > MAX_CANVAS_DIM {
        return Err(RecoveryError::InvalidFormat(format!(
            "Canvas size {}x{} exceeds maximum allowed {}x{}",
            file.width, file.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    if file.layers.len() > MAX_LAYERS {
        return Err(RecoveryError::InvalidFormat(format!(
            "Recovery file contains {} layers, which exceeds the maximum of {}",
            file.layers.len(),
            MAX_LAYERS
        )));
    }

    let mut canvas = CanvasState::new(file.width, file.height);
    let mut seen = HashSet::new();
    for rl in file.layers {
        if !seen.insert(rl.id) {
            return Err(RecoveryError::InvalidFormat(format!("Duplicate layer id {}", rl.id)));
        }
        let img = image::load_from_memory_with_format(&rl.png, image::ImageFormat::Png)?.to_rgba8();
        if img.dimensions() != (file.width, file.height) {
            return Err(RecoveryError::InvalidFormat(format!(
                "Layer '{}' is {}x{}, expected {}x{}",
                rl.name,
                img.width(),
                img.height(),
                file.width,
                file.height
            )));
        }
        let mut layer = Layer::new(rl.id, rl.name, file.width, file.height);
        layer.pixels = PixelBuffer::from_image(img);
        layer.visible = rl.visible;
        layer.locked = rl.locked;
        layer.group_id = rl.group_id;
        layer.origin_scene_ref = rl.origin_scene_ref;
        layer.dirty = rl.dirty;
        layer.placement = rl.placement;
        canvas.layers.push(layer);
    }

    for rg in file.groups {
        let members: Vec<LayerId> = rg.members.into_iter().filter(|id| seen.contains(id)).collect();
        if members.is_empty() {
            continue;
        }
        canvas.groups.push(Group {
            id: rg.id,
            name: rg.name,
            member_layer_ids: members,
            visible: rg.visible,
            collapsed: rg.collapsed,
        });
    }
    // Group links on layers must agree with the group list
    for layer in &mut canvas.layers {
        let owner = canvas.groups.iter().find(|g| g.contains(layer.id)).map(|g| g.id);
        layer.group_id = owner;
    }

    canvas.active_layer = file
        .active_layer
        .filter(|id| seen.contains(id))
        .or_else(|| canvas.layers.first().map(|l| l.id));
    let max_id = seen.iter().copied().max().unwrap_or(0);
    canvas.next_layer_id = file.next_layer_id.max(max_id + 1);

    let mut session = EditorSession::new(file.width, file.height, settings);
    session.canvas = canvas;
    session.reset_history();
    log_info!(
        "Loaded recovery file {} ({} layers, saved at {})",
        path.display(),
        session.canvas.layers.len(),
        file.timestamp
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use uuid::Uuid;

    fn record(id: &str, w: u32, h: u32, c: u8) -> SceneRecord {
        SceneRecord {
            external_id: id.to_string(),
            display_title: format!("Scene {}", id),
            source_image: RgbaImage::from_pixel(w, h, Rgba([c, c, c, 255])),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stickerpaint-{}-{}", Uuid::new_v4(), name))
    }

    #[test]
    fn fit_and_centre_letterboxes() {
        let src = RgbaImage::from_pixel(20, 10, Rgba([5, 5, 5, 255]));
        let out = fit_and_centre(&src, 40, 40, Interpolation::Nearest);
        assert_eq!(out.get_pixel(20, 20)[3], 255);
        assert_eq!(out.get_pixel(20, 5)[3], 0);
        assert_eq!(out.get_pixel(0, 10)[3], 255);
        assert_eq!(out.get_pixel(39, 29)[3], 255);
        assert_eq!(out.get_pixel(39, 30)[3], 0);
    }

    #[test]
    fn bootstrap_batches_into_groups() {
        let records: Vec<SceneRecord> = (0..20).map(|i| record(&format!("s{}", i), 8, 8, i as u8)).collect();
        let session = bootstrap_session(8, 8, &records, EditorSettings::default());
        let canvas = &session.canvas;

        assert_eq!(canvas.layers.len(), 20);
        assert_eq!(canvas.groups.len(), 3);
        assert_eq!(canvas.groups[0].name, "Group 1 (1-8)");
        assert_eq!(canvas.groups[2].name, "Group 3 (17-20)");
        assert_eq!(canvas.groups[2].member_layer_ids.len(), 4);
        assert!(canvas.groups[0].visible && !canvas.groups[0].collapsed);
        assert!(!canvas.groups[1].visible && canvas.groups[1].collapsed);

        for (i, layer) in canvas.layers.iter().enumerate() {
            assert_eq!(layer.visible, i < 8);
            assert!(!layer.dirty);
            assert_eq!(layer.origin_scene_ref.as_deref(), Some(format!("s{}", i).as_str()));
        }
        assert_eq!(canvas.active_layer_id(), Some(canvas.layers[0].id));
        assert!(!session.history.can_undo());
        assert!(prepare_export(canvas).is_empty());
    }

    #[test]
    fn export_partitions_dirty_scenes_only() {
        let records = vec![record("a", 4, 4, 10), record("b", 4, 4, 20)];
        let mut session = bootstrap_session(4, 4, &records, EditorSettings::default());
        let a = session.canvas.layers[0].id;
        session.canvas.set_active(a);
        // Extra layer on scene "a", painted and dirty
        let extra = session.canvas.add_layer(None, Some("ink"), None, Some("a".to_string()));
        {
            let layer = session.canvas.layer_mut(extra).unwrap();
            layer.pixels.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
            layer.dirty = true;
        }

        let items = prepare_export(&session.canvas);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.external_id, "a");
        assert_eq!(item.display_name, "Scene a");
        assert_eq!(item.image.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(item.image.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        assert_eq!(item.layer_ids().len(), 2);
    }

    #[test]
    fn failed_sink_keeps_dirty_flags() {
        let records = vec![record("a", 4, 4, 10)];
        let mut session = bootstrap_session(4, 4, &records, EditorSettings::default());
        let id = session.canvas.layers[0].id;
        session.canvas.layer_mut(id).unwrap().dirty = true;

        let failed = export_with(&mut session, |_| Err(std::io::Error::other("network down")));
        assert!(matches!(failed, Err(ExportError::Io(_))));
        assert!(session.canvas.layer(id).unwrap().dirty);

        let mut seen = Vec::new();
        let ok = export_with(&mut session, |item| {
            seen.push(item.external_id.clone());
            Ok(())
        });
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(seen, vec!["a".to_string()]);
        assert!(!session.canvas.layer(id).unwrap().dirty);
        // Nothing left to export
        assert_eq!(export_with(&mut session, |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn hidden_partition_is_skipped() {
        let records = vec![record("a", 4, 4, 10)];
        let mut session = bootstrap_session(4, 4, &records, EditorSettings::default());
        let id = session.canvas.layers[0].id;
        let layer = session.canvas.layer_mut(id).unwrap();
        layer.dirty = true;
        layer.visible = false;
        assert!(prepare_export(&session.canvas).is_empty());
    }

    #[test]
    fn write_exports_writes_pngs_and_clears_flags() {
        let records = vec![record("scene/1", 4, 4, 30)];
        let mut session = bootstrap_session(4, 4, &records, EditorSettings::default());
        let id = session.canvas.layers[0].id;
        session.canvas.layer_mut(id).unwrap().dirty = true;

        let dir = temp_path("export");
        let written = write_exports(&mut session, &dir).unwrap();
        assert_eq!(written, vec![dir.join("scene_1.png")]);
        let back = image::open(&written[0]).unwrap().to_rgba8();
        assert_eq!(back.get_pixel(2, 2), &Rgba([30, 30, 30, 255]));
        assert!(!session.canvas.layer(id).unwrap().dirty);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn recovery_round_trip() {
        let records: Vec<SceneRecord> = (0..3).map(|i| record(&format!("s{}", i), 6, 6, 40 * i as u8)).collect();
        let mut settings = EditorSettings::default();
        settings.bootstrap_batch = 2;
        let mut session = bootstrap_session(6, 6, &records, settings.clone());
        let second = session.canvas.layers[1].id;
        session.canvas.set_active(second);
        session.canvas.set_layer_locked(second, true);
        session.canvas.layer_mut(second).unwrap().dirty = true;
        session.canvas.layer_mut(second).unwrap().placement.x = 2.5;

        let path = temp_path("recovery.spr");
        save_recovery(&session, &path).unwrap();
        let restored = load_recovery(&path, settings).unwrap();
        let _ = std::fs::remove_file(&path);

        let (a, b) = (&session.canvas, &restored.canvas);
        assert_eq!(a.layers, b.layers);
        assert_eq!(a.groups, b.groups);
        assert_eq!(b.active_layer_id(), Some(second));
        assert!(!restored.history.can_undo());
        let fresh = restored.canvas.next_layer_id;
        assert!(a.layers.iter().all(|l| l.id < fresh));
    }

    #[test]
    fn recovery_rejects_foreign_files() {
        let path = temp_path("bogus.spr");
        std::fs::write(&path, b"definitely not a recovery file").unwrap();
        let err = load_recovery(&path, EditorSettings::default());
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, Err(RecoveryError::InvalidFormat(_))));

        let missing = load_recovery(&temp_path("missing.spr"), EditorSettings::default());
        assert!(matches!(missing, Err(RecoveryError::Io(_))));
    }
}
