use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use egui::Pos2;

use super::shapes::CoverageMask;

/// Lay out one line of text starting at x=0, baseline at `ascent`.
/// Returns `(glyphs, total_width)`.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor_x, ascent));
        cursor_x += scaled.h_advance(id);
        last = Some(id);
    }
    (glyphs, cursor_x)
}

/// Rasterize `text` into `mask` with its top-left corner at `origin`.
/// Lines split on '\n'. Returns false when nothing was drawn.
pub fn rasterize_text(
    mask: &mut CoverageMask,
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: Pos2,
) -> bool {
    if font_size <= 0.0 {
        return false;
    }
    let line_height = font.as_scaled(font_size).height();
    let mut drawn = false;

    for (line_idx, line) in text.split('\n').enumerate() {
        let (glyphs, _) = layout_line(font, line, font_size);
        let y_off = line_idx as f32 * line_height;
        for (id, gx, gy) in glyphs {
            let glyph = id.with_scale_and_position(
                font_size,
                point(origin.x + gx, origin.y + gy + y_off),
            );
            let Some(outlined) = font.outline_glyph(glyph) else { continue };
            let b = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let x = b.min.x as i64 + px as i64;
                let y = b.min.y as i64 + py as i64;
                if cov > 0.001 {
                    mask.accumulate(x, y, cov);
                    drawn = true;
                }
            });
        }
    }
    drawn
}

/// Load a font by family name from the system, falling back to the generic
/// sans-serif family. `None` when the system has no usable font at all.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let families = [FamilyName::Title(family.to_string()), FamilyName::SansSerif];
    let handle = match source.select_best_match(&families, &Properties::new()) {
        Ok(h) => h,
        Err(e) => {
            log_warn!("No system font for '{}': {}", family, e);
            return None;
        }
    };
    let font = handle.load().ok()?;
    let data = font.copy_font_data()?;
    let bytes: Vec<u8> = (*data).clone();
    match FontArc::try_from_vec(bytes) {
        Ok(f) => Some(f),
        Err(e) => {
            log_warn!("Font '{}' could not be parsed: {}", family, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lands_below_and_right_of_origin() {
        // Machines without any system font skip this test
        let Some(font) = load_system_font("sans-serif") else { return };
        let mut mask = CoverageMask::new(200, 80);
        assert!(rasterize_text(&mut mask, &font, "Hi", 20.0, Pos2::new(30.0, 10.0)));
        let b = mask.touched().unwrap();
        assert!(b.min_x >= 29, "{:?}", b);
        assert!(b.min_y >= 9, "{:?}", b);
        assert!(b.max_y < 10 + 30);
    }

    #[test]
    fn layout_advances_monotonically() {
        let Some(font) = load_system_font("sans-serif") else { return };
        let (glyphs, width) = layout_line(&font, "abc", 16.0);
        assert_eq!(glyphs.len(), 3);
        assert!(glyphs[0].1 < glyphs[1].1 && glyphs[1].1 < glyphs[2].1);
        assert!(width > glyphs[2].1);
        let (none, w0) = layout_line(&font, "", 16.0);
        assert!(none.is_empty() && w0 == 0.0);
    }
}
