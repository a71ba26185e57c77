// ============================================================================
// LINE ART: split a drawing into dark line work and everything else
// ============================================================================

use image::{Rgba, RgbaImage};

use crate::canvas::{PixelBuffer, TRANSPARENT};

/// Brightness (0-255) below which a pixel counts as line work.
pub const DEFAULT_LINE_THRESHOLD: u8 = 200;
/// Fraction of the threshold just under it that fades out instead of cutting.
const EDGE_BAND: f32 = 0.15;

/// The two halves of a split. Compositing `lines` over `fill` covers the
/// same pixels as the source.
#[derive(Clone, Debug)]
pub struct LineSplit {
    /// Black strokes; alpha carries the line strength
    pub lines: RgbaImage,
    /// Source colors with the line alpha taken out
    pub fill: RgbaImage,
    pub line_pixels: usize,
}

/// Perceived brightness, ITU-R 601 luma weights.
pub fn brightness(px: Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// Line alpha for one pixel. Solid below the edge band, a linear fade across
/// it, zero at or above the threshold.
pub fn line_alpha(px: Rgba<u8>, threshold: u8) -> u8 {
    let a = px[3];
    let t = threshold as f32;
    let b = brightness(px);
    if a == 0 || b >= t {
        return 0;
    }
    let band = t * EDGE_BAND;
    let core = t - band;
    if b < core {
        return a;
    }
    ((t - b) / band * a as f32).round().clamp(0.0, a as f32) as u8
}

/// Separate `src` into a line image and a fill image of the same size.
pub fn separate_line_and_fill(src: &PixelBuffer, threshold: u8) -> LineSplit {
    let (w, h) = (src.width(), src.height());
    let mut lines = RgbaImage::new(w, h);
    let mut fill = RgbaImage::new(w, h);
    let mut line_pixels = 0;

    for (x, y, px) in src.image().enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        let la = line_alpha(*px, threshold);
        if la > 0 {
            lines.put_pixel(x, y, Rgba([0, 0, 0, la]));
            line_pixels += 1;
        }
        let rest = px[3] - la;
        fill.put_pixel(x, y, if rest == 0 { TRANSPARENT } else { Rgba([px[0], px[1], px[2], rest]) });
    }

    LineSplit { lines, fill, line_pixels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(v: u8) -> Rgba<u8> {
        Rgba([v, v, v, 255])
    }

    #[test]
    fn alpha_is_solid_faded_or_absent() {
        assert_eq!(line_alpha(gray(0), 200), 255);
        assert_eq!(line_alpha(gray(169), 200), 255);
        // Edge band runs 170..200; 190 sits a third of the way in from the top
        assert_eq!(line_alpha(gray(190), 200), 85);
        assert_eq!(line_alpha(gray(200), 200), 0);
        assert_eq!(line_alpha(gray(255), 200), 0);
        assert_eq!(line_alpha(Rgba([0, 0, 0, 100]), 200), 100);
        assert_eq!(line_alpha(Rgba([0, 0, 0, 0]), 200), 0);
        // Nothing is darker than zero
        assert_eq!(line_alpha(gray(0), 0), 0);
    }

    #[test]
    fn split_partitions_the_source() {
        let mut src = PixelBuffer::new(4, 1);
        src.put_pixel(0, 0, gray(10));
        src.put_pixel(1, 0, gray(190));
        src.put_pixel(2, 0, Rgba([250, 240, 10, 255]));

        let split = separate_line_and_fill(&src, DEFAULT_LINE_THRESHOLD);
        assert_eq!(split.line_pixels, 2);

        assert_eq!(split.lines.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(split.fill.get_pixel(0, 0), &TRANSPARENT);

        assert_eq!(split.lines.get_pixel(1, 0), &Rgba([0, 0, 0, 85]));
        assert_eq!(split.fill.get_pixel(1, 0), &Rgba([190, 190, 190, 170]));

        // Yellow is bright enough to stay entirely in the fill
        assert_eq!(split.lines.get_pixel(2, 0)[3], 0);
        assert_eq!(split.fill.get_pixel(2, 0), &Rgba([250, 240, 10, 255]));

        assert_eq!(split.lines.get_pixel(3, 0), &TRANSPARENT);
        assert_eq!(split.fill.get_pixel(3, 0), &TRANSPARENT);
    }
}
