//! Caption band and opening title painting.
//!
//! Bands are canvas-width PNGs containing a translucent rounded rectangle
//! and (for static overlays) the segment text. The geometry comes from
//! [`lform_models::geometry`] so the ASS positioner lands on the same pixels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle};
use fontdue::Font;
use image::{Rgba, RgbaImage};
use tracing::debug;

use lform_models::{BandMetrics, BandPlan, LineBox, RenderSettings, Rgba as Color, TextSegment};

use crate::error::MediaResult;
use crate::font::ResolvedFont;

/// A painted caption band plus the layout it was painted with.
#[derive(Debug, Clone)]
pub struct BandOverlay {
    pub path: PathBuf,
    pub plan: BandPlan,
}

/// One glyph ready to blit, positioned inside the measured line box.
struct PlacedGlyph {
    x: i32,
    y: i32,
    key: GlyphRasterConfig,
}

/// A measured display row: its tight pixel box and the glyphs inside it.
struct MeasuredLine {
    glyphs: Vec<PlacedGlyph>,
    bbox: LineBox,
}

/// Paints caption bands and opening titles, caching per run directory.
pub struct OverlayPainter {
    canvas_width: u32,
    canvas_height: u32,
    body_size: u32,
    title_size: u32,
    text_color: Color,
    band_color: Color,
    body_font: ResolvedFont,
    title_font: ResolvedFont,
    cache: Mutex<HashMap<String, BandOverlay>>,
    opening_cache: Mutex<HashMap<String, PathBuf>>,
}

impl OverlayPainter {
    pub fn new(settings: &RenderSettings) -> MediaResult<Self> {
        let configured = settings.text.font_path.as_deref();
        let body_font = ResolvedFont::resolve(configured, false)?;
        let title_font = ResolvedFont::resolve(configured, true)?;
        let text_color = settings.text.text_color().unwrap_or(Color {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        });
        let band_color = settings.text.band_color().unwrap_or(Color {
            r: 0,
            g: 0,
            b: 0,
            a: 0xF0,
        });
        Ok(Self {
            canvas_width: settings.video.width,
            canvas_height: settings.video.height,
            body_size: settings.text.default_size,
            title_size: settings.text.opening_title_size,
            text_color,
            band_color,
            body_font,
            title_font,
            cache: Mutex::new(HashMap::new()),
            opening_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn body_font(&self) -> &ResolvedFont {
        &self.body_font
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    /// Lay out a segment without painting; the subtitle builder uses this to
    /// position typing text against the band that will be painted.
    pub fn plan_band(&self, segment: &TextSegment) -> BandPlan {
        let metrics = BandMetrics::new(self.body_size, self.canvas_width, segment.lines.len() > 1);
        let lines = self.measure_lines(&self.body_font, self.body_size, &segment.lines);
        BandPlan::compute(metrics, lines.into_iter().map(|l| l.bbox).collect())
    }

    /// Paint the band PNG for one segment. With `include_text=false` only the
    /// rounded rectangle is painted (typing mode; libass draws the glyphs).
    pub fn paint_band(
        &self,
        overlay_dir: &Path,
        scene_id: &str,
        segment: &TextSegment,
        include_text: bool,
    ) -> MediaResult<BandOverlay> {
        let cache_key = self.band_cache_key(segment, include_text);
        if let Some(hit) = self.cache.lock().expect("overlay cache").get(&cache_key) {
            return Ok(hit.clone());
        }

        let metrics = BandMetrics::new(self.body_size, self.canvas_width, segment.lines.len() > 1);
        let measured = self.measure_lines(&self.body_font, self.body_size, &segment.lines);
        let plan = BandPlan::compute(metrics, measured.iter().map(|l| l.bbox).collect());

        let mut image = RgbaImage::new(self.canvas_width, plan.band_height.max(1));
        fill_rounded_rect(
            &mut image,
            metrics.horizontal_margin,
            plan.rect_top(),
            self.canvas_width as i32 - metrics.horizontal_margin,
            plan.rect_bottom(),
            metrics.corner_radius,
            self.band_color,
        );

        if include_text {
            for (index, line) in measured.iter().enumerate() {
                let (x, y) = plan.line_origin(index);
                blit_line(&mut image, &self.body_font.font, line, x, y, self.text_color);
            }
        }

        let path = overlay_dir.join(format!("{scene_id}_seg{:02}.png", segment.index));
        write_png_atomic(&image, &path)?;
        debug!("Painted band overlay: {}", path.display());

        let overlay = BandOverlay { path, plan };
        self.cache
            .lock()
            .expect("overlay cache")
            .insert(cache_key, overlay.clone());
        Ok(overlay)
    }

    /// Paint the opening title PNG: lines centred on a transparent canvas.
    pub fn paint_opening_title(
        &self,
        overlay_dir: &Path,
        scene_id: &str,
        lines: &[String],
    ) -> MediaResult<PathBuf> {
        let cache_key = format!(
            "opening|{}|{}|{}",
            self.title_font.identity(),
            self.title_size,
            lines.join("\u{1f}")
        );
        if let Some(hit) = self
            .opening_cache
            .lock()
            .expect("overlay cache")
            .get(&cache_key)
        {
            return Ok(hit.clone());
        }

        let measured = self.measure_lines(&self.title_font, self.title_size, lines);
        let spacing = (f64::from(self.title_size) * 0.6) as i32;
        let total_height: i32 = measured.iter().map(|l| l.bbox.height as i32).sum::<i32>()
            + spacing * (measured.len() as i32 - 1).max(0);

        let mut image = RgbaImage::new(self.canvas_width, self.canvas_height);
        let mut y = (self.canvas_height as i32 - total_height) / 2;
        let white = Color {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        };
        for line in &measured {
            let x = (self.canvas_width as i32 - line.bbox.width as i32) / 2;
            blit_line(&mut image, &self.title_font.font, line, x, y, white);
            y += line.bbox.height as i32 + spacing;
        }

        let path = overlay_dir.join(format!("{scene_id}_opening.png"));
        write_png_atomic(&image, &path)?;

        self.opening_cache
            .lock()
            .expect("overlay cache")
            .insert(cache_key, path.clone());
        Ok(path)
    }

    fn band_cache_key(&self, segment: &TextSegment, include_text: bool) -> String {
        format!(
            "band|{}|{}|{}|{:?}|{:?}|{}|{}",
            self.body_font.identity(),
            self.body_size,
            self.canvas_width,
            self.text_color,
            self.band_color,
            include_text,
            segment.lines.join("\u{1f}")
        )
    }

    fn measure_lines(&self, font: &ResolvedFont, px: u32, lines: &[String]) -> Vec<MeasuredLine> {
        lines
            .iter()
            .map(|line| measure_line(&font.font, px as f32, line))
            .collect()
    }
}

/// Lay out one row at origin and record its tight bounding box.
fn measure_line(font: &Font, px: f32, text: &str) -> MeasuredLine {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings::default());
    layout.append(&[font], &TextStyle::new(text, px, 0));

    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    let mut glyphs = Vec::new();

    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let gx = glyph.x.round() as i32;
        let gy = glyph.y.round() as i32;
        min_x = min_x.min(gx);
        min_y = min_y.min(gy);
        max_x = max_x.max(gx + glyph.width as i32);
        max_y = max_y.max(gy + glyph.height as i32);
        glyphs.push(PlacedGlyph {
            x: gx,
            y: gy,
            key: glyph.key,
        });
    }

    if glyphs.is_empty() {
        return MeasuredLine {
            glyphs,
            bbox: LineBox {
                width: 0,
                height: 0,
            },
        };
    }

    // Shift placements so the tight box starts at (0, 0).
    for g in &mut glyphs {
        g.x -= min_x;
        g.y -= min_y;
    }
    MeasuredLine {
        glyphs,
        bbox: LineBox {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    }
}

/// Rasterise and alpha-blend one measured row at `(x, y)`.
fn blit_line(image: &mut RgbaImage, font: &Font, line: &MeasuredLine, x: i32, y: i32, color: Color) {
    for glyph in &line.glyphs {
        let (metrics, coverage) = font.rasterize_config(glyph.key);
        for (i, &cov) in coverage.iter().enumerate() {
            if cov == 0 {
                continue;
            }
            let px = x + glyph.x + (i % metrics.width) as i32;
            let py = y + glyph.y + (i / metrics.width) as i32;
            blend_pixel(image, px, py, color, cov);
        }
    }
}

/// Fill a rounded rectangle spanning `[x0, x1] × [y0, y1]`.
fn fill_rounded_rect(
    image: &mut RgbaImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    radius: i32,
    color: Color,
) {
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let radius = radius.min((x1 - x0) / 2).min((y1 - y0) / 2).max(0);
    let r2 = radius * radius;
    for y in y0.max(0)..=y1.min(image.height() as i32 - 1) {
        for x in x0.max(0)..=x1.min(image.width() as i32 - 1) {
            // Corner circle test only inside the corner squares.
            let cx = if x < x0 + radius {
                Some(x0 + radius)
            } else if x > x1 - radius {
                Some(x1 - radius)
            } else {
                None
            };
            let cy = if y < y0 + radius {
                Some(y0 + radius)
            } else if y > y1 - radius {
                Some(y1 - radius)
            } else {
                None
            };
            if let (Some(cx), Some(cy)) = (cx, cy) {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy > r2 {
                    continue;
                }
            }
            blend_pixel(image, x, y, color, 255);
        }
    }
}

/// Source-over blend of `color` at `coverage` onto the image.
fn blend_pixel(image: &mut RgbaImage, x: i32, y: i32, color: Color, coverage: u8) {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return;
    }
    let src_a = u32::from(color.a) * u32::from(coverage) / 255;
    if src_a == 0 {
        return;
    }
    let dst = image.get_pixel_mut(x as u32, y as u32);
    let dst_a = u32::from(dst[3]);
    let out_a = src_a + dst_a * (255 - src_a) / 255;
    if out_a == 0 {
        return;
    }
    let blend = |s: u8, d: u8| -> u8 {
        let s = u32::from(s) * src_a;
        let d = u32::from(d) * dst_a * (255 - src_a) / 255;
        ((s + d) / out_a) as u8
    };
    *dst = Rgba([
        blend(color.r, dst[0]),
        blend(color.g, dst[1]),
        blend(color.b, dst[2]),
        out_a as u8,
    ]);
}

/// Publish a PNG via exclusive temp-file-then-rename so concurrent painters
/// racing on the same key never observe a half-written file.
fn write_png_atomic(image: &RgbaImage, path: &Path) -> MediaResult<()> {
    static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!(
        "tmp{}-{}",
        std::process::id(),
        SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    ));
    image.save_with_format(&tmp, image::ImageFormat::Png)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(lines: &[&str]) -> TextSegment {
        TextSegment {
            index: 0,
            lines: lines.iter().map(|s| s.to_string()).collect(),
            start_offset: 0.0,
            duration: 3.0,
        }
    }

    fn painter() -> Option<OverlayPainter> {
        OverlayPainter::new(&RenderSettings::default()).ok()
    }

    #[test]
    fn test_rounded_rect_leaves_corners_transparent() {
        let mut img = RgbaImage::new(100, 60);
        let color = Color {
            r: 0,
            g: 0,
            b: 0,
            a: 240,
        };
        fill_rounded_rect(&mut img, 0, 0, 99, 59, 20, color);
        assert_eq!(img.get_pixel(0, 0)[3], 0, "corner must stay transparent");
        assert_eq!(img.get_pixel(50, 30)[3], 240, "centre must be filled");
        assert_eq!(img.get_pixel(50, 0)[3], 240, "top edge midpoint filled");
    }

    #[test]
    fn test_blend_opaque_over_transparent_keeps_color() {
        let mut img = RgbaImage::new(2, 2);
        let red = Color {
            r: 200,
            g: 10,
            b: 10,
            a: 255,
        };
        blend_pixel(&mut img, 0, 0, red, 255);
        let px = img.get_pixel(0, 0);
        assert_eq!((px[0], px[3]), (200, 255));
    }

    #[test]
    fn test_band_plan_matches_paint_height() {
        // Skipped when no system font is installed.
        let Some(painter) = painter() else { return };
        let dir = tempfile::tempdir().unwrap();
        let seg = segment(&["hello world"]);
        let plan = painter.plan_band(&seg);
        let overlay = painter
            .paint_band(dir.path(), "S001", &seg, true)
            .unwrap();
        assert_eq!(plan, overlay.plan);
        let img = image::open(&overlay.path).unwrap().to_rgba8();
        assert_eq!(img.height(), overlay.plan.band_height);
        assert_eq!(img.width(), 1280);
    }

    #[test]
    fn test_typing_band_has_no_glyph_pixels_inside_padding() {
        let Some(painter) = painter() else { return };
        let dir = tempfile::tempdir().unwrap();
        let seg = segment(&["hello"]);
        let with_text = painter.paint_band(dir.path(), "A", &seg, true).unwrap();
        let band_only = painter.paint_band(dir.path(), "B", &seg, false).unwrap();
        let a = image::open(&with_text.path).unwrap().to_rgba8();
        let b = image::open(&band_only.path).unwrap().to_rgba8();
        // The band-only PNG must be strictly "flatter": every pixel equals
        // the band colour or transparent.
        let distinct: std::collections::HashSet<_> =
            b.pixels().map(|p| (p[0], p[1], p[2], p[3])).collect();
        assert!(distinct.len() <= 2, "band-only overlay should be flat");
        assert!(
            a.pixels().map(|p| p[0] as u64).sum::<u64>()
                > b.pixels().map(|p| p[0] as u64).sum::<u64>(),
            "text overlay should add bright glyph pixels"
        );
    }

    #[test]
    fn test_paint_band_reuses_cache() {
        let Some(painter) = painter() else { return };
        let dir = tempfile::tempdir().unwrap();
        let seg = segment(&["cached"]);
        let first = painter.paint_band(dir.path(), "S001", &seg, true).unwrap();
        let second = painter.paint_band(dir.path(), "S001", &seg, true).unwrap();
        assert_eq!(first.path, second.path);
    }
}
