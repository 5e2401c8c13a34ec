//! Caption band geometry.
//!
//! The translucent caption band is painted as a PNG (overlay painter) and its
//! text may instead be revealed by libass (typing subtitles). Both consumers
//! must agree on every pixel, so all shared formulas live here and nowhere
//! else. Products are truncated to integers exactly once, in this module.

use serde::{Deserialize, Serialize};

/// Fixed band proportions derived from font size `s` and canvas width `w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandMetrics {
    pub font_size: u32,
    pub canvas_width: u32,
    /// Vertical gap between display rows.
    pub line_leading: i32,
    pub outer_margin_top: i32,
    pub outer_margin_bottom: i32,
    pub inner_padding_top: i32,
    pub inner_padding_bottom: i32,
    pub horizontal_margin: i32,
    pub corner_radius: i32,
}

impl BandMetrics {
    /// Derive band metrics for a segment.
    ///
    /// `multi_line` switches the leading between the tight single-row value
    /// and the taller multi-row value.
    pub fn new(font_size: u32, canvas_width: u32, multi_line: bool) -> Self {
        let s = f64::from(font_size);
        let leading_factor = if multi_line { 0.42 } else { 0.25 };
        Self {
            font_size,
            canvas_width,
            line_leading: (s * leading_factor) as i32,
            outer_margin_top: ((s * 0.12) as i32).max(6),
            outer_margin_bottom: ((s * 0.35) as i32).max(18),
            inner_padding_top: ((s * 0.45) as i32).max(20),
            inner_padding_bottom: ((s * 0.7) as i32).max(28),
            horizontal_margin: ((f64::from(canvas_width) * 0.018) as i32).max(18),
            corner_radius: ((s * 0.42) as i32).max(18),
        }
    }

    /// Width available for text between the horizontal margins.
    pub fn content_width(&self) -> i32 {
        self.canvas_width as i32 - self.horizontal_margin * 2
    }
}

/// Measured extent of one display row, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBox {
    pub width: u32,
    pub height: u32,
}

/// A fully resolved band layout for one segment.
///
/// Carries the metrics plus the measured row boxes, from which every
/// ordinate the painter or the subtitle positioner needs can be derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPlan {
    pub metrics: BandMetrics,
    pub lines: Vec<LineBox>,
    pub band_height: u32,
}

impl BandPlan {
    /// Lay out the band around the measured rows.
    pub fn compute(metrics: BandMetrics, lines: Vec<LineBox>) -> Self {
        let text_block = Self::text_block_height_of(&metrics, &lines);
        let band_height = (text_block
            + metrics.inner_padding_top
            + metrics.inner_padding_bottom
            + metrics.outer_margin_top
            + metrics.outer_margin_bottom)
            .max(0) as u32;
        Self {
            metrics,
            lines,
            band_height,
        }
    }

    fn text_block_height_of(metrics: &BandMetrics, lines: &[LineBox]) -> i32 {
        let mut height: i32 = lines.iter().map(|l| l.height as i32).sum();
        if lines.len() > 1 {
            height += metrics.line_leading * (lines.len() as i32 - 1);
        }
        height
    }

    /// Summed row heights plus leading.
    pub fn text_block_height(&self) -> i32 {
        Self::text_block_height_of(&self.metrics, &self.lines)
    }

    /// Top edge of the rounded rectangle, relative to the band image.
    pub fn rect_top(&self) -> i32 {
        self.metrics.outer_margin_top
    }

    /// Bottom edge of the rounded rectangle, relative to the band image.
    pub fn rect_bottom(&self) -> i32 {
        self.band_height as i32 - self.metrics.outer_margin_bottom
    }

    /// Baseline-independent top of the first row, relative to the band image.
    ///
    /// Text is centred vertically inside the inner padding; leftover space
    /// is split evenly with the remainder going below.
    pub fn first_line_y(&self) -> i32 {
        let inner_top = self.rect_top() + self.metrics.inner_padding_top;
        let inner_bottom = self.rect_bottom() - self.metrics.inner_padding_bottom;
        let available = (inner_bottom - inner_top).max(0);
        inner_top + ((available - self.text_block_height()) / 2).max(0)
    }

    /// Origin of row `index` relative to the band image, horizontally centred
    /// within the content width.
    pub fn line_origin(&self, index: usize) -> (i32, i32) {
        let mut y = self.first_line_y();
        for line in &self.lines[..index] {
            y += line.height as i32 + self.metrics.line_leading;
        }
        let width = self.lines[index].width as i32;
        let x = self.metrics.horizontal_margin + ((self.metrics.content_width() - width) / 2).max(0);
        (x, y)
    }

    /// Top ordinate of row `index` on the full canvas, given that the band
    /// image is overlaid bottom-anchored (`y = H - h`).
    pub fn line_top_on_canvas(&self, canvas_height: u32, index: usize) -> i32 {
        canvas_height as i32 - self.band_height as i32 + self.line_origin(index).1
    }
}
