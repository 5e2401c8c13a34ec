//! Console progress reporting.
//!
//! A single [`RenderBar`] tracks one FFmpeg invocation; when several scenes
//! render in parallel their per-process positions are reduced into one
//! [`ProgressAccumulator`] bar, weighting each scene by its share of the
//! total programme duration.

use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Redraw ceiling; FFmpeg flushes progress every ~500ms, the bar caps
/// rendering at 10 Hz regardless of how fast updates arrive.
const DRAW_RATE_HZ: u8 = 10;

/// An elapsed / total / ETA console bar positioned in centiseconds of
/// rendered output time.
pub struct RenderBar {
    bar: ProgressBar,
    total_cs: u64,
}

impl RenderBar {
    pub fn new(total_seconds: f64, label: impl Into<String>) -> Self {
        let total_cs = (total_seconds.max(0.01) * 100.0).round() as u64;
        let bar = ProgressBar::with_draw_target(
            Some(total_cs),
            ProgressDrawTarget::stderr_with_hz(DRAW_RATE_HZ),
        );
        bar.set_style(
            ProgressStyle::with_template(
                "[{bar:24}] {percent:>3}% | {elapsed_precise} / {duration_precise} | ETA {eta_precise} | {msg}",
            )
            .expect("static template")
            .progress_chars("█·"),
        );
        bar.set_message(label.into());
        Self { bar, total_cs }
    }

    /// Hidden bar for tests and non-interactive runs.
    pub fn hidden(total_seconds: f64) -> Self {
        let total_cs = (total_seconds.max(0.01) * 100.0).round() as u64;
        let bar = ProgressBar::with_draw_target(Some(total_cs), ProgressDrawTarget::hidden());
        Self { bar, total_cs }
    }

    /// Move the bar to an absolute output position in seconds.
    pub fn update(&self, seconds: f64) {
        let cs = (seconds.max(0.0) * 100.0).round() as u64;
        self.bar.set_position(cs.min(self.total_cs));
    }

    /// Swap the step label shown at the end of the line.
    pub fn set_label(&self, label: impl Into<String>) {
        self.bar.set_message(label.into());
    }

    /// Fill the bar and drop to a fresh line.
    pub fn finish(&self) {
        self.bar.set_position(self.total_cs);
        self.bar.finish();
    }

    pub fn position_seconds(&self) -> f64 {
        self.bar.position() as f64 / 100.0
    }
}

/// Reduces per-scene progress reports into one joined bar.
///
/// Every scene worker calls [`report`](Self::report) with its own output
/// position; the bar shows the sum of clamped positions, so the display is
/// monotonic even when scenes complete out of order.
pub struct ProgressAccumulator {
    positions: Mutex<Vec<f64>>,
    durations: Vec<f64>,
    bar: RenderBar,
}

impl ProgressAccumulator {
    pub fn new(durations: Vec<f64>, label: impl Into<String>) -> Arc<Self> {
        let total: f64 = durations.iter().sum();
        Arc::new(Self {
            positions: Mutex::new(vec![0.0; durations.len()]),
            durations,
            bar: RenderBar::new(total, label),
        })
    }

    /// Accumulator that renders nowhere; used by tests.
    pub fn hidden(durations: Vec<f64>) -> Arc<Self> {
        let total: f64 = durations.iter().sum();
        Arc::new(Self {
            positions: Mutex::new(vec![0.0; durations.len()]),
            durations,
            bar: RenderBar::hidden(total),
        })
    }

    /// Record that scene `index` has rendered `seconds` of output.
    pub fn report(&self, index: usize, seconds: f64) {
        let total = {
            let mut positions = self.positions.lock().expect("progress lock");
            if let Some(slot) = positions.get_mut(index) {
                *slot = seconds.clamp(0.0, self.durations[index]);
            }
            positions.iter().sum::<f64>()
        };
        self.bar.update(total);
    }

    /// Mark scene `index` fully rendered.
    pub fn complete_scene(&self, index: usize) {
        if index < self.durations.len() {
            self.report(index, self.durations[index]);
        }
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.bar.set_label(label);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn position_seconds(&self) -> f64 {
        self.bar.position_seconds()
    }
}
