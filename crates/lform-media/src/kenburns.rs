//! Ken-Burns motion planning.
//!
//! `pan_only` slides a canvas-sized crop window across an oversized scaled
//! frame; `zoompan` accumulates zoom per frame with a drifting centre. Both
//! are planned here as pure values so tests can assert the crop rectangle
//! stays inside the scaled frame for every t, then serialised into filter
//! expressions by the graph composer.

use lform_models::{Direction, KenBurnsProfile};

/// Minimum effective zoom amount; zoompan with zero zoom still needs motion.
const ZOOM_EPSILON: f64 = 0.015;

/// A planned constant-scale pan.
#[derive(Debug, Clone, PartialEq)]
pub struct PanPath {
    pub scaled_w: u32,
    pub scaled_h: u32,
    pub canvas_w: u32,
    pub canvas_h: u32,
    pub origin: (f64, f64),
    pub target: (f64, f64),
    pub duration: f64,
}

impl PanPath {
    /// Plan the pan for one scene.
    ///
    /// The base image is pre-scaled to cover the canvas plus the peak margin
    /// so that every crop rectangle along the path stays inside the frame.
    /// When the scene carries an intro relief the peak margin is the relaxed
    /// one, since the scale is fixed for the whole scene.
    pub fn plan(
        profile: &KenBurnsProfile,
        direction: Direction,
        source: (u32, u32),
        canvas: (u32, u32),
        duration: f64,
        intro_relief_seconds: f64,
    ) -> Self {
        let (iw, ih) = (f64::from(source.0.max(1)), f64::from(source.1.max(1)));
        let (cw, ch) = (f64::from(canvas.0), f64::from(canvas.1));

        let cover = (cw / iw).max(ch / ih);
        let margin = effective_margin(profile, intro_relief_seconds);
        let scaled_w = even_ceil(iw * cover * (1.0 + margin)).max(canvas.0);
        let scaled_h = even_ceil(ih * cover * (1.0 + margin)).max(canvas.1);

        let slack_x = f64::from(scaled_w) - cw;
        let slack_y = f64::from(scaled_h) - ch;

        let fraction = if profile.full_travel {
            1.0
        } else {
            (profile.pan_extent * profile.motion_scale).clamp(0.0, 1.0)
        };
        let travel_x = slack_x * fraction * f64::from(direction.dx);
        let travel_y = slack_y * fraction * f64::from(direction.dy);

        let origin = (
            ((slack_x - travel_x) / 2.0).clamp(0.0, slack_x),
            ((slack_y - travel_y) / 2.0).clamp(0.0, slack_y),
        );
        let target = (
            (origin.0 + travel_x).clamp(0.0, slack_x),
            (origin.1 + travel_y).clamp(0.0, slack_y),
        );

        Self {
            scaled_w,
            scaled_h,
            canvas_w: canvas.0,
            canvas_h: canvas.1,
            origin,
            target,
            duration: duration.max(0.01),
        }
    }

    /// Crop origin at time `t`, clamped linear interpolation.
    pub fn position_at(&self, t: f64) -> (f64, f64) {
        let progress = (t / self.duration).clamp(0.0, 1.0);
        let slack_x = f64::from(self.scaled_w) - f64::from(self.canvas_w);
        let slack_y = f64::from(self.scaled_h) - f64::from(self.canvas_h);
        (
            (self.origin.0 + (self.target.0 - self.origin.0) * progress).clamp(0.0, slack_x),
            (self.origin.1 + (self.target.1 - self.origin.1) * progress).clamp(0.0, slack_y),
        )
    }

    pub fn crop_x_expr(&self) -> String {
        pan_expr(
            self.origin.0,
            self.target.0,
            self.duration,
            f64::from(self.scaled_w) - f64::from(self.canvas_w),
        )
    }

    pub fn crop_y_expr(&self) -> String {
        pan_expr(
            self.origin.1,
            self.target.1,
            self.duration,
            f64::from(self.scaled_h) - f64::from(self.canvas_h),
        )
    }
}

/// Margin used for pre-scaling; relaxed while an intro relief is active.
fn effective_margin(profile: &KenBurnsProfile, intro_relief_seconds: f64) -> f64 {
    if intro_relief_seconds > 0.0 {
        (profile.margin * (1.0 + profile.intro_relief)).min(profile.max_margin)
    } else {
        profile.margin
    }
}

fn even_ceil(value: f64) -> u32 {
    let v = value.ceil() as u32;
    v + (v & 1)
}

// Expressions are emitted for single-quoted filter options, where commas
// need no escaping.
fn pan_expr(from: f64, to: f64, duration: f64, slack: f64) -> String {
    if (to - from).abs() < f64::EPSILON {
        return format!("{from:.4}");
    }
    format!(
        "clip({from:.4}+{delta:.4}*min(t/{duration:.4},1),0,{slack:.4})",
        delta = to - from,
    )
}

/// A planned cumulative zoompan.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomPanSpec {
    pub nframes: u32,
    pub zmax: f64,
    pub step: f64,
    pub drift: f64,
    pub direction: Direction,
    pub canvas_w: u32,
    pub canvas_h: u32,
    pub fps: u32,
}

impl ZoomPanSpec {
    pub fn plan(
        profile: &KenBurnsProfile,
        direction: Direction,
        canvas: (u32, u32),
        fps: u32,
        duration: f64,
    ) -> Self {
        let zoom = if profile.zoom <= 0.0 {
            ZOOM_EPSILON
        } else {
            profile.zoom
        };
        let nframes = ((duration * f64::from(fps)).round() as u32).max(1);
        let zmax = 1.0 + zoom;
        Self {
            nframes,
            zmax,
            step: zoom / f64::from(nframes),
            drift: profile.offset * profile.margin,
            direction,
            canvas_w: canvas.0,
            canvas_h: canvas.1,
            fps,
        }
    }

    /// The full zoompan filter for this spec.
    ///
    /// `pzoom` carries the accumulated zoom across frames so the ramp reaches
    /// `zmax` exactly at the last frame.
    pub fn to_filter(&self) -> String {
        let zoom = format!(
            "min(max(zoom,pzoom)+{step:.7},{zmax:.6})",
            step = self.step,
            zmax = self.zmax,
        );
        let x = centre_drift_expr("iw", self.direction.dx, self.drift, self.nframes);
        let y = centre_drift_expr("ih", self.direction.dy, self.drift, self.nframes);
        format!(
            "zoompan=z='{zoom}':x='{x}':y='{y}':d={n}:s={w}x{h}:fps={fps}",
            n = self.nframes,
            w = self.canvas_w,
            h = self.canvas_h,
            fps = self.fps,
        )
    }
}

fn centre_drift_expr(dim: &str, sign: i8, drift: f64, nframes: u32) -> String {
    let centre = format!("{dim}/2-({dim}/zoom/2)");
    if sign == 0 || drift == 0.0 {
        return centre;
    }
    format!(
        "{centre}+({signed_drift:.6}*{dim})*(on/{nframes})",
        signed_drift = drift * f64::from(sign),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lform_models::{AnimationSettings, KenBurnsMode};

    fn pan_profile() -> KenBurnsProfile {
        AnimationSettings::default().profile()
    }

    fn zoom_profile() -> KenBurnsProfile {
        AnimationSettings {
            ken_burns_mode: KenBurnsMode::Zoompan,
            ..Default::default()
        }
        .profile()
    }

    const RIGHT: Direction = Direction { dx: 1, dy: 0 };
    const DOWN_LEFT: Direction = Direction { dx: -1, dy: 1 };

    #[test]
    fn test_scaled_frame_covers_canvas_plus_margin() {
        let path = PanPath::plan(&pan_profile(), RIGHT, (4000, 3000), (1920, 1080), 10.0, 0.0);
        assert!(path.scaled_w >= 1920);
        assert!(path.scaled_h >= 1080);
        assert_eq!(path.scaled_w % 2, 0);
        assert_eq!(path.scaled_h % 2, 0);
    }

    #[test]
    fn test_crop_stays_inside_scaled_frame_for_all_t() {
        let profile = pan_profile();
        for direction in lform_models::DIRECTIONS {
            let path = PanPath::plan(&profile, direction, (800, 600), (1920, 1080), 8.0, 0.8);
            let slack_x = f64::from(path.scaled_w - path.canvas_w);
            let slack_y = f64::from(path.scaled_h - path.canvas_h);
            for step in 0..=100 {
                let t = 8.0 * f64::from(step) / 100.0;
                let (x, y) = path.position_at(t);
                assert!(x >= -1e-9 && x <= slack_x + 1e-9, "{direction:?} x={x}");
                assert!(y >= -1e-9 && y <= slack_y + 1e-9, "{direction:?} y={y}");
            }
        }
    }

    #[test]
    fn test_travel_equals_extent_times_slack() {
        // Direction (1,0), extent 0.1, motion scale 1: the final origin sits
        // 0.1 * slack right of the initial one.
        let profile = KenBurnsProfile {
            pan_extent: 0.1,
            motion_scale: 1.0,
            full_travel: false,
            ..pan_profile()
        };
        let path = PanPath::plan(&profile, RIGHT, (3000, 2000), (1920, 1080), 10.0, 0.0);
        let slack_x = f64::from(path.scaled_w - path.canvas_w);
        let (x0, y0) = path.position_at(0.0);
        let (x1, y1) = path.position_at(10.0);
        assert!((x1 - x0 - 0.1 * slack_x).abs() < 1e-6);
        assert_eq!(y0, y1);
    }

    #[test]
    fn test_full_travel_saturates_slack() {
        let profile = KenBurnsProfile {
            full_travel: true,
            pan_extent: 0.1,
            ..pan_profile()
        };
        let path = PanPath::plan(&profile, RIGHT, (3000, 2000), (1920, 1080), 10.0, 0.0);
        let slack_x = f64::from(path.scaled_w - path.canvas_w);
        let (x0, _) = path.position_at(0.0);
        let (x1, _) = path.position_at(10.0);
        assert!((x1 - x0 - slack_x).abs() < 1e-6);
        assert_eq!(x0, 0.0);
    }

    #[test]
    fn test_motion_is_clamped_after_duration() {
        let path = PanPath::plan(&pan_profile(), DOWN_LEFT, (3000, 2000), (1280, 720), 5.0, 0.0);
        assert_eq!(path.position_at(5.0), path.position_at(99.0));
    }

    #[test]
    fn test_intro_relief_enlarges_scaled_frame() {
        let profile = pan_profile();
        let without = PanPath::plan(&profile, RIGHT, (3000, 2000), (1280, 720), 5.0, 0.0);
        let with = PanPath::plan(&profile, RIGHT, (3000, 2000), (1280, 720), 5.0, 1.0);
        assert!(with.scaled_w > without.scaled_w);
        assert!(with.scaled_h > without.scaled_h);
    }

    #[test]
    fn test_relief_margin_is_capped_at_max_margin() {
        let profile = KenBurnsProfile {
            margin: 0.4,
            intro_relief: 10.0,
            max_margin: 0.5,
            ..pan_profile()
        };
        assert_eq!(effective_margin(&profile, 1.0), 0.5);
    }

    #[test]
    fn test_pan_exprs_are_static_when_axis_is_idle() {
        let path = PanPath::plan(&pan_profile(), RIGHT, (3000, 2000), (1920, 1080), 10.0, 0.0);
        assert!(path.crop_x_expr().contains("clip("));
        assert!(!path.crop_y_expr().contains("clip("), "idle axis is constant");
    }

    #[test]
    fn test_zoompan_reaches_zmax_at_last_frame() {
        let spec = ZoomPanSpec::plan(&zoom_profile(), RIGHT, (1920, 1080), 30, 5.0);
        assert_eq!(spec.nframes, 150);
        let total = spec.step * f64::from(spec.nframes);
        assert!((1.0 + total - spec.zmax).abs() < 1e-9);
    }

    #[test]
    fn test_zoompan_clamps_zero_zoom_to_epsilon() {
        let profile = KenBurnsProfile {
            zoom: 0.0,
            ..zoom_profile()
        };
        let spec = ZoomPanSpec::plan(&profile, RIGHT, (1280, 720), 30, 2.0);
        assert!((spec.zmax - 1.015).abs() < 1e-9);
    }

    #[test]
    fn test_zoompan_filter_contains_drift_only_on_moving_axis() {
        let spec = ZoomPanSpec::plan(&zoom_profile(), RIGHT, (1280, 720), 30, 2.0);
        let filter = spec.to_filter();
        assert!(filter.contains("zoompan=z="));
        assert!(filter.contains("s=1280x720"));
        assert!(filter.contains("(on/60)"), "x axis drifts");
        assert!(filter.contains("y='ih/2-(ih/zoom/2)'"), "y axis static");
    }
}
