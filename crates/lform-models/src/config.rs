//! Renderer configuration surface.
//!
//! Mirrors the `renderer.*` section of the YAML configuration. Every field
//! has a serde default so a minimal config file renders something sensible.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default CRF for scene encodes
pub const DEFAULT_CRF: u8 = 20;
/// Output audio sample rate; the loudness chain conforms everything to this.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// An RGBA colour parsed from `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Error)]
#[error("invalid colour value: {0}")]
pub struct ColorParseError(String);

impl Rgba {
    /// Parse a hex colour. Six digits get an implied alpha of 200, matching
    /// the translucent caption band default.
    pub fn parse(value: &str) -> Result<Self, ColorParseError> {
        let v = value.trim_start_matches('#');
        if !v.is_ascii() {
            return Err(ColorParseError(value.to_string()));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&v[i..i + 2], 16).map_err(|_| ColorParseError(value.to_string()))
        };
        match v.len() {
            6 => Ok(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: 200,
            }),
            8 => Ok(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => Err(ColorParseError(value.to_string())),
        }
    }

    /// `&HAABBGGRR` ASS style colour (alpha 00 = opaque).
    pub fn to_ass(&self) -> String {
        format!(
            "&H{:02X}{:02X}{:02X}{:02X}",
            255 - self.a,
            self.b,
            self.g,
            self.r
        )
    }
}

/// Canvas and video encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    /// Target bitrate (e.g. "6M"); mutually additive with `crf`.
    pub bitrate: Option<String>,
    pub crf: Option<u8>,
    pub preset: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            bitrate: None,
            crf: Some(DEFAULT_CRF),
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

/// Audio encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub codec: String,
    pub bitrate: Option<String>,
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: DEFAULT_AUDIO_CODEC.to_string(),
            bitrate: Some("192k".to_string()),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Caption text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub font_path: Option<PathBuf>,
    pub default_size: u32,
    /// Caption text colour, `#RRGGBB`.
    pub color_default: String,
    /// Caption band colour, `#RRGGBB` or `#RRGGBBAA`.
    pub color_background_box: String,
    pub opening_title_size: u32,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            default_size: 36,
            color_default: "#FFFFFF".to_string(),
            color_background_box: "#000000F0".to_string(),
            opening_title_size: 75,
        }
    }
}

impl TextSettings {
    pub fn text_color(&self) -> Result<Rgba, ColorParseError> {
        Rgba::parse(&self.color_default)
    }

    pub fn band_color(&self) -> Result<Rgba, ColorParseError> {
        Rgba::parse(&self.color_background_box)
    }
}

/// How caption text is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Band and text painted together, shown for the whole segment.
    #[default]
    Static,
    /// Band painted alone; text typed in by libass.
    Typing,
}

/// How typing reveals are encoded in the subtitle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypingEvents {
    /// One event per display row with per-character `\kf` ticks.
    #[default]
    Karaoke,
    /// One event per revealed prefix; heavier, for renderers without
    /// reliable karaoke timing.
    PerChar,
}

/// Caption overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    /// Multiplier on the auto-fitted characters-per-second rate.
    pub typing_speed: f64,
    pub typing_events: TypingEvents,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            kind: OverlayKind::Static,
            typing_speed: 1.0,
            typing_events: TypingEvents::Karaoke,
        }
    }
}

/// Ken-Burns animation flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsMode {
    /// Constant-scale crop window panning across an oversized frame.
    #[default]
    PanOnly,
    /// Cumulative zoompan with drifting centre.
    Zoompan,
}

/// Raw animation configuration; resolve with [`AnimationSettings::profile`].
///
/// Unset values fall back to per-mode defaults, which differ substantially
/// between the two modes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    pub ken_burns_mode: KenBurnsMode,
    pub padding_seconds: Option<f64>,
    pub ken_burns_zoom: Option<f64>,
    pub ken_burns_offset: Option<f64>,
    pub ken_burns_margin: Option<f64>,
    pub ken_burns_motion_scale: Option<f64>,
    pub ken_burns_full_travel: Option<bool>,
    pub ken_burns_max_margin: Option<f64>,
    pub ken_burns_pan_extent: Option<f64>,
    pub ken_burns_intro_relief: Option<f64>,
    pub ken_burns_intro_seconds: Option<f64>,
}

/// Fully resolved Ken-Burns parameters for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KenBurnsProfile {
    pub mode: KenBurnsMode,
    pub padding_seconds: f64,
    pub zoom: f64,
    pub offset: f64,
    pub margin: f64,
    pub motion_scale: f64,
    pub full_travel: bool,
    pub max_margin: f64,
    pub pan_extent: f64,
    pub intro_relief: f64,
    pub intro_seconds: f64,
}

impl AnimationSettings {
    /// Merge per-mode defaults under any explicitly configured values.
    pub fn profile(&self) -> KenBurnsProfile {
        let mode = self.ken_burns_mode;
        let defaults = match mode {
            KenBurnsMode::Zoompan => KenBurnsProfile {
                mode,
                padding_seconds: 0.35,
                zoom: 0.04,
                offset: 0.085,
                margin: 0.09,
                motion_scale: 1.0,
                full_travel: false,
                max_margin: 0.45,
                pan_extent: 1.0,
                intro_relief: 0.2,
                intro_seconds: 0.8,
            },
            KenBurnsMode::PanOnly => KenBurnsProfile {
                mode,
                padding_seconds: 0.35,
                zoom: 0.0,
                offset: 0.4,
                margin: 0.2,
                motion_scale: 3.0,
                full_travel: false,
                max_margin: 1.5,
                pan_extent: 0.17,
                intro_relief: 1.0,
                intro_seconds: 0.0,
            },
        };
        KenBurnsProfile {
            mode,
            padding_seconds: self.padding_seconds.unwrap_or(defaults.padding_seconds),
            zoom: self.ken_burns_zoom.unwrap_or(defaults.zoom),
            offset: self.ken_burns_offset.unwrap_or(defaults.offset),
            margin: self.ken_burns_margin.unwrap_or(defaults.margin),
            motion_scale: self
                .ken_burns_motion_scale
                .unwrap_or(defaults.motion_scale),
            full_travel: self.ken_burns_full_travel.unwrap_or(defaults.full_travel),
            max_margin: self.ken_burns_max_margin.unwrap_or(defaults.max_margin),
            pan_extent: self.ken_burns_pan_extent.unwrap_or(defaults.pan_extent),
            intro_relief: self.ken_burns_intro_relief.unwrap_or(defaults.intro_relief),
            intro_seconds: self
                .ken_burns_intro_seconds
                .unwrap_or(defaults.intro_seconds),
        }
    }
}

/// Scene bundling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionSettings {
    pub default_duration_seconds: f64,
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub max_chunks_per_scene: usize,
    /// Display rows wrap at this many characters.
    pub wrap_width: usize,
    /// Fallback narration pace for chunks without measured audio.
    pub words_per_minute: u32,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            default_duration_seconds: 60.0,
            min_duration_seconds: 5.0,
            max_duration_seconds: 120.0,
            max_chunks_per_scene: 10,
            wrap_width: 26,
            words_per_minute: 150,
        }
    }
}

/// Background music settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BgmSettings {
    /// Music file to mix under the narration. None disables the mix.
    pub path: Option<PathBuf>,
    /// Linear gain applied to the narration stem before mixing.
    pub narration_boost: f64,
    /// Linear gain applied to the normalised BGM stem.
    pub bgm_boost: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Default for BgmSettings {
    fn default() -> Self {
        Self {
            path: None,
            narration_boost: 1.0,
            bgm_boost: 0.24,
            fade_in: 0.5,
            fade_out: 1.0,
        }
    }
}

/// The complete renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub video: VideoSettings,
    pub audio: AudioSettings,
    pub text: TextSettings,
    pub overlay: OverlaySettings,
    pub animation: AnimationSettings,
    pub sections: SectionSettings,
    pub bgm: BgmSettings,
    /// Delete per-scene artefacts after a successful run; they are kept for
    /// inspection unless this is set.
    pub cleanup_intermediates: bool,
    /// Scene render parallelism; 0 means one worker per CPU core.
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_parse_six_digits_gets_band_alpha() {
        let c = Rgba::parse("#FFFFFF").unwrap();
        assert_eq!((c.r, c.g, c.b, c.a), (255, 255, 255, 200));
    }

    #[test]
    fn test_rgba_parse_eight_digits() {
        let c = Rgba::parse("#000000F0").unwrap();
        assert_eq!((c.r, c.g, c.b, c.a), (0, 0, 0, 0xF0));
    }

    #[test]
    fn test_rgba_rejects_garbage() {
        assert!(Rgba::parse("#12345").is_err());
        assert!(Rgba::parse("not-a-colour").is_err());
    }

    #[test]
    fn test_ass_colour_is_abgr_with_inverted_alpha() {
        let c = Rgba {
            r: 0x11,
            g: 0x22,
            b: 0x33,
            a: 255,
        };
        assert_eq!(c.to_ass(), "&H00332211");
    }

    #[test]
    fn test_pan_only_profile_defaults() {
        let p = AnimationSettings::default().profile();
        assert_eq!(p.mode, KenBurnsMode::PanOnly);
        assert_eq!(p.pan_extent, 0.17);
        assert_eq!(p.motion_scale, 3.0);
        assert!(!p.full_travel);
    }

    #[test]
    fn test_zoompan_profile_defaults() {
        let settings = AnimationSettings {
            ken_burns_mode: KenBurnsMode::Zoompan,
            ..Default::default()
        };
        let p = settings.profile();
        assert_eq!(p.zoom, 0.04);
        assert_eq!(p.pan_extent, 1.0);
        assert_eq!(p.intro_seconds, 0.8);
    }

    #[test]
    fn test_explicit_values_override_mode_defaults() {
        let settings = AnimationSettings {
            ken_burns_mode: KenBurnsMode::PanOnly,
            ken_burns_pan_extent: Some(0.5),
            ken_burns_full_travel: Some(true),
            ..Default::default()
        };
        let p = settings.profile();
        assert_eq!(p.pan_extent, 0.5);
        assert!(p.full_travel);
    }

    #[test]
    fn test_settings_deserialize_from_partial_yaml() {
        let yaml = r#"
video:
  width: 1920
  height: 1080
overlay:
  type: typing
  typing_speed: 1.5
"#;
        let settings: RenderSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.video.width, 1920);
        assert_eq!(settings.video.fps, 30);
        assert_eq!(settings.overlay.kind, OverlayKind::Typing);
        assert_eq!(settings.audio.sample_rate, 48_000);
    }
}
