//! Scene plans and caption segments.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::motion::Direction;

/// What a scene is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    /// Black canvas with a centred title.
    Opening,
    /// Still image with Ken-Burns motion and caption bands.
    Content,
}

/// A caption interval within a scene.
///
/// Segments tile the scene without gap or overlap: the sum of segment
/// durations equals the scene duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub index: usize,
    /// Display rows, already wrapped to the configured width.
    pub lines: Vec<String>,
    pub start_offset: f64,
    pub duration: f64,
}

impl TextSegment {
    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }

    /// The text revealed by the typing animation, rows joined by newlines.
    pub fn text_for_typing(&self) -> String {
        self.lines.join("\n")
    }

    /// True when there is nothing visible to paint.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

/// Everything the renderer needs to produce one scene MP4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlan {
    /// Stable scene identifier; doubles as the motion RNG seed.
    pub id: String,
    pub kind: SceneKind,
    /// Still image for content scenes; absent for the opening.
    pub base_image_path: Option<PathBuf>,
    pub narration_audio_path: PathBuf,
    pub duration_seconds: f64,
    pub segments: Vec<TextSegment>,
    pub motion_vector: Direction,
    /// Leading interval during which the motion margin is relaxed.
    pub intro_relief_seconds: f64,
}

impl ScenePlan {
    /// Segments that actually render something.
    pub fn visible_segments(&self) -> impl Iterator<Item = &TextSegment> {
        self.segments.iter().filter(|s| !s.is_blank())
    }

    pub fn is_opening(&self) -> bool {
        self.kind == SceneKind::Opening
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, duration: f64, lines: &[&str]) -> TextSegment {
        TextSegment {
            index: 0,
            lines: lines.iter().map(|s| s.to_string()).collect(),
            start_offset: start,
            duration,
        }
    }

    #[test]
    fn test_typing_text_joins_rows() {
        let seg = segment(0.0, 2.0, &["first row", "second row"]);
        assert_eq!(seg.text_for_typing(), "first row\nsecond row");
    }

    #[test]
    fn test_blank_segment_detection() {
        assert!(segment(0.0, 1.0, &["", "  "]).is_blank());
        assert!(!segment(0.0, 1.0, &["", "x"]).is_blank());
    }

    #[test]
    fn test_scene_plan_roundtrips_through_json() {
        let plan = ScenePlan {
            id: "S002".to_string(),
            kind: SceneKind::Content,
            base_image_path: Some(PathBuf::from("images/S002.png")),
            narration_audio_path: PathBuf::from("narration/S002.wav"),
            duration_seconds: 12.5,
            segments: vec![segment(0.0, 12.5, &["hello"])],
            motion_vector: Direction::for_scene("S002"),
            intro_relief_seconds: 0.8,
        };
        let json = serde_json::to_string(&plan).unwrap();
        let back: ScenePlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }
}
