//! Timeline building: sections to time-budgeted scenes.
//!
//! Chunks are bundled into scenes until the accumulated narration reaches
//! the configured target, every chunk becoming one caption segment at its
//! cumulative offset. Durations come from the asset pipeline (measured
//! narration); the word-count estimate only stands in while assets are
//! missing.

use tracing::{debug, info};

use lform_models::{Direction, SceneKind, SectionSettings, TextSegment};

use crate::error::{PipelineError, PipelineResult};
use crate::script::{ScriptDocument, ScriptSection};

/// A planned scene before asset paths are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDraft {
    pub id: String,
    pub kind: SceneKind,
    pub duration_seconds: f64,
    pub segments: Vec<TextSegment>,
    pub motion_vector: Direction,
    pub intro_relief_seconds: f64,
    /// Indices of the script sections bundled into this scene.
    pub section_indices: Vec<usize>,
}

/// Groups script sections into scenes.
pub struct TimelineBuilder {
    sections: SectionSettings,
    padding_seconds: f64,
    intro_relief_seconds: f64,
}

impl TimelineBuilder {
    pub fn new(
        sections: SectionSettings,
        padding_seconds: f64,
        intro_relief_seconds: f64,
    ) -> Self {
        Self {
            sections,
            padding_seconds,
            intro_relief_seconds,
        }
    }

    /// Build the timeline.
    ///
    /// `durations` holds one narration duration per script section, aligned
    /// with `document.sections`.
    pub fn build(
        &self,
        document: &ScriptDocument,
        durations: &[f64],
    ) -> PipelineResult<Vec<SceneDraft>> {
        if document.sections.is_empty() {
            return Err(PipelineError::EmptyScript);
        }
        for (i, &d) in durations.iter().enumerate() {
            if d <= 0.0 {
                return Err(PipelineError::InvalidDuration {
                    chunk: i + 1,
                    seconds: d,
                });
            }
        }

        let mut scenes: Vec<SceneDraft> = Vec::new();

        // Opening: always the first section alone.
        let opening = &document.sections[0];
        let opening_duration = durations[0];
        scenes.push(self.opening_scene(opening, opening_duration));

        let mut scene_number = 2usize;
        let mut group: Vec<(&ScriptSection, f64)> = Vec::new();
        let mut group_duration = 0.0;

        for (section, &duration) in document.sections[1..].iter().zip(&durations[1..]) {
            if group.is_empty() {
                group.push((section, duration));
                group_duration = duration;
                continue;
            }

            let max_chunks = self.sections.max_chunks_per_scene;
            if max_chunks > 0 && group.len() >= max_chunks {
                scenes.push(self.content_scene(scene_number, &group));
                scene_number += 1;
                group = vec![(section, duration)];
                group_duration = duration;
                continue;
            }

            let proposed = group_duration + duration;
            let should_close = group_duration >= self.sections.min_duration_seconds
                && (group_duration >= self.sections.default_duration_seconds
                    || proposed > self.sections.max_duration_seconds);

            if should_close {
                scenes.push(self.content_scene(scene_number, &group));
                scene_number += 1;
                group = vec![(section, duration)];
                group_duration = duration;
            } else {
                group.push((section, duration));
                group_duration = proposed;
            }
        }
        if !group.is_empty() {
            scenes.push(self.content_scene(scene_number, &group));
        }

        let total: f64 = scenes.iter().map(|s| s.duration_seconds).sum();
        info!(
            "Timeline built with {} scenes (total {:.2} seconds)",
            scenes.len(),
            total
        );
        Ok(scenes)
    }

    /// Fallback duration estimate for sections without measured narration.
    pub fn estimate_duration(&self, section: &ScriptSection, words_per_minute: u32) -> f64 {
        let words_per_second = (f64::from(words_per_minute) / 60.0).max(0.1);
        let voice = section.word_count() as f64 / words_per_second
            + self.padding_seconds * (section.lines.len().saturating_sub(1)) as f64;
        voice.max(1.0)
    }

    fn opening_scene(&self, section: &ScriptSection, duration: f64) -> SceneDraft {
        let id = "S001".to_string();
        let lines = wrap_rows(&section.lines, self.sections.wrap_width);
        SceneDraft {
            motion_vector: Direction::for_scene(&id),
            kind: SceneKind::Opening,
            duration_seconds: round2(duration),
            segments: vec![TextSegment {
                index: 0,
                lines,
                start_offset: 0.0,
                duration: round2(duration),
            }],
            intro_relief_seconds: 0.0,
            section_indices: vec![section.index],
            id,
        }
    }

    fn content_scene(&self, scene_number: usize, group: &[(&ScriptSection, f64)]) -> SceneDraft {
        let id = format!("S{scene_number:03}");
        let n = group.len();
        let raw_duration: f64 = group.iter().map(|(_, d)| d).sum::<f64>()
            + self.padding_seconds * (n.saturating_sub(1)) as f64;
        let duration = round2(
            raw_duration
                .min(self.sections.max_duration_seconds)
                .max(self.sections.min_duration_seconds),
        );

        let mut segments = Vec::with_capacity(n);
        let mut cursor = 0.0;
        for (i, (section, chunk_duration)) in group.iter().enumerate() {
            // Padding between chunks is absorbed into the leading segment so
            // the band never disappears between chunks of the same scene.
            let seg_duration = if i + 1 < n {
                chunk_duration + self.padding_seconds
            } else {
                *chunk_duration
            };
            segments.push(TextSegment {
                index: i,
                lines: wrap_rows(&section.lines, self.sections.wrap_width),
                start_offset: cursor,
                duration: seg_duration,
            });
            cursor += seg_duration;
        }
        clamp_segments(&mut segments, duration);

        debug!(
            "Scene {id}: {} chunks, {:.2}s (raw {:.2}s)",
            n, duration, raw_duration
        );
        SceneDraft {
            motion_vector: Direction::for_scene(&id),
            kind: SceneKind::Content,
            duration_seconds: duration,
            segments,
            intro_relief_seconds: self.intro_relief_seconds,
            section_indices: group.iter().map(|(s, _)| s.index).collect(),
            id,
        }
    }
}

/// Re-tile segments over a clamped scene duration: truncated scenes lose
/// trailing coverage, extended scenes stretch the final segment. Either way
/// the segments exactly tile `[0, duration]`.
fn clamp_segments(segments: &mut Vec<TextSegment>, duration: f64) {
    segments.retain(|s| s.start_offset < duration);
    if let Some(last) = segments.last_mut() {
        last.duration = duration - last.start_offset;
    }
}

/// Wrap script rows into display rows of at most `width` characters,
/// breaking on whitespace where there is any and mid-word otherwise.
pub fn wrap_rows(rows: &[String], width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for row in rows {
        let row = row.trim();
        if row.is_empty() {
            continue;
        }
        if row.chars().count() <= width {
            out.push(row.to_string());
            continue;
        }
        if row.contains(' ') {
            let mut current = String::new();
            for word in row.split_whitespace() {
                let candidate_len = if current.is_empty() {
                    word.chars().count()
                } else {
                    current.chars().count() + 1 + word.chars().count()
                };
                if candidate_len > width && !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                // A single over-long word still gets hard-broken.
                while current.chars().count() > width {
                    let head: String = current.chars().take(width).collect();
                    let rest: String = current.chars().skip(width).collect();
                    out.push(head);
                    current = rest;
                }
            }
            if !current.is_empty() {
                out.push(current);
            }
        } else {
            let chars: Vec<char> = row.chars().collect();
            for piece in chars.chunks(width) {
                out.push(piece.iter().collect());
            }
        }
    }
    out
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;
    use lform_models::SectionSettings;

    fn builder() -> TimelineBuilder {
        TimelineBuilder::new(SectionSettings::default(), 0.35, 0.8)
    }

    fn doc(sections: usize) -> ScriptDocument {
        let mut text = String::from("s\"Title\"\n");
        for i in 0..sections {
            text.push_str(&format!("\nsection number {i} words here"));
        }
        parse_script(&text).unwrap()
    }

    #[test]
    fn test_first_section_becomes_opening() {
        let scenes = builder().build(&doc(3), &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(scenes[0].kind, SceneKind::Opening);
        assert_eq!(scenes[0].id, "S001");
        assert_eq!(scenes[0].duration_seconds, 4.0);
        assert_eq!(scenes[0].segments.len(), 1);
        assert_eq!(scenes[0].segments[0].duration, 4.0);
    }

    #[test]
    fn test_content_chunks_bundle_until_target() {
        // Three short content chunks stay in one scene below the 60 s target.
        let scenes = builder().build(&doc(4), &[3.0, 5.0, 6.0, 7.0]).unwrap();
        assert_eq!(scenes.len(), 2);
        let content = &scenes[1];
        assert_eq!(content.kind, SceneKind::Content);
        assert_eq!(content.segments.len(), 3);
        assert_eq!(content.section_indices, vec![2, 3, 4]);
    }

    #[test]
    fn test_scene_duration_equals_chunks_plus_padding() {
        let scenes = builder().build(&doc(4), &[3.0, 5.0, 6.0, 7.0]).unwrap();
        let content = &scenes[1];
        let expected = 5.0 + 6.0 + 7.0 + 0.35 * 2.0;
        assert!((content.duration_seconds - round2(expected)).abs() < 1e-9);
        let sum: f64 = content.segments.iter().map(|s| s.duration).sum();
        assert!((sum - content.duration_seconds).abs() < 1e-6);
    }

    #[test]
    fn test_segments_tile_without_gap_or_overlap() {
        let scenes = builder().build(&doc(4), &[3.0, 5.0, 6.0, 7.0]).unwrap();
        let content = &scenes[1];
        let mut cursor = 0.0;
        for seg in &content.segments {
            assert!((seg.start_offset - cursor).abs() < 1e-9);
            cursor += seg.duration;
        }
        assert!((cursor - content.duration_seconds).abs() < 1e-6);
    }

    #[test]
    fn test_max_chunks_per_scene_closes_group() {
        let settings = SectionSettings {
            max_chunks_per_scene: 2,
            ..Default::default()
        };
        let b = TimelineBuilder::new(settings, 0.35, 0.0);
        let scenes = b.build(&doc(5), &[2.0, 2.0, 2.0, 2.0, 2.0]).unwrap();
        // Opening + ceil(4/2) content scenes.
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[1].segments.len(), 2);
        assert_eq!(scenes[2].segments.len(), 2);
    }

    #[test]
    fn test_group_closes_when_target_reached() {
        let settings = SectionSettings {
            default_duration_seconds: 10.0,
            min_duration_seconds: 5.0,
            max_duration_seconds: 120.0,
            ..Default::default()
        };
        let b = TimelineBuilder::new(settings, 0.0, 0.0);
        let scenes = b.build(&doc(4), &[1.0, 6.0, 6.0, 6.0]).unwrap();
        // 6+6 reaches the 10 s target, third chunk starts a new scene.
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[1].segments.len(), 2);
        assert_eq!(scenes[2].segments.len(), 1);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let err = builder().build(&doc(2), &[3.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidDuration { chunk: 2, .. }
        ));
    }

    #[test]
    fn test_motion_vector_is_deterministic_per_scene() {
        let a = builder().build(&doc(3), &[3.0, 4.0, 5.0]).unwrap();
        let b = builder().build(&doc(3), &[3.0, 4.0, 5.0]).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.motion_vector, y.motion_vector);
        }
    }

    #[test]
    fn test_short_scene_is_raised_to_minimum() {
        let settings = SectionSettings {
            min_duration_seconds: 5.0,
            ..Default::default()
        };
        let b = TimelineBuilder::new(settings, 0.0, 0.0);
        let scenes = b.build(&doc(2), &[3.0, 2.0]).unwrap();
        let content = &scenes[1];
        assert_eq!(content.duration_seconds, 5.0);
        // The lone segment stretches to cover the clamped duration.
        assert_eq!(content.segments[0].duration, 5.0);
    }

    #[test]
    fn test_wrap_rows_on_whitespace() {
        let rows = vec!["the quick brown fox jumps".to_string()];
        assert_eq!(
            wrap_rows(&rows, 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn test_wrap_rows_cjk_hard_break() {
        let rows = vec!["あいうえおかきくけこ".to_string()];
        assert_eq!(wrap_rows(&rows, 4), vec!["あいうえ", "おかきく", "けこ"]);
    }

    #[test]
    fn test_wrap_rows_keeps_short_rows() {
        let rows = vec!["short".to_string(), "also short".to_string()];
        assert_eq!(wrap_rows(&rows, 26), rows);
    }
}
