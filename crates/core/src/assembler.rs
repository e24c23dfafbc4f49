//! Result assembly.
//!
//! Stage outputs arrive in one of two wire shapes:
//!
//! * the simple subtitle-service shape: a flat transcript list
//!   (`transcript`, `segments` or `subtitles`) or an SRT document
//!   (`subtitle` + `format`);
//! * the full multimodal shape: separate `audio`, `visual` and `scenes`
//!   sections, plus `glossary`, `summary` and `fullDescription`.
//!
//! Both normalize into [`AnalysisResult`]. Source order is kept as is; entries
//! that break time ordering are dropped and reported as warnings, never as
//! errors. Only a structurally broken payload fails assembly.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::AnalysisError,
    format::parse_srt,
    types::{
        AnalysisResult, GlossaryTerm, SceneDescription, SourceStrategy, SubtitleItem, VisualFrame,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// When false the subtitle track is emitted empty.
    pub captions_enabled: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            captions_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    Simple,
    Full,
}

/// Data-quality issue found while assembling; the offending entry is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyWarning {
    InvalidSubtitleSpan { index: usize, start: f64, end: f64 },
    SubtitleOutOfOrder { index: usize, start: f64, previous_start: f64 },
    SubtitleOverlap { index: usize, start: f64, previous_end: f64 },
    VisualOutOfOrder { index: usize, timestamp: f64, previous: f64 },
    SceneOutOfOrder { index: usize, timestamp: f64, previous: f64 },
    EmptyGlossaryEntry { index: usize },
    DuplicateGlossaryTerm { term: String },
}

impl fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyWarning::InvalidSubtitleSpan { index, start, end } => {
                write!(f, "subtitle #{index} has an invalid span {start}..{end}")
            }
            AssemblyWarning::SubtitleOutOfOrder {
                index,
                start,
                previous_start,
            } => write!(
                f,
                "subtitle #{index} starts at {start} before the previous cue ({previous_start})"
            ),
            AssemblyWarning::SubtitleOverlap {
                index,
                start,
                previous_end,
            } => write!(
                f,
                "subtitle #{index} starts at {start} while the previous cue runs until {previous_end}"
            ),
            AssemblyWarning::VisualOutOfOrder {
                index,
                timestamp,
                previous,
            } => write!(f, "visual frame #{index} at {timestamp} precedes {previous}"),
            AssemblyWarning::SceneOutOfOrder {
                index,
                timestamp,
                previous,
            } => write!(f, "scene #{index} at {timestamp} precedes {previous}"),
            AssemblyWarning::EmptyGlossaryEntry { index } => {
                write!(f, "glossary entry #{index} has an empty term or definition")
            }
            AssemblyWarning::DuplicateGlossaryTerm { term } => {
                write!(f, "glossary term '{term}' appears more than once")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubtitleTrack {
    pub items: Vec<SubtitleItem>,
    pub warnings: Vec<AssemblyWarning>,
}

impl SubtitleTrack {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub result: AnalysisResult,
    pub warnings: Vec<AssemblyWarning>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SimplePayload {
    #[serde(default, alias = "segments", alias = "subtitles")]
    transcript: Option<Vec<WireSegment>>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AudioSection {
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct VisualSection {
    frames: Vec<VisualFrame>,
}

#[derive(Debug, Deserialize)]
struct WireGlossaryTerm {
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullPayload {
    #[serde(default)]
    audio: Option<AudioSection>,
    #[serde(default)]
    visual: Option<VisualSection>,
    #[serde(default)]
    scenes: Option<Vec<SceneDescription>>,
    #[serde(default)]
    glossary: Option<Vec<WireGlossaryTerm>>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    full_description: Option<String>,
}

pub fn detect_shape(payload: &Value) -> Result<WireShape, AnalysisError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AnalysisError::malformed("result payload is not a JSON object"))?;

    if ["audio", "visual", "scenes"].iter().any(|k| obj.contains_key(*k)) {
        Ok(WireShape::Full)
    } else if ["transcript", "segments", "subtitles", "subtitle"]
        .iter()
        .any(|k| obj.contains_key(*k))
    {
        Ok(WireShape::Simple)
    } else {
        Err(AnalysisError::malformed(
            "result payload carries neither subtitles nor analysis sections",
        ))
    }
}

fn decode<T: DeserializeOwned>(payload: &Value, what: &str) -> Result<T, AnalysisError> {
    T::deserialize(payload).map_err(|e| AnalysisError::malformed(format!("{}: {}", what, e)))
}

/// Extract the subtitle track of either wire shape.
pub fn subtitles_from_payload(payload: &Value) -> Result<SubtitleTrack, AnalysisError> {
    match detect_shape(payload)? {
        WireShape::Simple => {
            let simple: SimplePayload = decode(payload, "subtitle payload")?;
            let items = match (simple.transcript, simple.subtitle) {
                (Some(segments), _) => segments.into_iter().map(SubtitleItem::from).collect(),
                (None, Some(document)) => {
                    let format = simple.format.as_deref().unwrap_or("srt");
                    if !format.eq_ignore_ascii_case("srt") {
                        return Err(AnalysisError::malformed(format!(
                            "unsupported subtitle format '{}'",
                            format
                        )));
                    }
                    parse_srt(&document).map_err(|e| AnalysisError::malformed(e.to_string()))?
                }
                (None, None) => {
                    return Err(AnalysisError::malformed(
                        "subtitle payload carries no transcript",
                    ));
                }
            };
            Ok(validate_subtitles(items))
        }
        WireShape::Full => {
            let full: FullPayload = decode(payload, "analysis payload")?;
            let items = full
                .audio
                .map(|audio| audio.segments.into_iter().map(SubtitleItem::from).collect())
                .unwrap_or_default();
            Ok(validate_subtitles(items))
        }
    }
}

/// Assemble one payload of either shape into a result.
pub fn assemble(payload: &Value, options: AssemblyOptions) -> Result<Assembled, AnalysisError> {
    let track = subtitles_from_payload(payload)?;
    let visual = match detect_shape(payload)? {
        WireShape::Full => Some(payload),
        WireShape::Simple => None,
    };
    merge(track, None, visual, options)
}

/// Combine the selected subtitle track with the optional full-analysis payload.
pub fn merge(
    track: SubtitleTrack,
    source: Option<SourceStrategy>,
    analysis: Option<&Value>,
    options: AssemblyOptions,
) -> Result<Assembled, AnalysisError> {
    let mut warnings = track.warnings;
    let mut result = AnalysisResult {
        subtitles: if options.captions_enabled {
            track.items
        } else {
            Vec::new()
        },
        subtitle_source: source,
        ..Default::default()
    };

    if let Some(payload) = analysis {
        if detect_shape(payload)? != WireShape::Full {
            return Err(AnalysisError::malformed(
                "visual analysis returned a subtitle-only payload",
            ));
        }
        let full: FullPayload = decode(payload, "analysis payload")?;

        let frames = full.visual.map(|v| v.frames).unwrap_or_default();
        result.visual_content = keep_ordered(
            frames,
            |frame| frame.timestamp,
            |index, timestamp, previous| AssemblyWarning::VisualOutOfOrder {
                index,
                timestamp,
                previous,
            },
            &mut warnings,
        );

        result.scene_descriptions = keep_ordered(
            full.scenes.unwrap_or_default(),
            |scene| scene.timestamp,
            |index, timestamp, previous| AssemblyWarning::SceneOutOfOrder {
                index,
                timestamp,
                previous,
            },
            &mut warnings,
        );

        result.glossary = filter_glossary(full.glossary.unwrap_or_default(), &mut warnings);
        result.summary = non_empty(full.summary);
        result.full_description = non_empty(full.full_description);
    }

    for warning in &warnings {
        tracing::warn!(%warning, "dropped entry while assembling result");
    }

    Ok(Assembled { result, warnings })
}

impl From<WireSegment> for SubtitleItem {
    fn from(segment: WireSegment) -> Self {
        SubtitleItem::new(segment.start, segment.end, segment.text)
    }
}

/// Drop cues with broken spans, cues that go back in time and cues that
/// overlap the previously kept one. Cues are half-open, so touching is fine.
pub fn validate_subtitles(items: Vec<SubtitleItem>) -> SubtitleTrack {
    let mut track = SubtitleTrack::default();

    for (index, item) in items.into_iter().enumerate() {
        if !item.start.is_finite() || !item.end.is_finite() || item.start < 0.0 || item.end < item.start
        {
            track.warnings.push(AssemblyWarning::InvalidSubtitleSpan {
                index,
                start: item.start,
                end: item.end,
            });
            continue;
        }

        if let Some(previous) = track.items.last() {
            if item.start < previous.start {
                track.warnings.push(AssemblyWarning::SubtitleOutOfOrder {
                    index,
                    start: item.start,
                    previous_start: previous.start,
                });
                continue;
            }
            if item.start < previous.end {
                track.warnings.push(AssemblyWarning::SubtitleOverlap {
                    index,
                    start: item.start,
                    previous_end: previous.end,
                });
                continue;
            }
        }

        track.items.push(item);
    }

    track
}

fn keep_ordered<T>(
    entries: Vec<T>,
    timestamp: impl Fn(&T) -> f64,
    warn: impl Fn(usize, f64, f64) -> AssemblyWarning,
    warnings: &mut Vec<AssemblyWarning>,
) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(entries.len());
    let mut previous = f64::NEG_INFINITY;

    for (index, entry) in entries.into_iter().enumerate() {
        let ts = timestamp(&entry);
        if !ts.is_finite() || ts < previous {
            warnings.push(warn(index, ts, previous));
            continue;
        }
        previous = ts;
        kept.push(entry);
    }

    kept
}

/// Drop entries with a blank term or definition; first occurrence of a term wins.
fn filter_glossary(
    terms: Vec<WireGlossaryTerm>,
    warnings: &mut Vec<AssemblyWarning>,
) -> Vec<GlossaryTerm> {
    let mut seen = HashSet::new();
    let mut glossary = Vec::new();

    for (index, entry) in terms.into_iter().enumerate() {
        let term = entry.term.as_deref().unwrap_or_default().trim();
        let definition = entry.definition.as_deref().unwrap_or_default().trim();
        if term.is_empty() || definition.is_empty() {
            warnings.push(AssemblyWarning::EmptyGlossaryEntry { index });
            continue;
        }
        if !seen.insert(term.to_string()) {
            warnings.push(AssemblyWarning::DuplicateGlossaryTerm {
                term: term.to_string(),
            });
            continue;
        }
        glossary.push(GlossaryTerm {
            term: term.to_string(),
            definition: definition.to_string(),
            context: non_empty(entry.context),
        });
    }

    glossary
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flat_transcript_becomes_subtitles_only() {
        let payload = json!({
            "transcript": [
                {"start": 0.0, "end": 1.5, "text": "hello"},
                {"start": 1.5, "end": 3.0, "text": "world"}
            ]
        });
        let assembled = assemble(&payload, AssemblyOptions::default()).unwrap();
        assert_eq!(assembled.result.subtitles.len(), 2);
        assert!(assembled.result.visual_content.is_empty());
        assert!(assembled.result.scene_descriptions.is_empty());
        assert!(assembled.warnings.is_empty());
    }

    #[test]
    fn srt_document_payload() {
        let payload = json!({
            "subtitle": "1\n00:00:00,000 --> 00:00:02,000\nhi\n\n2\n00:00:02,000 --> 00:00:04,000\nthere\n",
            "format": "srt",
            "mode": "official"
        });
        let track = subtitles_from_payload(&payload).unwrap();
        assert_eq!(track.items.len(), 2);
        assert_eq!(track.items[1].text, "there");
    }

    #[test]
    fn unsupported_subtitle_format_is_malformed() {
        let payload = json!({"subtitle": "WEBVTT", "format": "vtt"});
        let err = subtitles_from_payload(&payload).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedResult);
    }

    #[test]
    fn full_payload_sections_map_verbatim() {
        let payload = json!({
            "audio": {"segments": [{"start": 0.0, "end": 2.0, "text": "intro"}]},
            "visual": {"frames": [
                {"timestamp": 0.0, "texts": ["Title slide"]},
                {"timestamp": 2.0, "texts": ["Agenda", "1. Basics"]}
            ]},
            "scenes": [{"timestamp": 0.0, "description": "Lecturer at a whiteboard"}],
            "summary": "  An introduction.  ",
            "fullDescription": ""
        });
        let assembled = assemble(&payload, AssemblyOptions::default()).unwrap();
        let result = assembled.result;
        assert_eq!(result.subtitles[0].text, "intro");
        assert_eq!(result.visual_content[1].texts, vec!["Agenda", "1. Basics"]);
        assert_eq!(result.scene_descriptions.len(), 1);
        assert_eq!(result.summary.as_deref(), Some("An introduction."));
        assert_eq!(result.full_description, None);
    }

    #[test]
    fn glossary_drops_blank_terms_and_definitions() {
        let payload = json!({
            "audio": {"segments": []},
            "glossary": [
                {"term": "A", "definition": "x"},
                {"term": "", "definition": "y"},
                {"term": "B", "definition": ""}
            ]
        });
        let assembled = assemble(&payload, AssemblyOptions::default()).unwrap();
        assert_eq!(
            assembled.result.glossary,
            vec![GlossaryTerm {
                term: "A".into(),
                definition: "x".into(),
                context: None
            }]
        );
        assert_eq!(assembled.warnings.len(), 2);
    }

    #[test]
    fn null_glossary_fields_are_filtered_not_fatal() {
        let payload = json!({
            "visual": {"frames": []},
            "glossary": [
                {"term": "A", "definition": "x"},
                {"term": null, "definition": "y"},
                {"term": "B", "definition": null},
                {"definition": "no term at all"}
            ]
        });
        let assembled = assemble(&payload, AssemblyOptions::default()).unwrap();
        assert_eq!(assembled.result.glossary.len(), 1);
        assert_eq!(assembled.result.glossary[0].term, "A");
        assert_eq!(
            assembled.warnings,
            vec![
                AssemblyWarning::EmptyGlossaryEntry { index: 1 },
                AssemblyWarning::EmptyGlossaryEntry { index: 2 },
                AssemblyWarning::EmptyGlossaryEntry { index: 3 },
            ]
        );
    }

    #[test]
    fn duplicate_glossary_terms_keep_first() {
        let mut warnings = Vec::new();
        let glossary = filter_glossary(
            vec![
                WireGlossaryTerm {
                    term: Some("OCR".into()),
                    definition: Some("optical character recognition".into()),
                    context: Some("slides".into()),
                },
                WireGlossaryTerm {
                    term: Some(" OCR ".into()),
                    definition: Some("other".into()),
                    context: None,
                },
            ],
            &mut warnings,
        );
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary[0].context.as_deref(), Some("slides"));
        assert_eq!(
            warnings,
            vec![AssemblyWarning::DuplicateGlossaryTerm { term: "OCR".into() }]
        );
    }

    #[test]
    fn out_of_order_entries_are_dropped_not_resorted() {
        let payload = json!({
            "audio": {"segments": [
                {"start": 0.0, "end": 2.0, "text": "a"},
                {"start": 1.0, "end": 3.0, "text": "overlaps a"},
                {"start": 5.0, "end": 6.0, "text": "b"},
                {"start": 4.0, "end": 4.5, "text": "goes back"},
                {"start": 7.0, "end": 6.0, "text": "inverted"},
                {"start": 6.0, "end": 8.0, "text": "c"}
            ]},
            "visual": {"frames": [
                {"timestamp": 4.0, "texts": ["x"]},
                {"timestamp": 2.0, "texts": ["late"]},
                {"timestamp": 4.0, "texts": ["same time"]}
            ]},
            "scenes": [
                {"timestamp": 3.0, "description": "s1"},
                {"timestamp": 1.0, "description": "s0"}
            ]
        });
        let assembled = assemble(&payload, AssemblyOptions::default()).unwrap();
        let texts: Vec<_> = assembled
            .result
            .subtitles
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(assembled.result.visual_content.len(), 2);
        assert_eq!(assembled.result.scene_descriptions.len(), 1);
        assert_eq!(assembled.warnings.len(), 5);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let payload = json!({"visual": {"frames": [{"texts": ["no timestamp"]}]}});
        let err = assemble(&payload, AssemblyOptions::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedResult);

        let payload = json!({"transcript": [{"start": 0.0, "text": "no end"}]});
        assert!(subtitles_from_payload(&payload).is_err());

        assert!(detect_shape(&json!([1, 2, 3])).is_err());
        assert!(detect_shape(&json!({"status": "ok"})).is_err());
    }

    #[test]
    fn captions_disabled_yields_empty_track() {
        let track = validate_subtitles(vec![SubtitleItem::new(0.0, 1.0, "hi")]);
        let assembled = merge(
            track,
            Some(SourceStrategy::OfficialCaptions),
            None,
            AssemblyOptions {
                captions_enabled: false,
            },
        )
        .unwrap();
        assert!(assembled.result.subtitles.is_empty());
        assert_eq!(
            assembled.result.subtitle_source,
            Some(SourceStrategy::OfficialCaptions)
        );
    }
}
