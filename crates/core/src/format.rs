use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::types::{AnalysisResult, SubtitleItem};

#[derive(Debug, Error, PartialEq)]
#[error("invalid SRT cue {cue}: {reason}")]
pub struct SrtError {
    pub cue: usize,
    pub reason: String,
}

/// Format seconds as MM:SS, or HH:MM:SS past the first hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let mins = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}

fn srt_timing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})",
        )
        .expect("valid SRT timing regex")
    })
}

fn srt_seconds(h: &str, m: &str, s: &str, frac: &str) -> f64 {
    let h: f64 = h.parse().unwrap_or(0.0);
    let m: f64 = m.parse().unwrap_or(0.0);
    let s: f64 = s.parse().unwrap_or(0.0);
    let frac_value: f64 = frac.parse().unwrap_or(0.0);
    let frac = frac_value / 10f64.powi(frac.len() as i32);
    h * 3600.0 + m * 60.0 + s + frac
}

/// Parse an SRT document into subtitle items, in document order.
pub fn parse_srt(document: &str) -> Result<Vec<SubtitleItem>, SrtError> {
    let normalized = document.replace("\r\n", "\n");
    let mut items = Vec::new();

    let blocks = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty());

    for (index, block) in blocks.enumerate() {
        let cue = index + 1;
        let mut lines = block.lines().peekable();

        // the numeric counter is optional in the wild
        if lines
            .peek()
            .is_some_and(|line| line.trim().chars().all(|c| c.is_ascii_digit()))
        {
            lines.next();
        }

        let timing = lines.next().ok_or_else(|| SrtError {
            cue,
            reason: "missing timing line".to_string(),
        })?;
        let caps = srt_timing_re()
            .captures(timing.trim())
            .ok_or_else(|| SrtError {
                cue,
                reason: format!("unrecognized timing line '{}'", timing.trim()),
            })?;

        let start = srt_seconds(&caps[1], &caps[2], &caps[3], &caps[4]);
        let end = srt_seconds(&caps[5], &caps[6], &caps[7], &caps[8]);
        let text = lines.map(str::trim).collect::<Vec<_>>().join("\n");

        items.push(SubtitleItem::new(start, end, text));
    }

    Ok(items)
}

/// Render subtitle items as an SRT document
pub fn to_srt(subtitles: &[SubtitleItem]) -> String {
    subtitles
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_srt_timestamp(item.start),
                format_srt_timestamp(item.end),
                item.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cue on screen at `time`; cues are half-open `[start, end)`.
pub fn subtitle_at(subtitles: &[SubtitleItem], time: f64) -> Option<&SubtitleItem> {
    let idx = subtitles.partition_point(|item| item.start <= time);
    let candidate = subtitles.get(idx.checked_sub(1)?)?;
    (time < candidate.end).then_some(candidate)
}

/// Format subtitle items with timestamps
pub fn format_subtitles_with_timestamps(subtitles: &[SubtitleItem]) -> String {
    subtitles
        .iter()
        .map(|item| format!("[{}] {}", format_timestamp(item.start), item.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_result_readable(result: &AnalysisResult) -> String {
    let mut output = String::new();

    if let Some(source) = result.subtitle_source {
        output.push_str(&format!("**Subtitle source:** {}\n\n", source));
    }

    if let Some(summary) = &result.summary {
        output.push_str("## Summary\n\n");
        output.push_str(summary);
        output.push_str("\n\n");
    }

    output.push_str(&format!("## Subtitles ({})\n\n", result.subtitles.len()));
    if result.subtitles.is_empty() {
        output.push_str("_none_\n");
    } else {
        output.push_str(&format_subtitles_with_timestamps(&result.subtitles));
        output.push('\n');
    }
    output.push('\n');

    if !result.visual_content.is_empty() {
        output.push_str("## On-screen text\n\n");
        for frame in &result.visual_content {
            output.push_str(&format!(
                "[{}] {}\n",
                format_timestamp(frame.timestamp),
                frame.texts.join(" | ")
            ));
        }
        output.push('\n');
    }

    if !result.scene_descriptions.is_empty() {
        output.push_str("## Scenes\n\n");
        for scene in &result.scene_descriptions {
            output.push_str(&format!(
                "[{}] {}\n",
                format_timestamp(scene.timestamp),
                scene.description
            ));
        }
        output.push('\n');
    }

    if !result.glossary.is_empty() {
        output.push_str("## Glossary\n\n");
        for term in &result.glossary {
            output.push_str(&format!("• **{}**: {}\n", term.term, term.definition));
            if let Some(context) = &term.context {
                output.push_str(&format!("  _{}_\n", context));
            }
        }
        output.push('\n');
    }

    if let Some(description) = &result.full_description {
        output.push_str("## Full description\n\n");
        output.push_str(description);
        output.push('\n');
    }

    output
}
