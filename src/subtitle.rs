use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs;
use tracing::{info, warn};

use crate::config::OutputText;
use crate::error::{Result, SubflowError};

static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d+):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timestamp pattern")
});

/// Final timed text unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleEvent {
    pub start: f64,
    pub end: f64,
    pub src_text: String,
    pub dst_text: Option<String>,
    pub style_ref: Option<String>,
    /// Translation was requested but not obtained for some of the text
    pub missing_translation: bool,
}

impl SubtitleEvent {
    pub fn new<S: Into<String>>(start: f64, end: f64, src_text: S) -> Self {
        Self {
            start,
            end,
            src_text: src_text.into(),
            dst_text: None,
            style_ref: None,
            missing_translation: false,
        }
    }

    /// Text to emit for the chosen output mode
    pub fn text_for(&self, mode: OutputText) -> String {
        match (mode, &self.dst_text) {
            (OutputText::Source, _) | (_, None) => self.src_text.clone(),
            (OutputText::Destination, Some(dst)) => dst.clone(),
            (OutputText::Bilingual, Some(dst)) => format!("{}\n{}", dst, self.src_text),
        }
    }
}

/// Concrete subtitle file format
pub trait SubtitleCodec: Send + Sync {
    fn extension(&self) -> &'static str;

    fn format(&self, events: &[SubtitleEvent], mode: OutputText) -> String;

    fn parse(&self, content: &str) -> Result<Vec<SubtitleEvent>>;
}

pub struct SrtCodec;

impl SubtitleCodec for SrtCodec {
    fn extension(&self) -> &'static str {
        "srt"
    }

    fn format(&self, events: &[SubtitleEvent], mode: OutputText) -> String {
        let mut srt_content = String::new();

        for (index, event) in events.iter().enumerate() {
            srt_content.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                index + 1,
                format_srt_time(event.start),
                format_srt_time(event.end),
                event.text_for(mode).trim()
            ));
        }
        srt_content
    }

    fn parse(&self, content: &str) -> Result<Vec<SubtitleEvent>> {
        let mut events = Vec::new();
        let mut timing: Option<(f64, f64)> = None;
        let mut text = String::new();

        let mut flush = |timing: &mut Option<(f64, f64)>, text: &mut String| {
            if let Some((start, end)) = timing.take() {
                if end > start {
                    events.push(SubtitleEvent::new(start, end, text.trim()));
                } else {
                    warn!("Skipping cue with non-positive duration at {:.3}s", start);
                }
            }
            text.clear();
        };

        let mut after_blank = true;
        for line in content.lines() {
            let trimmed = line.trim_start_matches('\u{feff}').trim();
            if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                flush(&mut timing, &mut text);
                timing = Some((parse_srt_time(&caps, 1), parse_srt_time(&caps, 5)));
                after_blank = false;
                continue;
            }
            if trimmed.is_empty() {
                after_blank = true;
                continue;
            }
            // Cue number of the next entry
            if after_blank && trimmed.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            after_blank = false;
            if timing.is_some() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(trimmed);
            }
        }
        flush(&mut timing, &mut text);

        if events.is_empty() {
            return Err(SubflowError::Subtitle(
                "No valid subtitle entries were found".to_string(),
            ));
        }
        events.sort_by(|a, b| a.start.total_cmp(&b.start));
        Ok(events)
    }
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

fn parse_srt_time(caps: &regex::Captures, start_idx: usize) -> f64 {
    let field = |i: usize| -> f64 {
        caps.get(start_idx + i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0) as f64
    };
    field(0) * 3600.0 + field(1) * 60.0 + field(2) + field(3) / 1000.0
}

pub async fn write_subtitles<P: AsRef<Path>>(
    codec: &dyn SubtitleCodec,
    events: &[SubtitleEvent],
    mode: OutputText,
    output_path: P,
) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Writing {} subtitle events to {}", events.len(), output_path.display());
    fs::write(output_path, codec.format(events, mode)).await?;
    Ok(())
}

pub async fn read_subtitles<P: AsRef<Path>>(codec: &dyn SubtitleCodec, path: P) -> Result<Vec<SubtitleEvent>> {
    let content = fs::read_to_string(path.as_ref()).await?;
    codec.parse(&content)
}
