//! Speech region detection.
//!
//! Regions either come from an external interval list (trusted as-is) or are
//! detected from a frame-level energy stream with a small state machine:
//! a region opens on the first frame reaching the energy threshold, tolerates
//! silence up to `max_continuous_silence`, and closes when that tolerance is
//! exceeded or `max_region_size` is reached.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::RegionConfig;
use crate::error::{Result, SubflowError};

/// A contiguous interval of speech, in seconds. `index` is the ordering key
/// for every later stage regardless of completion order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioRegion {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl AudioRegion {
    pub fn new(index: usize, start: f64, end: f64) -> Self {
        Self { index, start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn with_index(self, index: usize) -> Self {
        Self { index, ..self }
    }
}

/// Frame energies of an audio track on a 0-100 scale.
#[derive(Debug, Clone)]
pub struct EnergyProfile {
    frame_duration: f64,
    frames: Vec<f64>,
}

impl EnergyProfile {
    pub fn new(frame_duration: f64, frames: Vec<f64>) -> Self {
        Self {
            frame_duration,
            frames,
        }
    }

    /// Log energy per frame of mono 16-bit PCM.
    pub fn from_samples(samples: &[i16], sample_rate: u32, frame_duration: f64) -> Self {
        let frame_len = ((sample_rate as f64 * frame_duration).round() as usize).max(1);
        let frames = samples.chunks(frame_len).map(frame_energy).collect();
        Self::new(frame_duration, frames)
    }

    /// Read a WAV file (any channel count is mixed down to mono).
    pub fn from_wav<P: AsRef<Path>>(path: P, frame_duration: f64) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        debug!(
            "Reading energy stream from {} ({} Hz, {} ch, {} bit)",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );

        let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<i16>, hound::Error>>()?,
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16))
                .collect::<std::result::Result<Vec<i16>, hound::Error>>()?,
            (format, bits) => {
                return Err(SubflowError::Media(format!(
                    "Unsupported WAV sample format {:?}/{} bit in {}",
                    format,
                    bits,
                    path.display()
                )));
            }
        };

        let channels = spec.channels.max(1) as usize;
        let mono: Vec<i16> = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32) as i16)
                .collect()
        };

        Ok(Self::from_samples(&mono, spec.sample_rate, frame_duration))
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    pub fn frames(&self) -> &[f64] {
        &self.frames
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 * self.frame_duration
    }

    /// Tightest sub-interval of `[start, end]` whose frames reach `threshold`.
    pub fn active_span(&self, start: f64, end: f64, threshold: f64) -> Option<(f64, f64)> {
        if self.frames.is_empty() || end <= start {
            return None;
        }
        let first = (start / self.frame_duration).floor().max(0.0) as usize;
        let last = ((end / self.frame_duration).ceil() as usize).min(self.frames.len());
        if first >= last {
            return None;
        }

        let active: Vec<usize> = (first..last)
            .filter(|&i| self.frames[i] >= threshold)
            .collect();
        let (lo, hi) = (*active.first()?, *active.last()?);
        let span_start = (lo as f64 * self.frame_duration).max(start);
        let span_end = ((hi + 1) as f64 * self.frame_duration).min(end);
        (span_start < span_end).then_some((span_start, span_end))
    }
}

fn frame_energy(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_square = frame
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum::<f64>()
        / frame.len() as f64;
    if mean_square <= 1.0 {
        return 0.0;
    }
    (10.0 * mean_square.log10()).clamp(0.0, 100.0)
}

pub struct RegionDetector {
    config: RegionConfig,
}

impl RegionDetector {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    /// Use externally supplied intervals without further detection.
    /// Degenerate intervals are skipped; the rest are put in start order.
    pub fn from_intervals(&self, intervals: &[(f64, f64)]) -> Vec<AudioRegion> {
        let mut valid: Vec<(f64, f64)> = intervals
            .iter()
            .copied()
            .filter(|&(start, end)| {
                let ok = start.is_finite() && end.is_finite() && start >= 0.0 && start < end;
                if !ok {
                    warn!("Skipping invalid interval ({}, {})", start, end);
                }
                ok
            })
            .collect();
        valid.sort_by(|a, b| a.0.total_cmp(&b.0));

        let regions = number(valid);
        if regions.is_empty() {
            warn!("No usable regions in the supplied interval list");
        }
        regions
    }

    /// Detect speech regions in an energy stream. Deterministic for identical
    /// input and configuration; an empty result is a warning, not an error.
    pub fn detect(&self, profile: &EnergyProfile) -> Vec<AudioRegion> {
        let fd = profile.frame_duration();
        let frames = profile.frames();
        let threshold = self.config.energy_threshold as f64;
        let min_frames = ((self.config.min_region_size / fd).round() as usize).max(1);
        let max_frames = ((self.config.max_region_size / fd).round() as usize).max(min_frames);
        let max_silence = (self.config.max_continuous_silence / fd).round() as usize;

        let mut spans: Vec<(usize, usize)> = Vec::new();
        // (start frame, last active frame, current silence run)
        let mut open: Option<(usize, usize, usize)> = None;

        for (i, &energy) in frames.iter().enumerate() {
            let active = energy >= threshold;
            open = match open {
                None if active => Some((i, i, 0)),
                None => None,
                Some((start, last_active, silence)) => {
                    let (last_active, silence) = if active { (i, 0) } else { (last_active, silence + 1) };
                    if silence > max_silence {
                        // Keep the tolerated silence, drop the frame that exceeded it
                        self.close(start, i, last_active, min_frames, &mut spans);
                        None
                    } else if i + 1 - start >= max_frames {
                        self.close(start, i + 1, last_active, min_frames, &mut spans);
                        None
                    } else {
                        Some((start, last_active, silence))
                    }
                }
            };
        }
        if let Some((start, last_active, _)) = open {
            self.close(start, frames.len(), last_active, min_frames, &mut spans);
        }

        // Padding may run into the next region or past the end of the track
        let total = frames.len();
        for i in 0..spans.len() {
            let limit = spans.get(i + 1).map(|next| next.0).unwrap_or(total);
            spans[i].1 = spans[i].1.min(limit);
        }
        spans.retain(|&(start, end)| start < end);

        let regions = number(
            spans
                .into_iter()
                .map(|(start, end)| (start as f64 * fd, end as f64 * fd))
                .collect(),
        );

        if regions.is_empty() {
            warn!("No speech regions detected; output will be empty");
        } else {
            info!("Detected {} speech regions", regions.len());
        }
        regions
    }

    fn close(
        &self,
        start: usize,
        end: usize,
        last_active: usize,
        min_frames: usize,
        spans: &mut Vec<(usize, usize)>,
    ) {
        let end = if self.config.drop_trailing_silence {
            last_active + 1
        } else {
            end
        };
        let length = end - start;
        if length >= min_frames {
            spans.push((start, end));
        } else if self.config.not_strict_min_length {
            spans.push((start, start + min_frames));
        } else {
            debug!("Discarding {}-frame region shorter than the minimum", length);
        }
    }
}

fn number(intervals: Vec<(f64, f64)>) -> Vec<AudioRegion> {
    intervals
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| AudioRegion::new(index, start, end))
        .collect()
}
