//! In-process stand-ins for the media toolchain and the speech and
//! translation backends. Nothing here touches the network or spawns a
//! process.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use subflow::error::{Result, SubflowError};
use subflow::media::{AudioAsset, AudioToolchain};
use subflow::region::AudioRegion;
use subflow::transcribe::{RecognizedSpeech, SpeechTranscriptionService};
use subflow::translate::TranslationService;

pub const SAMPLE_RATE: u32 = 16_000;

/// Writes a synthetic track: loud where `loud` says so, silent elsewhere.
pub struct FakeToolchain {
    pub duration: f64,
    pub loud: Vec<(f64, f64)>,
    pub extract_calls: AtomicUsize,
}

impl FakeToolchain {
    pub fn new(duration: f64, loud: Vec<(f64, f64)>) -> Self {
        Self {
            duration,
            loud,
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn silent(duration: f64) -> Self {
        Self::new(duration, Vec::new())
    }
}

#[async_trait]
impl AudioToolchain for FakeToolchain {
    async fn extract_audio(&self, _source: &Path, audio_path: &Path) -> Result<()> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(audio_path, spec)?;
        let total = (self.duration * SAMPLE_RATE as f64) as usize;
        for i in 0..total {
            let t = i as f64 / SAMPLE_RATE as f64;
            let loud = self.loud.iter().any(|&(start, end)| t >= start && t < end);
            let sample: i16 = match (loud, i % 2) {
                (true, 0) => 10_000,
                (true, _) => -10_000,
                (false, _) => 0,
            };
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    async fn extract_region(&self, _audio: &Path, region: &AudioRegion, output_dir: &Path) -> Result<AudioAsset> {
        Ok(AudioAsset {
            region: *region,
            path: output_dir.join(format!("region-{:05}.wav", region.index)),
        })
    }

    async fn version_info(&self) -> Result<String> {
        Ok("fake toolchain".to_string())
    }
}

/// Returns a fixed text per region index
pub struct FakeTranscriber {
    texts: Vec<&'static str>,
    pub calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn new(texts: Vec<&'static str>) -> Self {
        Self {
            texts,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeechTranscriptionService for FakeTranscriber {
    async fn transcribe(&self, asset: &AudioAsset, _language: Option<&str>) -> Result<RecognizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.texts.get(asset.region.index).copied().unwrap_or("");
        Ok(RecognizedSpeech::new(text).with_confidence(0.9))
    }

    fn name(&self) -> &str {
        "fake-speech"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorFailure {
    None,
    Auth,
}

/// Prefixes every line with the target language
pub struct FakeTranslator {
    failure: TranslatorFailure,
    pub requests: Mutex<Vec<String>>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self::failing(TranslatorFailure::None)
    }

    pub fn failing(failure: TranslatorFailure) -> Self {
        Self {
            failure,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TranslationService for FakeTranslator {
    async fn translate(&self, text: &str, _source: Option<&str>, target: &str) -> Result<String> {
        self.requests.lock().unwrap().push(text.to_string());
        if self.failure == TranslatorFailure::Auth {
            return Err(SubflowError::Authentication("invalid token".to_string()));
        }
        Ok(text
            .lines()
            .map(|line| format!("[{}] {}", target, line))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn detect_language(&self, _text: &str) -> Result<String> {
        Ok("en".to_string())
    }

    fn name(&self) -> &str {
        "fake-translate"
    }
}
