// Speech transcription
//
// Backends implement SpeechTranscriptionService for a single clip; the
// dispatcher fans clips out to a backend with bounded concurrency.
//
// To add a backend:
// 1. Define serde structs for its output
// 2. Implement TranscriptionMapper to turn them into RecognizedSpeech
// 3. Add a SpeechBackend variant and a factory arm

pub mod common;
pub mod dispatcher;
pub mod openai;
pub mod whisper_cpp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use common::*;
pub use dispatcher::*;

use crate::config::{SpeechBackend, SpeechConfig};
use crate::error::Result;
use crate::language::SPEECH_LANGUAGES;
use crate::media::AudioAsset;

/// Timing of one recognized word, in seconds on the media timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Backend result for one region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpeech {
    pub text: String,
    /// 0.0-1.0; `None` when the backend does not report one
    pub confidence: Option<f32>,
    pub language: Option<String>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
}

impl RecognizedSpeech {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// The explicit "nothing usable" marker
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Speech extent from word timings, if any were reported
    pub fn speech_span(&self) -> Option<(f64, f64)> {
        let start = self.words.iter().map(|w| w.start).reduce(f64::min)?;
        let end = self.words.iter().map(|w| w.end).reduce(f64::max)?;
        (end > start).then_some((start, end))
    }
}

/// External speech-to-text collaborator
#[async_trait]
pub trait SpeechTranscriptionService: Send + Sync {
    /// Recognize the speech in one clip. `language` is already resolved
    /// against `supported_languages`; `None` asks the backend to detect it.
    async fn transcribe(&self, asset: &AudioAsset, language: Option<&str>) -> Result<RecognizedSpeech>;

    fn name(&self) -> &str;

    fn supported_languages(&self) -> &'static [&'static str] {
        SPEECH_LANGUAGES
    }
}

pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create(config: &SpeechConfig) -> Arc<dyn SpeechTranscriptionService> {
        match config.backend {
            SpeechBackend::WhisperCpp => Arc::new(whisper_cpp::WhisperCppTranscriber::new(config)),
            SpeechBackend::OpenaiWhisper => Arc::new(openai::OpenAITranscriber::new(config)),
        }
    }
}
