// OpenAI Whisper command-line implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::common::{TranscriptionMapper, join_segment_texts, mean, read_json, run_transcriber};
use super::{RecognizedSpeech, SpeechTranscriptionService, WordTiming};
use crate::config::SpeechConfig;
use crate::error::{Result, SubflowError};
use crate::media::AudioAsset;
use crate::region::AudioRegion;

/// OpenAI Whisper JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperOutput {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<OpenAIWhisperSegment>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
    #[serde(default)]
    pub words: Vec<OpenAIWhisperWord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

pub struct OpenAIWhisperMapper;

impl TranscriptionMapper<OpenAIWhisperOutput> for OpenAIWhisperMapper {
    fn to_recognized(output: OpenAIWhisperOutput, region: &AudioRegion) -> Result<RecognizedSpeech> {
        let text = if output.segments.is_empty() {
            join_segment_texts([output.text.as_str()])
        } else {
            join_segment_texts(output.segments.iter().map(|s| s.text.as_str()))
        };

        // Log probability to a 0-1 score
        let confidence = mean(output.segments.iter().filter_map(|s| s.avg_logprob))
            .map(|logprob| (logprob.exp() as f32).clamp(0.0, 1.0));

        let words = output
            .segments
            .iter()
            .flat_map(|s| s.words.iter())
            .filter(|w| !w.word.trim().is_empty())
            .map(|w| WordTiming {
                word: w.word.trim().to_string(),
                start: region.start + w.start,
                end: region.start + w.end,
            })
            .collect();

        Ok(RecognizedSpeech {
            text,
            confidence,
            language: output.language,
            words,
        })
    }
}

/// Runs the `whisper` Python command-line tool per clip
pub struct OpenAITranscriber {
    binary_path: String,
    model: String,
}

impl OpenAITranscriber {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl SpeechTranscriptionService for OpenAITranscriber {
    async fn transcribe(&self, asset: &AudioAsset, language: Option<&str>) -> Result<RecognizedSpeech> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| SubflowError::Backend(format!("Failed to create temp directory: {}", e)))?;
        let output_dir = temp_dir.path();

        debug!("openai-whisper on region {} with model {}", asset.region.index, self.model);

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg(&asset.path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--output_format")
            .arg("json")
            .arg("--word_timestamps")
            .arg("True")
            .arg("--fp16")
            .arg("False");
        if let Some(lang) = language {
            cmd.arg("--language").arg(lang);
        }
        cmd.kill_on_drop(true);

        run_transcriber(cmd, &self.binary_path).await?;

        let stem = asset
            .path
            .file_stem()
            .ok_or_else(|| SubflowError::Backend("Invalid audio filename".to_string()))?;
        let json_file = output_dir.join(format!("{}.json", stem.to_string_lossy()));

        let output: OpenAIWhisperOutput = read_json(&json_file).await?;
        OpenAIWhisperMapper::to_recognized(output, &asset.region)
    }

    fn name(&self) -> &str {
        "openai-whisper"
    }
}
