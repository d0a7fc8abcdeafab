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

/// whisper.cpp `--output-json-full` document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    #[serde(default)]
    pub result: Option<WhisperCppResult>,
    #[serde(default)]
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: Option<String>,
}

/// Millisecond offsets relative to the clip
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: WhisperCppOffsets,
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<WhisperCppToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppToken {
    pub text: String,
    pub offsets: WhisperCppOffsets,
    /// Token probability
    pub p: f64,
}

impl WhisperCppToken {
    /// Control tokens such as `[_BEG_]` or `[_TT_150]`
    fn is_special(&self) -> bool {
        self.text.starts_with("[_") && self.text.ends_with(']')
    }
}

pub struct WhisperCppMapper;

impl TranscriptionMapper<WhisperCppOutput> for WhisperCppMapper {
    fn to_recognized(output: WhisperCppOutput, region: &AudioRegion) -> Result<RecognizedSpeech> {
        let text = join_segment_texts(output.transcription.iter().map(|s| s.text.as_str()));

        let tokens: Vec<&WhisperCppToken> = output
            .transcription
            .iter()
            .flat_map(|s| s.tokens.iter())
            .filter(|t| !t.is_special())
            .collect();

        let confidence = mean(tokens.iter().map(|t| t.p)).map(|p| (p as f32).clamp(0.0, 1.0));

        // Sub-word tokens: a leading space starts a new word
        let mut words: Vec<WordTiming> = Vec::new();
        for token in tokens {
            let start = region.start + token.offsets.from as f64 / 1000.0;
            let end = region.start + token.offsets.to as f64 / 1000.0;
            match words.last_mut() {
                Some(word) if !token.text.starts_with(' ') => {
                    word.word.push_str(&token.text);
                    word.end = end;
                }
                _ => {
                    let trimmed = token.text.trim();
                    if !trimmed.is_empty() {
                        words.push(WordTiming {
                            word: trimmed.to_string(),
                            start,
                            end,
                        });
                    }
                }
            }
        }

        Ok(RecognizedSpeech {
            text,
            confidence,
            language: output.result.and_then(|r| r.language),
            words,
        })
    }
}

/// Runs the whisper.cpp command-line binary per clip
pub struct WhisperCppTranscriber {
    binary_path: String,
    model: String,
}

impl WhisperCppTranscriber {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl SpeechTranscriptionService for WhisperCppTranscriber {
    async fn transcribe(&self, asset: &AudioAsset, language: Option<&str>) -> Result<RecognizedSpeech> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| SubflowError::Backend(format!("Failed to create temp directory: {}", e)))?;
        let output_base = temp_dir.path().join("out");

        debug!("whisper.cpp on region {} ({})", asset.region.index, asset.path.display());

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(&asset.path)
            .arg("-l")
            .arg(language.unwrap_or("auto"))
            .arg("--output-json-full")
            .arg("--output-file")
            .arg(&output_base)
            .arg("--no-prints");
        cmd.kill_on_drop(true);

        run_transcriber(cmd, &self.binary_path).await?;

        let output: WhisperCppOutput = read_json(&output_base.with_extension("json")).await?;
        WhisperCppMapper::to_recognized(output, &asset.region)
    }

    fn name(&self) -> &str {
        "whisper.cpp"
    }
}
