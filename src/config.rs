use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SubflowError};

// Defaults carried over from the original command-line tool
fn default_energy_threshold() -> u8 {
    45
}

fn default_min_region_size() -> f64 {
    0.5
}

fn default_max_region_size() -> f64 {
    10.0
}

fn default_continuous_silence() -> f64 {
    0.2
}

fn default_frame_duration() -> f64 {
    0.05
}

fn default_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_max_trans_size() -> usize {
    4000
}

fn default_sleep_seconds() -> f64 {
    5.0
}

fn default_max_join_size() -> usize {
    100
}

fn default_delimiters() -> String {
    "!()*,.:;?[]^_`~".to_string()
}

fn default_min_score() -> u8 {
    90
}

fn default_src_language() -> String {
    "auto".to_string()
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

/// Characters replaced by `translate.delete_chars` when the option is given without a value
pub const DEFAULT_DELETE_CHARS: &str = "，。！";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub regions: RegionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to the ffmpeg binary
    pub binary_path: String,
    /// Sample rate of the extracted mono track
    pub sample_rate: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            sample_rate: 16_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Energy level (0-100) a frame must exceed to count as speech
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: u8,
    /// Minimum region size in seconds
    #[serde(default = "default_min_region_size")]
    pub min_region_size: f64,
    /// Maximum region size in seconds
    #[serde(default = "default_max_region_size")]
    pub max_region_size: f64,
    /// Longest silence (seconds) tolerated inside a region
    #[serde(default = "default_continuous_silence")]
    pub max_continuous_silence: f64,
    /// Keep regions shorter than the minimum, padded up to it
    #[serde(default)]
    pub not_strict_min_length: bool,
    /// Trim each region's tail back to its last active frame
    #[serde(default)]
    pub drop_trailing_silence: bool,
    /// Analysis window in seconds
    #[serde(default = "default_frame_duration")]
    pub frame_duration: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            energy_threshold: default_energy_threshold(),
            min_region_size: default_min_region_size(),
            max_region_size: default_max_region_size(),
            max_continuous_silence: default_continuous_silence(),
            not_strict_min_length: false,
            drop_trailing_silence: false,
            frame_duration: default_frame_duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechBackend {
    /// whisper.cpp command-line binary
    WhisperCpp,
    /// OpenAI whisper Python command-line tool
    OpenaiWhisper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    /// Path to the transcriber binary
    pub binary_path: String,
    /// Model name or path handed to the transcriber
    pub model: String,
    /// Speech language; `None` lets the backend detect it
    #[serde(default)]
    pub language: Option<String>,
    /// Results below this confidence are blanked
    #[serde(default)]
    pub min_confidence: f32,
    /// Remove regions without a usable transcript instead of blanking them
    #[serde(default)]
    pub drop_empty_regions: bool,
    /// Maximum in-flight transcription calls
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum concurrent region extractions
    #[serde(default = "default_concurrency")]
    pub split_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::WhisperCpp,
            binary_path: "whisper-cli".to_string(),
            model: "models/ggml-base.bin".to_string(),
            language: None,
            min_confidence: 0.0,
            drop_empty_regions: false,
            concurrency: default_concurrency(),
            split_concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: Some(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationBackend {
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub backend: TranslationBackend,
    /// Backend endpoint URL
    pub endpoint: String,
    /// Model used for translation and language detection
    pub model: String,
    /// Bearer token, if the endpoint requires one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Source language, or "auto" to detect it once from the first batch
    #[serde(default = "default_src_language")]
    pub src_language: String,
    /// Destination language; translation is skipped when unset
    #[serde(default)]
    pub dst_language: Option<String>,
    /// Maximum characters per translation request
    #[serde(default = "default_max_trans_size")]
    pub max_trans_size: usize,
    /// Mandatory pause between two consecutive requests
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: f64,
    /// Maximum in-flight translation calls
    #[serde(default = "default_translate_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Strip ASS override codes before sending text
    #[serde(default)]
    pub drop_override_codes: bool,
    /// Characters replaced with a space after translation
    #[serde(default)]
    pub delete_chars: Option<String>,
}

fn default_translate_concurrency() -> usize {
    1
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
            src_language: default_src_language(),
            dst_language: None,
            max_trans_size: default_max_trans_size(),
            sleep_seconds: default_sleep_seconds(),
            concurrency: default_translate_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: Some(300),
            drop_override_codes: false,
            delete_chars: None,
        }
    }
}

/// What to do with a language code that has no good enough best match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedLanguage {
    /// Report a configuration error
    #[default]
    Fail,
    /// Warn and send the raw code to the backend
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Minimum best-match score (0-100)
    #[serde(default = "default_min_score")]
    pub min_score: u8,
    #[serde(default)]
    pub on_unresolved: UnresolvedLanguage,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            on_unresolved: UnresolvedLanguage::Fail,
        }
    }
}

/// Inline karaoke tag that marks "do not split here"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTag {
    K,
    Ko,
    Kf,
}

impl KeyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::K => "\\k",
            Self::Ko => "\\ko",
            Self::Kf => "\\kf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoMode {
    /// Join across region boundaries reported by the detector
    ExtAuto,
    /// Split at sentence punctuation, then join
    PunctAuto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintAction {
    Merge,
    Split,
}

/// Human-supplied verdict for the boundary after source region `after`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryHint {
    pub after: usize,
    pub action: HintAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default)]
    pub key_tag: Option<KeyTag>,
    /// Auto strategies, applied in order
    #[serde(default)]
    pub auto_modes: Vec<AutoMode>,
    /// Never split, only merge
    #[serde(default)]
    pub dont_split: bool,
    /// Uppercase the first letter and add a full stop
    #[serde(default)]
    pub capitalize: bool,
    /// Clip events to their speech content
    #[serde(default)]
    pub trim: bool,
    #[serde(default = "default_max_join_size")]
    pub max_join_size: usize,
    #[serde(default = "default_continuous_silence")]
    pub max_delta_time: f64,
    /// Characters that forbid a join when found at the boundary
    #[serde(default = "default_delimiters")]
    pub delimiters: String,
    /// Split when the left event ends with one of these
    #[serde(default)]
    pub stop_words_1: Vec<String>,
    /// Split when the right event starts with one of these
    #[serde(default)]
    pub stop_words_2: Vec<String>,
    /// Boundary hints applied after the auto passes
    #[serde(default)]
    pub hints: Vec<BoundaryHint>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            key_tag: None,
            auto_modes: Vec::new(),
            dont_split: false,
            capitalize: false,
            trim: false,
            max_join_size: default_max_join_size(),
            max_delta_time: default_continuous_silence(),
            delimiters: default_delimiters(),
            stop_words_1: Vec::new(),
            stop_words_2: Vec::new(),
            hints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub https_proxy: Option<String>,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub proxy_username: Option<String>,
    #[serde(default)]
    pub proxy_password: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputText {
    Source,
    /// Translation when available, source otherwise
    #[default]
    Destination,
    /// Translation above source
    Bilingual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub text: OutputText,
    /// How long in-flight requests may run after an abort
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// Style name attached to every event; formats without styles ignore it
    #[serde(default)]
    pub style: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            text: OutputText::default(),
            cancel_grace_ms: default_cancel_grace_ms(),
            style: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubflowError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| SubflowError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubflowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubflowError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject invalid or incompatible options before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.media.sample_rate == 0 {
            return Err(invalid("media.sample_rate must be positive"));
        }

        let regions = &self.regions;
        if regions.energy_threshold > 100 {
            return Err(invalid("regions.energy_threshold must be between 0 and 100"));
        }
        if regions.frame_duration <= 0.0 {
            return Err(invalid("regions.frame_duration must be positive"));
        }
        if regions.min_region_size <= 0.0 || regions.min_region_size >= regions.max_region_size {
            return Err(invalid("regions.min_region_size must be positive and below max_region_size"));
        }
        if regions.max_continuous_silence < 0.0 {
            return Err(invalid("regions.max_continuous_silence cannot be negative"));
        }

        let speech = &self.speech;
        if !(0.0..=1.0).contains(&speech.min_confidence) {
            return Err(invalid("speech.min_confidence must be between 0 and 1"));
        }
        if speech.concurrency == 0 || speech.split_concurrency == 0 {
            return Err(invalid("speech concurrency must be at least 1"));
        }
        if speech.max_attempts == 0 {
            return Err(invalid("speech.max_attempts must be at least 1"));
        }

        let translate = &self.translate;
        if translate.concurrency == 0 {
            return Err(invalid("translate.concurrency must be at least 1"));
        }
        if translate.max_attempts == 0 {
            return Err(invalid("translate.max_attempts must be at least 1"));
        }
        if translate.max_trans_size == 0 {
            return Err(invalid("translate.max_trans_size must be at least 1"));
        }
        if translate.sleep_seconds < 0.0 {
            return Err(invalid("translate.sleep_seconds cannot be negative"));
        }
        if translate.dst_language.as_deref() == Some("auto") {
            return Err(invalid("translate.dst_language cannot be \"auto\""));
        }

        if self.language.min_score > 100 {
            return Err(invalid("language.min_score must be between 0 and 100"));
        }

        let join = &self.join;
        if join.key_tag.is_some() && !join.auto_modes.is_empty() {
            return Err(invalid("join.key_tag cannot be combined with an auto join mode"));
        }
        if join.max_delta_time < 0.0 {
            return Err(invalid("join.max_delta_time cannot be negative"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> SubflowError {
    SubflowError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.regions.energy_threshold, 45);
        assert_eq!(config.translate.max_trans_size, 4000);
        assert_eq!(config.join.delimiters, "!()*,.:;?[]^_`~");
    }

    #[test]
    fn test_key_tag_with_auto_mode_is_rejected() {
        let mut config = Config::default();
        config.join.key_tag = Some(KeyTag::Kf);
        config.join.auto_modes = vec![AutoMode::PunctAuto];
        assert!(matches!(config.validate(), Err(SubflowError::Config(_))));
    }

    #[test]
    fn test_region_bounds_are_checked() {
        let mut config = Config::default();
        config.regions.min_region_size = 12.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speech.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subflow.toml");

        let mut config = Config::default();
        config.translate.dst_language = Some("ja".to_string());
        config.join.auto_modes = vec![AutoMode::ExtAuto, AutoMode::PunctAuto];
        config.join.hints = vec![BoundaryHint { after: 3, action: HintAction::Split }];
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.translate.dst_language.as_deref(), Some("ja"));
        assert_eq!(loaded.join.auto_modes, vec![AutoMode::ExtAuto, AutoMode::PunctAuto]);
        assert_eq!(loaded.join.hints[0].after, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [join]
            auto_modes = ["ext-auto"]
            stop_words_2 = ["friend."]
            "#,
        )
        .unwrap();
        assert_eq!(config.join.max_join_size, 100);
        assert_eq!(config.join.stop_words_2, vec!["friend.".to_string()]);
        assert_eq!(config.speech.concurrency, 10);
    }
}
