use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("WAV decoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Subtitle error: {0}")]
    Subtitle(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SubflowError {
    /// Configuration and authentication failures abort the run outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Authentication(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// No new request may be issued once one of these has been seen.
    pub fn halts_new_work(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::QuotaExceeded(_))
    }

    /// Classify an HTTP status returned by a backend.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{}: {}", status, body.trim());
        match status.as_u16() {
            401 | 403 => Self::Authentication(message),
            429 => Self::QuotaExceeded(message),
            408 => Self::TransientNetwork(message),
            s if s >= 500 => Self::TransientNetwork(message),
            _ => Self::Backend(message),
        }
    }
}

impl From<reqwest::Error> for SubflowError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status, &error.to_string());
        }
        if error.is_timeout() || error.is_connect() || error.is_request() {
            Self::TransientNetwork(error.to_string())
        } else {
            Self::Backend(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SubflowError>;

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Segmentation,
    Transcription,
    Translation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segmentation => write!(f, "segmentation"),
            Self::Transcription => write!(f, "transcription"),
            Self::Translation => write!(f, "translation"),
        }
    }
}

/// A recorded, non-fatal failure of one region or batch.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub stage: Stage,
    /// Region index for segmentation/transcription, batch index for translation.
    pub index: usize,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, index: usize, error: &SubflowError) -> Self {
        Self {
            stage,
            index,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}: {}", self.stage, self.index, self.reason)
    }
}

/// How a dispatch stage finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CompletionStatus {
    #[default]
    Complete,
    /// Stopped early; whatever was obtained before `reason` is still usable.
    Partial { reason: String },
}

impl CompletionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Keeps the first recorded reason when both sides are partial.
    pub fn combine(self, other: CompletionStatus) -> CompletionStatus {
        match (self, other) {
            (Self::Complete, other) => other,
            (partial, _) => partial,
        }
    }
}
