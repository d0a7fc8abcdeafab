// Translation
//
// - client: shared HTTP client setup
// - ollama: Ollama backend
// - batch: character-budget batching
// - shaping: pre/post text shaping
// - dispatcher: paced, concurrency-bounded batch dispatch

pub mod batch;
pub mod client;
pub mod dispatcher;
pub mod ollama;
pub mod shaping;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

pub use batch::*;
pub use client::*;
pub use dispatcher::*;

use crate::config::{TranslateConfig, TranslationBackend};
use crate::error::Result;
use crate::language::TRANSLATION_LANGUAGES;

/// External translation collaborator
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate `text`, keeping one output line per input line.
    /// `source` is `None` when the backend should infer it.
    async fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String>;

    /// Language code of `text`
    async fn detect_language(&self, text: &str) -> Result<String>;

    fn name(&self) -> &str;

    fn supported_languages(&self) -> &'static [&'static str] {
        TRANSLATION_LANGUAGES
    }
}

pub struct TranslatorFactory;

impl TranslatorFactory {
    /// `client` is the shared, pre-configured HTTP client
    pub fn create(config: &TranslateConfig, client: Client) -> Arc<dyn TranslationService> {
        match config.backend {
            TranslationBackend::Ollama => Arc::new(ollama::OllamaTranslator::new(config, client)),
        }
    }
}
