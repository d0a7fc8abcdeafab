use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TranslationService;
use crate::config::TranslateConfig;
use crate::error::{Result, SubflowError};
use crate::language::language_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TranslationPayload {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DetectionPayload {
    language: String,
}

/// Translation and language detection through Ollama's generate API
pub struct OllamaTranslator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OllamaTranslator {
    pub fn new(config: &TranslateConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };
        let url = format!("{}/api/generate", self.endpoint);
        debug!("Sending request to: {}", url);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubflowError::from_status(status, &body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SubflowError::Backend(format!("Failed to parse response: {}", e)))?;
        let raw = generated.response.trim().to_string();
        debug!("Raw Ollama response: {}", raw);

        if raw.is_empty() {
            return Err(SubflowError::Backend("Empty response received".to_string()));
        }
        Ok(raw)
    }
}

pub fn build_translation_prompt(text: &str, source: Option<&str>, target: &str) -> String {
    let target_name = language_name(target).unwrap_or(target);
    let source_line = match source {
        Some(code) => format!(
            "The source language is: {} (language code: {})\n",
            language_name(code).unwrap_or(code),
            code
        ),
        None => String::new(),
    };
    let line_count = text.lines().count();

    format!(
        "You are a professional subtitle translator.\n\
         \n\
         CRITICAL: You must translate the text to {target_name} ONLY.\n\
         {source_line}\
         The target language is: {target_name} (language code: {target})\n\
         The text has {line_count} line(s). Translate each line separately and keep exactly \
         {line_count} line(s) in the same order, separated by newline characters.\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {target_name} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         [Text to translate]\n\
         {text}\n"
    )
}

pub fn build_detection_prompt(text: &str) -> String {
    format!(
        "Identify the language of the following text.\n\
         \n\
         Return ONLY JSON as {{\"language\":\"<ISO 639-1 code>\"}}.\n\
         \n\
         [Text]\n\
         {}\n",
        text
    )
}

/// Pull the translation out of a raw model reply
pub fn parse_translation(raw: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<TranslationPayload>(raw) {
        return payload.text.trim().to_string();
    }
    clean_translation_response(raw)
}

pub fn parse_detected_language(raw: &str) -> Result<String> {
    let code = match serde_json::from_str::<DetectionPayload>(raw) {
        Ok(payload) => payload.language,
        Err(_) => raw.to_string(),
    };
    let code = code.trim().trim_matches('"').to_lowercase();
    if code.is_empty() || code.contains(char::is_whitespace) {
        return Err(SubflowError::Backend(format!(
            "Unrecognized language detection reply: {}",
            raw
        )));
    }
    Ok(code)
}

/// Drop commentary lines models like to add around a translation
fn clean_translation_response(response: &str) -> String {
    let kept: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            !(line.starts_with("Here is")
                || line.starts_with("Here are")
                || line.starts_with("Translation:")
                || (line.starts_with("**") && line.ends_with("**")))
        })
        .collect();

    if kept.is_empty() {
        response.trim().to_string()
    } else {
        kept.join("\n")
    }
}

#[async_trait]
impl TranslationService for OllamaTranslator {
    async fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String> {
        let raw = self
            .generate(build_translation_prompt(text, source, target))
            .await?;
        Ok(parse_translation(&raw))
    }

    async fn detect_language(&self, text: &str) -> Result<String> {
        let raw = self.generate(build_detection_prompt(text)).await?;
        parse_detected_language(&raw)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
