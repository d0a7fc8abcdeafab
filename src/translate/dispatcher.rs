use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::TranslationService;
use super::batch::{TranslationBatch, build_batches};
use super::shaping::{apply_delete_chars, strip_override_codes};
use crate::cancel::AbortSignal;
use crate::config::{DEFAULT_DELETE_CHARS, LanguageConfig, TranslateConfig};
use crate::error::{CompletionStatus, ItemFailure, Result, Stage, SubflowError};
use crate::language::{match_score, resolve};
use crate::retry::{RetryPolicy, within};

/// Enforces a minimum delay between the starts of consecutive calls.
pub struct Pacer {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait for this caller's slot. Callers queue on the lock, so the
    /// spacing holds across concurrent workers.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready = previous + self.interval;
            if ready > Instant::now() {
                debug!("Pacing next request by {:?}", ready - Instant::now());
                tokio::time::sleep_until(ready).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct TranslationPolicy {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Bounds each backend call, not the wait for a pacing slot
    pub request_timeout: Option<Duration>,
    pub pace: Duration,
    pub max_chars: usize,
    pub cancel_grace: Duration,
    pub drop_override_codes: bool,
    pub delete_chars: Option<String>,
    pub language: LanguageConfig,
}

impl TranslationPolicy {
    pub fn from_config(config: &TranslateConfig, language: &LanguageConfig, cancel_grace_ms: u64) -> Self {
        let delete_chars = config.delete_chars.as_ref().map(|chars| {
            if chars.is_empty() {
                DEFAULT_DELETE_CHARS.to_string()
            } else {
                chars.clone()
            }
        });
        Self {
            concurrency: config.concurrency,
            retry: RetryPolicy::new(
                config.max_attempts,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
            pace: Duration::from_secs_f64(config.sleep_seconds.max(0.0)),
            max_chars: config.max_trans_size,
            cancel_grace: Duration::from_millis(cancel_grace_ms),
            drop_override_codes: config.drop_override_codes,
            delete_chars,
            language: language.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TranslationOutcome {
    /// Aligned with the input; `None` where no translation was obtained
    pub translations: Vec<Option<String>>,
    pub failures: Vec<ItemFailure>,
    pub status: CompletionStatus,
    /// Resolved or detected source language
    pub source_language: Option<String>,
    pub target_language: String,
}

/// Batches texts and sends them to a translation backend, paced and
/// concurrency-bounded.
pub struct TranslationDispatcher {
    service: Arc<dyn TranslationService>,
    policy: TranslationPolicy,
    pacer: Pacer,
}

impl TranslationDispatcher {
    pub fn new(service: Arc<dyn TranslationService>, policy: TranslationPolicy) -> Self {
        let pacer = Pacer::new(policy.pace);
        Self {
            service,
            policy,
            pacer,
        }
    }

    /// Translate `texts` from `source` ("auto" to detect) into `target`.
    ///
    /// Language codes that cannot be resolved fail before any request. An
    /// authentication or quota failure stops the stage, keeps translations
    /// already obtained and reports `Partial`; other batch failures are
    /// recorded and leave their texts untranslated.
    pub async fn dispatch(
        &self,
        texts: &[String],
        source: &str,
        target: &str,
        signal: &AbortSignal,
    ) -> Result<TranslationOutcome> {
        let supported = self.service.supported_languages();
        let target = resolve(target, supported, &self.policy.language)?;
        let explicit_source = if source.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(resolve(source, supported, &self.policy.language)?)
        };

        let shaped: Vec<String> = texts
            .iter()
            .map(|t| {
                if self.policy.drop_override_codes {
                    strip_override_codes(t)
                } else {
                    t.clone()
                }
            })
            .collect();

        let mut outcome = TranslationOutcome {
            translations: shaped
                .iter()
                .map(|t| t.trim().is_empty().then(String::new))
                .collect(),
            target_language: target.clone(),
            ..Default::default()
        };

        let batches = build_batches(&shaped, self.policy.max_chars);
        info!(
            "Translating {} texts in {} batches with {} (to {})",
            texts.len(),
            batches.len(),
            self.service.name(),
            target
        );
        if batches.is_empty() {
            outcome.source_language = explicit_source;
            return Ok(outcome);
        }

        outcome.source_language = match explicit_source {
            Some(code) => Some(code),
            None => match self.detect_source(&batches[0], signal).await {
                Ok(code) => code,
                Err(e) => {
                    warn!("Language detection failed, stopping translation: {}", e);
                    outcome.failures.push(ItemFailure::new(Stage::Translation, 0, &e));
                    outcome.status = CompletionStatus::Partial {
                        reason: e.to_string(),
                    };
                    return Ok(outcome);
                }
            },
        };

        if let Some(src) = &outcome.source_language {
            if match_score(src, &target) == 100 {
                info!("Source and target are both '{}', skipping translation", target);
                for (slot, text) in outcome.translations.iter_mut().zip(&shaped) {
                    *slot = Some(text.trim().to_string());
                }
                return Ok(outcome);
            }
        }

        let source = outcome.source_language.clone();
        self.translate_batches(&batches, source.as_deref(), &target, signal, &mut outcome)
            .await;

        info!(
            "Translation finished: {} of {} texts translated, {} batches failed",
            outcome.translations.iter().filter(|t| t.is_some()).count(),
            texts.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    async fn translate_batches(
        &self,
        batches: &[TranslationBatch],
        source: Option<&str>,
        target: &str,
        signal: &AbortSignal,
        outcome: &mut TranslationOutcome,
    ) {
        let halted = AtomicBool::new(false);
        let mut completions = pin!(
            stream::iter(batches)
                .take_while(|_| {
                    let proceed = !signal.is_aborted() && !halted.load(Ordering::SeqCst);
                    async move { proceed }
                })
                .map(|batch| async move {
                    let request = self.translate_batch(batch, source, target, signal);
                    (batch, signal.guard(self.policy.cancel_grace, request).await)
                })
                .buffer_unordered(self.policy.concurrency.max(1)),
        );

        let mut settled = 0;
        while let Some((batch, result)) = completions.next().await {
            settled += 1;
            match result {
                Ok(lines) => {
                    for (position, line) in batch.positions.iter().zip(lines) {
                        outcome.translations[*position] = Some(self.postprocess(&line));
                    }
                }
                Err(e) => {
                    outcome
                        .failures
                        .push(ItemFailure::new(Stage::Translation, batch.index, &e));
                    if e.is_fatal() {
                        error!("Batch {} failed fatally, stopping translation: {}", batch.index, e);
                        outcome.status = outcome.status.clone().combine(CompletionStatus::Partial {
                            reason: e.to_string(),
                        });
                        break;
                    }
                    if e.halts_new_work() && !halted.swap(true, Ordering::SeqCst) {
                        warn!("Stopping new translation requests: {}", e);
                        outcome.status = outcome.status.clone().combine(CompletionStatus::Partial {
                            reason: e.to_string(),
                        });
                    }
                    if matches!(e, SubflowError::Cancelled) {
                        outcome.status = outcome.status.clone().combine(CompletionStatus::Partial {
                            reason: "translation aborted".to_string(),
                        });
                    }
                    warn!("Batch {} failed: {}", batch.index, e);
                }
            }
        }

        if settled < batches.len() {
            outcome.status = outcome.status.clone().combine(CompletionStatus::Partial {
                reason: format!(
                    "translation stopped after {} of {} batches",
                    settled,
                    batches.len()
                ),
            });
        }
        outcome.failures.sort_by_key(|f| f.index);
    }

    /// Detect the source language once from the first batch.
    async fn detect_source(
        &self,
        batch: &TranslationBatch,
        signal: &AbortSignal,
    ) -> Result<Option<String>> {
        let sample = batch.joined();
        let sample = sample.as_str();
        let timeout = self.policy.request_timeout;
        let request = self.policy.retry.run("language detection", signal, |_| async move {
            self.pacer.wait().await;
            within(timeout, self.service.detect_language(sample)).await
        });

        let detected = match signal.guard(self.policy.cancel_grace, request).await {
            Ok(code) => code,
            Err(e) if e.halts_new_work() || e.is_fatal() || matches!(e, SubflowError::Cancelled) => {
                return Err(e);
            }
            Err(e) => {
                warn!("Could not detect source language, letting the backend infer it: {}", e);
                return Ok(None);
            }
        };

        match resolve(&detected, self.service.supported_languages(), &self.policy.language) {
            Ok(code) => {
                info!("Detected source language: {}", code);
                Ok(Some(code))
            }
            Err(e) => {
                warn!("Detected language '{}' is not usable: {}", detected, e);
                Ok(None)
            }
        }
    }

    /// One request for the whole batch, falling back to one request per text
    /// when the reply loses line boundaries.
    async fn translate_batch(
        &self,
        batch: &TranslationBatch,
        source: Option<&str>,
        target: &str,
        signal: &AbortSignal,
    ) -> Result<Vec<String>> {
        let label = format!("batch {}", batch.index);
        let response = self
            .request(&batch.joined(), source, target, &label, signal)
            .await?;

        if batch.texts.len() == 1 {
            return Ok(vec![single_line(&response)]);
        }
        if let Some(lines) = batch.unbatch(&response) {
            return Ok(lines);
        }

        warn!(
            "Batch {} lost its line structure, translating its {} texts one by one",
            batch.index,
            batch.texts.len()
        );
        let mut lines = Vec::with_capacity(batch.texts.len());
        for (offset, text) in batch.texts.iter().enumerate() {
            let label = format!("batch {} text {}", batch.index, offset);
            let response = self.request(text, source, target, &label, signal).await?;
            lines.push(single_line(&response));
        }
        Ok(lines)
    }

    async fn request(
        &self,
        text: &str,
        source: Option<&str>,
        target: &str,
        label: &str,
        signal: &AbortSignal,
    ) -> Result<String> {
        let timeout = self.policy.request_timeout;
        self.policy
            .retry
            .run(label, signal, |_| async move {
                self.pacer.wait().await;
                within(timeout, self.service.translate(text, source, target)).await
            })
            .await
    }

    fn postprocess(&self, line: &str) -> String {
        match &self.policy.delete_chars {
            Some(chars) => apply_delete_chars(line, chars).trim().to_string(),
            None => line.trim().to_string(),
        }
    }
}

fn single_line(response: &str) -> String {
    response.split_whitespace().collect::<Vec<_>>().join(" ")
}
