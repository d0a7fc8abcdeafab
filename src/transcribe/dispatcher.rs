use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{RecognizedSpeech, SpeechTranscriptionService};
use crate::cancel::AbortSignal;
use crate::config::SpeechConfig;
use crate::error::{CompletionStatus, ItemFailure, Result, Stage, SubflowError};
use crate::media::AudioAsset;
use crate::region::AudioRegion;
use crate::retry::RetryPolicy;

/// Knobs for one transcription run.
#[derive(Debug, Clone)]
pub struct TranscriptionPolicy {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub min_confidence: f32,
    pub drop_empty: bool,
    /// How long in-flight calls may run after an abort
    pub cancel_grace: Duration,
}

impl TranscriptionPolicy {
    pub fn from_config(config: &SpeechConfig, cancel_grace_ms: u64) -> Self {
        Self {
            concurrency: config.concurrency,
            retry: RetryPolicy::new(
                config.max_attempts,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            )
            .with_timeout(config.request_timeout_secs.map(Duration::from_secs)),
            min_confidence: config.min_confidence,
            drop_empty: config.drop_empty_regions,
            cancel_grace: Duration::from_millis(cancel_grace_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedRegion {
    pub region: AudioRegion,
    pub speech: RecognizedSpeech,
}

#[derive(Debug, Default)]
pub struct TranscriptionOutcome {
    /// One entry per attempted region, in region order
    pub results: Vec<TranscribedRegion>,
    pub failures: Vec<ItemFailure>,
    /// Regions removed by the drop-empty policy
    pub dropped: usize,
    pub status: CompletionStatus,
}

/// Fans clips out to a speech backend with bounded concurrency.
pub struct TranscriptionDispatcher {
    service: Arc<dyn SpeechTranscriptionService>,
    policy: TranscriptionPolicy,
}

impl TranscriptionDispatcher {
    pub fn new(service: Arc<dyn SpeechTranscriptionService>, policy: TranscriptionPolicy) -> Self {
        Self { service, policy }
    }

    /// Transcribe every asset and return results in region order.
    ///
    /// Authentication and configuration failures abort immediately and drop
    /// all in-flight calls. A quota failure or an abort stops new calls, lets
    /// in-flight ones settle, and returns what was obtained as `Partial`.
    /// Any other failure is recorded against its region, which stays in the
    /// output as an empty marker.
    pub async fn dispatch(
        &self,
        assets: Vec<AudioAsset>,
        language: Option<&str>,
        signal: &AbortSignal,
    ) -> Result<TranscriptionOutcome> {
        let total = assets.len();
        info!(
            "Transcribing {} regions with {} (concurrency {})",
            total,
            self.service.name(),
            self.policy.concurrency
        );

        let halted = AtomicBool::new(false);
        let mut completions = pin!(
            stream::iter(assets)
                .take_while(|_| {
                    let proceed = !signal.is_aborted() && !halted.load(Ordering::SeqCst);
                    async move { proceed }
                })
                .map(|asset| async move {
                    let label = format!("{} region {}", self.service.name(), asset.region.index);
                    let clip = &asset;
                    let request = self
                        .policy
                        .retry
                        .run(&label, signal, move |_| self.service.transcribe(clip, language));
                    let result = signal.guard(self.policy.cancel_grace, request).await;
                    (asset.region, result)
                })
                .buffer_unordered(self.policy.concurrency.max(1)),
        );

        let mut outcome = TranscriptionOutcome::default();
        let mut results = Vec::with_capacity(total);
        let mut settled = 0;

        while let Some((region, result)) = completions.next().await {
            settled += 1;
            match result {
                Ok(speech) => {
                    debug!("Region {} transcribed: {:?}", region.index, speech.text);
                    results.push(TranscribedRegion { region, speech });
                }
                Err(e) if e.is_fatal() => {
                    error!("Region {} failed fatally, aborting transcription: {}", region.index, e);
                    return Err(e);
                }
                Err(e) => {
                    if e.halts_new_work() && !halted.swap(true, Ordering::SeqCst) {
                        warn!("Stopping new transcription requests: {}", e);
                        outcome.status = outcome.status.combine(CompletionStatus::Partial {
                            reason: e.to_string(),
                        });
                    }
                    if matches!(e, SubflowError::Cancelled) {
                        outcome.status = outcome.status.combine(CompletionStatus::Partial {
                            reason: "transcription aborted".to_string(),
                        });
                    }
                    warn!("Region {} failed: {}", region.index, e);
                    outcome
                        .failures
                        .push(ItemFailure::new(Stage::Transcription, region.index, &e));
                    results.push(TranscribedRegion {
                        region,
                        speech: RecognizedSpeech::empty(),
                    });
                }
            }
        }

        if settled < total {
            outcome.status = outcome.status.combine(CompletionStatus::Partial {
                reason: format!(
                    "transcription stopped after {} of {} regions",
                    settled, total
                ),
            });
        }

        results.sort_by_key(|r| r.region.index);
        outcome.failures.sort_by_key(|f| f.index);
        let (results, dropped) = self.apply_result_policy(results);
        outcome.results = results;
        outcome.dropped = dropped;

        info!(
            "Transcription finished: {} regions, {} failed, {} dropped",
            outcome.results.len(),
            outcome.failures.len(),
            outcome.dropped
        );
        Ok(outcome)
    }

    /// Blank low-confidence results, then drop empty regions if asked and
    /// renumber the survivors.
    fn apply_result_policy(
        &self,
        mut results: Vec<TranscribedRegion>,
    ) -> (Vec<TranscribedRegion>, usize) {
        for result in results.iter_mut() {
            // Unreported confidence counts as certain
            let confidence = result.speech.confidence.unwrap_or(1.0);
            if confidence < self.policy.min_confidence && !result.speech.is_empty() {
                debug!(
                    "Region {} below confidence ({:.2} < {:.2}), blanking",
                    result.region.index, confidence, self.policy.min_confidence
                );
                result.speech = RecognizedSpeech::empty();
            }
        }

        let before = results.len();
        if self.policy.drop_empty {
            results.retain(|r| !r.speech.is_empty());
        }
        let dropped = before - results.len();

        for (position, result) in results.iter_mut().enumerate() {
            result.region = result.region.with_index(position);
        }
        (results, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{AbortHandle, abort_pair};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    type Script = dyn Fn(usize, u32) -> (u64, Result<RecognizedSpeech>) + Send + Sync;

    /// Replies per (region index, attempt) after a delay
    struct ScriptedTranscriber {
        script: Box<Script>,
        attempts: Mutex<HashMap<usize, u32>>,
        calls: AtomicUsize,
        abort_on: Option<(usize, AbortHandle)>,
    }

    impl ScriptedTranscriber {
        fn new<F>(script: F) -> Self
        where
            F: Fn(usize, u32) -> (u64, Result<RecognizedSpeech>) + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                attempts: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                abort_on: None,
            }
        }
    }

    #[async_trait]
    impl SpeechTranscriptionService for ScriptedTranscriber {
        async fn transcribe(&self, asset: &AudioAsset, _language: Option<&str>) -> Result<RecognizedSpeech> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let entry = attempts.entry(asset.region.index).or_insert(0);
                *entry += 1;
                *entry
            };
            if let Some((index, handle)) = &self.abort_on {
                if *index == asset.region.index {
                    handle.abort();
                }
            }
            let (delay, result) = (self.script)(asset.region.index, attempt);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            result
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn assets(n: usize) -> Vec<AudioAsset> {
        (0..n)
            .map(|i| AudioAsset {
                region: AudioRegion::new(i, i as f64 * 2.0, i as f64 * 2.0 + 1.5),
                path: PathBuf::from(format!("region-{}.wav", i)),
            })
            .collect()
    }

    fn policy(concurrency: usize) -> TranscriptionPolicy {
        TranscriptionPolicy {
            concurrency,
            retry: RetryPolicy::new(3, 1, 2),
            min_confidence: 0.0,
            drop_empty: false,
            cancel_grace: Duration::from_millis(200),
        }
    }

    fn texts(outcome: &TranscriptionOutcome) -> Vec<&str> {
        outcome.results.iter().map(|r| r.speech.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_results_follow_region_order_not_completion_order() {
        let service = ScriptedTranscriber::new(|index, _| {
            ((5 - index as u64) * 15, Ok(RecognizedSpeech::new(format!("r{}", index))))
        });
        let dispatcher = TranscriptionDispatcher::new(Arc::new(service), policy(5));

        let outcome = dispatcher
            .dispatch(assets(5), Some("en"), &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "r1", "r2", "r3", "r4"]);
        assert!(outcome.status.is_complete());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_is_blanked() {
        let confidences = [0.9f32, 0.3, 0.5];
        let service = ScriptedTranscriber::new(move |index, _| {
            let speech = RecognizedSpeech::new(format!("r{}", index)).with_confidence(confidences[index]);
            (0, Ok(speech))
        });
        let mut policy = policy(2);
        policy.min_confidence = 0.4;
        let dispatcher = TranscriptionDispatcher::new(Arc::new(service), policy);

        let outcome = dispatcher
            .dispatch(assets(3), None, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "", "r2"]);
        assert_eq!(outcome.dropped, 0);
    }

    #[tokio::test]
    async fn test_drop_empty_removes_and_renumbers() {
        let confidences = [0.9f32, 0.3, 0.5];
        let service = ScriptedTranscriber::new(move |index, _| {
            let speech = RecognizedSpeech::new(format!("r{}", index)).with_confidence(confidences[index]);
            (0, Ok(speech))
        });
        let mut policy = policy(2);
        policy.min_confidence = 0.4;
        policy.drop_empty = true;
        let dispatcher = TranscriptionDispatcher::new(Arc::new(service), policy);

        let outcome = dispatcher
            .dispatch(assets(3), None, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "r2"]);
        assert_eq!(outcome.dropped, 1);
        let indices: Vec<usize> = outcome.results.iter().map(|r| r.region.index).collect();
        assert_eq!(indices, vec![0, 1]);
        // Surviving region keeps its timing
        assert_eq!(outcome.results[1].region.start, 4.0);
    }

    #[tokio::test]
    async fn test_authentication_failure_fails_fast() {
        let service = Arc::new(ScriptedTranscriber::new(|index, _| {
            if index == 1 {
                (0, Err(SubflowError::Authentication("bad key".to_string())))
            } else {
                (5, Ok(RecognizedSpeech::new("ok")))
            }
        }));
        let dispatcher = TranscriptionDispatcher::new(service.clone(), policy(1));

        let result = dispatcher
            .dispatch(assets(6), None, &AbortSignal::never())
            .await;

        assert!(matches!(result, Err(SubflowError::Authentication(_))));
        // No retries and no further regions
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let service = Arc::new(ScriptedTranscriber::new(|index, attempt| {
            if index == 0 && attempt == 1 {
                (0, Err(SubflowError::TransientNetwork("reset".to_string())))
            } else {
                (0, Ok(RecognizedSpeech::new(format!("r{}", index))))
            }
        }));
        let dispatcher = TranscriptionDispatcher::new(service.clone(), policy(2));

        let outcome = dispatcher
            .dispatch(assets(2), None, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "r1"]);
        assert!(outcome.failures.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_only_that_region() {
        let service = ScriptedTranscriber::new(|index, _| {
            if index == 1 {
                (0, Err(SubflowError::TransientNetwork("unreachable".to_string())))
            } else {
                (0, Ok(RecognizedSpeech::new(format!("r{}", index))))
            }
        });
        let dispatcher = TranscriptionDispatcher::new(Arc::new(service), policy(3));

        let outcome = dispatcher
            .dispatch(assets(3), None, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "", "r2"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].stage, Stage::Transcription);
        assert!(outcome.status.is_complete());
    }

    #[tokio::test]
    async fn test_quota_flushes_partial_results() {
        let service = Arc::new(ScriptedTranscriber::new(|index, _| {
            if index == 2 {
                (0, Err(SubflowError::QuotaExceeded("limit".to_string())))
            } else {
                (0, Ok(RecognizedSpeech::new(format!("r{}", index))))
            }
        }));
        let dispatcher = TranscriptionDispatcher::new(service.clone(), policy(1));

        let outcome = dispatcher
            .dispatch(assets(5), None, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(texts(&outcome), vec!["r0", "r1", ""]);
        assert!(!outcome.status.is_complete());
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abort_stops_new_requests() {
        let (handle, signal) = abort_pair();
        let mut service = ScriptedTranscriber::new(|index, _| {
            (1, Ok(RecognizedSpeech::new(format!("r{}", index))))
        });
        service.abort_on = Some((1, handle));
        let service = Arc::new(service);
        let dispatcher = TranscriptionDispatcher::new(service.clone(), policy(1));

        let outcome = dispatcher.dispatch(assets(4), None, &signal).await.unwrap();

        // The in-flight call finishes inside the grace period
        assert_eq!(texts(&outcome), vec!["r0", "r1"]);
        assert!(!outcome.status.is_complete());
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abort_during_failed_attempt_is_not_retried() {
        let (handle, signal) = abort_pair();
        let mut service = ScriptedTranscriber::new(|_, attempt| {
            if attempt == 1 {
                (0, Err(SubflowError::TransientNetwork("reset".to_string())))
            } else {
                (0, Ok(RecognizedSpeech::new("late")))
            }
        });
        service.abort_on = Some((0, handle));
        let service = Arc::new(service);
        let mut policy = policy(1);
        policy.retry = RetryPolicy::new(5, 1, 1);
        policy.cancel_grace = Duration::from_millis(500);
        let dispatcher = TranscriptionDispatcher::new(service.clone(), policy);

        let outcome = dispatcher.dispatch(assets(2), None, &signal).await.unwrap();

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(texts(&outcome), vec![""]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 0);
        assert!(!outcome.status.is_complete());
    }
}
