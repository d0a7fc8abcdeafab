//! End-to-end runs of the workflow against fake collaborators

use std::sync::Arc;
use std::sync::atomic::Ordering;

use subflow::cancel::{AbortSignal, abort_pair};
use subflow::config::{AutoMode, KeyTag, OutputText};
use subflow::error::SubflowError;
use subflow::translate::TranslationService;
use subflow::workflow::Workflow;

use crate::common::fake_backends::{FakeToolchain, FakeTranscriber, FakeTranslator, TranslatorFailure};
use crate::common::{fast_config, request, write_file};

fn two_phrases() -> Arc<FakeToolchain> {
    Arc::new(FakeToolchain::new(4.0, vec![(0.5, 1.5), (2.5, 3.5)]))
}

fn close_to(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-6
}

#[tokio::test]
async fn test_detected_regions_are_transcribed_and_translated() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut config = fast_config();
    config.translate.dst_language = Some("fr".to_string());

    let transcriber = Arc::new(FakeTranscriber::new(vec!["Hello there", "General Kenobi"]));
    let translator = Arc::new(FakeTranslator::new());
    let workflow = Workflow::with_services(
        config,
        two_phrases(),
        transcriber.clone(),
        Some(translator.clone() as Arc<dyn TranslationService>),
    )
    .unwrap();

    let request = request(dir.path());
    let report = workflow.process(&request, &AbortSignal::never()).await.unwrap();

    assert!(report.status.is_complete());
    assert_eq!(report.detected_regions, 2);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
    // Both texts fit in one batch
    assert_eq!(translator.request_count(), 1);
    assert_eq!(report.source_language.as_deref(), Some("en"));

    assert_eq!(report.events.len(), 2);
    assert!(close_to(report.events[0].start, 0.5));
    assert!(report.events[0].end <= report.events[1].start);
    assert_eq!(report.events[1].dst_text.as_deref(), Some("[fr] General Kenobi"));

    let written = std::fs::read_to_string(&request.output).unwrap();
    assert!(written.starts_with("1\n00:00:00,500 --> "));
    assert!(written.contains("[fr] Hello there\n"));
    assert!(written.contains("[fr] General Kenobi\n"));
}

#[tokio::test]
async fn test_auto_join_merges_and_trims() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut config = fast_config();
    config.join.auto_modes = vec![AutoMode::ExtAuto];
    config.join.max_delta_time = 1.0;
    config.join.trim = true;
    config.join.capitalize = true;

    let transcriber = Arc::new(FakeTranscriber::new(vec!["hello there", "general Kenobi"]));
    let workflow = Workflow::with_services(config, two_phrases(), transcriber, None).unwrap();

    let report = workflow.process(&request(dir.path()), &AbortSignal::never()).await.unwrap();

    assert_eq!(report.events.len(), 1);
    let event = &report.events[0];
    assert_eq!(event.src_text, "Hello there general Kenobi.");
    assert!(event.dst_text.is_none());
    assert!(!event.missing_translation);
    // Tolerated trailing silence is trimmed away
    assert!(close_to(event.start, 0.5));
    assert!(close_to(event.end, 3.5));
}

#[tokio::test]
async fn test_region_timings_from_subtitle_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let timings = write_file(
        dir.path(),
        "timings.srt",
        "1\n00:00:01,000 --> 00:00:02,000\none{\\kf}\n\n2\n00:00:02,500 --> 00:00:03,000\ntwo\n\n3\n00:00:05,000 --> 00:00:06,000\nthree\n",
    );

    let mut config = fast_config();
    config.join.key_tag = Some(KeyTag::Kf);
    config.output.text = OutputText::Source;

    let transcriber = Arc::new(FakeTranscriber::new(vec!["alpha", "beta", "gamma"]));
    let workflow = Workflow::with_services(
        config,
        Arc::new(FakeToolchain::silent(7.0)),
        transcriber,
        None,
    )
    .unwrap();

    let mut request = request(dir.path());
    request.regions_from = Some(timings);
    let report = workflow.process(&request, &AbortSignal::never()).await.unwrap();

    assert_eq!(report.detected_regions, 3);
    let texts: Vec<(f64, f64, &str)> = report
        .events
        .iter()
        .map(|e| (e.start, e.end, e.src_text.as_str()))
        .collect();
    assert_eq!(texts, vec![(1.0, 3.0, "alpha beta"), (5.0, 6.0, "gamma")]);
}

#[tokio::test]
async fn test_silent_track_writes_empty_subtitles() {
    let dir = assert_fs::TempDir::new().unwrap();
    let transcriber = Arc::new(FakeTranscriber::new(vec![]));
    let workflow = Workflow::with_services(
        fast_config(),
        Arc::new(FakeToolchain::silent(3.0)),
        transcriber.clone(),
        None,
    )
    .unwrap();

    let request = request(dir.path());
    let report = workflow.process(&request, &AbortSignal::never()).await.unwrap();

    assert!(report.status.is_complete());
    assert!(report.events.is_empty());
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_to_string(&request.output).unwrap(), "");
}

#[tokio::test]
async fn test_translation_auth_failure_keeps_transcripts() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut config = fast_config();
    config.translate.dst_language = Some("fr".to_string());

    let translator = Arc::new(FakeTranslator::failing(TranslatorFailure::Auth));
    let workflow = Workflow::with_services(
        config,
        two_phrases(),
        Arc::new(FakeTranscriber::new(vec!["Hello there", "General Kenobi"])),
        Some(translator.clone() as Arc<dyn TranslationService>),
    )
    .unwrap();

    let request = request(dir.path());
    let report = workflow.process(&request, &AbortSignal::never()).await.unwrap();

    assert!(!report.status.is_complete());
    assert_eq!(translator.request_count(), 1);
    assert_eq!(report.events.len(), 2);
    assert!(report.events.iter().all(|e| e.missing_translation));
    assert_eq!(report.missing_translations(), 2);

    // Untranslated events fall back to the source text
    let written = std::fs::read_to_string(&request.output).unwrap();
    assert!(written.contains("Hello there\n"));
}

#[tokio::test]
async fn test_unresolvable_language_fails_before_any_work() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut config = fast_config();
    config.translate.dst_language = Some("xx-invalid".to_string());

    let toolchain = two_phrases();
    let workflow = Workflow::with_services(
        config,
        toolchain.clone(),
        Arc::new(FakeTranscriber::new(vec![])),
        Some(Arc::new(FakeTranslator::new()) as Arc<dyn TranslationService>),
    )
    .unwrap();

    let result = workflow.process(&request(dir.path()), &AbortSignal::never()).await;

    assert!(matches!(result, Err(SubflowError::Config(_))));
    assert_eq!(toolchain.extract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_abort_before_dispatch_reports_partial() {
    let dir = assert_fs::TempDir::new().unwrap();
    let transcriber = Arc::new(FakeTranscriber::new(vec!["Hello there", "General Kenobi"]));
    let workflow = Workflow::with_services(fast_config(), two_phrases(), transcriber.clone(), None).unwrap();

    let (handle, signal) = abort_pair();
    handle.abort();
    let request = request(dir.path());
    let report = workflow.process(&request, &signal).await.unwrap();

    assert!(!report.status.is_complete());
    assert_eq!(report.detected_regions, 2);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert!(report.events.is_empty());
    assert!(request.output.exists());
}

#[tokio::test]
async fn test_configured_style_is_attached_to_every_event() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut config = fast_config();
    config.output.style = Some("Dialogue".to_string());

    let transcriber = Arc::new(FakeTranscriber::new(vec!["Hello there", "General Kenobi"]));
    let workflow = Workflow::with_services(config, two_phrases(), transcriber, None).unwrap();

    let request = request(dir.path());
    let report = workflow.process(&request, &AbortSignal::never()).await.unwrap();

    assert_eq!(report.events.len(), 2);
    assert!(report.events.iter().all(|e| e.style_ref.as_deref() == Some("Dialogue")));
    // SRT has no style field
    let written = std::fs::read_to_string(&request.output).unwrap();
    assert!(!written.contains("Dialogue"));
}
