use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::assemble::{AssemblyInput, EventAssembler, rules};
use crate::cancel::AbortSignal;
use crate::config::Config;
use crate::error::{CompletionStatus, ItemFailure, Result};
use crate::language::resolve;
use crate::media::{AudioToolchain, MediaToolchainFactory, extract_regions};
use crate::region::{AudioRegion, EnergyProfile, RegionDetector};
use crate::subtitle::{SrtCodec, SubtitleCodec, SubtitleEvent, read_subtitles, write_subtitles};
use crate::transcribe::{SpeechTranscriptionService, TranscriberFactory, TranscriptionDispatcher, TranscriptionPolicy};
use crate::translate::{
    TranslationDispatcher, TranslationPolicy, TranslationService, TranslatorFactory, build_http_client,
    check_ollama_availability,
};

/// Where a run reads from and writes to
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Take region timings from this subtitle file instead of detecting them
    pub regions_from: Option<PathBuf>,
}

/// Result of one end-to-end run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub events: Vec<SubtitleEvent>,
    pub failures: Vec<ItemFailure>,
    pub status: CompletionStatus,
    /// Regions removed by the drop-empty policy
    pub dropped: usize,
    pub detected_regions: usize,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
}

impl RunReport {
    pub fn missing_translations(&self) -> usize {
        self.events.iter().filter(|e| e.missing_translation).count()
    }

    /// Process exit code: 0 when complete, 2 when results are partial
    pub fn exit_status(&self) -> u8 {
        if self.status.is_complete() { 0 } else { 2 }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Regions detected:     {}", self.detected_regions)?;
        writeln!(f, "Regions dropped:      {}", self.dropped)?;
        writeln!(f, "Events written:       {}", self.events.len())?;
        if let Some(target) = &self.target_language {
            writeln!(
                f,
                "Translation:          {} -> {} ({} events untranslated)",
                self.source_language.as_deref().unwrap_or("?"),
                target,
                self.missing_translations()
            )?;
        }
        match &self.status {
            CompletionStatus::Complete => writeln!(f, "Status:               complete")?,
            CompletionStatus::Partial { reason } => writeln!(f, "Status:               partial ({})", reason)?,
        }
        if !self.failures.is_empty() {
            writeln!(f, "Failures:")?;
            for failure in &self.failures {
                writeln!(f, "  {}", failure)?;
            }
        }
        Ok(())
    }
}

pub struct Workflow {
    config: Config,
    toolchain: Arc<dyn AudioToolchain>,
    transcriber: Arc<dyn SpeechTranscriptionService>,
    translator: Option<Arc<dyn TranslationService>>,
    codec: Box<dyn SubtitleCodec>,
    client: Option<Client>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let toolchain = MediaToolchainFactory::create(&config.media);
        let transcriber = TranscriberFactory::create(&config.speech);

        // One client, shared read-only by every translation worker
        let (translator, client) = if config.translate.dst_language.is_some() {
            let timeout = config.translate.request_timeout_secs.map(Duration::from_secs);
            let client = build_http_client(&config.network, timeout)?;
            let translator = TranslatorFactory::create(&config.translate, client.clone());
            (Some(translator), Some(client))
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            toolchain,
            transcriber,
            translator,
            codec: Box::new(SrtCodec),
            client,
        })
    }

    /// Build a workflow around caller-supplied collaborators.
    pub fn with_services(
        config: Config,
        toolchain: Arc<dyn AudioToolchain>,
        transcriber: Arc<dyn SpeechTranscriptionService>,
        translator: Option<Arc<dyn TranslationService>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            toolchain,
            transcriber,
            translator,
            codec: Box::new(SrtCodec),
            client: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that the external tools answer before starting a run
    pub async fn check_dependencies(&self) -> Result<()> {
        let version = self.toolchain.version_info().await?;
        info!("Media toolchain: {}", version);

        if let Some(client) = &self.client {
            check_ollama_availability(client, &self.config.translate.endpoint, &self.config.translate.model)
                .await?;
        }
        Ok(())
    }

    /// Default output path next to the input: `<stem>.<language>.srt`
    pub fn default_output_path(&self, input: &Path) -> PathBuf {
        let language = self
            .config
            .translate
            .dst_language
            .as_deref()
            .or(self.config.speech.language.as_deref())
            .unwrap_or("subtitles");
        let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        input.with_file_name(format!("{}.{}.{}", stem, language, self.codec.extension()))
    }

    /// Run the whole pipeline for one media file.
    ///
    /// Partial results are still assembled and written when the run is
    /// aborted or a stage stops early; the report says which.
    pub async fn process(&self, request: &ProcessRequest, signal: &AbortSignal) -> Result<RunReport> {
        let config = &self.config;
        info!("Processing {}", request.input.display());

        // Language codes are checked before any work starts
        let speech_language = config
            .speech
            .language
            .as_deref()
            .map(|code| resolve(code, self.transcriber.supported_languages(), &config.language))
            .transpose()?;
        let target = match (&self.translator, &config.translate.dst_language) {
            (Some(translator), Some(code)) => {
                Some(resolve(code, translator.supported_languages(), &config.language)?)
            }
            _ => None,
        };

        let workspace = tempfile::tempdir()?;
        let audio = workspace.path().join("audio.wav");
        self.toolchain.extract_audio(&request.input, &audio).await?;
        let profile = EnergyProfile::from_wav(&audio, config.regions.frame_duration)?;

        let detector = RegionDetector::new(config.regions.clone());
        let (regions, tagged) = match &request.regions_from {
            Some(path) => {
                info!("Using region timings from {}", path.display());
                let cues = read_subtitles(self.codec.as_ref(), path).await?;
                let intervals: Vec<(f64, f64)> = cues.iter().map(|c| (c.start, c.end)).collect();
                let tagged: Vec<bool> = match config.join.key_tag {
                    Some(tag) => cues.iter().map(|c| rules::ends_with_key_tag(&c.src_text, tag)).collect(),
                    None => vec![false; cues.len()],
                };
                (detector.from_intervals(&intervals), tagged)
            }
            None => {
                let regions = detector.detect(&profile);
                let count = regions.len();
                (regions, vec![false; count])
            }
        };

        let mut report = RunReport {
            detected_regions: regions.len(),
            target_language: target.clone(),
            ..Default::default()
        };
        if regions.is_empty() {
            warn!("No speech regions found in {}, writing empty subtitles", request.input.display());
            write_subtitles(self.codec.as_ref(), &[], config.output.text, &request.output).await?;
            return Ok(report);
        }

        let segmentation = extract_regions(
            self.toolchain.clone(),
            &audio,
            &regions,
            workspace.path(),
            config.speech.split_concurrency,
            signal,
        )
        .await;
        report.failures.extend(segmentation.failures);
        report.status = segmentation.status;

        let transcription = TranscriptionDispatcher::new(
            self.transcriber.clone(),
            TranscriptionPolicy::from_config(&config.speech, config.output.cancel_grace_ms),
        )
        .dispatch(segmentation.assets, speech_language.as_deref(), signal)
        .await?;
        report.failures.extend(transcription.failures);
        report.status = report.status.combine(transcription.status);
        report.dropped = transcription.dropped;

        let texts: Vec<String> = transcription.results.iter().map(|r| r.speech.text.clone()).collect();
        let translations = match (&self.translator, &target) {
            (Some(translator), Some(target)) => {
                let outcome = TranslationDispatcher::new(
                    translator.clone(),
                    TranslationPolicy::from_config(
                        &config.translate,
                        &config.language,
                        config.output.cancel_grace_ms,
                    ),
                )
                .dispatch(&texts, &config.translate.src_language, target, signal)
                .await?;
                report.failures.extend(outcome.failures);
                report.status = report.status.combine(outcome.status);
                report.source_language = outcome.source_language;
                Some(outcome.translations)
            }
            _ => None,
        };

        let threshold = f64::from(config.regions.energy_threshold);
        let tag_token = config.join.key_tag.map(|tag| format!("{{{}}}", tag.as_str()));
        let inputs: Vec<AssemblyInput> = transcription
            .results
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                let region: AudioRegion = result.region;
                let mut text = result.speech.text.clone();
                // Results are renumbered, so look the tag up by start time
                let carries_tag = regions
                    .iter()
                    .position(|r| r.start == region.start && r.end == region.end)
                    .is_some_and(|p| tagged.get(p).copied().unwrap_or(false));
                if let (true, Some(token)) = (carries_tag, &tag_token) {
                    text.push_str(token);
                }
                let span = result
                    .speech
                    .speech_span()
                    .or_else(|| profile.active_span(region.start, region.end, threshold));
                let translation = translations.as_ref().and_then(|t| t.get(i).cloned().flatten());
                AssemblyInput::new(region, text)
                    .with_translation(translation, translations.is_some())
                    .with_speech_span(span)
            })
            .collect();

        report.events = EventAssembler::new(config.join.clone()).assemble(inputs);
        if let Some(style) = &config.output.style {
            for event in report.events.iter_mut() {
                event.style_ref = Some(style.clone());
            }
        }
        write_subtitles(self.codec.as_ref(), &report.events, config.output.text, &request.output).await?;

        report.failures.sort_by_key(|f| (f.stage as u8, f.index));
        if !report.status.is_complete() {
            warn!("Run finished with partial results: {:?}", report.status);
        }
        info!("Wrote {} events to {}", report.events.len(), request.output.display());
        Ok(report)
    }
}
