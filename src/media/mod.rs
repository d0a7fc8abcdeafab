// Audio toolchain abstraction
//
// - commands: argument builders for the toolchain binary
// - processor: ffmpeg implementation

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use commands::*;
pub use processor::*;

use crate::cancel::AbortSignal;
use crate::config::MediaConfig;
use crate::error::{CompletionStatus, ItemFailure, Result, Stage};
use crate::region::AudioRegion;

/// An extracted clip for one region
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub region: AudioRegion,
    pub path: PathBuf,
}

/// External collaborator that decodes media and cuts per-region clips
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioToolchain: Send + Sync {
    /// Extract a mono PCM WAV track from any media file
    async fn extract_audio(&self, source: &Path, audio_path: &Path) -> Result<()>;

    /// Cut one region out of an extracted track into `output_dir`
    async fn extract_region(
        &self,
        audio: &Path,
        region: &AudioRegion,
        output_dir: &Path,
    ) -> Result<AudioAsset>;

    async fn version_info(&self) -> Result<String>;
}

pub struct MediaToolchainFactory;

impl MediaToolchainFactory {
    pub fn create(config: &MediaConfig) -> Arc<dyn AudioToolchain> {
        Arc::new(FfmpegToolchain::new(config))
    }
}

/// Clips produced for a region list, in region order.
#[derive(Debug, Default)]
pub struct SegmentationOutcome {
    pub assets: Vec<AudioAsset>,
    pub failures: Vec<ItemFailure>,
    pub status: CompletionStatus,
}

/// Cut every region with at most `concurrency` extractions in flight.
///
/// A region that fails to extract is recorded and skipped. After an abort no
/// new extraction starts.
pub async fn extract_regions(
    toolchain: Arc<dyn AudioToolchain>,
    audio: &Path,
    regions: &[AudioRegion],
    output_dir: &Path,
    concurrency: usize,
    signal: &AbortSignal,
) -> SegmentationOutcome {
    info!("Extracting {} regions (concurrency {})", regions.len(), concurrency);

    let results: Vec<(usize, Result<AudioAsset>)> = stream::iter(regions.iter().copied())
        .take_while(|_| {
            let aborted = signal.is_aborted();
            async move { !aborted }
        })
        .map(|region| {
            let toolchain = toolchain.clone();
            async move {
                let result = toolchain.extract_region(audio, &region, output_dir).await;
                (region.index, result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = SegmentationOutcome::default();
    if results.len() < regions.len() {
        outcome.status = CompletionStatus::Partial {
            reason: "aborted during segmentation".to_string(),
        };
    }
    for (index, result) in results {
        match result {
            Ok(asset) => outcome.assets.push(asset),
            Err(e) => {
                warn!("Region {} could not be extracted: {}", index, e);
                outcome.failures.push(ItemFailure::new(Stage::Segmentation, index, &e));
            }
        }
    }
    outcome.assets.sort_by_key(|a| a.region.index);
    outcome.failures.sort_by_key(|f| f.index);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::abort_pair;
    use crate::error::SubflowError;

    fn regions(n: usize) -> Vec<AudioRegion> {
        (0..n)
            .map(|i| AudioRegion::new(i, i as f64, i as f64 + 0.8))
            .collect()
    }

    #[tokio::test]
    async fn test_assets_come_back_in_region_order() {
        let mut mock = MockAudioToolchain::new();
        mock.expect_extract_region()
            .times(4)
            .returning(|_, region, dir| {
                Ok(AudioAsset {
                    region: *region,
                    path: dir.join(format!("{}.wav", region.index)),
                })
            });

        let outcome = extract_regions(
            Arc::new(mock),
            Path::new("track.wav"),
            &regions(4),
            Path::new("/tmp/clips"),
            3,
            &AbortSignal::never(),
        )
        .await;

        let indices: Vec<usize> = outcome.assets.iter().map(|a| a.region.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(outcome.failures.is_empty());
        assert!(outcome.status.is_complete());
    }

    #[tokio::test]
    async fn test_failed_region_is_recorded_not_fatal() {
        let mut mock = MockAudioToolchain::new();
        mock.expect_extract_region().returning(|_, region, dir| {
            if region.index == 1 {
                Err(SubflowError::Media("corrupt frame".to_string()))
            } else {
                Ok(AudioAsset {
                    region: *region,
                    path: dir.join("clip.wav"),
                })
            }
        });

        let outcome = extract_regions(
            Arc::new(mock),
            Path::new("track.wav"),
            &regions(3),
            Path::new("/tmp"),
            1,
            &AbortSignal::never(),
        )
        .await;

        assert_eq!(outcome.assets.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].stage, Stage::Segmentation);
        assert_eq!(outcome.failures[0].index, 1);
    }

    #[tokio::test]
    async fn test_abort_before_start_is_partial() {
        let mut mock = MockAudioToolchain::new();
        mock.expect_extract_region().never();
        let (handle, signal) = abort_pair();
        handle.abort();

        let outcome = extract_regions(
            Arc::new(mock),
            Path::new("track.wav"),
            &regions(2),
            Path::new("/tmp"),
            2,
            &signal,
        )
        .await;

        assert!(outcome.assets.is_empty());
        assert!(!outcome.status.is_complete());
    }
}
