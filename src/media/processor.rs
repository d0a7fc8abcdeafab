use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::{AudioAsset, AudioToolchain, MediaCommandBuilder};
use crate::config::MediaConfig;
use crate::error::{Result, SubflowError};
use crate::region::AudioRegion;

/// ffmpeg-backed audio toolchain
pub struct FfmpegToolchain {
    command_builder: MediaCommandBuilder,
}

impl FfmpegToolchain {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.binary_path, config.sample_rate),
        }
    }
}

#[async_trait]
impl AudioToolchain for FfmpegToolchain {
    async fn extract_audio(&self, source: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", source.display(), audio_path.display());

        self.command_builder
            .extract_audio(source, audio_path)
            .execute()
            .await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn extract_region(
        &self,
        audio: &Path,
        region: &AudioRegion,
        output_dir: &Path,
    ) -> Result<AudioAsset> {
        let path = output_dir.join(format!("region-{:05}.wav", region.index));
        debug!(
            "Cutting region {} ({:.2}s-{:.2}s) to {}",
            region.index,
            region.start,
            region.end,
            path.display()
        );

        self.command_builder
            .cut_region(audio, region.start, region.duration(), path.as_path())
            .execute()
            .await?;

        Ok(AudioAsset {
            region: *region,
            path,
        })
    }

    async fn version_info(&self) -> Result<String> {
        let stdout = self.command_builder.version_check().run().await?;
        stdout
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| SubflowError::Media("Empty version output".to_string()))
    }
}
