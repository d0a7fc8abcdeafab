use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use super::RecognizedSpeech;
use crate::error::{Result, SubflowError};
use crate::region::AudioRegion;

/// Converts a backend's native output into [`RecognizedSpeech`].
///
/// Backend timestamps are relative to the clip; mappers shift them by the
/// region start so word timings land on the media timeline.
pub trait TranscriptionMapper<T> {
    fn to_recognized(output: T, region: &AudioRegion) -> Result<RecognizedSpeech>;
}

/// Run a transcriber binary and fail on a non-zero exit.
pub async fn run_transcriber(mut cmd: Command, binary: &str) -> Result<()> {
    debug!("Executing transcriber: {:?}", cmd.as_std());

    // Spawn failures are fatal for the whole stage
    let output = cmd
        .output()
        .await
        .map_err(|e| SubflowError::Config(format!("Failed to execute {}: {}", binary, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SubflowError::Backend(format!(
            "{} exited with {}: {}",
            binary,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SubflowError::Backend(format!("Transcriber output {} missing: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Collapse whitespace left between joined segment texts.
pub fn join_segment_texts<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> String {
    texts
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mean of the values, or `None` for an empty input
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
