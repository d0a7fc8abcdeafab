use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SubflowError};

/// A single invocation of the media toolchain binary
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn quiet(self) -> Self {
        self.arg("-loglevel").arg("error")
    }

    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Start reading at `seconds`; placed before `-i` for fast seeking
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }

    pub async fn execute(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }

    /// Run and return stdout
    pub async fn run(&self) -> Result<String> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                SubflowError::Media(format!("Failed to execute {}: {}", self.binary_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubflowError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Builder for the commands the pipeline needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    binary_path: String,
    sample_rate: u32,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S, sample_rate: u32) -> Self {
        Self {
            binary_path: binary_path.into(),
            sample_rate,
        }
    }

    /// Mono 16-bit PCM WAV of the whole source
    pub fn extract_audio<P: AsRef<Path>>(&self, source: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .quiet()
            .input(source)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(self.sample_rate)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }

    /// One region of an extracted track
    pub fn cut_region<P: AsRef<Path>>(
        &self,
        audio: P,
        start: f64,
        duration: f64,
        output: P,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Region extraction")
            .quiet()
            .seek(start)
            .duration(duration)
            .input(audio)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(self.sample_rate)
            .audio_channels(1)
            .overwrite()
            .output(output)
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_audio_arguments() {
        let builder = MediaCommandBuilder::new("ffmpeg", 16000);
        let cmd = builder.extract_audio("movie.mkv", "track.wav");
        assert_eq!(cmd.binary_path, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec![
                "-loglevel", "error", "-i", "movie.mkv", "-vn", "-c:a", "pcm_s16le", "-ar",
                "16000", "-ac", "1", "-y", "track.wav"
            ]
        );
    }

    #[test]
    fn test_cut_region_seeks_before_input() {
        let builder = MediaCommandBuilder::new("ffmpeg", 16000);
        let cmd = builder.cut_region("track.wav", 1.5, 2.25, "region-0001.wav");
        let seek = cmd.args.iter().position(|a| a == "-ss").unwrap();
        let input = cmd.args.iter().position(|a| a == "-i").unwrap();
        assert!(seek < input);
        assert_eq!(cmd.args[seek + 1], "1.500");
        assert!(cmd.args.windows(2).any(|w| w[0] == "-t" && w[1] == "2.250"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("region-0001.wav"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let cmd = MediaCommand::new("/nonexistent/ffmpeg-binary", "Version check").arg("-version");
        let result = cmd.execute().await;
        assert!(matches!(result, Err(SubflowError::Media(_))));
    }
}
