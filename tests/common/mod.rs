//! Shared helpers for the integration suite

use std::path::{Path, PathBuf};

use subflow::config::Config;
use subflow::workflow::ProcessRequest;

pub mod fake_backends;

/// Configuration with pacing and retry delays removed
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.translate.sleep_seconds = 0.0;
    config.speech.initial_backoff_ms = 1;
    config.speech.max_backoff_ms = 1;
    config.translate.initial_backoff_ms = 1;
    config.translate.max_backoff_ms = 1;
    config.output.cancel_grace_ms = 100;
    config
}

pub fn request(dir: &Path) -> ProcessRequest {
    ProcessRequest {
        input: dir.join("talk.mp4"),
        output: dir.join("talk.srt"),
        regions_from: None,
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
