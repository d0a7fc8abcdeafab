//! Subflow - speech regions to timed, translated subtitles
//!
//! Finds speech regions in a media file, transcribes them through a pluggable
//! speech backend, optionally translates the text through a translation
//! backend, and joins the results into subtitle events.

pub mod assemble;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod media;
pub mod region;
pub mod retry;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
