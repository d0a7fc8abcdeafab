use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, OutputText};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect speech, transcribe, translate and write subtitles for one media file
    Process {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file (defaults to <input>.<language>.srt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Speech language hint
        #[arg(short = 'S', long)]
        speech_language: Option<String>,

        /// Source language for translation ("auto" to detect)
        #[arg(short = 's', long)]
        src_language: Option<String>,

        /// Destination language; omit to skip translation
        #[arg(short = 'd', long)]
        dst_language: Option<String>,

        /// Take region timings from an existing subtitle file
        #[arg(long)]
        regions_from: Option<PathBuf>,

        /// Which text to write for each event
        #[arg(long, value_enum)]
        text: Option<TextArg>,

        /// Style name attached to every subtitle event
        #[arg(long)]
        style_name: Option<String>,

        /// Skip the toolchain and backend availability checks
        #[arg(long)]
        skip_checks: bool,
    },

    /// List language codes accepted by the speech and translation backends
    Langs,

    /// Write the effective configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "subflow.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TextArg {
    Src,
    Dst,
    Both,
}

impl From<TextArg> for OutputText {
    fn from(arg: TextArg) -> Self {
        match arg {
            TextArg::Src => OutputText::Source,
            TextArg::Dst => OutputText::Destination,
            TextArg::Both => OutputText::Bilingual,
        }
    }
}

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub speech_language: Option<String>,
    pub src_language: Option<String>,
    pub dst_language: Option<String>,
    pub text: Option<TextArg>,
    pub style_name: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(language) = self.speech_language {
            config.speech.language = Some(language);
        }
        if let Some(language) = self.src_language {
            config.translate.src_language = language;
        }
        if let Some(language) = self.dst_language {
            config.translate.dst_language = Some(language);
        }
        if let Some(text) = self.text {
            config.output.text = text.into();
        }
        if let Some(style) = self.style_name {
            config.output.style = Some(style);
        }
    }
}
