//! Subflow - speech regions to timed, translated subtitles
//!
//! Entry point: parses arguments, sets up logging and runs the workflow.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use subflow::cancel::abort_pair;
use subflow::cli::{Args, Commands, Overrides};
use subflow::config::Config;
use subflow::language::{SPEECH_LANGUAGES, TRANSLATION_LANGUAGES, language_name};
use subflow::workflow::{ProcessRequest, Workflow};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Dropped on return so the file writer flushes
    let _log_guard = setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("subflow.toml").exists() {
                info!("Found subflow.toml in current directory, loading...");
                Config::from_file("subflow.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Process {
            input,
            output,
            speech_language,
            src_language,
            dst_language,
            regions_from,
            text,
            style_name,
            skip_checks,
        } => {
            Overrides {
                speech_language,
                src_language,
                dst_language,
                text,
                style_name,
            }
            .apply(&mut config);
            let workflow = Workflow::new(config)?;
            if !skip_checks {
                workflow.check_dependencies().await?;
            }

            let output = output.unwrap_or_else(|| workflow.default_output_path(&input));
            let request = ProcessRequest { input, output, regions_from };

            let (handle, signal) = abort_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing in-flight requests");
                    handle.abort();
                }
            });

            let report = workflow.process(&request, &signal).await?;
            println!("\n{}", report);
            println!("Subtitles written to {}", request.output.display());

            return Ok(ExitCode::from(report.exit_status()));
        }
        Commands::Langs => {
            print_languages("Speech languages", SPEECH_LANGUAGES);
            print_languages("Translation languages", TRANSLATION_LANGUAGES);
        }
        Commands::InitConfig { output } => {
            config.validate()?;
            config.save_to_file(&output)?;
            println!("Configuration written to {}", output.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_languages(title: &str, codes: &[&str]) {
    println!("\n{}:", title);
    println!("{:<10} {:<30}", "Code", "Name");
    println!("{}", "-".repeat(40));
    for code in codes {
        println!("{:<10} {:<30}", code, language_name(code).unwrap_or("-"));
    }
}

fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".subflow").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subflow.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("subflow.log").display());
    Ok(guard)
}
