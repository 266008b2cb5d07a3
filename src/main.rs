use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{info, warn};

use transcript_pipeline::{Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("transcript-pipeline")
        .version("0.1.0")
        .about("Chunked audio transcription with LLM-based transcript refinement")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Audio file to transcribe")
                .required(true),
        )
        .arg(
            Arg::new("language")
                .short('l')
                .long("language")
                .value_name("LANG")
                .help("Language hint for transcription")
                .default_value("en"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to TOML configuration file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the final transcript to this file instead of stdout"),
        )
        .arg(
            Arg::new("skip-upgrade")
                .long("skip-upgrade")
                .help("Stop after transcription, skip the revision stage")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    tracing_subscriber::fmt()
        .with_env_filter(if verbose {
            "transcript_pipeline=debug,info"
        } else {
            "transcript_pipeline=info,warn"
        })
        .init();

    let input = PathBuf::from(matches.get_one::<String>("input").unwrap());
    let language = matches.get_one::<String>("language").unwrap();
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let skip_upgrade = matches.get_flag("skip-upgrade");

    if !input.exists() {
        return Err(anyhow!("input file not found: {}", input.display()));
    }

    let config = Config::from_file_or_default(config_path.as_deref()).await?;
    let pipeline = Pipeline::new(config)?;

    info!("input: {}", input.display());
    info!("language: {}", language);

    let transcript = pipeline.transcribe_audio(&input, language).await?;
    if transcript.failed_segments > 0 {
        warn!(
            "{} segment(s) failed to transcribe; transcript is degraded",
            transcript.failed_segments
        );
    }

    let final_text = if skip_upgrade {
        transcript.text
    } else {
        let upgraded = pipeline
            .upgrade_transcript(&transcript.text, language)
            .await?;
        info!(
            "revision changed {:.1}% of the text ({} fallback chunks)",
            upgraded.improved_percentage, upgraded.fallback_chunks
        );
        upgraded.upgraded_text
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, &final_text).await?;
            info!("transcript written to {}", path.display());
        }
        None => println!("{}", final_text),
    }

    Ok(())
}
