mod cli;
mod config;
mod error;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use cli::{Cli, Commands};
use config::Config;
use quill_db::Store;
use quill_transcript::{Options, build_transcript, render};
use quill_types::time::Zone;

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "quill=debug,quill_archive=debug,quill_db=debug,quill_transcript=debug"
    } else {
        "quill=info,quill_archive=info,quill_db=info,quill_transcript=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(error::exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::List { db_path } => {
            let store = open_store(db_path, &config)?;
            let chats = store.list_chats()?;
            info!("{} conversations", chats.len());

            let out = if cli.json {
                render::chats_json(&chats)? + "\n"
            } else {
                render::chat_table(&chats)
            };
            emit(&out)
        }

        Commands::Extract {
            identifier,
            db_path,
            utc,
        } => {
            let store = open_store(db_path, &config)?;
            let zone = if utc { Zone::Utc } else { config.zone };
            let options = Options {
                diagnostics: cli.verbose,
            };
            let transcript = build_transcript(&store, &identifier, &options)?;

            let out = if cli.json {
                render::transcript_json(&transcript, zone)? + "\n"
            } else {
                render::transcript(&transcript, zone)
            };
            emit(&out)
        }
    }
}

fn open_store(arg: Option<PathBuf>, config: &Config) -> Result<Store> {
    let path = arg.unwrap_or_else(|| config.db_path.clone());
    debug!("Opening store {}", path.display());
    Ok(Store::open(&path)?)
}

fn emit(out: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(out.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
