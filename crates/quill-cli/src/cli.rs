use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quill", about = "Read conversations out of a Messages store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging, plus a decode report for every archived body
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List conversations, busiest first
    List {
        /// Store path (defaults to QUILL_DB_PATH, then ~/Library/Messages/chat.db)
        db_path: Option<PathBuf>,
    },

    /// Print one conversation
    Extract {
        /// Chat identifier, exactly as `list` shows it
        identifier: String,

        /// Store path (defaults to QUILL_DB_PATH, then ~/Library/Messages/chat.db)
        db_path: Option<PathBuf>,

        /// Show times in UTC instead of local time
        #[arg(long)]
        utc: bool,
    },
}
