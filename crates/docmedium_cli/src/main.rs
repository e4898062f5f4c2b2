//! docmedium CLI
//!
//! Command-line tools for documents managed by the docmedium engine.
//!
//! # Commands
//!
//! - `inspect` - Show lock record, read-only state and stored revisions
//! - `save` - Replace a document's content through a full save cycle
//! - `backup` - Write a `.bak` copy into the backup directory
//! - `unlock` - Remove a lock file
//! - `versions` - List stored revisions
//! - `extract-version` - Write a stored revision out as its own package

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use docmedium_core::Outcome;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docmedium command-line document tools.
#[derive(Parser)]
#[command(name = "docmedium")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// How to answer lock conflicts and other questions
    #[arg(global = true, long, value_enum, default_value = "abort")]
    on_conflict: ConflictAnswer,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConflictAnswer {
    /// Give up
    Abort,
    /// Open read-only on load, retry on save
    Approve,
    /// Open as a copy, or ignore our own stale lock
    Disapprove,
}

impl From<ConflictAnswer> for Outcome {
    fn from(answer: ConflictAnswer) -> Self {
        match answer {
            ConflictAnswer::Abort => Outcome::Abort,
            ConflictAnswer::Approve => Outcome::Approve,
            ConflictAnswer::Disapprove => Outcome::Disapprove,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show lock record, read-only state and stored revisions
    Inspect {
        /// Document path
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replace the document content with the content of another file
    Save {
        /// Document path
        path: PathBuf,

        /// File holding the new content
        #[arg(short, long)]
        input: PathBuf,

        /// Keep a `.bak` copy of the previous content
        #[arg(short, long)]
        backup: bool,

        /// Do not take the document lock
        #[arg(long)]
        no_lock: bool,
    },

    /// Copy the document into the backup directory
    Backup {
        /// Document path
        path: PathBuf,
    },

    /// Remove the document's lock file
    Unlock {
        /// Document path
        path: PathBuf,

        /// Remove the lock even if another installation holds it
        #[arg(short, long)]
        force: bool,
    },

    /// List stored revisions
    Versions {
        /// Document path
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a stored revision to its own package file
    ExtractVersion {
        /// Document path
        path: PathBuf,

        /// 1-based revision number; negative counts from the newest
        #[arg(long, allow_negative_numbers = true)]
        version: i16,

        /// Where to write the revision
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let answer = Outcome::from(cli.on_conflict);
    match cli.command {
        Commands::Inspect { path, format } => {
            commands::inspect::run(&path, answer, &format)?;
        }
        Commands::Save {
            path,
            input,
            backup,
            no_lock,
        } => {
            commands::save::run(&path, &input, answer, backup, !no_lock)?;
        }
        Commands::Backup { path } => {
            commands::backup::run(&path, answer)?;
        }
        Commands::Unlock { path, force } => {
            commands::unlock::run(&path, force)?;
        }
        Commands::Versions { path, format } => {
            commands::versions::list(&path, answer, &format)?;
        }
        Commands::ExtractVersion {
            path,
            version,
            output,
        } => {
            commands::versions::extract(&path, answer, version, &output)?;
        }
    }

    Ok(())
}
