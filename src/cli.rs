//! Command-line interface for fluxgen.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fluxgen", version, about = "Generate images with the Flux API")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a single image
    Generate {
        /// Text describing the image
        prompt: String,

        #[command(flatten)]
        options: GenerationOptions,
    },

    /// Generate one image per prompt, concurrently
    Batch {
        /// Prompts to generate
        prompts: Vec<String>,

        /// Read additional prompts from a file, one per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Override FLUX_BATCH_CONCURRENCY
        #[arg(short, long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        options: GenerationOptions,
    },

    /// Inspect or edit the prompt history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Debug, Clone, Args)]
pub struct GenerationOptions {
    /// One of 1:1, 4:3, 16:9, 9:16
    #[arg(short, long, default_value = "1:1")]
    pub aspect_ratio: String,

    /// standard or high
    #[arg(short, long, default_value = "standard")]
    pub quality: String,

    /// Directory the images are written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// Most recent prompts first
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Favorite prompts
    Favorites,
    /// Toggle the favorite flag on a prompt
    Favorite { prompt: String },
    /// Remove a prompt
    Remove { prompt: String },
    /// Remove every prompt
    Clear,
}
