//! CLI for the rangefetch segmented downloader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use rangefetch_core::checksum::DigestAlgorithm;
use std::path::PathBuf;

use commands::{run_checksum, run_completions, run_config, run_fetch};

/// Top-level CLI for rangefetch.
#[derive(Debug, Parser)]
#[command(name = "rangefetch", version)]
#[command(about = "rangefetch: concurrent byte-range downloader with integrity check", long_about = None)]
pub struct Cli {
    /// Mirror log output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one resource in concurrent byte-range chunks.
    Fetch(FetchArgs),

    /// Print the integrity token (`md5:<hex>` or `sha256:<hex>`) of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = Algorithm::Md5)]
        algo: Algorithm,
    },

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show the config file path and the effective configuration.
    Config,
}

/// Flags override environment (`URL`, `NUM_OF_CHUNKS`, `MAX_RETRIES`,
/// `FILE_EXTENSION`), which overrides config.toml.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Direct HTTP/HTTPS URL to download.
    pub url: Option<String>,

    /// Number of byte-range chunks.
    #[arg(short = 'n', long, value_name = "N")]
    pub chunks: Option<usize>,

    /// Attempts per chunk, including the first.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Extension of the output file (e.g. csv).
    #[arg(long, value_name = "EXT")]
    pub ext: Option<String>,

    /// Directory for the output file.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Overall time limit in seconds (0 = none).
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Run at most N chunks at once.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Keep chunk files when the download fails.
    #[arg(long)]
    pub keep_chunks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    Md5,
    Sha256,
}

impl From<Algorithm> for DigestAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Md5 => DigestAlgorithm::Md5,
            Algorithm::Sha256 => DigestAlgorithm::Sha256,
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Fetch(args) => run_fetch(args).await?,
            CliCommand::Checksum { path, algo } => run_checksum(&path, algo.into())?,
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Config => run_config()?,
        }
        Ok(())
    }
}
