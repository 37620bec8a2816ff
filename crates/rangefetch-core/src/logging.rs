//! Logging init: file under XDG state dir, or graceful fallback to stderr.

use anyhow::Result;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,rangefetch=debug,rangefetch_core=debug";

/// Log file destination, optionally mirrored to stderr.
enum LogWriter {
    File { file: fs::File, mirror: bool },
    Stderr,
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File { file, mirror } => {
                if *mirror {
                    // Best effort: a closed stderr must not lose the file copy.
                    let _ = io::stderr().lock().write_all(buf);
                }
                file.write(buf)
            }
            LogWriter::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File { file, .. } => file.flush(),
            LogWriter::Stderr => io::stderr().lock().flush(),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file: `~/.local/state/rangefetch/rangefetch.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rangefetch")?;
    Ok(xdg_dirs
        .get_state_home()
        .join("rangefetch")
        .join("rangefetch.log"))
}

/// Initialize structured logging to the XDG state log file, mirrored to
/// stderr when `mirror_stderr` is set. Returns the log file path.
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging(mirror_stderr: bool) -> Result<PathBuf> {
    let log_file_path = log_path()?;
    if let Some(dir) = log_file_path.parent() {
        fs::create_dir_all(dir)?;
    }

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    struct FileMakeWriter {
        file: fs::File,
        mirror: bool,
    }

    impl<'a> MakeWriter<'a> for FileMakeWriter {
        type Writer = LogWriter;

        fn make_writer(&'a self) -> Self::Writer {
            match self.file.try_clone() {
                Ok(file) => LogWriter::File {
                    file,
                    mirror: self.mirror,
                },
                Err(_) => LogWriter::Stderr,
            }
        }
    }

    let writer = BoxMakeWriter::new(FileMakeWriter {
        file,
        mirror: mirror_stderr,
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {}", e))?;

    tracing::info!("rangefetch logging initialized at {}", log_file_path.display());

    Ok(log_file_path)
}

/// Initialize logging to stderr only (no file). Use when init_logging() fails so the CLI doesn't crash.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
