//! Disk layout of one download.
//!
//! Chunk bodies are buffered in a per-invocation directory inside the output
//! directory (`.rangefetch-<stamp>-<pid>-<seq>/chunk_<index>.part`), one file
//! per chunk, truncated at the start of every attempt. The merged artifact is
//! written to `<output-dir>/output_<YYYYMMDD_HHMMSS>.<extension>`, or
//! `output_<stamp>_<n>.<extension>` when that name is already taken.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone};

/// Chunk file suffix inside the chunk directory.
pub const CHUNK_SUFFIX: &str = ".part";

/// Prefix of the per-invocation chunk directory.
pub const CHUNK_DIR_PREFIX: &str = ".rangefetch-";

/// Timestamp format used in artifact and chunk directory names.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Upper bound on `_<n>` suffixes tried for one artifact name.
const MAX_NAME_SUFFIX: u32 = 10_000;

static STORE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Path of the final artifact: `<dir>/output_<stamp>.<extension>`.
pub fn artifact_path<Tz: TimeZone>(dir: &Path, extension: &str, at: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    dir.join(format!("output_{}.{}", at.format(STAMP_FORMAT), extension))
}

/// Create the artifact file without touching an existing one. If `path` is
/// taken, tries `<stem>_1.<ext>`, `<stem>_2.<ext>`, ... and returns the path
/// actually created.
pub fn create_artifact(path: &Path) -> io::Result<(PathBuf, File)> {
    let mut candidate = path.to_path_buf();
    for n in 1..=MAX_NAME_SUFFIX {
        match File::options().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = suffixed(path, n);
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free artifact name next to {}", path.display()),
    ))
}

/// `dir/stem.ext` -> `dir/stem_<n>.ext`.
fn suffixed(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

/// Per-invocation chunk storage directory.
#[derive(Debug)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Create `<parent>/.rangefetch-<label>`, creating `parent` too if missing.
    /// Fails if the chunk directory already exists.
    pub fn create_in(parent: &Path, label: &str) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let dir = parent.join(format!("{}{}", CHUNK_DIR_PREFIX, label));
        fs::create_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Create a chunk directory no other download in this process (or any
    /// other process) shares: `<parent>/.rangefetch-<stamp>-<pid>-<seq>`.
    pub fn create_unique_in(parent: &Path, stamp: &str) -> io::Result<Self> {
        loop {
            let seq = STORE_SEQ.fetch_add(1, Ordering::Relaxed);
            let label = format!("{}-{}-{}", stamp, std::process::id(), seq);
            match Self::create_in(parent, &label) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                other => return other,
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage handle (path) for chunk `index`.
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("chunk_{}{}", index, CHUNK_SUFFIX))
    }

    /// Create (or truncate) the file for chunk `index`. Called once per attempt
    /// so bytes never accumulate across attempts.
    pub fn recreate(&self, index: usize) -> io::Result<File> {
        File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.chunk_path(index))
    }

    /// Open the stored body of chunk `index` for reading.
    pub fn open(&self, index: usize) -> io::Result<File> {
        File::open(self.chunk_path(index))
    }

    /// Delete the chunk directory and everything in it.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_dir_all(&self.dir)
    }

    /// Give up ownership without deleting; returns the directory path.
    pub fn retain(self) -> PathBuf {
        self.dir
    }
}
