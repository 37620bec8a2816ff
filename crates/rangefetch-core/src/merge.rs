//! Ordered merge of chunk storage into the final artifact, plus the
//! integrity verdict derived from the merged digest.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::checksum::{DigestAlgorithm, DigestWriter, TokenSpec};
use crate::events::{Event, EventSink};
use crate::storage::{create_artifact, ChunkStore};

const COPY_BUF: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("create artifact {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read chunk {index}: {source}")]
    ReadChunk {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("write artifact: {0}")]
    Write(#[source] io::Error),
    #[error("merged {actual} bytes but the resource is {expected} bytes")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// What the merge produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub artifact: PathBuf,
    pub bytes: u64,
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex digest of the whole artifact.
    pub digest: String,
}

/// Result of comparing the artifact digest with the server's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityVerdict {
    Match { token: String },
    Mismatch { expected: String, actual: String },
    /// Server sent no token.
    Unverifiable,
}

impl IntegrityVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, IntegrityVerdict::Match { .. })
    }
}

/// Digest algorithm the merge should compute for `token`. MD5 when there is none.
pub fn algorithm_for(token: Option<&str>) -> DigestAlgorithm {
    token
        .map(|t| TokenSpec::parse(t).algorithm)
        .unwrap_or(DigestAlgorithm::Md5)
}

/// Compare a hex digest (computed with `algorithm_for(token)`) against the token.
pub fn verify(token: Option<&str>, digest: &str) -> IntegrityVerdict {
    let Some(token) = token else {
        return IntegrityVerdict::Unverifiable;
    };
    let spec = TokenSpec::parse(token);
    if spec.matches(digest) {
        IntegrityVerdict::Match {
            token: token.to_string(),
        }
    } else {
        IntegrityVerdict::Mismatch {
            expected: token.to_string(),
            actual: spec.render(digest),
        }
    }
}

/// Concatenate chunks `0..chunk_count` of `store` into `artifact`, strictly in
/// index order, hashing as we go. Creates the parent directory if missing.
/// An existing file at `artifact` is left alone and a `_<n>` suffixed name is
/// used instead; `Merged::artifact` is the path actually written.
///
/// A size mismatch leaves the written artifact in place.
pub fn merge_chunks(
    store: &ChunkStore,
    chunk_count: usize,
    artifact: &Path,
    expected_size: u64,
    algorithm: DigestAlgorithm,
    sink: &dyn EventSink,
) -> Result<Merged, MergeError> {
    let create_err = |source| MergeError::Create {
        path: artifact.to_path_buf(),
        source,
    };
    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent).map_err(create_err)?;
    }
    let (artifact, file) = create_artifact(artifact).map_err(create_err)?;
    let mut out = DigestWriter::new(BufWriter::new(file), algorithm);
    let mut buf = vec![0u8; COPY_BUF];

    for index in 0..chunk_count {
        let mut chunk = store
            .open(index)
            .map_err(|source| MergeError::ReadChunk { index, source })?;
        let mut bytes = 0u64;
        loop {
            let n = chunk
                .read(&mut buf)
                .map_err(|source| MergeError::ReadChunk { index, source })?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).map_err(MergeError::Write)?;
            bytes += n as u64;
        }
        sink.info(&Event::ChunkMerged { index, bytes });
    }

    let bytes = out.written();
    out.flush().map_err(MergeError::Write)?;
    let (writer, digest) = out.finish();
    let file = writer
        .into_inner()
        .map_err(|e| MergeError::Write(e.into_error()))?;
    file.sync_all().map_err(MergeError::Write)?;

    if bytes != expected_size {
        return Err(MergeError::SizeMismatch {
            expected: expected_size,
            actual: bytes,
        });
    }
    Ok(Merged {
        artifact,
        bytes,
        algorithm,
        digest,
    })
}
