//! Content digests and integrity-token conventions.
//!
//! Servers hand out an opaque token (the `ETag`). When it follows the
//! `<algo>:<hex>` convention (e.g. `"md5:9e10..."`, quotes optional, weak
//! `W/` prefix ignored) we compute the same algorithm and compare in the same
//! form. A bare 32-hex token is compared to the bare MD5 hex. Anything else is
//! compared against `md5:<hex>` and will simply not match.

use anyhow::{Context, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithms we can compute locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Parse a prefix such as `md5` or `SHA256`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running digest over one of the supported algorithms.
#[derive(Clone)]
pub enum Digester {
    Md5(Md5),
    Sha256(Sha256),
}

impl Digester {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Digester::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Digester::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Md5(h) => h.update(data),
            Digester::Sha256(h) => h.update(data),
        }
    }

    /// Finish and return the digest as lowercase hex.
    pub fn finalize_hex(self) -> String {
        match self {
            Digester::Md5(h) => hex::encode(h.finalize()),
            Digester::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Writer adapter that feeds every written byte into a digest.
pub struct DigestWriter<W> {
    inner: W,
    digest: Digester,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            digest: Digester::new(algorithm),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the inner writer and the lowercase hex digest.
    pub fn finish(self) -> (W, String) {
        (self.inner, self.digest.finalize_hex())
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// How the locally computed digest must be rendered to compare with a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpec {
    pub algorithm: DigestAlgorithm,
    /// Normalized expected value (quotes and `W/` stripped, lowercase).
    pub expected: String,
    /// Token had no `<algo>:` prefix; compare bare hex.
    pub bare: bool,
}

impl TokenSpec {
    pub fn parse(token: &str) -> Self {
        let normalized = normalize_token(token);
        if let Some((name, _)) = normalized.split_once(':') {
            if let Some(algorithm) = DigestAlgorithm::from_name(name) {
                return Self {
                    algorithm,
                    expected: normalized,
                    bare: false,
                };
            }
        }
        let bare = normalized.len() == 32 && normalized.bytes().all(|b| b.is_ascii_hexdigit());
        Self {
            algorithm: DigestAlgorithm::Md5,
            expected: normalized,
            bare,
        }
    }

    /// Render a hex digest the way the token is written.
    pub fn render(&self, hex_digest: &str) -> String {
        if self.bare {
            hex_digest.to_string()
        } else {
            format_token(self.algorithm, hex_digest)
        }
    }

    pub fn matches(&self, hex_digest: &str) -> bool {
        self.render(hex_digest) == self.expected
    }
}

/// Strip a weak-validator prefix and surrounding quotes; lowercase.
pub fn normalize_token(token: &str) -> String {
    let t = token.trim();
    let t = t.strip_prefix("W/").unwrap_or(t);
    t.trim_matches('"').trim().to_ascii_lowercase()
}

/// `<algo>:<hex>` form of a digest.
pub fn format_token(algorithm: DigestAlgorithm, hex_digest: &str) -> String {
    format!("{}:{}", algorithm, hex_digest)
}

/// Digest of an in-memory buffer as lowercase hex.
pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut d = Digester::new(algorithm);
    d.update(data);
    d.finalize_hex()
}

/// Compute a digest of a file and return it as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn digest_path(algorithm: DigestAlgorithm, path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut digest = Digester::new(algorithm);
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize_hex())
}
