//! Checksum command: print a file's digest in integrity-token form.

use anyhow::Result;
use rangefetch_core::checksum::{self, DigestAlgorithm};
use std::path::Path;

/// Compute and print `<algo>:<hex>` of the given file.
pub fn run_checksum(path: &Path, algorithm: DigestAlgorithm) -> Result<()> {
    let digest = checksum::digest_path(algorithm, path)?;
    println!("{}  {}", checksum::format_token(algorithm, &digest), path.display());
    Ok(())
}
