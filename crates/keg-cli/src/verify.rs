//! Implementation of the `keg verify` command.

use anyhow::{Context, Result};
use keg_pkg::{read_local, verify_integrity, ContentHash};
use std::path::Path;

/// Check the archive at `path` against `sha256`.
pub fn verify_archive(path: &Path, sha256: &str) -> Result<()> {
    let expected = ContentHash::from_hex(sha256).context("invalid --sha256")?;
    let data = read_local(path)
        .with_context(|| format!("failed to read archive '{}'", path.display()))?;

    verify_integrity(&data, &expected)
        .with_context(|| format!("'{}' failed verification", path.display()))?;

    println!("{}: OK ({} bytes, sha256 {expected})", path.display(), data.len());
    Ok(())
}
