//! Verified source archives and the source trees unpacked from them.
//!
//! [`VerifiedArchive`] can only be built by checking bytes against a content
//! hash, and [`SourceTree`] can only be built by unpacking a
//! [`VerifiedArchive`]. Since installing needs a `SourceTree`, nothing can be
//! placed from an archive that failed verification.

use crate::integrity::{verify_integrity, ContentHash, IntegrityError};
use crate::manifest::PackageDescriptor;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that can occur while unpacking an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to unpack archive: {0}")]
    Io(#[from] io::Error),

    #[error("archive contains no entries")]
    Empty,
}

/// Archive bytes whose digest matched the expected content hash.
#[derive(Debug)]
pub struct VerifiedArchive {
    data: Vec<u8>,
    hash: ContentHash,
}

impl VerifiedArchive {
    /// Verify `data` against the descriptor's content hash.
    pub fn verify(data: Vec<u8>, descriptor: &PackageDescriptor) -> Result<Self, IntegrityError> {
        Self::verify_against(data, descriptor.content_hash())
    }

    /// Verify `data` against an explicit hash.
    pub fn verify_against(data: Vec<u8>, expected: &ContentHash) -> Result<Self, IntegrityError> {
        verify_integrity(&data, expected)?;
        Ok(Self {
            data,
            hash: *expected,
        })
    }

    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Unpack into a fresh staging directory removed when the tree is dropped.
    pub fn unpack(&self) -> Result<SourceTree, ArchiveError> {
        let staging = tempfile::Builder::new().prefix("keg-src-").tempdir()?;
        let root = self.unpack_into(staging.path())?;
        Ok(SourceTree {
            root,
            _staging: staging,
        })
    }

    /// Archives with a single top-level directory (`name-1.2.3/...`, as
    /// source tarballs usually are) are rooted at that directory.
    fn unpack_into(&self, dest: &Path) -> Result<PathBuf, ArchiveError> {
        let reader: Box<dyn Read + '_> = if self.data.starts_with(&GZIP_MAGIC) {
            Box::new(GzDecoder::new(self.data.as_slice()))
        } else {
            Box::new(self.data.as_slice())
        };

        // `unpack` refuses entries that would land outside `dest`.
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.unpack(dest)?;

        let mut entries = fs::read_dir(dest)?.collect::<Result<Vec<_>, _>>()?;
        match entries.len() {
            0 => Err(ArchiveError::Empty),
            1 if entries[0].file_type()?.is_dir() => Ok(entries.remove(0).path()),
            _ => Ok(dest.to_path_buf()),
        }
    }
}

/// The unpacked contents of a verified archive.
#[derive(Debug)]
pub struct SourceTree {
    root: PathBuf,
    _staging: TempDir,
}

impl SourceTree {
    /// Directory install steps resolve their sources against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(entries: &[(&str, &[u8])], gzip: bool) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        if !gzip {
            return tar;
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &tar).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn verify_rejects_wrong_hash() {
        let data = tarball(&[("a.txt", b"a")], true);
        let wrong = ContentHash::compute(b"something else");
        let err = VerifiedArchive::verify_against(data, &wrong).unwrap_err();
        assert!(matches!(err, IntegrityError::Mismatch { .. }));
    }

    #[test]
    fn unpack_strips_single_top_level_directory() {
        let data = tarball(
            &[("pkg-1.0/tool", b"#!/bin/sh\n"), ("pkg-1.0/lib.py", b"x = 1\n")],
            true,
        );
        let hash = ContentHash::compute(&data);
        let archive = VerifiedArchive::verify_against(data, &hash).unwrap();
        let tree = archive.unpack().unwrap();

        assert!(tree.root().ends_with("pkg-1.0"));
        assert_eq!(fs::read(tree.root().join("lib.py")).unwrap(), b"x = 1\n");
    }

    #[test]
    fn unpack_flat_plain_tar() {
        let data = tarball(&[("tool", b"bin"), ("lib.py", b"py")], false);
        let hash = ContentHash::compute(&data);
        let archive = VerifiedArchive::verify_against(data, &hash).unwrap();
        let tree = archive.unpack().unwrap();

        assert!(tree.root().join("tool").is_file());
        assert_eq!(fs::read(tree.root().join("lib.py")).unwrap(), b"py");
    }

    #[test]
    fn staging_directory_is_removed_on_drop() {
        let data = tarball(&[("tool", b"bin")], true);
        let hash = ContentHash::compute(&data);
        let tree = VerifiedArchive::verify_against(data, &hash)
            .unwrap()
            .unpack()
            .unwrap();
        let root = tree.root().to_path_buf();
        assert!(root.exists());
        drop(tree);
        assert!(!root.exists());
    }
}
