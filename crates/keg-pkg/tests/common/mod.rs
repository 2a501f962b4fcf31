//! Helpers shared by the integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use keg_pkg::{ContentHash, PackageDescriptor, SubstitutionContext};
use std::io::Write;
use std::path::Path;

pub const MACPREFS_MANIFEST: &str = r####"
depends-on = ["python@3"]

[package]
name = "macprefs"
description = "Backup and Restore your Mac System and App Preferences"
homepage = "https://github.com/clintmod/macprefs"
url = "https://github.com/clintmod/macprefs/archive/###version###.tar.gz"
sha256 = "###sha256###"

[[install]]
action = "copy-binary"
source = "macprefs"

[[install]]
action = "copy-files"
glob = "*.py"

[[test]]
command = ["bin/macprefs", "--help"]
"####;

/// A script that exits 0 for `--help` and 2 otherwise.
pub const MACPREFS_SCRIPT: &[u8] =
    b"#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then echo 'usage: macprefs'; exit 0; fi\nexit 2\n";

pub struct Entry<'a> {
    pub path: &'a str,
    pub data: &'a [u8],
    pub mode: u32,
    pub link: Option<&'a Path>,
}

pub fn file<'a>(path: &'a str, data: &'a [u8]) -> Entry<'a> {
    Entry {
        path,
        data,
        mode: 0o644,
        link: None,
    }
}

pub fn executable<'a>(path: &'a str, data: &'a [u8]) -> Entry<'a> {
    Entry {
        path,
        data,
        mode: 0o755,
        link: None,
    }
}

/// A symbolic link at `path` pointing to `target`.
pub fn symlink<'a>(path: &'a str, target: &'a Path) -> Entry<'a> {
    Entry {
        path,
        data: b"",
        mode: 0o777,
        link: Some(target),
    }
}

/// Build a gzipped tarball with every entry under `top/`.
pub fn tarball(top: &str, entries: &[Entry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let path = format!("{top}/{}", entry.path);
        let mut header = tar::Header::new_gnu();
        header.set_mode(entry.mode);
        if let Some(target) = entry.link {
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            builder.append_link(&mut header, path, target).unwrap();
            continue;
        }
        header.set_size(entry.data.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, path, entry.data).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

/// The archive from the macprefs scenario.
pub fn macprefs_archive() -> Vec<u8> {
    tarball(
        "macprefs-1.2.3",
        &[
            executable("macprefs", MACPREFS_SCRIPT),
            file("helper.py", b"def helper():\n    pass\n"),
            file("config.py", b"MACPREFS_DIR = '~/Dropbox/MacPrefsBackup'\n"),
            file("README.md", b"# macprefs\n"),
        ],
    )
}

pub fn context_for(data: &[u8]) -> SubstitutionContext {
    SubstitutionContext::new("1.2.3", ContentHash::compute(data).to_hex()).unwrap()
}

pub fn descriptor(manifest: &str, data: &[u8]) -> PackageDescriptor {
    PackageDescriptor::parse(manifest, &context_for(data)).unwrap()
}
