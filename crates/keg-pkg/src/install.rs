//! Placement of unpacked files into an installation prefix.
//!
//! Layout written beneath the prefix:
//! ```text
//! prefix/
//! ├── bin/        # copy-binary targets, mode 0755
//! └── libexec/    # copy-files targets, flattened
//! ```
//!
//! Nothing is ever written outside those two directories, and the prefix
//! itself must already exist.

use crate::archive::SourceTree;
use crate::manifest::{InstallAction, PackageDescriptor};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Executables directory name.
pub const BIN_DIR: &str = "bin";

/// Auxiliary files directory name.
pub const LIBEXEC_DIR: &str = "libexec";

/// Errors that can occur while placing files.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("installation prefix does not exist: {}", .0.display())]
    PrefixMissing(PathBuf),

    #[error("installation prefix is not a directory: {}", .0.display())]
    PrefixNotDirectory(PathBuf),

    #[error("step {step} ({action}): source '{}' not found", .path.display())]
    MissingSource {
        step: usize,
        action: String,
        path: PathBuf,
    },

    #[error("step {step} ({action}): '{}' is not a regular file", .path.display())]
    NotAFile {
        step: usize,
        action: String,
        path: PathBuf,
    },

    #[error("step {step} ({action}): pattern matched no files")]
    NoMatches { step: usize, action: String },

    #[error("step {step} ({action}): invalid glob pattern: {reason}")]
    Pattern {
        step: usize,
        action: String,
        reason: String,
    },

    #[error("step {step} ({action}): path '{path}' escapes the source tree")]
    OutsideSource {
        step: usize,
        action: String,
        path: String,
    },

    #[error("step {step} ({action}): more than one match is named '{name}'")]
    Collision {
        step: usize,
        action: String,
        name: String,
    },

    #[error("step {step} ({action}): {}: {source}", .path.display())]
    Io {
        step: usize,
        action: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An existing directory supplied by the host to install into.
#[derive(Debug, Clone)]
pub struct InstallationPrefix {
    root: PathBuf,
}

impl InstallationPrefix {
    /// Wrap an existing directory; the prefix is never created here.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, InstallError> {
        let root = root.into();
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(InstallError::PrefixNotDirectory(root)),
            Err(_) => Err(InstallError::PrefixMissing(root)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bin(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    #[must_use]
    pub fn libexec(&self) -> PathBuf {
        self.root.join(LIBEXEC_DIR)
    }
}

/// Files written by one install run, in the order they were placed.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub placed: Vec<PathBuf>,
}

/// Apply every install step of `descriptor` in order.
///
/// Re-running with the same inputs overwrites the same files with the same
/// bytes and modes. A failing step leaves earlier steps' files in place.
pub fn install(
    descriptor: &PackageDescriptor,
    source: &SourceTree,
    prefix: &InstallationPrefix,
) -> Result<InstallReport, InstallError> {
    let mut report = InstallReport::default();

    for (index, action) in descriptor.install_steps().iter().enumerate() {
        let step = Step {
            number: index + 1,
            action,
        };
        tracing::debug!(
            package = descriptor.name(),
            step = step.number,
            %action,
            "applying install step"
        );

        let placed = match action {
            InstallAction::CopyBinary { source: path } => {
                copy_binary(&step, source.root(), path, prefix)?
            }
            InstallAction::CopyFiles { glob } => copy_files(&step, source.root(), glob, prefix)?,
        };
        report.placed.extend(placed);
    }

    Ok(report)
}

struct Step<'a> {
    number: usize,
    action: &'a InstallAction,
}

impl Step<'_> {
    fn io(&self, path: &Path, source: io::Error) -> InstallError {
        InstallError::Io {
            step: self.number,
            action: self.action.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }

    fn not_a_file(&self, path: &Path) -> InstallError {
        InstallError::NotAFile {
            step: self.number,
            action: self.action.to_string(),
            path: path.to_path_buf(),
        }
    }

    /// Reject absolute paths and `..` so sources stay inside the tree.
    fn check_relative(&self, path: &str) -> Result<(), InstallError> {
        let escapes = Path::new(path).components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes {
            return Err(InstallError::OutsideSource {
                step: self.number,
                action: self.action.to_string(),
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn outside(&self, path: &Path) -> InstallError {
        InstallError::OutsideSource {
            step: self.number,
            action: self.action.to_string(),
            path: path.display().to_string(),
        }
    }

    /// Resolve symlinks in `path` and require the result to lie under `root`.
    fn contained(&self, root: &Path, path: &Path) -> Result<PathBuf, InstallError> {
        let real_root = fs::canonicalize(root).map_err(|e| self.io(root, e))?;
        let real = match fs::canonicalize(path) {
            Ok(real) => real,
            // A dangling link points at nothing inside the tree.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(self.outside(path)),
            Err(e) => return Err(self.io(path, e)),
        };
        if !real.starts_with(&real_root) {
            return Err(self.outside(path));
        }
        Ok(real)
    }
}

fn copy_binary(
    step: &Step<'_>,
    root: &Path,
    path: &str,
    prefix: &InstallationPrefix,
) -> Result<Vec<PathBuf>, InstallError> {
    step.check_relative(path)?;
    let src = root.join(path);

    match fs::symlink_metadata(&src) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InstallError::MissingSource {
                step: step.number,
                action: step.action.to_string(),
                path: PathBuf::from(path),
            })
        }
        Err(e) => return Err(step.io(&src, e)),
    }
    let real = step.contained(root, &src)?;
    if !real.is_file() {
        return Err(step.not_a_file(&src));
    }

    let name = src.file_name().ok_or_else(|| step.not_a_file(&src))?;
    let target_dir = prefix.bin();
    fs::create_dir_all(&target_dir).map_err(|e| step.io(&target_dir, e))?;

    let dest = target_dir.join(name);
    place_file(step, &real, &dest)?;
    make_executable(&dest).map_err(|e| step.io(&dest, e))?;

    tracing::info!(file = %dest.display(), "installed executable");
    Ok(vec![dest])
}

fn copy_files(
    step: &Step<'_>,
    root: &Path,
    pattern: &str,
    prefix: &InstallationPrefix,
) -> Result<Vec<PathBuf>, InstallError> {
    step.check_relative(pattern)?;

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern
    );
    // Like a shell, `*` does not match a leading dot.
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    };
    let paths = glob::glob_with(&full_pattern, options).map_err(|e| InstallError::Pattern {
        step: step.number,
        action: step.action.to_string(),
        reason: e.to_string(),
    })?;

    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            step.io(&path, io::Error::from(e))
        })?;
        let real = step.contained(root, &path)?;
        if !real.is_file() {
            return Err(step.not_a_file(&path));
        }
        matches.push((path, real));
    }

    if matches.is_empty() {
        return Err(InstallError::NoMatches {
            step: step.number,
            action: step.action.to_string(),
        });
    }

    // Flattening must not let two sources fight over one destination.
    let mut names = BTreeSet::new();
    for (path, _) in &matches {
        let name = path.file_name().ok_or_else(|| step.not_a_file(path))?;
        if !names.insert(name.to_os_string()) {
            return Err(InstallError::Collision {
                step: step.number,
                action: step.action.to_string(),
                name: name.to_string_lossy().into_owned(),
            });
        }
    }

    let target_dir = prefix.libexec();
    fs::create_dir_all(&target_dir).map_err(|e| step.io(&target_dir, e))?;

    let mut placed = Vec::with_capacity(matches.len());
    for (src, real) in matches {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dest = target_dir.join(name);
        place_file(step, &real, &dest)?;
        tracing::debug!(file = %dest.display(), "installed file");
        placed.push(dest);
    }

    tracing::info!(count = placed.len(), dir = %target_dir.display(), "installed files");
    Ok(placed)
}

/// Copy `src` over `dest`, replacing whatever file was there.
fn place_file(step: &Step<'_>, src: &Path, dest: &Path) -> Result<(), InstallError> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => return Err(step.not_a_file(dest)),
        // A previous run may have left a read-only copy.
        Ok(_) => fs::remove_file(dest).map_err(|e| step.io(dest, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(step.io(dest, e)),
    }

    // `fs::copy` carries the permission bits over on Unix.
    fs::copy(src, dest).map_err(|e| step.io(src, e))?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
