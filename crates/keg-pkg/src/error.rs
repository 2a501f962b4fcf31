//! Top-level error type for an install run.

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::depends::DependencyError;
use crate::fetch::FetchError;
use crate::install::InstallError;
use crate::integrity::IntegrityError;
use crate::manifest::ManifestError;
use crate::smoke::TestError;
use thiserror::Error;

/// Any failure of the manifest interpreter.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Test(#[from] TestError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lifecycle step was requested from the wrong state.
    #[error("cannot {attempted} while {state}")]
    OutOfOrder {
        attempted: &'static str,
        state: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
