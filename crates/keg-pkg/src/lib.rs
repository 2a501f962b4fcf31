//! Manifest interpretation and install orchestration for keg packages.
//!
//! This crate provides:
//! - Parsing of package manifests with `###token###` placeholder substitution
//! - SHA-256 verification of source archives before anything is unpacked
//! - Placement of executables and support files into an installation prefix
//! - Post-install smoke tests
//! - Host-side dependency checks and a cached archive fetcher

pub mod archive;
pub mod config;
pub mod depends;
mod error;
pub mod fetch;
pub mod install;
pub mod integrity;
pub mod lifecycle;
mod manifest;
pub mod smoke;

pub use archive::{ArchiveError, SourceTree, VerifiedArchive};
pub use config::{Config, ConfigError};
pub use depends::{
    check_all, DependencyChecker, DependencyError, DependencyId, PathDependencyChecker,
    StaticDependencyChecker,
};
pub use error::{Error, Result};
pub use fetch::{read_local, FetchError, FetchedArchive, Fetcher};
pub use install::{install, InstallError, InstallReport, InstallationPrefix, BIN_DIR, LIBEXEC_DIR};
pub use integrity::{verify_integrity, ContentHash, IntegrityError};
pub use lifecycle::{Lifecycle, RunError, RunReport, RunState, Stage};
pub use manifest::{
    InstallAction, Manifest, ManifestError, Package, PackageDescriptor, SubstitutionContext,
    TestAction, TestStep, PLACEHOLDER_DELIMITER, SHA256_TOKEN, VERSION_TOKEN,
};
pub use smoke::{run_tests, TestError, TestReport};
