//! The install run state machine.
//!
//! ```text
//! Parsed ──verify──▶ Verified ──install──▶ Installed ──test──▶ Tested
//!    │                  │                     │
//!    └──────────────────┴─────────────────────┴──▶ Failed(stage, reason)
//! ```
//!
//! Each transition only happens if the previous one succeeded. A failure is
//! terminal and nothing is rolled back: files placed before a failing install
//! step stay in the prefix.

use crate::archive::{SourceTree, VerifiedArchive};
use crate::depends::{self, DependencyChecker};
use crate::error::Error;
use crate::install::{self, InstallReport, InstallationPrefix};
use crate::manifest::{PackageDescriptor, SubstitutionContext};
use crate::smoke::{self, TestReport};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A step of the lifecycle, named by what it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Verify,
    Install,
    Test,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Verify => "verify",
            Self::Install => "install",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Parsed,
    Verified,
    Installed,
    Tested,
    Failed { stage: Stage, reason: String },
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => f.write_str("parsed"),
            Self::Verified => f.write_str("verified"),
            Self::Installed => f.write_str("installed"),
            Self::Tested => f.write_str("tested"),
            Self::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// A run that stopped at `stage`.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub package: String,
    pub placed: Vec<PathBuf>,
    pub tests_passed: usize,
    pub state: RunState,
}

/// Drives one package through parse, verify, install and test.
#[derive(Debug)]
pub struct Lifecycle {
    descriptor: PackageDescriptor,
    state: RunState,
    source: Option<SourceTree>,
    placed: Vec<PathBuf>,
    tests_passed: usize,
    run_tests: bool,
}

impl Lifecycle {
    /// Start from an already resolved descriptor.
    #[must_use]
    pub fn new(descriptor: PackageDescriptor) -> Self {
        tracing::info!(package = descriptor.name(), "manifest parsed");
        Self {
            descriptor,
            state: RunState::Parsed,
            source: None,
            placed: Vec::new(),
            tests_passed: 0,
            run_tests: true,
        }
    }

    /// Parse manifest text into a new run.
    pub fn parse(content: &str, ctx: &SubstitutionContext) -> Result<Self, RunError> {
        let descriptor = PackageDescriptor::parse(content, ctx).map_err(|e| RunError {
            stage: Stage::Parse,
            source: e.into(),
        })?;
        Ok(Self::new(descriptor))
    }

    /// Stop [`Lifecycle::run`] after the install stage.
    #[must_use]
    pub fn skip_tests(mut self, skip: bool) -> Self {
        self.run_tests = !skip;
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Ask `checker` about every declared dependency.
    ///
    /// Only valid before verification. An unsatisfied dependency fails the
    /// run at the parse stage.
    pub fn check_dependencies(&mut self, checker: &dyn DependencyChecker) -> Result<(), RunError> {
        self.require_state(&RunState::Parsed, Stage::Parse)?;
        depends::check_all(checker, self.descriptor.dependencies())
            .map_err(|e| self.fail(Stage::Parse, e))
    }

    /// Check the archive against the content hash and unpack it for staging.
    pub fn verify(&mut self, data: Vec<u8>) -> Result<(), RunError> {
        self.require_state(&RunState::Parsed, Stage::Verify)?;

        let archive = VerifiedArchive::verify(data, &self.descriptor)
            .map_err(|e| self.fail(Stage::Verify, e))?;
        tracing::info!(
            package = self.descriptor.name(),
            sha256 = %archive.hash(),
            bytes = archive.len(),
            "archive verified"
        );

        let tree = archive.unpack().map_err(|e| self.fail(Stage::Verify, e))?;
        self.source = Some(tree);
        self.state = RunState::Verified;
        Ok(())
    }

    /// Apply the install steps to `prefix`.
    pub fn install(&mut self, prefix: &InstallationPrefix) -> Result<&[PathBuf], RunError> {
        self.require_state(&RunState::Verified, Stage::Install)?;

        let Some(tree) = self.source.take() else {
            return Err(self.fail(
                Stage::Install,
                Error::OutOfOrder {
                    attempted: "install",
                    state: "verified without a source tree".to_string(),
                },
            ));
        };

        let InstallReport { placed } = install::install(&self.descriptor, &tree, prefix)
            .map_err(|e| self.fail(Stage::Install, e))?;
        tracing::info!(
            package = self.descriptor.name(),
            files = placed.len(),
            prefix = %prefix.root().display(),
            "package installed"
        );

        self.placed = placed;
        self.state = RunState::Installed;
        Ok(&self.placed)
    }

    /// Run the smoke tests against `prefix`.
    pub fn test(&mut self, prefix: &InstallationPrefix) -> Result<usize, RunError> {
        self.require_state(&RunState::Installed, Stage::Test)?;

        let TestReport { passed } = smoke::run_tests(&self.descriptor, prefix)
            .map_err(|e| self.fail(Stage::Test, e))?;
        tracing::info!(package = self.descriptor.name(), passed, "tests passed");

        self.tests_passed = passed;
        self.state = RunState::Tested;
        Ok(passed)
    }

    /// Verify, install and (unless skipped) test in one go.
    pub fn run(
        mut self,
        data: Vec<u8>,
        prefix: &InstallationPrefix,
    ) -> Result<RunReport, RunError> {
        self.verify(data)?;
        self.install(prefix)?;
        if self.run_tests {
            self.test(prefix)?;
        }
        Ok(self.into_report())
    }

    /// Summary of what has happened so far.
    #[must_use]
    pub fn into_report(self) -> RunReport {
        RunReport {
            package: self.descriptor.name().to_string(),
            placed: self.placed,
            tests_passed: self.tests_passed,
            state: self.state,
        }
    }

    fn require_state(&self, expected: &RunState, attempted: Stage) -> Result<(), RunError> {
        if &self.state == expected {
            return Ok(());
        }
        Err(RunError {
            stage: attempted,
            source: Error::OutOfOrder {
                attempted: attempted.as_str(),
                state: self.state.to_string(),
            },
        })
    }

    fn fail(&mut self, stage: Stage, err: impl Into<Error>) -> RunError {
        let source = err.into();
        tracing::error!(package = self.descriptor.name(), %stage, "{source}");
        self.state = RunState::Failed {
            stage,
            reason: source.to_string(),
        };
        RunError { stage, source }
    }
}
