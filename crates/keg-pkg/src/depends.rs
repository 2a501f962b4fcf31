//! Declared runtime dependencies and the host-side capability check.
//!
//! A manifest only *declares* what it needs (`depends-on = ["python@3"]`).
//! Making sure those tools exist is the host's job: it runs a
//! [`DependencyChecker`] over the declared identifiers before asking the
//! installer to do anything.

use crate::manifest::ManifestError;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while checking dependencies.
#[derive(Error, Debug)]
pub enum DependencyError {
    /// One or more declared dependencies are not present.
    #[error("unsatisfied dependencies: {}", .0.join(", "))]
    Unsatisfied(Vec<String>),

    /// Probing a candidate executable failed.
    #[error("failed to query dependency '{name}' at {}: {source}", .path.display())]
    VersionQuery {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A dependency identifier: `name` or `name@requirement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct DependencyId {
    name: String,
    requirement: Option<VersionReq>,
    raw: String,
}

impl DependencyId {
    /// Parse an identifier such as `python`, `python@3` or `node@>=18`.
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidDependency {
            id: raw.to_string(),
            reason,
        };

        let (name, requirement) = match raw.split_once('@') {
            Some((name, req)) => {
                if req.trim().is_empty() {
                    return Err(invalid("version requirement after '@' is empty".to_string()));
                }
                let req = VersionReq::parse(req.trim()).map_err(|e| invalid(e.to_string()))?;
                (name, Some(req))
            }
            None => (raw, None),
        };

        if name.is_empty() {
            return Err(invalid("name cannot be empty".to_string()));
        }
        if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("name must start with a letter or digit".to_string()));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | '+'))
        {
            return Err(invalid(format!("name contains invalid character '{c}'")));
        }

        Ok(Self {
            name: name.to_string(),
            requirement,
            raw: raw.to_string(),
        })
    }

    /// Dependency name without the requirement.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version requirement, if one was declared.
    #[must_use]
    pub fn requirement(&self) -> Option<&VersionReq> {
        self.requirement.as_ref()
    }

    /// The identifier as written in the manifest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Executable names worth looking for: `python@3` tries `python3` then `python`.
    #[must_use]
    pub fn executable_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(major) = self
            .requirement
            .as_ref()
            .and_then(|req| req.comparators.first())
            .map(|c| c.major)
        {
            candidates.push(format!("{}{major}", self.name));
        }
        candidates.push(self.name.clone());
        candidates
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<DependencyId> for String {
    fn from(id: DependencyId) -> Self {
        id.raw
    }
}

/// Answers whether a declared dependency is present in the host environment.
pub trait DependencyChecker {
    /// Returns `true` when `dependency` is available.
    fn is_satisfied(&self, dependency: &DependencyId) -> Result<bool, DependencyError>;
}

/// Check every dependency, reporting all missing ones together.
pub fn check_all(
    checker: &dyn DependencyChecker,
    dependencies: &[DependencyId],
) -> Result<(), DependencyError> {
    let mut missing = Vec::new();
    for dependency in dependencies {
        if checker.is_satisfied(dependency)? {
            tracing::debug!(dependency = %dependency, "dependency satisfied");
        } else {
            tracing::warn!(dependency = %dependency, "dependency not satisfied");
            missing.push(dependency.to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DependencyError::Unsatisfied(missing))
    }
}

/// Looks dependencies up as executables on `PATH`.
///
/// With a requirement, the executable's `--version` output is parsed and the
/// first version number found must satisfy it.
#[derive(Debug, Clone, Default)]
pub struct PathDependencyChecker {
    search_path: Option<OsString>,
}

impl PathDependencyChecker {
    /// Search the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Search an explicit path list instead of the process `PATH`.
    #[must_use]
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    fn locate(&self, candidate: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(candidate, Some(paths), cwd).ok()
            }
            None => which::which(candidate).ok(),
        }
    }

    fn query_version(name: &str, executable: &Path) -> Result<Option<Version>, DependencyError> {
        let output = Command::new(executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DependencyError::VersionQuery {
                name: name.to_string(),
                path: executable.to_path_buf(),
                source,
            })?;

        // Some interpreters print their version on stderr.
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(extract_version(&text))
    }
}

impl DependencyChecker for PathDependencyChecker {
    fn is_satisfied(&self, dependency: &DependencyId) -> Result<bool, DependencyError> {
        for candidate in dependency.executable_candidates() {
            let Some(executable) = self.locate(&candidate) else {
                continue;
            };

            let Some(requirement) = dependency.requirement() else {
                return Ok(true);
            };

            match Self::query_version(dependency.name(), &executable)? {
                Some(version) if requirement.matches(&version) => return Ok(true),
                Some(version) => {
                    tracing::debug!(
                        candidate = %executable.display(),
                        %version,
                        %requirement,
                        "candidate version does not match"
                    );
                }
                None => {
                    tracing::debug!(
                        candidate = %executable.display(),
                        "no version in --version output"
                    );
                }
            }
        }
        Ok(false)
    }
}

/// Answers from a fixed table of available dependencies.
#[derive(Debug, Clone, Default)]
pub struct StaticDependencyChecker {
    available: BTreeMap<String, Option<Version>>,
}

impl StaticDependencyChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as available, optionally at a known version.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, version: Option<Version>) -> Self {
        self.available.insert(name.into(), version);
        self
    }
}

impl DependencyChecker for StaticDependencyChecker {
    fn is_satisfied(&self, dependency: &DependencyId) -> Result<bool, DependencyError> {
        let Some(version) = self.available.get(dependency.name()) else {
            return Ok(false);
        };
        Ok(match (dependency.requirement(), version) {
            (None, _) => true,
            (Some(req), Some(version)) => req.matches(version),
            // Present but of unknown version: only an unconstrained dependency is satisfied.
            (Some(_), None) => false,
        })
    }
}

/// Pull the first `major[.minor[.patch]]` out of free-form text.
fn extract_version(text: &str) -> Option<Version> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("version regex is valid")
    });

    let caps = pattern.captures(text)?;
    let part = |i: usize| {
        caps.get(i)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_name() {
        let dep = DependencyId::parse("git").unwrap();
        assert_eq!(dep.name(), "git");
        assert!(dep.requirement().is_none());
        assert_eq!(dep.executable_candidates(), vec!["git"]);
    }

    #[test]
    fn parse_with_major_requirement() {
        let dep = DependencyId::parse("python@3").unwrap();
        assert_eq!(dep.name(), "python");
        assert!(dep.requirement().unwrap().matches(&Version::new(3, 11, 4)));
        assert!(!dep.requirement().unwrap().matches(&Version::new(2, 7, 18)));
        assert_eq!(dep.executable_candidates(), vec!["python3", "python"]);
        assert_eq!(dep.to_string(), "python@3");
    }

    #[test]
    fn parse_with_comparison_requirement() {
        let dep = DependencyId::parse("node@>=18").unwrap();
        assert!(dep.requirement().unwrap().matches(&Version::new(20, 1, 0)));
    }

    #[test]
    fn parse_rejects_malformed() {
        for raw in ["", "@3", "python@", "python@not-a-version", "py thon", "-python"] {
            let err = DependencyId::parse(raw).unwrap_err();
            assert!(
                matches!(err, ManifestError::InvalidDependency { .. }),
                "{raw:?} gave {err}"
            );
        }
    }

    #[test]
    fn extract_version_from_tool_output() {
        assert_eq!(extract_version("Python 3.11.4"), Some(Version::new(3, 11, 4)));
        assert_eq!(extract_version("v18.2"), Some(Version::new(18, 2, 0)));
        assert_eq!(
            extract_version("git version 2.39.3 (Apple Git-145)"),
            Some(Version::new(2, 39, 3))
        );
        assert_eq!(extract_version("no digits here"), None);
    }

    #[test]
    fn static_checker_honours_requirements() {
        let checker = StaticDependencyChecker::new()
            .with("python", Some(Version::new(3, 12, 0)))
            .with("make", None);

        let python3 = DependencyId::parse("python@3").unwrap();
        let python2 = DependencyId::parse("python@2").unwrap();
        let make = DependencyId::parse("make").unwrap();
        let make4 = DependencyId::parse("make@4").unwrap();
        let ruby = DependencyId::parse("ruby").unwrap();

        assert!(checker.is_satisfied(&python3).unwrap());
        assert!(!checker.is_satisfied(&python2).unwrap());
        assert!(checker.is_satisfied(&make).unwrap());
        assert!(!checker.is_satisfied(&make4).unwrap());
        assert!(!checker.is_satisfied(&ruby).unwrap());
    }

    #[test]
    fn check_all_lists_every_missing_dependency() {
        let checker = StaticDependencyChecker::new().with("python", Some(Version::new(3, 9, 0)));
        let deps = vec![
            DependencyId::parse("python@3").unwrap(),
            DependencyId::parse("ruby").unwrap(),
            DependencyId::parse("perl@5").unwrap(),
        ];

        let err = check_all(&checker, &deps).unwrap_err();
        match err {
            DependencyError::Unsatisfied(missing) => assert_eq!(missing, vec!["ruby", "perl@5"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn path_checker_misses_on_empty_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let checker = PathDependencyChecker::with_search_path(dir.path().as_os_str());
        let dep = DependencyId::parse("definitely-not-installed-tool").unwrap();
        assert!(!checker.is_satisfied(&dep).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn path_checker_reads_version() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fakepy3");
        std::fs::write(&tool, "#!/bin/sh\necho 'FakePy 3.10.2'\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let checker = PathDependencyChecker::with_search_path(dir.path().as_os_str());
        assert!(checker.is_satisfied(&DependencyId::parse("fakepy@3").unwrap()).unwrap());
        assert!(!checker.is_satisfied(&DependencyId::parse("fakepy@>=3.11").unwrap()).unwrap());
        assert!(!checker.is_satisfied(&DependencyId::parse("fakepy").unwrap()).unwrap());
    }
}
