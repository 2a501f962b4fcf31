//! Post-install smoke tests.

use crate::install::InstallationPrefix;
use crate::manifest::{PackageDescriptor, TestAction};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// A smoke test that did not pass.
#[derive(Error, Debug)]
pub enum TestError {
    #[error("test {step} (`{command}`) {}", describe_failure(.code, .stderr))]
    Failed {
        step: usize,
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("test {step} (`{command}`) could not be started: {source}")]
    Spawn {
        step: usize,
        command: String,
        #[source]
        source: io::Error,
    },
}

fn describe_failure(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{status}: {stderr}")
    }
}

/// Outcome of a passing test run.
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub passed: usize,
}

/// Run every test action of `descriptor` against `prefix`, stopping at the
/// first failure.
///
/// Each action runs with `prefix/bin` at the front of `PATH` and the prefix
/// as its working directory.
pub fn run_tests(
    descriptor: &PackageDescriptor,
    prefix: &InstallationPrefix,
) -> Result<TestReport, TestError> {
    let mut report = TestReport::default();

    for (index, action) in descriptor.test_steps().iter().enumerate() {
        let step = index + 1;
        let command = action.to_string();
        tracing::debug!(package = descriptor.name(), step, %command, "running test");

        let spawn_error = |source| TestError::Spawn {
            step,
            command: command.clone(),
            source,
        };

        let path_var = search_path(&prefix.bin()).map_err(spawn_error)?;
        let program = resolve_program(action, prefix, &path_var);

        let output = Command::new(&program)
            .args(&action.args)
            .current_dir(prefix.root())
            .env("PATH", &path_var)
            .stdin(Stdio::null())
            .output()
            .map_err(spawn_error)?;

        if !output.status.success() {
            let err = TestError::Failed {
                step,
                command,
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            tracing::warn!(package = descriptor.name(), "{err}");
            return Err(err);
        }

        report.passed += 1;
    }

    Ok(report)
}

/// `bin_dir` followed by the inherited `PATH`.
fn search_path(bin_dir: &Path) -> Result<OsString, io::Error> {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let dirs = std::iter::once(bin_dir.to_path_buf()).chain(std::env::split_paths(&inherited));
    std::env::join_paths(dirs).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn resolve_program(
    action: &TestAction,
    prefix: &InstallationPrefix,
    search_path: &OsString,
) -> PathBuf {
    let program = Path::new(&action.program);
    if program.is_absolute() {
        return program.to_path_buf();
    }
    if program.components().count() > 1 {
        return prefix.root().join(program);
    }
    which::which_in(&action.program, Some(search_path), prefix.root())
        .unwrap_or_else(|_| program.to_path_buf())
}
