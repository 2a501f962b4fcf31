//! Implementation of the `keg test` command.

use anyhow::{Context, Result};
use keg_pkg::{run_tests, InstallationPrefix, PackageDescriptor};
use std::path::Path;

/// Run the descriptor's test actions against an already installed prefix.
pub fn run_smoke_tests(descriptor: &PackageDescriptor, prefix: &Path) -> Result<()> {
    let prefix = InstallationPrefix::new(prefix)
        .with_context(|| format!("cannot test in '{}'", prefix.display()))?;

    let report = run_tests(descriptor, &prefix)
        .with_context(|| format!("{} failed its tests", descriptor.name()))?;

    println!("{}: {} test(s) passed", descriptor.name(), report.passed);
    Ok(())
}
