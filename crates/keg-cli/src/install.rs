//! Implementation of the `keg install` command.

use anyhow::{Context, Result};
use keg_pkg::{
    read_local, Config, Fetcher, InstallationPrefix, Lifecycle, PackageDescriptor,
    PathDependencyChecker, RunReport, RunState,
};
use std::path::PathBuf;

/// Options for the install command.
#[derive(Debug)]
pub struct InstallOptions {
    /// The resolved package.
    pub descriptor: PackageDescriptor,
    /// Existing directory to install into.
    pub prefix: PathBuf,
    /// Local archive to use instead of the source url.
    pub archive: Option<PathBuf>,
    pub skip_tests: bool,
    pub check_deps: bool,
    pub use_cache: bool,
}

/// Check dependencies, obtain the archive, then verify, install and test.
pub fn install_package(options: InstallOptions) -> Result<RunReport> {
    let prefix = InstallationPrefix::new(&options.prefix)
        .with_context(|| format!("cannot install into '{}'", options.prefix.display()))?;

    let mut lifecycle = Lifecycle::new(options.descriptor).skip_tests(options.skip_tests);

    if options.check_deps {
        lifecycle.check_dependencies(&PathDependencyChecker::new())?;
    }

    let data = match &options.archive {
        Some(path) => read_local(path)
            .with_context(|| format!("failed to read archive '{}'", path.display()))?,
        None => {
            let config = Config::load().context("failed to load configuration")?;
            let fetcher = Fetcher::new(&config)?.with_cache(options.use_cache);
            let source_url = lifecycle.descriptor().source_url();
            let fetched = fetcher
                .fetch(lifecycle.descriptor())
                .with_context(|| format!("failed to fetch {source_url}"))?;
            if fetched.from_cache {
                println!("Using cached archive");
            }
            fetched.data
        }
    };

    let report = lifecycle
        .run(data, &prefix)
        .with_context(|| format!("failed to install into '{}'", prefix.root().display()))?;
    Ok(report)
}

/// Print what was placed and how far the run got.
pub fn print_summary(report: &RunReport) {
    println!("Installed {}:", report.package);
    for path in &report.placed {
        println!("  + {}", path.display());
    }

    match report.state {
        RunState::Tested => println!("{} test(s) passed", report.tests_passed),
        RunState::Installed => println!("Tests skipped"),
        _ => {}
    }
}
