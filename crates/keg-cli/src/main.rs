//! keg CLI - install packages described by manifest templates

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use keg_pkg::{PackageDescriptor, SubstitutionContext};
use std::path::PathBuf;
use tracing::Level;

mod check;
mod install;
mod smoke;
mod verify;

#[derive(Parser)]
#[command(name = "keg")]
#[command(version)]
#[command(about = "Install packages from manifest templates", long_about = None)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify, install and test a package into a prefix
    Install {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Existing directory to install into
        #[arg(long)]
        prefix: PathBuf,

        /// Use a local archive instead of downloading the source url
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Stop after the install stage
        #[arg(long)]
        skip_tests: bool,

        /// Do not check declared dependencies
        #[arg(long)]
        no_deps: bool,

        /// Neither read nor write the download cache
        #[arg(long, conflicts_with = "archive")]
        no_cache: bool,
    },

    /// Parse and resolve a manifest, then print the result
    Check {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Print the resolved descriptor as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a local archive against a SHA-256 digest
    Verify {
        /// Path to the archive
        archive: PathBuf,

        /// Expected SHA-256 digest (64 hex characters)
        #[arg(long)]
        sha256: String,
    },

    /// Run a package's smoke tests against an existing install
    Test {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Directory the package was installed into
        #[arg(long)]
        prefix: PathBuf,
    },
}

/// The manifest plus the values for its placeholders.
#[derive(Args, Debug)]
struct ManifestArgs {
    /// Path to the manifest template
    manifest: PathBuf,

    /// Package version, substituted for ###version###
    #[arg(long = "version", value_name = "VERSION")]
    version: String,

    /// Archive SHA-256, substituted for ###sha256###
    #[arg(long, value_name = "HEX")]
    sha256: String,

    /// Extra placeholder value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

impl ManifestArgs {
    fn context(&self) -> Result<SubstitutionContext> {
        let mut ctx = SubstitutionContext::new(&self.version, &self.sha256)
            .context("invalid placeholder values")?;
        for var in &self.vars {
            ctx.insert_assignment(var)
                .with_context(|| format!("invalid --var '{var}'"))?;
        }
        Ok(ctx)
    }

    /// Read, parse and resolve the manifest.
    fn load(&self) -> Result<PackageDescriptor> {
        let ctx = self.context()?;
        PackageDescriptor::from_path(&self.manifest, &ctx)
            .with_context(|| format!("failed to load manifest '{}'", self.manifest.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Install {
            manifest,
            prefix,
            archive,
            skip_tests,
            no_deps,
            no_cache,
        } => {
            let options = install::InstallOptions {
                descriptor: manifest.load()?,
                prefix,
                archive,
                skip_tests,
                check_deps: !no_deps,
                use_cache: !no_cache,
            };
            let report = install::install_package(options)?;
            install::print_summary(&report);
        }

        Commands::Check { manifest, json } => {
            let descriptor = manifest.load()?;
            check::print_descriptor(&descriptor, json)?;
        }

        Commands::Verify { archive, sha256 } => {
            verify::verify_archive(&archive, &sha256)?;
        }

        Commands::Test { manifest, prefix } => {
            let descriptor = manifest.load()?;
            smoke::run_smoke_tests(&descriptor, &prefix)?;
        }
    }

    Ok(())
}

/// Send log output to stderr so stdout stays clean for results.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
