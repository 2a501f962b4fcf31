//! Implementation of the `keg check` command.

use anyhow::{Context, Result};
use keg_pkg::PackageDescriptor;

/// Print a resolved descriptor as manifest TOML or as JSON.
pub fn print_descriptor(descriptor: &PackageDescriptor, json: bool) -> Result<()> {
    let out = if json {
        serde_json::to_string_pretty(descriptor).context("failed to serialize descriptor")?
    } else {
        descriptor
            .to_toml_string()
            .context("failed to render descriptor")?
    };

    println!("{}", out.trim_end());
    Ok(())
}
