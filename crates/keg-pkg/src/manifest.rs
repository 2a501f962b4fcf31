//! Package manifest parsing, placeholder substitution and validation.
//!
//! A manifest is a TOML template. String values may contain placeholders of
//! the form `###token###`, which are replaced from a [`SubstitutionContext`]
//! before anything else happens. The result is an immutable
//! [`PackageDescriptor`] with every placeholder resolved.
//!
//! ```toml
//! depends-on = ["python@3"]
//!
//! [package]
//! name = "macprefs"
//! description = "Backup and Restore your Mac System and App Preferences"
//! homepage = "https://github.com/clintmod/macprefs"
//! url = "https://github.com/clintmod/macprefs/archive/###version###.tar.gz"
//! sha256 = "###sha256###"
//!
//! [[install]]
//! action = "copy-binary"
//! source = "macprefs"
//!
//! [[install]]
//! action = "copy-files"
//! glob = "*.py"
//!
//! [[test]]
//! command = ["bin/macprefs", "--help"]
//! ```

use crate::depends::DependencyId;
use crate::integrity::ContentHash;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

/// The placeholder token for the package version.
pub const VERSION_TOKEN: &str = "version";

/// The placeholder token for the archive content hash.
pub const SHA256_TOKEN: &str = "sha256";

/// Delimiter on both sides of a placeholder token.
pub const PLACEHOLDER_DELIMITER: &str = "###";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid sha256 '{0}': expected 64 hex characters")]
    InvalidHash(String),

    #[error("invalid dependency '{id}': {reason}")]
    InvalidDependency { id: String, reason: String },

    #[error("placeholder '###{token}###' in {field} has no substitution")]
    UnresolvedPlaceholder { field: String, token: String },

    #[error("{field} must contain the '###{token}###' placeholder")]
    MissingPlaceholder { field: &'static str, token: &'static str },

    #[error("invalid substitution '{key}': {reason}")]
    InvalidSubstitution { key: String, reason: &'static str },

    #[error("test {0} has an empty command")]
    EmptyTestCommand(usize),

    #[error("{field} cannot be empty")]
    EmptyField { field: String },
}

/// The manifest as written, before placeholder substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Runtime dependencies the host must provide.
    #[serde(default, rename = "depends-on")]
    pub depends_on: Vec<String>,

    /// Package metadata (required).
    pub package: Package,

    /// Install steps, applied in order.
    #[serde(default)]
    pub install: Vec<InstallAction>,

    /// Post-install smoke tests, run in order.
    #[serde(default, rename = "test")]
    pub tests: Vec<TestStep>,
}

/// Package metadata section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Source archive URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// SHA-256 of the source archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// One filesystem placement step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum InstallAction {
    /// Copy a single executable into `bin`.
    CopyBinary { source: String },

    /// Copy every file matching a glob into `libexec`, flattened.
    CopyFiles { glob: String },
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyBinary { source } => write!(f, "copy-binary {source}"),
            Self::CopyFiles { glob } => write!(f, "copy-files {glob}"),
        }
    }
}

/// A `[[test]]` entry as written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestStep {
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

/// A resolved smoke-test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestAction {
    /// Executable; a path containing a separator is relative to the prefix.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl fmt::Display for TestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Values for the placeholders of one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionContext {
    values: BTreeMap<String, String>,
}

impl SubstitutionContext {
    /// Create a context with the two required tokens.
    pub fn new(
        version: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Result<Self, ManifestError> {
        let mut ctx = Self {
            values: BTreeMap::new(),
        };
        ctx.insert(VERSION_TOKEN, version)?;
        ctx.insert(SHA256_TOKEN, sha256)?;
        Ok(ctx)
    }

    /// Add or replace a token value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ManifestError> {
        let key = key.into();
        let value = value.into();

        if !is_valid_token(&key) {
            return Err(ManifestError::InvalidSubstitution {
                key,
                reason: "token names may only contain letters, digits, '-' and '_'",
            });
        }
        if value.is_empty() {
            return Err(ManifestError::InvalidSubstitution {
                key,
                reason: "value cannot be empty",
            });
        }
        if value.contains(PLACEHOLDER_DELIMITER) {
            return Err(ManifestError::InvalidSubstitution {
                key,
                reason: "value cannot contain '###'",
            });
        }
        if key == VERSION_TOKEN && value.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ManifestError::InvalidSubstitution {
                key,
                reason: "version cannot contain whitespace or '/'",
            });
        }

        self.values.insert(key, value);
        Ok(())
    }

    /// Parse a `key=value` assignment and add it.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), ManifestError> {
        let (key, value) =
            assignment
                .split_once('=')
                .ok_or_else(|| ManifestError::InvalidSubstitution {
                    key: assignment.to_string(),
                    reason: "expected KEY=VALUE",
                })?;
        self.insert(key.trim(), value)
    }

    /// Look up a token value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Replace every placeholder in `value`.
    ///
    /// `field` only names the value in error messages.
    pub fn substitute(&self, field: &str, value: &str) -> Result<String, ManifestError> {
        let pattern = placeholder_pattern();
        let mut out = String::with_capacity(value.len());
        let mut last = 0;

        for caps in pattern.captures_iter(value) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let token = &caps[1];
            let replacement =
                self.get(token)
                    .ok_or_else(|| ManifestError::UnresolvedPlaceholder {
                        field: field.to_string(),
                        token: token.to_string(),
                    })?;
            out.push_str(&value[last..whole.start]);
            out.push_str(replacement);
            last = whole.end;
        }
        out.push_str(&value[last..]);

        // Anything still delimited is malformed, e.g. `###ver sion###`.
        if let Some(start) = out.find(PLACEHOLDER_DELIMITER) {
            let rest = &out[start + PLACEHOLDER_DELIMITER.len()..];
            let token = rest.split(PLACEHOLDER_DELIMITER).next().unwrap_or(rest);
            return Err(ManifestError::UnresolvedPlaceholder {
                field: field.to_string(),
                token: token.to_string(),
            });
        }

        Ok(out)
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"###([A-Za-z0-9_-]+)###").expect("placeholder regex is valid")
    })
}

fn is_valid_token(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn template_mentions(value: &str, token: &str) -> bool {
    placeholder_pattern()
        .captures_iter(value)
        .any(|caps| &caps[1] == token)
}

/// A fully resolved package description.
///
/// Only obtainable through [`PackageDescriptor::parse`] (or
/// [`Manifest::resolve`]), so holding one means every placeholder was
/// substituted and every field validated.
#[derive(Debug, Clone, Serialize)]
pub struct PackageDescriptor {
    name: String,
    description: String,
    homepage: Url,
    source_url: Url,
    content_hash: ContentHash,
    dependencies: Vec<DependencyId>,
    install_steps: Vec<InstallAction>,
    test_steps: Vec<TestAction>,
}

impl PackageDescriptor {
    /// Parse and resolve manifest text.
    pub fn parse(content: &str, ctx: &SubstitutionContext) -> Result<Self, ManifestError> {
        Manifest::parse(content)?.resolve(ctx)
    }

    /// Read, parse and resolve a manifest file.
    pub fn from_path(
        path: impl AsRef<Path>,
        ctx: &SubstitutionContext,
    ) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, ctx)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn homepage(&self) -> &Url {
        &self.homepage
    }

    /// Archive URL with the version substituted.
    #[must_use]
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    #[must_use]
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    #[must_use]
    pub fn dependencies(&self) -> &[DependencyId] {
        &self.dependencies
    }

    #[must_use]
    pub fn install_steps(&self) -> &[InstallAction] {
        &self.install_steps
    }

    #[must_use]
    pub fn test_steps(&self) -> &[TestAction] {
        &self.test_steps
    }

    /// Render the resolved descriptor back to manifest TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        let manifest = Manifest {
            depends_on: self.dependencies.iter().map(ToString::to_string).collect(),
            package: Package {
                name: Some(self.name.clone()),
                description: Some(self.description.clone()),
                homepage: Some(self.homepage.to_string()),
                url: Some(self.source_url.to_string()),
                sha256: Some(self.content_hash.to_hex()),
            },
            install: self.install_steps.clone(),
            tests: self
                .test_steps
                .iter()
                .map(|t| TestStep {
                    command: std::iter::once(t.program.clone())
                        .chain(t.args.iter().cloned())
                        .collect(),
                })
                .collect(),
        };
        manifest.to_toml_string()
    }
}

impl Manifest {
    /// Parse a manifest template from a TOML string.
    ///
    /// Only syntax and required fields are checked here; values are
    /// validated after substitution in [`Manifest::resolve`].
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate_template()?;
        Ok(manifest)
    }

    fn validate_template(&self) -> Result<(), ManifestError> {
        let package = &self.package;
        require(package.name.as_deref(), "package.name")?;
        require(package.description.as_deref(), "package.description")?;
        require(package.homepage.as_deref(), "package.homepage")?;
        let url = require(package.url.as_deref(), "package.url")?;
        let sha256 = require(package.sha256.as_deref(), "package.sha256")?;

        if self.install.is_empty() {
            return Err(ManifestError::MissingField("install"));
        }
        if self.tests.is_empty() {
            return Err(ManifestError::MissingField("test"));
        }

        if !template_mentions(url, VERSION_TOKEN) {
            return Err(ManifestError::MissingPlaceholder {
                field: "package.url",
                token: VERSION_TOKEN,
            });
        }
        // The hash must come from the host, never from the manifest author.
        if !template_mentions(sha256, SHA256_TOKEN) {
            return Err(ManifestError::MissingPlaceholder {
                field: "package.sha256",
                token: SHA256_TOKEN,
            });
        }

        Ok(())
    }

    /// Substitute every placeholder and validate the result.
    pub fn resolve(&self, ctx: &SubstitutionContext) -> Result<PackageDescriptor, ManifestError> {
        let package = &self.package;
        let sub = |field: &str, value: Option<&str>| {
            ctx.substitute(field, value.unwrap_or_default())
        };

        let name = sub("package.name", package.name.as_deref())?;
        validate_name(&name)?;

        let description = sub("package.description", package.description.as_deref())?;
        if description.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                field: "package.description".to_string(),
            });
        }

        let homepage = parse_url(
            "homepage",
            &sub("package.homepage", package.homepage.as_deref())?,
            &["http", "https"],
        )?;
        let source_url = parse_url(
            "source url",
            &sub("package.url", package.url.as_deref())?,
            &["http", "https", "file"],
        )?;

        let sha256 = sub("package.sha256", package.sha256.as_deref())?;
        let content_hash =
            ContentHash::from_hex(&sha256).map_err(|_| ManifestError::InvalidHash(sha256.clone()))?;

        let dependencies = self
            .depends_on
            .iter()
            .enumerate()
            .map(|(i, raw)| DependencyId::parse(&ctx.substitute(&format!("depends-on[{i}]"), raw)?))
            .collect::<Result<Vec<_>, _>>()?;

        let install_steps = self
            .install
            .iter()
            .enumerate()
            .map(|(i, action)| resolve_action(ctx, i, action))
            .collect::<Result<Vec<_>, _>>()?;

        let test_steps = self
            .tests
            .iter()
            .enumerate()
            .map(|(i, step)| resolve_test(ctx, i, step))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PackageDescriptor {
            name,
            description,
            homepage,
            source_url,
            content_hash,
            dependencies,
            install_steps,
            test_steps,
        })
    }

    /// Serialize the manifest to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ManifestError> {
    value.ok_or(ManifestError::MissingField(field))
}

fn resolve_action(
    ctx: &SubstitutionContext,
    index: usize,
    action: &InstallAction,
) -> Result<InstallAction, ManifestError> {
    let (field, value) = match action {
        InstallAction::CopyBinary { source } => (format!("install[{index}].source"), source),
        InstallAction::CopyFiles { glob } => (format!("install[{index}].glob"), glob),
    };
    let resolved = ctx.substitute(&field, value)?;
    if resolved.trim().is_empty() {
        return Err(ManifestError::EmptyField { field });
    }

    Ok(match action {
        InstallAction::CopyBinary { .. } => InstallAction::CopyBinary { source: resolved },
        InstallAction::CopyFiles { .. } => InstallAction::CopyFiles { glob: resolved },
    })
}

fn resolve_test(
    ctx: &SubstitutionContext,
    index: usize,
    step: &TestStep,
) -> Result<TestAction, ManifestError> {
    let mut parts = step
        .command
        .iter()
        .enumerate()
        .map(|(j, part)| ctx.substitute(&format!("test[{index}].command[{j}]"), part))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();

    let program = parts
        .next()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ManifestError::EmptyTestCommand(index + 1))?;

    Ok(TestAction {
        program,
        args: parts.collect(),
    })
}

/// Validate the package name.
fn validate_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }

    if name.len() > 64 {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot exceed 64 characters",
        ));
    }

    // Must start with a letter
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name must start with a letter",
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '@' | '.') {
            return Err(ManifestError::InvalidName(
                name.to_string(),
                "name can only contain letters, numbers, '-', '_', '@' and '.'",
            ));
        }
    }

    Ok(())
}

fn parse_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<Url, ManifestError> {
    let url = Url::parse(value).map_err(|e| ManifestError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ManifestError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    const MACPREFS: &str = r####"
depends-on = ["python@3"]

[package]
name = "macprefs"
description = "Backup and Restore your Mac System and App Preferences"
homepage = "https://github.com/clintmod/macprefs"
url = "https://github.com/clintmod/macprefs/archive/###version###.tar.gz"
sha256 = "###sha256###"

[[install]]
action = "copy-binary"
source = "macprefs"

[[install]]
action = "copy-files"
glob = "*.py"

[[test]]
command = ["bin/macprefs", "--help"]
"####;

    fn ctx() -> SubstitutionContext {
        SubstitutionContext::new("1.2.3", HASH).unwrap()
    }

    #[test]
    fn parse_macprefs_manifest() {
        let desc = PackageDescriptor::parse(MACPREFS, &ctx()).unwrap();
        assert_eq!(desc.name(), "macprefs");
        assert_eq!(
            desc.source_url().as_str(),
            "https://github.com/clintmod/macprefs/archive/1.2.3.tar.gz"
        );
        assert_eq!(desc.content_hash().to_hex(), HASH);
        assert_eq!(desc.dependencies().len(), 1);
        assert_eq!(desc.dependencies()[0].name(), "python");
        assert_eq!(
            desc.install_steps(),
            &[
                InstallAction::CopyBinary {
                    source: "macprefs".to_string()
                },
                InstallAction::CopyFiles {
                    glob: "*.py".to_string()
                },
            ]
        );
        assert_eq!(desc.test_steps()[0].program, "bin/macprefs");
        assert_eq!(desc.test_steps()[0].args, vec!["--help"]);
    }

    #[test]
    fn resolved_fields_contain_no_placeholders() {
        let desc = PackageDescriptor::parse(MACPREFS, &ctx()).unwrap();
        let rendered = desc.to_toml_string().unwrap();
        assert!(!rendered.contains(PLACEHOLDER_DELIMITER));
        assert!(rendered.contains("1.2.3"));
    }

    #[test]
    fn rendered_descriptor_parses_again() {
        let desc = PackageDescriptor::parse(MACPREFS, &ctx()).unwrap();
        let rendered = desc.to_toml_string().unwrap();
        let template = rendered
            .replace("1.2.3", "###version###")
            .replace(HASH, "###sha256###");
        let manifest = Manifest::parse(&template).unwrap();
        assert_eq!(manifest.install.len(), 2);
        assert_eq!(manifest.depends_on, vec!["python@3"]);
    }

    #[test]
    fn uppercase_hash_is_normalized() {
        let ctx = SubstitutionContext::new("1.2.3", HASH.to_uppercase()).unwrap();
        let desc = PackageDescriptor::parse(MACPREFS, &ctx).unwrap();
        assert_eq!(desc.content_hash().to_hex(), HASH);
    }

    #[test]
    fn extra_tokens_substitute_anywhere() {
        let manifest = MACPREFS.replace("\"*.py\"", "\"###ext-glob###\"");
        let mut ctx = ctx();
        ctx.insert_assignment("ext-glob=*.py").unwrap();
        let desc = PackageDescriptor::parse(&manifest, &ctx).unwrap();
        assert_eq!(
            desc.install_steps()[1],
            InstallAction::CopyFiles {
                glob: "*.py".to_string()
            }
        );
    }

    #[test]
    fn unresolved_placeholder_is_a_parse_error() {
        let manifest = MACPREFS.replace("\"*.py\"", "\"###pattern###\"");
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        match err {
            ManifestError::UnresolvedPlaceholder { field, token } => {
                assert_eq!(field, "install[1].glob");
                assert_eq!(token, "pattern");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_placeholder_is_rejected() {
        let manifest = MACPREFS.replace("Backup and", "###not a token### and");
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        assert!(matches!(err, ManifestError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn url_without_version_placeholder() {
        let manifest = MACPREFS.replace("###version###.tar.gz", "1.0.0.tar.gz");
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingPlaceholder {
                field: "package.url",
                ..
            }
        ));
    }

    #[test]
    fn missing_required_field() {
        let manifest = MACPREFS.replace(
            "homepage = \"https://github.com/clintmod/macprefs\"\n",
            "",
        );
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField("package.homepage")));
    }

    #[test]
    fn manifest_without_install_steps() {
        let toml = r####"
[package]
name = "empty"
description = "Nothing to install"
homepage = "https://example.com"
url = "https://example.com/###version###.tar.gz"
sha256 = "###sha256###"
"####;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField("install")));
    }

    #[test]
    fn manifest_without_test_steps() {
        let manifest = MACPREFS.replace("[[test]]\ncommand = [\"bin/macprefs\", \"--help\"]\n", "");
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField("test")));
    }

    #[test]
    fn literal_hash_is_rejected() {
        let manifest = MACPREFS.replace("###sha256###", HASH);
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingPlaceholder {
                field: "package.sha256",
                token: SHA256_TOKEN,
            }
        ));
    }

    #[test]
    fn malformed_toml() {
        let err = Manifest::parse("[package\nname = ").unwrap_err();
        assert!(matches!(err, ManifestError::Parse(..)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let manifest = MACPREFS.replace("[package]", "[package]\nlicense = \"MIT\"");
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(..)));
    }

    #[test]
    fn unknown_install_action() {
        let manifest = MACPREFS.replace("copy-binary", "compile");
        let err = Manifest::parse(&manifest).unwrap_err();
        assert!(matches!(err, ManifestError::Parse(..)));
    }

    #[test]
    fn invalid_hash_value() {
        let ctx = SubstitutionContext::new("1.2.3", "abc123").unwrap();
        let err = PackageDescriptor::parse(MACPREFS, &ctx).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidHash(..)));
    }

    #[test]
    fn invalid_homepage_scheme() {
        let manifest = MACPREFS.replace(
            "homepage = \"https://github.com/clintmod/macprefs\"",
            "homepage = \"ftp://example.com\"",
        );
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::InvalidUrl {
                field: "homepage",
                ..
            }
        ));
    }

    #[test]
    fn invalid_name_starts_with_number() {
        let manifest = MACPREFS.replace("name = \"macprefs\"", "name = \"123prefs\"");
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName(..)));
    }

    #[test]
    fn invalid_dependency_identifier() {
        let manifest = MACPREFS.replace("python@3", "python@three");
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidDependency { .. }));
    }

    #[test]
    fn empty_test_command() {
        let manifest = MACPREFS.replace("[\"bin/macprefs\", \"--help\"]", "[]");
        let err = PackageDescriptor::parse(&manifest, &ctx()).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyTestCommand(1)));
    }

    #[test]
    fn substitution_rejects_bad_values() {
        assert!(SubstitutionContext::new("", HASH).is_err());
        assert!(SubstitutionContext::new("1.0 beta", HASH).is_err());
        assert!(SubstitutionContext::new("../1.0", HASH).is_err());

        let mut ctx = ctx();
        assert!(ctx.insert("bad key", "x").is_err());
        assert!(ctx.insert("loop", "###version###").is_err());
        assert!(ctx.insert_assignment("no-equals-sign").is_err());
    }

    #[test]
    fn substitute_replaces_repeated_tokens() {
        let out = ctx()
            .substitute("field", "v###version###/###version###-###sha256###")
            .unwrap();
        assert_eq!(out, format!("v1.2.3/1.2.3-{HASH}"));
    }
}
