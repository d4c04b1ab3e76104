//! Immutable inputs for one pipeline run.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::classify::ExternalsConfig;
use crate::error::{BindleError, Result};

/// Name of the attributions document unless overridden.
pub const DEFAULT_LICENSES_FILE: &str = "THIRD_PARTY_LICENSES";

/// Accepted when no allow-list is configured. Comparison is case-insensitive.
pub const DEFAULT_ALLOWED_LICENSES: &[&str] = &[
    "Apache-2.0",
    "MIT",
    "BSD-2-Clause",
    "BSD-3-Clause",
    "ISC",
    "0BSD",
];

/// How an external dependency survives in the bundle manifest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExternalKind {
    Runtime,
    Optional,
}

/// Configuration for one pipeline run. Constructed by the CLI (or embedder)
/// and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct BundleConfig {
    pub package_dir: PathBuf,
    /// Relative entry points; empty means the manifest's declared entry point.
    pub entry_points: Vec<String>,
    pub externals: ExternalsConfig,
    pub allowed_licenses: Vec<String>,
    /// Logical name to relative path.
    pub resources: IndexMap<String, String>,
    /// Regex over dependency names excluded from attribution.
    pub dont_attribute: Option<String>,
    /// Optional shell command run inside the written bundle.
    pub test: Option<String>,
    pub minify_whitespace: bool,
    /// Where to write the bundler's build metafile, relative to the package.
    pub metafile: Option<String>,
    pub sourcemap: bool,
    /// Relative name of the attributions document.
    pub licenses_file: String,
    /// When set, the versions index is a separate file and attribution
    /// titles omit versions.
    pub versions_file: Option<String>,
    /// Legacy sidecar: with no versions file configured, also write
    /// `<licenses_file>.versions.json` during flush.
    pub versions_sidecar: bool,
}

impl BundleConfig {
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        BundleConfig {
            package_dir: package_dir.into(),
            entry_points: Vec::new(),
            externals: ExternalsConfig::default(),
            allowed_licenses: DEFAULT_ALLOWED_LICENSES.iter().map(|s| s.to_string()).collect(),
            resources: IndexMap::new(),
            dont_attribute: None,
            test: None,
            minify_whitespace: false,
            metafile: None,
            sourcemap: false,
            licenses_file: DEFAULT_LICENSES_FILE.to_string(),
            versions_file: None,
            versions_sidecar: false,
        }
    }

    /// The allow-list is matched lowercased on both sides.
    pub fn allowed_licenses_lowercase(&self) -> Vec<String> {
        self.allowed_licenses.iter().map(|l| l.to_lowercase()).collect()
    }
}

/// Parse a repeatable `--external name:kind` option.
pub fn parse_external(spec: &str) -> Result<(String, ExternalKind)> {
    // Scoped names contain '/', never ':'; the last colon splits the kind.
    let (name, kind) = spec.rsplit_once(':').ok_or_else(|| {
        BindleError::invalid_config(format!(
            "external \"{}\" must look like name:runtime or name:optional",
            spec
        ))
    })?;
    if name.is_empty() {
        return Err(BindleError::invalid_config(format!(
            "external \"{}\" has an empty package name",
            spec
        )));
    }
    let kind = match kind {
        "runtime" => ExternalKind::Runtime,
        "optional" => ExternalKind::Optional,
        other => {
            return Err(BindleError::invalid_config(format!(
                "unknown external type \"{}\" (expected runtime or optional)",
                other
            )))
        }
    };
    Ok((name.to_string(), kind))
}

/// Parse a repeatable `--resource name:relpath` option.
pub fn parse_resource(spec: &str) -> Result<(String, String)> {
    let (name, path) = spec.split_once(':').ok_or_else(|| {
        BindleError::invalid_config(format!("resource \"{}\" must look like name:relpath", spec))
    })?;
    if name.is_empty() || path.is_empty() {
        return Err(BindleError::invalid_config(format!(
            "resource \"{}\" must have a non-empty name and path",
            spec
        )));
    }
    Ok((name.to_string(), path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_externals() {
        assert_eq!(
            parse_external("aws-sdk:runtime").unwrap(),
            ("aws-sdk".to_string(), ExternalKind::Runtime)
        );
        assert_eq!(
            parse_external("@scope/pkg:optional").unwrap(),
            ("@scope/pkg".to_string(), ExternalKind::Optional)
        );
        assert!(parse_external("no-kind").is_err());
        assert!(parse_external("pkg:sometimes").is_err());
        assert!(parse_external(":runtime").is_err());
    }

    #[test]
    fn parses_resources() {
        assert_eq!(
            parse_resource("bin:bin/tool").unwrap(),
            ("bin".to_string(), "bin/tool".to_string())
        );
        assert!(parse_resource("justaname").is_err());
        assert!(parse_resource(":path").is_err());
    }

    #[test]
    fn defaults() {
        let cfg = BundleConfig::new("/pkg");
        assert_eq!(cfg.licenses_file, "THIRD_PARTY_LICENSES");
        assert!(cfg.versions_file.is_none());
        assert!(!cfg.versions_sidecar);
        assert!(cfg.allowed_licenses_lowercase().contains(&"mit".to_string()));
    }
}
