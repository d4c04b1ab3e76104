//! Third-party attributions: collection, canonical rendering, staleness
//! validation, and flush.
//!
//! The canonical document and versions index are derived deterministically
//! from the bundled closure; the same bytes are used for writing and for
//! staleness comparison.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{BindleError, Result};
use crate::report::{Fix, Violation, ViolationKind};
use crate::shell::{self, SystemShell};
use crate::utils;

pub const DEFAULT_PROBE: &str = "license-checker";

const NPM_URL_BASE: &str = "https://www.npmjs.com/package";
const BLOCK_SEPARATOR: &str = "\n----------------\n";

/// One installed dependency to attribute.
#[derive(Clone, Debug)]
pub struct DependencyRef {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
}

impl DependencyRef {
    pub fn fqn(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// License metadata for one package, as reported by the probe. The probe's
/// `licenses` field arrives as a string or an array; it is normalized to a
/// list at this boundary.
#[derive(Clone, Debug, Default)]
pub struct ProbeRecord {
    pub licenses: Vec<String>,
    pub license_file: Option<PathBuf>,
    pub notice_file: Option<PathBuf>,
}

/// License-metadata probe: given a working directory and package
/// identifiers, return identifier to record.
pub trait LicenseProbe {
    fn probe(&self, cwd: &Path, ids: &[String]) -> Result<IndexMap<String, ProbeRecord>>;
}

/// Production probe shelling out to the license-checker tool:
/// `--json --packages "a@1;b@2"`.
pub struct LicenseCheckerProbe {
    shell: SystemShell,
    program: String,
}

impl LicenseCheckerProbe {
    pub fn new(package_dir: &Path) -> Self {
        let program = shell::resolve_tool(DEFAULT_PROBE, "BINDLE_LICENSE_PROBE", package_dir);
        LicenseCheckerProbe { shell: SystemShell::new(), program }
    }
}

impl LicenseProbe for LicenseCheckerProbe {
    fn probe(&self, cwd: &Path, ids: &[String]) -> Result<IndexMap<String, ProbeRecord>> {
        let packages = ids.join(";");
        let args = ["--json", "--packages", packages.as_str()];
        let stdout = shell::invoke_expecting_success(&self.shell, &self.program, &args, cwd)?;
        parse_probe_output(&self.program, &stdout)
    }
}

/// Parse the probe's JSON map. A malformed payload is a contract breach.
pub fn parse_probe_output(tool: &str, stdout: &[u8]) -> Result<IndexMap<String, ProbeRecord>> {
    let text = String::from_utf8_lossy(stdout);
    let value: serde_json::Value = serde_json::from_str(text.trim()).map_err(|e| {
        BindleError::ToolFailure {
            tool: tool.to_string(),
            status: Some(0),
            stderr: format!("unparseable probe output: {}", e),
        }
    })?;
    let object = value.as_object().ok_or_else(|| BindleError::ToolFailure {
        tool: tool.to_string(),
        status: Some(0),
        stderr: "probe output is not a JSON object".to_string(),
    })?;

    let mut records = IndexMap::new();
    for (id, entry) in object {
        let mut record = ProbeRecord::default();
        match entry.get("licenses") {
            Some(serde_json::Value::String(license)) => {
                record.licenses = vec![license.clone()];
            }
            Some(serde_json::Value::Array(items)) => {
                record.licenses = items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect();
            }
            _ => {}
        }
        record.license_file = entry
            .get("licenseFile")
            .and_then(|f| f.as_str())
            .map(PathBuf::from);
        record.notice_file = entry
            .get("noticeFile")
            .and_then(|f| f.as_str())
            .map(PathBuf::from);
        records.insert(id.clone(), record);
    }
    Ok(records)
}

/// Construction inputs for the engine.
pub struct AttributionsConfig {
    pub package_dir: PathBuf,
    pub package_name: String,
    /// Where the probe runs first, normally `<package_dir>/node_modules`.
    pub dependencies_root: PathBuf,
    /// Relative name of the attributions document.
    pub licenses_file: String,
    /// Lowercased allow-list.
    pub allowed_licenses: Vec<String>,
    /// Dependencies whose name matches are excluded from attribution and
    /// from the versions index.
    pub exclude: Option<Regex>,
    /// Relative name of the separate versions index, when externalized.
    pub versions_file: Option<String>,
    /// Legacy sidecar next to the licenses file when versions are embedded.
    pub versions_sidecar: bool,
}

/// One dependency's attribution.
#[derive(Clone, Debug)]
pub struct Attribution {
    pub name: String,
    pub version: String,
    pub url: String,
    pub licenses: Vec<String>,
    pub license_text: Option<String>,
    pub notice_text: Option<String>,
}

impl Attribution {
    pub fn fqn(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Canonical artifacts derived from one gather pass.
#[derive(Debug)]
pub struct AttributionsSet {
    /// Sorted by fqn, ascending code-point order.
    pub attributions: Vec<Attribution>,
    pub document: String,
    pub versions: IndexMap<String, Vec<String>>,
}

pub struct AttributionsEngine<'a> {
    config: AttributionsConfig,
    probe: &'a dyn LicenseProbe,
    dependencies: Vec<DependencyRef>,
}

impl<'a> AttributionsEngine<'a> {
    pub fn new(
        config: AttributionsConfig,
        probe: &'a dyn LicenseProbe,
        dependencies: Vec<DependencyRef>,
    ) -> Self {
        AttributionsEngine { config, probe, dependencies }
    }

    pub fn licenses_path(&self) -> PathBuf {
        self.config.package_dir.join(&self.config.licenses_file)
    }

    pub fn versions_path(&self) -> Option<PathBuf> {
        self.config
            .versions_file
            .as_ref()
            .map(|f| self.config.package_dir.join(f))
    }

    /// Collect attributions for the bundled closure and render the canonical
    /// document and versions index.
    pub fn gather(&self) -> Result<AttributionsSet> {
        let filtered: Vec<&DependencyRef> = self
            .dependencies
            .iter()
            .filter(|d| match &self.config.exclude {
                Some(re) => !re.is_match(&d.name),
                None => true,
            })
            .collect();

        if filtered.is_empty() {
            return Ok(AttributionsSet {
                attributions: Vec::new(),
                document: String::new(),
                versions: IndexMap::new(),
            });
        }

        let ids: Vec<String> = filtered.iter().map(|d| d.fqn()).collect();
        let mut records = self.probe.probe(&self.config.dependencies_root, &ids)?;

        // Several major versions of one package can coexist; entries the
        // shared probe run missed are retried in the package's own directory.
        for dep in &filtered {
            let fqn = dep.fqn();
            if !records.contains_key(&fqn) {
                let fallback = self.probe.probe(&dep.root, &[fqn.clone()])?;
                for (id, record) in fallback {
                    records.entry(id).or_insert(record);
                }
            }
        }

        let mut attributions = Vec::with_capacity(filtered.len());
        let mut versions: IndexMap<String, Vec<String>> = IndexMap::new();
        for dep in &filtered {
            let fqn = dep.fqn();
            let record = records.get(&fqn).ok_or_else(|| BindleError::AttributionFailed {
                package: fqn.clone(),
                reason: "license probe returned no entry".to_string(),
            })?;
            attributions.push(self.build_attribution(dep, record)?);

            let entry = versions.entry(dep.name.clone()).or_default();
            if !entry.contains(&dep.version) {
                entry.push(dep.version.clone());
            }
        }

        attributions.sort_by(|a, b| a.fqn().cmp(&b.fqn()));
        let document = render_document(
            &self.config.package_name,
            &attributions,
            self.config.versions_file.is_none(),
        );
        Ok(AttributionsSet { attributions, document, versions })
    }

    fn build_attribution(&self, dep: &DependencyRef, record: &ProbeRecord) -> Result<Attribution> {
        let license_text = match &record.license_file {
            Some(path) if reliable_license_file(path) => Some(read_embedded_text(path)?),
            _ => None,
        };
        let notice_text = match &record.notice_file {
            Some(path) => Some(read_embedded_text(path)?),
            None => None,
        };
        let url = if self.config.versions_file.is_some() {
            format!("{}/{}", NPM_URL_BASE, dep.name)
        } else {
            format!("{}/{}/v/{}", NPM_URL_BASE, dep.name, dep.version)
        };
        Ok(Attribution {
            name: dep.name.clone(),
            version: dep.version.clone(),
            url,
            licenses: record.licenses.clone(),
            license_text,
            notice_text,
        })
    }

    /// Produce license-policy and staleness violations. Staleness violations
    /// carry a bound fix writing the canonical bytes.
    pub fn validate(&self) -> Result<Vec<Violation>> {
        let set = self.gather()?;
        let mut violations = Vec::new();

        for attribution in &set.attributions {
            match attribution.licenses.len() {
                0 => violations.push(Violation::new(
                    ViolationKind::NoLicense,
                    format!("Dependency {} has no license", attribution.fqn()),
                )),
                1 => {
                    let license = &attribution.licenses[0];
                    if !self.config.allowed_licenses.contains(&license.to_lowercase()) {
                        violations.push(Violation::new(
                            ViolationKind::InvalidLicense,
                            format!(
                                "Dependency {} has an invalid license: {}",
                                attribution.fqn(),
                                license
                            ),
                        ));
                    }
                }
                _ => violations.push(Violation::new(
                    ViolationKind::MultipleLicense,
                    format!(
                        "Dependency {} has multiple licenses: {}",
                        attribution.fqn(),
                        attribution.licenses.join(",")
                    ),
                )),
            }
        }

        let licenses_path = self.licenses_path();
        match fs::read(&licenses_path) {
            Err(_) => violations.push(Violation::fixable(
                ViolationKind::MissingLicenses,
                format!("{} is missing", self.config.licenses_file),
                Fix { path: licenses_path, content: set.document.clone() },
            )),
            Ok(on_disk) if on_disk != set.document.as_bytes() => violations.push(Violation::fixable(
                ViolationKind::OutdatedLicenses,
                format!("{} is outdated", self.config.licenses_file),
                Fix { path: licenses_path, content: set.document.clone() },
            )),
            Ok(_) => {}
        }

        if let (Some(versions_path), Some(versions_file)) =
            (self.versions_path(), self.config.versions_file.as_ref())
        {
            let canonical = versions_json(&set.versions);
            match fs::read(&versions_path) {
                Err(_) => violations.push(Violation::fixable(
                    ViolationKind::MissingVersions,
                    format!("{} is missing", versions_file),
                    Fix { path: versions_path, content: canonical },
                )),
                Ok(on_disk) if on_disk != canonical.as_bytes() => violations.push(Violation::fixable(
                    ViolationKind::OutdatedVersions,
                    format!("{} is outdated", versions_file),
                    Fix { path: versions_path, content: canonical },
                )),
                Ok(_) => {}
            }
        }

        Ok(violations)
    }

    /// Write the canonical artifacts into a directory (the package root or a
    /// bundle directory) using the configured relative names.
    pub fn flush_into(&self, dir: &Path) -> Result<()> {
        let set = self.gather()?;
        let licenses_path = dir.join(&self.config.licenses_file);
        fs::write(&licenses_path, &set.document)
            .map_err(|e| BindleError::io("write attributions", &licenses_path, e))?;

        if let Some(versions_file) = &self.config.versions_file {
            let path = dir.join(versions_file);
            fs::write(&path, versions_json(&set.versions))
                .map_err(|e| BindleError::io("write versions index", &path, e))?;
        } else if self.config.versions_sidecar {
            let path = dir.join(format!("{}.versions.json", self.config.licenses_file));
            fs::write(&path, versions_json(&set.versions))
                .map_err(|e| BindleError::io("write versions sidecar", &path, e))?;
        }
        Ok(())
    }
}

/// License files named `*.md` are discarded as unreliable.
fn reliable_license_file(path: &Path) -> bool {
    !path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().ends_with(".md"))
        .unwrap_or(false)
}

fn read_embedded_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| BindleError::io("read license text", path, e))
}

/// Render the canonical document: preamble, blank line, sorted blocks.
/// Empty closure renders an empty string.
fn render_document(
    package_name: &str,
    attributions: &[Attribution],
    versions_in_titles: bool,
) -> String {
    if attributions.is_empty() {
        return String::new();
    }
    let mut blocks = Vec::with_capacity(attributions.len());
    for attribution in attributions {
        let title = if versions_in_titles {
            attribution.fqn()
        } else {
            attribution.name.clone()
        };
        let first_license = attribution.licenses.first().map(String::as_str).unwrap_or("");
        let mut block = format!("** {} - {} | {}", title, attribution.url, first_license);
        let body = attribution
            .notice_text
            .as_deref()
            .or(attribution.license_text.as_deref());
        if let Some(text) = body {
            let text = utils::normalize_newlines(text);
            if !text.is_empty() {
                block.push('\n');
                block.push_str(&text);
            }
        }
        block.push_str(BLOCK_SEPARATOR);
        blocks.push(block);
    }
    format!(
        "The {} package includes the following third-party software/licensing:\n\n{}",
        package_name,
        blocks.join("\n")
    )
}

/// Canonical versions JSON: two-space indent, insertion key order, trailing
/// newline.
pub fn versions_json(versions: &IndexMap<String, Vec<String>>) -> String {
    let mut text = serde_json::to_string_pretty(versions).unwrap_or_else(|_| "{}".to_string());
    text.push('\n');
    text
}
