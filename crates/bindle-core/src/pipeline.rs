//! The bundle pipeline: resolve the closure, classify it, validate policy
//! invariants, write the bundle directory, pack the tarball.
//!
//! Single-threaded and synchronous end-to-end; each run constructs a fresh
//! component graph and owns every derived artifact. Bundle directories are
//! created under the OS temp dir and deliberately kept so callers can
//! inspect them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::attributions::{
    AttributionsConfig, AttributionsEngine, DependencyRef, LicenseCheckerProbe, LicenseProbe,
};
use crate::bundler::{BundleRequest, Bundler};
use crate::circularity::CircularityAnalyzer;
use crate::classify::{classify, Classification};
use crate::config::BundleConfig;
use crate::error::{BindleError, Result};
use crate::manifest::Manifest;
use crate::packer;
use crate::report::{ValidationReport, Violation, ViolationKind};
use crate::resolver;
use crate::resources;
use crate::shell::{self, ShellInvoker, SystemShell};
use crate::utils;

/// Top-level entries never copied into the bundle. Exact names only;
/// `.gitignore` or `node_modules_file` at the package root are retained.
const BUNDLE_EXCLUDES: &[&str] = &[".git", "node_modules"];

struct Prepared {
    manifest: Manifest,
    entry_points: Vec<String>,
    classification: Classification,
}

/// One pipeline run over an immutable `BundleConfig`.
pub struct BundlePipeline {
    config: BundleConfig,
    shell: Box<dyn ShellInvoker>,
    probe: Box<dyn LicenseProbe>,
}

impl BundlePipeline {
    pub fn new(config: BundleConfig) -> Self {
        let probe = Box::new(LicenseCheckerProbe::new(&config.package_dir));
        BundlePipeline {
            shell: Box::new(SystemShell::new()),
            probe,
            config,
        }
    }

    /// Substitute the process invoker (tests use deterministic fakes).
    pub fn with_shell(mut self, shell: Box<dyn ShellInvoker>) -> Self {
        self.shell = shell;
        self
    }

    /// Substitute the license probe.
    pub fn with_probe(mut self, probe: Box<dyn LicenseProbe>) -> Self {
        self.probe = probe;
        self
    }

    fn prepare(&self) -> Result<Prepared> {
        let manifest = Manifest::read(&self.config.package_dir)?;
        let entry_points = if self.config.entry_points.is_empty() {
            vec![manifest.entry_point()]
        } else {
            self.config.entry_points.clone()
        };
        let root = resolver::resolve_package(&self.config.package_dir)?;
        let classification = classify(&root, &self.config.externals)?;
        Ok(Prepared { manifest, entry_points, classification })
    }

    fn attributions_engine<'a>(&'a self, prepared: &Prepared) -> Result<AttributionsEngine<'a>> {
        let exclude = match &self.config.dont_attribute {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                BindleError::invalid_config(format!("dont-attribute regex: {}", e))
            })?),
            None => None,
        };
        let dependencies: Vec<DependencyRef> = prepared
            .classification
            .bundled
            .iter()
            .map(|p| DependencyRef {
                name: p.name.clone(),
                version: p.version.clone(),
                root: p.root.clone(),
            })
            .collect();
        Ok(AttributionsEngine::new(
            AttributionsConfig {
                package_dir: self.config.package_dir.clone(),
                package_name: prepared.manifest.name.clone(),
                dependencies_root: self.config.package_dir.join("node_modules"),
                licenses_file: self.config.licenses_file.clone(),
                allowed_licenses: self.config.allowed_licenses_lowercase(),
                exclude,
                versions_file: self.config.versions_file.clone(),
                versions_sidecar: self.config.versions_sidecar,
            },
            self.probe.as_ref(),
            dependencies,
        ))
    }

    /// Fuse circularity, resource, and attribution findings into one report.
    /// With `fix`, every fixable violation's bound action runs exactly once
    /// in report order; the report keeps the originally detected list and
    /// succeeds when everything was fixable.
    pub fn validate(&self, fix: bool) -> Result<ValidationReport> {
        let prepared = self.prepare()?;
        let mut violations = Vec::new();

        let analyzer = CircularityAnalyzer::new(self.shell.as_ref(), &self.config.package_dir);
        for cycle in analyzer.find_cycles(&self.config.package_dir, &prepared.entry_points)? {
            violations.push(Violation::new(ViolationKind::CircularImport, cycle));
        }

        violations.extend(resources::verify_resources(
            &self.config.package_dir,
            &self.config.resources,
        ));

        let engine = self.attributions_engine(&prepared)?;
        violations.extend(engine.validate()?);

        let mut report = ValidationReport::new(violations);
        if fix && !report.success {
            for violation in &report.violations {
                if let Some(action) = &violation.fix {
                    utils::log(&format!("fixing {}: {}", violation.kind, violation.message));
                    action.apply()?;
                }
            }
            report.success = report.violations.iter().all(|v| v.is_fixable());
        }
        Ok(report)
    }

    /// Materialize the bundle directory: copy the package tree, overlay the
    /// bundler output, rewrite the manifest, flush attributions, then run
    /// the optional smoke test inside it. Returns the bundle directory.
    pub fn write(&self) -> Result<PathBuf> {
        let prepared = self.prepare()?;

        let bundle_dir = tempfile::Builder::new()
            .prefix("bindle-")
            .tempdir()
            .map_err(|e| BindleError::io("create bundle dir", Path::new("."), e))?
            .into_path();
        utils::log(&format!("writing bundle to {}", bundle_dir.display()));

        copy_package_tree(&self.config.package_dir, &bundle_dir)?;

        let bundler = Bundler::new(self.shell.as_ref(), &self.config.package_dir);
        let out_dir = bundler.bundle(&BundleRequest {
            package_dir: &self.config.package_dir,
            entry_points: &prepared.entry_points,
            externals: self.config.externals.names(),
            minify_whitespace: self.config.minify_whitespace,
            metafile: self.config.metafile.as_deref(),
            sourcemap: self.config.sourcemap,
        })?;
        overlay_outputs(&out_dir, &bundle_dir)?;

        let external_names: HashSet<String> =
            self.config.externals.names().into_iter().collect();
        prepared.manifest.write_rewritten(&bundle_dir, &external_names)?;

        let engine = self.attributions_engine(&prepared)?;
        engine.flush_into(&bundle_dir)?;

        if let Some(command) = &self.config.test {
            utils::log(&format!("running smoke test: {}", command));
            shell::run_shell_command(command, &bundle_dir)?;
        }
        Ok(bundle_dir)
    }

    /// `write`, then pack the bundle into `<name>-<version>.tgz` in the
    /// destination (default: the package directory).
    pub fn pack(&self, destination: Option<&Path>) -> Result<PathBuf> {
        let manifest = Manifest::read(&self.config.package_dir)?;
        let bundle_dir = self.write()?;
        let dest_dir = destination.unwrap_or(&self.config.package_dir);
        let tarball = packer::pack_directory(&bundle_dir, dest_dir, &manifest.name, &manifest.version)?;
        utils::log(&format!("packed {}", tarball.display()));
        Ok(tarball)
    }
}

/// Copy the package tree, excluding exactly and only the top-level
/// `.git` and `node_modules` entries.
fn copy_package_tree(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src).map_err(|e| BindleError::io("read package dir", src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BindleError::io("read package dir", src, e))?;
        let name = entry.file_name();
        if BUNDLE_EXCLUDES.iter().any(|x| name.to_str() == Some(*x)) {
            continue;
        }
        copy_recursive(&entry.path(), &dst.join(&name))?;
    }
    Ok(())
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src).map_err(|e| BindleError::io("stat", src, e))?;
    if meta.is_dir() {
        fs::create_dir_all(dst).map_err(|e| BindleError::io("create dir", dst, e))?;
        let entries = fs::read_dir(src).map_err(|e| BindleError::io("read dir", src, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BindleError::io("read dir", src, e))?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst).map_err(|e| BindleError::io("copy file", src, e))?;
    }
    Ok(())
}

/// Overlay bundler outputs onto the bundle at the same relative paths.
fn overlay_outputs(from: &Path, onto: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| BindleError::ToolFailure {
            tool: "overlay".to_string(),
            status: None,
            stderr: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(from)
            .expect("walked entries live under the output dir");
        let dest = onto.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BindleError::io("create dir", parent, e))?;
        }
        fs::copy(entry.path(), &dest).map_err(|e| BindleError::io("copy output", entry.path(), e))?;
    }
    Ok(())
}
