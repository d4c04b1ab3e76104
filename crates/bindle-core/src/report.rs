//! Violations, bound fixes, and the validation report.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::{BindleError, Result};

/// Closed set of policy findings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViolationKind {
    InvalidLicense,
    NoLicense,
    MultipleLicense,
    MissingLicenses,
    OutdatedLicenses,
    MissingVersions,
    OutdatedVersions,
    CircularImport,
    MissingResource,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::InvalidLicense => "invalid-license",
            ViolationKind::NoLicense => "no-license",
            ViolationKind::MultipleLicense => "multiple-license",
            ViolationKind::MissingLicenses => "missing-licenses",
            ViolationKind::OutdatedLicenses => "outdated-licenses",
            ViolationKind::MissingVersions => "missing-versions",
            ViolationKind::OutdatedVersions => "outdated-versions",
            ViolationKind::CircularImport => "circular-import",
            ViolationKind::MissingResource => "missing-resource",
        };
        f.write_str(s)
    }
}

/// A bound corrective action: the canonical content and where it belongs.
/// Produced by the subsystem that detected the violation; applying it never
/// consults other fixes.
#[derive(Clone, Debug)]
pub struct Fix {
    pub path: PathBuf,
    pub content: String,
}

impl Fix {
    pub fn apply(&self) -> Result<()> {
        fs::write(&self.path, &self.content)
            .map_err(|e| BindleError::io("apply fix", &self.path, e))
    }
}

/// One policy finding.
#[derive(Debug)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub fix: Option<Fix>,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Violation { kind, message: message.into(), fix: None }
    }

    pub fn fixable(kind: ViolationKind, message: impl Into<String>, fix: Fix) -> Self {
        Violation { kind, message: message.into(), fix: Some(fix) }
    }

    pub fn is_fixable(&self) -> bool {
        self.fix.is_some()
    }
}

/// Aggregate of one validation run. `success` starts as "no violations";
/// the orchestrator flips it to true after fixing when every violation was
/// fixable, while the originally detected list is retained.
#[derive(Debug)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub success: bool,
}

impl ValidationReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        let success = violations.is_empty();
        ValidationReport { violations, success }
    }

    /// User-visible failure payload, one line per violation.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("- {}: {}", v.kind, v.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "violations": self
                .violations
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "kind": v.kind.to_string(),
                        "message": v.message,
                        "fixable": v.is_fixable(),
                    })
                })
                .collect::<Vec<_>>(),
            "success": self.success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines_are_kind_prefixed() {
        let report = ValidationReport::new(vec![
            Violation::new(ViolationKind::CircularImport, "lib/bar.js -> lib/foo.js"),
            Violation::new(
                ViolationKind::MissingResource,
                "Unable to find resource (missing) relative to the package directory",
            ),
        ]);
        assert!(!report.success);
        let summary = report.summary();
        assert_eq!(
            summary,
            "- circular-import: lib/bar.js -> lib/foo.js\n- missing-resource: Unable to find resource (missing) relative to the package directory"
        );
    }

    #[test]
    fn empty_report_succeeds() {
        let report = ValidationReport::new(vec![]);
        assert!(report.success);
        assert!(report.summary().is_empty());
    }

    #[test]
    fn fix_writes_content() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("THIRD_PARTY_LICENSES");
        let fix = Fix { path: path.clone(), content: "canonical\n".to_string() };
        fix.apply().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "canonical\n");
    }

    #[test]
    fn json_shape() {
        let report = ValidationReport::new(vec![Violation::new(
            ViolationKind::NoLicense,
            "Dependency x@1.0.0 has no license",
        )]);
        let v = report.to_json();
        assert_eq!(v["success"], serde_json::json!(false));
        assert_eq!(v["violations"][0]["kind"], serde_json::json!("no-license"));
        assert_eq!(v["violations"][0]["fixable"], serde_json::json!(false));
    }
}
