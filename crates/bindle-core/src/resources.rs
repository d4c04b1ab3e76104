//! Declared resource presence checks.

use std::path::Path;

use indexmap::IndexMap;

use crate::report::{Violation, ViolationKind};

/// Verify each declared resource path exists under the package root.
/// Missing paths are reported by logical name; not auto-fixable.
pub fn verify_resources(package_dir: &Path, resources: &IndexMap<String, String>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (name, rel_path) in resources {
        if !package_dir.join(rel_path).exists() {
            violations.push(Violation::new(
                ViolationKind::MissingResource,
                format!(
                    "Unable to find resource ({}) relative to the package directory",
                    name
                ),
            ));
        }
    }
    violations
}
