//! Split the dependency closure into bundled and external partitions.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::config::ExternalKind;
use crate::error::{BindleError, Result};
use crate::resolver::Package;

/// Names intentionally excluded from inlining, split by how they survive in
/// the bundle manifest. The two sets must be disjoint.
#[derive(Clone, Debug, Default)]
pub struct ExternalsConfig {
    pub runtime: Vec<String>,
    pub optional: Vec<String>,
}

impl ExternalsConfig {
    pub fn push(&mut self, name: String, kind: ExternalKind) {
        match kind {
            ExternalKind::Runtime => self.runtime.push(name),
            ExternalKind::Optional => self.optional.push(name),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<ExternalKind> {
        if self.runtime.iter().any(|n| n == name) {
            Some(ExternalKind::Runtime)
        } else if self.optional.iter().any(|n| n == name) {
            Some(ExternalKind::Optional)
        } else {
            None
        }
    }

    /// All external names, runtime then optional.
    pub fn names(&self) -> Vec<String> {
        self.runtime.iter().chain(self.optional.iter()).cloned().collect()
    }

    pub fn validate(&self) -> Result<()> {
        for name in &self.runtime {
            if self.optional.iter().any(|n| n == name) {
                return Err(BindleError::invalid_config(format!(
                    "\"{}\" is declared both a runtime and an optional external",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Partition of the closure produced by `classify`.
#[derive(Debug, Default)]
pub struct Classification {
    pub bundled: Vec<Rc<Package>>,
    pub runtime: Vec<Rc<Package>>,
    pub optional: Vec<Rc<Package>>,
}

/// Breadth-first traversal from the root that stops descending at any node
/// whose name is external. An external's own transitive dependencies are
/// excluded from bundling and from attribution.
pub fn classify(root: &Rc<Package>, externals: &ExternalsConfig) -> Result<Classification> {
    externals.validate()?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut queue: VecDeque<Rc<Package>> = root.dependencies.iter().cloned().collect();
    let mut classification = Classification::default();

    while let Some(pkg) = queue.pop_front() {
        if !seen.insert((pkg.name.clone(), pkg.version.clone())) {
            continue;
        }
        match externals.kind_of(&pkg.name) {
            Some(ExternalKind::Runtime) => classification.runtime.push(pkg),
            Some(ExternalKind::Optional) => classification.optional.push(pkg),
            None => {
                for dep in &pkg.dependencies {
                    queue.push_back(dep.clone());
                }
                classification.bundled.push(pkg);
            }
        }
    }
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pkg(name: &str, version: &str, deps: Vec<Rc<Package>>) -> Rc<Package> {
        Rc::new(Package {
            name: name.to_string(),
            version: version.to_string(),
            root: PathBuf::from(format!("/nm/{}", name)),
            manifest_path: PathBuf::from(format!("/nm/{}/package.json", name)),
            dependencies: deps,
        })
    }

    #[test]
    fn externals_stop_traversal() {
        // root -> ext -> hidden; root -> plain
        let hidden = pkg("hidden", "1.0.0", vec![]);
        let ext = pkg("ext", "1.0.0", vec![hidden]);
        let plain = pkg("plain", "1.0.0", vec![]);
        let root = pkg("root", "0.0.0", vec![ext, plain]);

        let externals = ExternalsConfig {
            runtime: vec!["ext".to_string()],
            optional: vec![],
        };
        let c = classify(&root, &externals).unwrap();
        let bundled: Vec<&str> = c.bundled.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(bundled, vec!["plain"]);
        assert_eq!(c.runtime.len(), 1);
        assert_eq!(c.runtime[0].name, "ext");
        assert!(c.optional.is_empty());
    }

    #[test]
    fn optional_externals_partition_separately() {
        let maybe = pkg("maybe", "2.0.0", vec![]);
        let root = pkg("root", "0.0.0", vec![maybe]);
        let externals = ExternalsConfig {
            runtime: vec![],
            optional: vec!["maybe".to_string()],
        };
        let c = classify(&root, &externals).unwrap();
        assert!(c.bundled.is_empty());
        assert_eq!(c.optional[0].name, "maybe");
    }

    #[test]
    fn overlapping_externals_rejected() {
        let root = pkg("root", "0.0.0", vec![]);
        let externals = ExternalsConfig {
            runtime: vec!["x".to_string()],
            optional: vec!["x".to_string()],
        };
        let err = classify(&root, &externals).unwrap_err();
        assert!(matches!(err, BindleError::InvalidConfig { .. }));
    }

    #[test]
    fn closure_dedups_by_name_and_version() {
        let shared = pkg("shared", "1.0.0", vec![]);
        let a = pkg("a", "1.0.0", vec![shared.clone()]);
        let b = pkg("b", "1.0.0", vec![shared]);
        let root = pkg("root", "0.0.0", vec![a, b]);

        let c = classify(&root, &ExternalsConfig::default()).unwrap();
        let names: Vec<&str> = c.bundled.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "shared"]);
    }
}
