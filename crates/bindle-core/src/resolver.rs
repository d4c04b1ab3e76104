//! Transitive dependency resolution over the installed nested layout.
//!
//! Resolution never touches the network: every dependency must already be
//! installed on disk. Lookup follows the node algorithm, inspecting
//! `node_modules/<name>` at each level walking upward from the dependent
//! package until the filesystem root.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{BindleError, Result};
use crate::manifest::Manifest;
use crate::utils;

/// One installed package. Identity is `(name, version, root)`; the same
/// `(name, version)` installed at two locations is two distinct packages.
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Canonicalized install directory.
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub dependencies: Vec<Rc<Package>>,
}

impl Package {
    pub fn fqn(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Resolve a package root directory into a `Package` with the transitive
/// `dependencies` populated. `devDependencies` are never traversed.
pub fn resolve_package(root_dir: &Path) -> Result<Rc<Package>> {
    let canonical = fs::canonicalize(root_dir)
        .map_err(|e| BindleError::io("resolve package dir", root_dir, e))?;
    let mut cache: HashMap<PathBuf, Rc<Package>> = HashMap::new();
    let mut in_progress: HashSet<PathBuf> = HashSet::new();
    resolve_dir(&canonical, &mut cache, &mut in_progress)
}

fn resolve_dir(
    dir: &Path,
    cache: &mut HashMap<PathBuf, Rc<Package>>,
    in_progress: &mut HashSet<PathBuf>,
) -> Result<Rc<Package>> {
    if let Some(pkg) = cache.get(dir) {
        return Ok(pkg.clone());
    }
    in_progress.insert(dir.to_path_buf());

    let manifest = Manifest::read(dir)?;
    let mut dependencies = Vec::new();
    let declared = manifest
        .dependencies
        .keys()
        .chain(manifest.optional_dependencies.keys());
    for name in declared {
        let found = find_installed(dir, name).ok_or_else(|| BindleError::ResolutionFailed {
            package: name.clone(),
            searched_from: dir.to_path_buf(),
        })?;
        let canonical = fs::canonicalize(&found)
            .map_err(|e| BindleError::io("resolve dependency dir", &found, e))?;
        // The install layout is not trusted to be a DAG: a symlink loop
        // re-entering a directory mid-resolution drops the edge.
        if in_progress.contains(&canonical) {
            utils::log(&format!(
                "dropping cyclic install edge {} -> {}",
                dir.display(),
                canonical.display()
            ));
            continue;
        }
        dependencies.push(resolve_dir(&canonical, cache, in_progress)?);
    }

    in_progress.remove(dir);
    let pkg = Rc::new(Package {
        name: manifest.name,
        version: manifest.version,
        root: dir.to_path_buf(),
        manifest_path: manifest.path,
        dependencies,
    });
    cache.insert(dir.to_path_buf(), pkg.clone());
    Ok(pkg)
}

/// Locate the nearest installed copy of `name`: inspect `node_modules/<name>`
/// at each level from `from_dir` upward.
pub fn find_installed(from_dir: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = Some(from_dir);
    while let Some(current) = dir {
        let candidate = current.join("node_modules").join(name);
        if candidate.join("package.json").is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Ordered transitive closure reachable from `root`, excluding the root
/// itself, deduplicated by `(name, version)` in breadth-first order.
pub fn closure(root: &Rc<Package>) -> Vec<Rc<Package>> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    let mut queue: VecDeque<Rc<Package>> = root.dependencies.iter().cloned().collect();
    while let Some(pkg) = queue.pop_front() {
        if !seen.insert((pkg.name.clone(), pkg.version.clone())) {
            continue;
        }
        for dep in &pkg.dependencies {
            queue.push_back(dep.clone());
        }
        out.push(pkg);
    }
    out
}
