//! package.json reading and bundle-time rewriting.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{BindleError, Result};

pub const MANIFEST_NAME: &str = "package.json";

/// A parsed package manifest. The raw JSON value is retained so the bundle
/// rewrite preserves fields bindle does not model.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    pub main: Option<String>,
    pub dependencies: IndexMap<String, String>,
    pub optional_dependencies: IndexMap<String, String>,
    pub dev_dependencies: IndexMap<String, String>,
    raw: Value,
}

impl Manifest {
    /// Read and parse `<dir>/package.json`.
    pub fn read(dir: &Path) -> Result<Manifest> {
        let path = dir.join(MANIFEST_NAME);
        let text = fs::read_to_string(&path)
            .map_err(|e| BindleError::io("read manifest", &path, e))?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            BindleError::invalid_config(format!("{}: invalid JSON: {}", path.display(), e))
        })?;

        let name = str_field(&raw, "name").ok_or_else(|| {
            BindleError::invalid_config(format!("{}: missing \"name\"", path.display()))
        })?;
        let version = str_field(&raw, "version").ok_or_else(|| {
            BindleError::invalid_config(format!("{}: missing \"version\"", path.display()))
        })?;

        Ok(Manifest {
            name,
            version,
            main: str_field(&raw, "main"),
            dependencies: dep_table(&raw, "dependencies"),
            optional_dependencies: dep_table(&raw, "optionalDependencies"),
            dev_dependencies: dep_table(&raw, "devDependencies"),
            path,
            raw,
        })
    }

    pub fn fqn(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Declared entry point, npm default when absent.
    pub fn entry_point(&self) -> String {
        self.main.clone().unwrap_or_else(|| "index.js".to_string())
    }

    /// Rewrite the manifest for the bundle: every dependency that was inlined
    /// moves to devDependencies; only externals survive in dependencies and
    /// optionalDependencies.
    pub fn rewritten_for_bundle(&self, external_names: &HashSet<String>) -> Value {
        let mut raw = self.raw.clone();

        let mut dependencies = IndexMap::new();
        let mut optional = IndexMap::new();
        let mut dev = self.dev_dependencies.clone();

        for (name, spec) in &self.dependencies {
            if external_names.contains(name) {
                dependencies.insert(name.clone(), spec.clone());
            } else {
                dev.insert(name.clone(), spec.clone());
            }
        }
        for (name, spec) in &self.optional_dependencies {
            if external_names.contains(name) {
                optional.insert(name.clone(), spec.clone());
            } else {
                dev.insert(name.clone(), spec.clone());
            }
        }

        if let Some(obj) = raw.as_object_mut() {
            obj.insert("dependencies".to_string(), table_value(&dependencies));
            obj.insert("optionalDependencies".to_string(), table_value(&optional));
            obj.insert("devDependencies".to_string(), table_value(&dev));
        }
        raw
    }

    /// Write the rewritten manifest into a bundle directory.
    pub fn write_rewritten(&self, bundle_dir: &Path, external_names: &HashSet<String>) -> Result<()> {
        let value = self.rewritten_for_bundle(external_names);
        let path = bundle_dir.join(MANIFEST_NAME);
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| BindleError::invalid_config(format!("serialize manifest: {}", e)))?;
        fs::write(&path, format!("{}\n", text))
            .map_err(|e| BindleError::io("write manifest", &path, e))
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(String::from)
}

fn dep_table(v: &Value, key: &str) -> IndexMap<String, String> {
    let mut table = IndexMap::new();
    if let Some(obj) = v.get(key).and_then(|d| d.as_object()) {
        for (name, spec) in obj {
            if let Some(s) = spec.as_str() {
                table.insert(name.clone(), s.to_string());
            }
        }
    }
    table
}

fn table_value(table: &IndexMap<String, String>) -> Value {
    let mut map = serde_json::Map::new();
    for (name, spec) in table {
        map.insert(name.clone(), Value::String(spec.clone()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(dir: &Path, body: &str) {
        fs::write(dir.join(MANIFEST_NAME), body).unwrap();
    }

    #[test]
    fn reads_fields() {
        let td = tempfile::tempdir().unwrap();
        fixture(
            td.path(),
            r#"{
  "name": "consumer",
  "version": "0.0.0",
  "main": "lib/index.js",
  "dependencies": { "dep1": "^1.0.0", "dep2": "2.0.0" },
  "devDependencies": { "jest": "^29.0.0" }
}
"#,
        );
        let m = Manifest::read(td.path()).unwrap();
        assert_eq!(m.name, "consumer");
        assert_eq!(m.version, "0.0.0");
        assert_eq!(m.fqn(), "consumer@0.0.0");
        assert_eq!(m.entry_point(), "lib/index.js");
        assert_eq!(m.dependencies.len(), 2);
        assert_eq!(m.dev_dependencies.get("jest").unwrap(), "^29.0.0");
    }

    #[test]
    fn entry_point_defaults_to_index_js() {
        let td = tempfile::tempdir().unwrap();
        fixture(td.path(), r#"{ "name": "x", "version": "1.0.0" }"#);
        let m = Manifest::read(td.path()).unwrap();
        assert_eq!(m.entry_point(), "index.js");
    }

    #[test]
    fn missing_name_is_invalid_config() {
        let td = tempfile::tempdir().unwrap();
        fixture(td.path(), r#"{ "version": "1.0.0" }"#);
        let err = Manifest::read(td.path()).unwrap_err();
        assert!(matches!(err, BindleError::InvalidConfig { .. }));
    }

    #[test]
    fn rewrite_moves_bundled_to_dev_dependencies() {
        let td = tempfile::tempdir().unwrap();
        fixture(
            td.path(),
            r#"{
  "name": "consumer",
  "version": "0.0.0",
  "dependencies": { "dep1": "^1.0.0", "keep-me": "^3.0.0" },
  "optionalDependencies": { "maybe": "^2.0.0" }
}
"#,
        );
        let m = Manifest::read(td.path()).unwrap();
        let externals: HashSet<String> =
            ["keep-me".to_string(), "maybe".to_string()].into_iter().collect();
        let v = m.rewritten_for_bundle(&externals);

        let deps = v.get("dependencies").unwrap().as_object().unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps.contains_key("keep-me"));

        let optional = v.get("optionalDependencies").unwrap().as_object().unwrap();
        assert_eq!(optional.len(), 1);
        assert!(optional.contains_key("maybe"));

        let dev = v.get("devDependencies").unwrap().as_object().unwrap();
        assert!(dev.contains_key("dep1"));
        assert!(!dev.contains_key("keep-me"));
    }

    #[test]
    fn rewrite_with_no_externals_empties_dependencies() {
        let td = tempfile::tempdir().unwrap();
        fixture(
            td.path(),
            r#"{
  "name": "consumer",
  "version": "0.0.0",
  "dependencies": { "dep1": "^1.0.0", "dep2": "^1.0.0" }
}
"#,
        );
        let m = Manifest::read(td.path()).unwrap();
        let v = m.rewritten_for_bundle(&HashSet::new());
        assert!(v.get("dependencies").unwrap().as_object().unwrap().is_empty());
        let dev = v.get("devDependencies").unwrap().as_object().unwrap();
        assert_eq!(dev.len(), 2);
    }
}
