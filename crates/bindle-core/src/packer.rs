//! npm-compatible tarball creation.
//!
//! Entries live under a top-level `package/` directory, gzip-compressed,
//! with deterministic headers so identical bundles produce identical bytes.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::error::{BindleError, Result};

/// Pack `bundle_dir` into `<dest_dir>/<name>-<version>.tgz`.
pub fn pack_directory(
    bundle_dir: &Path,
    dest_dir: &Path,
    name: &str,
    version: &str,
) -> Result<PathBuf> {
    let file_name = format!("{}-{}.tgz", tarball_base_name(name), version);
    let dest = dest_dir.join(file_name);

    let file = File::create(&dest).map_err(|e| BindleError::io("create tarball", &dest, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(true);

    for entry in WalkDir::new(bundle_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BindleError::ToolFailure {
            tool: "pack".to_string(),
            status: None,
            stderr: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(bundle_dir)
            .expect("walked entries live under the bundle dir");
        builder
            .append_path_with_name(entry.path(), Path::new("package").join(rel))
            .map_err(|e| BindleError::io("append tarball entry", entry.path(), e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BindleError::io("finish tarball", &dest, e))?;
    encoder
        .finish()
        .map_err(|e| BindleError::io("finish tarball", &dest, e))?;
    Ok(dest)
}

/// npm flattens scoped names: `@scope/pkg` becomes `scope-pkg`.
fn tarball_base_name(name: &str) -> String {
    name.trim_start_matches('@').replace('/', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;

    fn entry_names(tarball: &Path) -> Vec<String> {
        let file = File::open(tarball).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn packs_under_package_prefix() {
        let td = tempfile::tempdir().unwrap();
        let bundle = td.path().join("bundle");
        std::fs::create_dir_all(bundle.join("lib")).unwrap();
        std::fs::write(bundle.join("package.json"), "{}").unwrap();
        std::fs::write(bundle.join("lib").join("index.js"), "module.exports = {};\n").unwrap();

        let out = pack_directory(&bundle, td.path(), "consumer", "1.2.3").unwrap();
        assert!(out.ends_with("consumer-1.2.3.tgz"));

        let names = entry_names(&out);
        assert!(names.contains(&"package/package.json".to_string()));
        assert!(names.contains(&"package/lib/index.js".to_string()));
    }

    #[test]
    fn scoped_names_flatten() {
        let td = tempfile::tempdir().unwrap();
        let bundle = td.path().join("bundle");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("package.json"), "{}").unwrap();

        let out = pack_directory(&bundle, td.path(), "@scope/pkg", "0.1.0").unwrap();
        assert!(out.ends_with("scope-pkg-0.1.0.tgz"));
    }

    #[test]
    fn roundtrip_preserves_content() {
        let td = tempfile::tempdir().unwrap();
        let bundle = td.path().join("bundle");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("THIRD_PARTY_LICENSES"), "The consumer package\n").unwrap();

        let out = pack_directory(&bundle, td.path(), "consumer", "0.0.0").unwrap();
        let file = File::open(&out).unwrap();
        let mut archive = Archive::new(GzDecoder::new(file));
        let mut found = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().ends_with("THIRD_PARTY_LICENSES") {
                entry.read_to_string(&mut found).unwrap();
            }
        }
        assert_eq!(found, "The consumer package\n");
    }
}
