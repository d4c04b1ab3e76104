//! Adapter for the opaque tree-shaking bundler.
//!
//! The bundler receives the entry points and a marker per external name; it
//! writes one file per entry point (plus any sourcemaps) into a fresh output
//! directory mirroring the entry-point paths.

use std::path::{Path, PathBuf};

use crate::error::{BindleError, Result};
use crate::shell::{self, ShellInvoker};

pub const DEFAULT_BUNDLER: &str = "esbuild";

/// Inputs for one bundler invocation.
pub struct BundleRequest<'a> {
    pub package_dir: &'a Path,
    pub entry_points: &'a [String],
    pub externals: Vec<String>,
    pub minify_whitespace: bool,
    pub metafile: Option<&'a str>,
    pub sourcemap: bool,
}

pub struct Bundler<'a> {
    shell: &'a dyn ShellInvoker,
    program: String,
}

impl<'a> Bundler<'a> {
    pub fn new(shell: &'a dyn ShellInvoker, package_dir: &Path) -> Self {
        let program = shell::resolve_tool(DEFAULT_BUNDLER, "BINDLE_BUNDLER", package_dir);
        Bundler { shell, program }
    }

    /// Run the bundler; returns the produced output directory.
    pub fn bundle(&self, request: &BundleRequest<'_>) -> Result<PathBuf> {
        let out_dir = tempfile::Builder::new()
            .prefix("bindle-out-")
            .tempdir()
            .map_err(|e| BindleError::io("create bundler output dir", Path::new("."), e))?
            .into_path();

        let mut args: Vec<String> = request.entry_points.to_vec();
        args.push("--bundle".to_string());
        args.push("--platform=node".to_string());
        args.push("--outbase=.".to_string());
        args.push(format!("--outdir={}", out_dir.display()));
        for name in &request.externals {
            args.push(format!("--external:{}", name));
        }
        if request.minify_whitespace {
            args.push("--minify-whitespace".to_string());
        }
        if let Some(metafile) = request.metafile {
            args.push(format!("--metafile={}", metafile));
        }
        if request.sourcemap {
            args.push("--sourcemap".to_string());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        shell::invoke_expecting_success(self.shell, &self.program, &arg_refs, request.package_dir)?;
        Ok(out_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellOutput;
    use std::cell::RefCell;

    struct RecordingShell {
        args: RefCell<Vec<String>>,
        status: Option<i32>,
    }

    impl ShellInvoker for RecordingShell {
        fn invoke(&self, _program: &str, args: &[&str], _cwd: &Path) -> Result<ShellOutput> {
            *self.args.borrow_mut() = args.iter().map(|s| s.to_string()).collect();
            Ok(ShellOutput {
                status: self.status,
                stdout: Vec::new(),
                stderr: b"boom".to_vec(),
            })
        }
    }

    #[test]
    fn marks_externals_and_flags() {
        let shell = RecordingShell { args: RefCell::new(Vec::new()), status: Some(0) };
        let bundler = Bundler { shell: &shell, program: "esbuild".to_string() };
        let entries = vec!["index.js".to_string()];
        let out = bundler
            .bundle(&BundleRequest {
                package_dir: Path::new("."),
                entry_points: &entries,
                externals: vec!["aws-sdk".to_string()],
                minify_whitespace: true,
                metafile: Some("meta.json"),
                sourcemap: true,
            })
            .unwrap();
        assert!(out.exists());

        let args = shell.args.borrow();
        assert_eq!(args[0], "index.js");
        assert!(args.contains(&"--bundle".to_string()));
        assert!(args.contains(&"--external:aws-sdk".to_string()));
        assert!(args.contains(&"--minify-whitespace".to_string()));
        assert!(args.contains(&"--metafile=meta.json".to_string()));
        assert!(args.contains(&"--sourcemap".to_string()));
    }

    #[test]
    fn bundler_failure_is_fatal() {
        let shell = RecordingShell { args: RefCell::new(Vec::new()), status: Some(1) };
        let bundler = Bundler { shell: &shell, program: "esbuild".to_string() };
        let entries = vec!["index.js".to_string()];
        let err = bundler
            .bundle(&BundleRequest {
                package_dir: Path::new("."),
                entry_points: &entries,
                externals: vec![],
                minify_whitespace: false,
                metafile: None,
                sourcemap: false,
            })
            .unwrap_err();
        match err {
            BindleError::ToolFailure { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("expected ToolFailure, got {:?}", other),
        }
    }
}
