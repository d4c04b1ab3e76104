//! Wrapper around the import-cycle analyzer.
//!
//! The tool is opaque: it receives the entry points and reports cycles in
//! the source-import graph as a JSON array of arrays of file paths. Exit
//! status 1 means "cycles found" and is part of the contract; any other
//! non-zero exit is a fatal `ToolFailure`, never a violation.

use std::path::Path;

use crate::error::{BindleError, Result};
use crate::shell::{self, ShellInvoker};

pub const DEFAULT_ANALYZER: &str = "madge";

pub struct CircularityAnalyzer<'a> {
    shell: &'a dyn ShellInvoker,
    program: String,
}

impl<'a> CircularityAnalyzer<'a> {
    pub fn new(shell: &'a dyn ShellInvoker, package_dir: &Path) -> Self {
        let program = shell::resolve_tool(DEFAULT_ANALYZER, "BINDLE_MADGE", package_dir);
        CircularityAnalyzer { shell, program }
    }

    /// Run the analyzer over the entry points. Each cycle is rendered as the
    /// participating files joined with `" -> "`.
    pub fn find_cycles(&self, package_dir: &Path, entry_points: &[String]) -> Result<Vec<String>> {
        let mut args: Vec<&str> = vec!["--circular", "--json", "--no-color", "--no-spinner"];
        for entry in entry_points {
            args.push(entry);
        }

        let out = self.shell.invoke(&self.program, &args, package_dir)?;
        // Exit 1 with JSON on stdout means cycles were found, not failure.
        if !matches!(out.status, Some(0) | Some(1)) {
            return Err(BindleError::ToolFailure {
                tool: self.program.clone(),
                status: out.status,
                stderr: out.stderr_utf8(),
            });
        }

        parse_cycles(&out.stdout).ok_or_else(|| BindleError::ToolFailure {
            tool: self.program.clone(),
            status: out.status,
            stderr: format!("unparseable cycle report: {}", out.stdout_utf8()),
        })
    }
}

fn parse_cycles(stdout: &[u8]) -> Option<Vec<String>> {
    let text = String::from_utf8_lossy(stdout);
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    let cycles = value.as_array()?;
    let mut rendered = Vec::with_capacity(cycles.len());
    for cycle in cycles {
        let files: Vec<&str> = cycle.as_array()?.iter().filter_map(|f| f.as_str()).collect();
        rendered.push(files.join(" -> "));
    }
    Some(rendered)
}
