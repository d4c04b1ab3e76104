//! External process invocation: capture stdout, propagate stderr on failure.
//! Every tool call goes through the `ShellInvoker` trait so tests can
//! substitute deterministic fakes.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{BindleError, Result};

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

/// Captured result of a tool invocation.
#[derive(Debug)]
pub struct ShellOutput {
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Synchronous external-process invoker.
///
/// `invoke` returns an error only when the process cannot be spawned;
/// a non-zero exit is reported through `ShellOutput::status` so callers
/// that tolerate specific exit codes (the cycle analyzer) can inspect it.
pub trait ShellInvoker {
    fn invoke(&self, program: &str, args: &[&str], cwd: &Path) -> Result<ShellOutput>;
}

/// Production invoker with a watchdog timeout; the child is killed on expiry.
pub struct SystemShell {
    timeout_secs: u64,
}

impl SystemShell {
    pub fn new() -> Self {
        let timeout_secs = env::var("BINDLE_TOOL_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        SystemShell { timeout_secs }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        SystemShell::new()
    }
}

impl ShellInvoker for SystemShell {
    fn invoke(&self, program: &str, args: &[&str], cwd: &Path) -> Result<ShellOutput> {
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BindleError::ToolFailure {
                tool: program.to_string(),
                status: None,
                stderr: e.to_string(),
            })?;

        let pid = child.id();
        let timeout = self.timeout_secs;
        let (tx, rx) = mpsc::channel::<()>();
        thread::spawn(move || {
            if rx.recv_timeout(Duration::from_secs(timeout)).is_err() {
                kill_process(pid);
            }
        });

        let out = child.wait_with_output().map_err(|e| BindleError::ToolFailure {
            tool: program.to_string(),
            status: None,
            stderr: e.to_string(),
        })?;
        let _ = tx.send(());

        Ok(ShellOutput {
            status: out.status.code(),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }
}

fn kill_process(pid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill").arg("-9").arg(pid.to_string()).output();
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill").args(["/F", "/PID", &pid.to_string()]).output();
    }
}

/// Invoke a tool and require a zero exit; stdout is returned as bytes,
/// a non-zero exit becomes `ToolFailure` with stderr propagated.
pub fn invoke_expecting_success(
    shell: &dyn ShellInvoker,
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> Result<Vec<u8>> {
    let out = shell.invoke(program, args, cwd)?;
    if !out.success() {
        return Err(BindleError::ToolFailure {
            tool: program.to_string(),
            status: out.status,
            stderr: out.stderr_utf8(),
        });
    }
    Ok(out.stdout)
}

/// Resolve a tool program: environment override first, then the nearest
/// `node_modules/.bin` walking upward from the package directory, then
/// the bare name on PATH.
pub fn resolve_tool(default_name: &str, env_var: &str, from_dir: &Path) -> String {
    if let Ok(v) = env::var(env_var) {
        if !v.is_empty() {
            return v;
        }
    }
    if let Some(path) = find_tool_in_node_modules(default_name, from_dir) {
        return path.to_string_lossy().into_owned();
    }
    default_name.to_string()
}

/// Find a binary in node_modules/.bin, nearest package first, then parents.
fn find_tool_in_node_modules(binary: &str, from_dir: &Path) -> Option<PathBuf> {
    // Windows installs wrap binaries in .cmd shims next to the bare name.
    #[cfg(windows)]
    let names = vec![binary.to_string(), format!("{}.cmd", binary)];
    #[cfg(not(windows))]
    let names = vec![binary.to_string()];

    from_dir.ancestors().find_map(|level| {
        let shims = level.join("node_modules").join(".bin");
        names.iter().map(|n| shims.join(n)).find(|p| p.is_file())
    })
}

/// Run a user-supplied shell command (the smoke test) in a directory with
/// inherited stdio. Non-zero exit is a `ToolFailure`.
pub fn run_shell_command(command: &str, cwd: &Path) -> Result<()> {
    #[cfg(unix)]
    let (shell, flag) = ("sh", "-c");
    #[cfg(windows)]
    let (shell, flag) = ("cmd", "/c");

    let status = Command::new(shell)
        .arg(flag)
        .arg(command)
        .current_dir(cwd)
        .status()
        .map_err(|e| BindleError::ToolFailure {
            tool: command.to_string(),
            status: None,
            stderr: e.to_string(),
        })?;
    if !status.success() {
        return Err(BindleError::ToolFailure {
            tool: command.to_string(),
            status: status.code(),
            stderr: String::new(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn captures_stdout() {
        let shell = SystemShell::new();
        let out = shell
            .invoke("echo", &["hello"], Path::new("."))
            .expect("echo runs");
        assert!(out.success());
        assert_eq!(out.stdout_utf8().trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_tool_failure() {
        let shell = SystemShell::new();
        let err = invoke_expecting_success(&shell, "false", &[], Path::new(".")).unwrap_err();
        match err {
            BindleError::ToolFailure { tool, status, .. } => {
                assert_eq!(tool, "false");
                assert_eq!(status, Some(1));
            }
            other => panic!("expected ToolFailure, got {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_tool_failure() {
        let shell = SystemShell::new();
        let err = shell
            .invoke("bindle-no-such-program-xyz", &[], Path::new("."))
            .unwrap_err();
        assert!(matches!(err, BindleError::ToolFailure { status: None, .. }));
    }

    #[test]
    fn env_override_wins() {
        let td = tempfile::tempdir().unwrap();
        std::env::set_var("BINDLE_TEST_TOOL_OVERRIDE", "/opt/custom/esbuild");
        let resolved = resolve_tool("esbuild", "BINDLE_TEST_TOOL_OVERRIDE", td.path());
        std::env::remove_var("BINDLE_TEST_TOOL_OVERRIDE");
        assert_eq!(resolved, "/opt/custom/esbuild");
    }

    #[test]
    fn resolves_from_node_modules_bin() {
        let td = tempfile::tempdir().unwrap();
        let pkg = td.path().join("pkg");
        let bin_dir = td.path().join("node_modules").join(".bin");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join("madge"), "#!/bin/sh\n").unwrap();

        let resolved = resolve_tool("madge", "BINDLE_TEST_UNSET_VAR", &pkg);
        assert!(resolved.ends_with("madge"));
        assert!(resolved.contains("node_modules"));
    }
}
