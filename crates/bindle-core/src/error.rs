//! Error types for bindle operations.
//! Hard failures are fatal; policy findings are `report::Violation`s, never errors.

use std::fmt;
use std::path::PathBuf;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BindleError>;

/// Fatal failure raised by the pipeline. Policy violations are not errors;
/// they accumulate into a `ValidationReport` instead.
#[derive(Debug)]
pub enum BindleError {
    /// A declared dependency could not be located in the installed layout.
    ResolutionFailed {
        package: String,
        searched_from: PathBuf,
    },
    /// The license probe could not produce metadata for a package.
    AttributionFailed {
        package: String,
        reason: String,
    },
    /// An external tool failed to spawn or exited outside its contract.
    ToolFailure {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    /// Contradictory or malformed configuration.
    InvalidConfig {
        message: String,
    },
    /// Filesystem failure with operation context.
    Io {
        operation: String,
        path: Option<PathBuf>,
        source: std::io::Error,
    },
}

impl BindleError {
    /// Wrap an I/O error with the operation and the path it touched.
    pub fn io(operation: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        BindleError::Io {
            operation: operation.to_string(),
            path: Some(path.to_path_buf()),
            source,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        BindleError::InvalidConfig { message: message.into() }
    }
}

impl fmt::Display for BindleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindleError::ResolutionFailed { package, searched_from } => {
                write!(
                    f,
                    "Unable to locate dependency \"{}\" on disk (searched upward from {})",
                    package,
                    searched_from.display()
                )
            }
            BindleError::AttributionFailed { package, reason } => {
                write!(f, "Unable to attribute {}: {}", package, reason)
            }
            BindleError::ToolFailure { tool, status, stderr } => {
                match status {
                    Some(code) => write!(f, "{} exited with status {}", tool, code)?,
                    None => write!(f, "{} could not be run", tool)?,
                }
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            BindleError::InvalidConfig { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
            BindleError::Io { operation, path, source } => {
                write!(f, "I/O error in {}: {}", operation, source)?;
                if let Some(path) = path {
                    write!(f, " (path: {})", path.display())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for BindleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindleError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
