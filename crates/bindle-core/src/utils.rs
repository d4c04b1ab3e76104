//! Logging and small text helpers shared across the pipeline.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;

use chrono::Local;

fn is_quiet() -> bool {
    env::var("BINDLE_QUIET")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Print a timestamped diagnostic line unless quiet; mirror it to
/// BINDLE_LOG_FILE when that variable is set.
pub fn log(message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let line = format!("[{}] {}", timestamp, message);

    if !is_quiet() {
        eprintln!("{}", line);
    }

    if let Ok(path) = env::var("BINDLE_LOG_FILE") {
        if !path.is_empty() {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = writeln!(file, "{}", line);
            }
        }
    }
}

pub fn log_error(message: &str) {
    log(&format!("ERROR: {}", message));
}

/// Normalize CRLF sequences to LF. All persisted artifacts are LF-only.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}
