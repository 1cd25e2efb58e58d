//! Append-only audit file for threshold breaches and failures.
//!
//! Lines written here leave the run alongside the structured job result (the
//! file is picked up and mailed by the surrounding pipeline), so writes are
//! best effort: a failed append is logged, never fatal.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// Appends lines to a local audit file, creating it on first use.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog { path: path.into() }
    }

    /// Appends one line.
    pub fn append(&self, line: &str) {
        let open = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path);
        match open {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{}", line) {
                    warn!("failed to write audit line to {}: {}", self.path.display(), err);
                }
            }
            Err(err) => {
                warn!("failed to open audit file {}: {}", self.path.display(), err);
            }
        }
    }
}
