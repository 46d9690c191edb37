use std::path::PathBuf;
use std::time::Duration;

use scaffold_core::StoreError;

/// Failure to launch or finish an external tool.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("tool failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool timed out after {}s ({command})", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("discovery root is not a directory: {path}")]
    InvalidRoot { path: PathBuf },
    #[error("failed to resolve discovery root {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors a task run surfaces instead of encoding them into the result.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid run request: {message}")]
    InvalidRequest { message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("background scan for {repo} failed: {message}")]
    Background { repo: PathBuf, message: String },
}
