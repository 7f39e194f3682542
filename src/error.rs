//! Domain error kinds.
//!
//! Most code paths return `anyhow::Result` and attach context as they go.
//! [`VaultError`] is the typed layer underneath: front ends downcast to it
//! to decide how a failure is presented (CLI message, HTTP status).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("extraction failed for {}: {reason}", .path.display())]
    ExtractionFailure { path: PathBuf, reason: String },

    #[error("index is not built at {} (run `fvault index <dir>` first)", .path.display())]
    IndexUnavailable { path: PathBuf },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        VaultError::ExtractionFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Io { .. } => "io_error",
            VaultError::NotFound(_) => "not_found",
            VaultError::ExtractionFailure { .. } => "extraction_failed",
            VaultError::IndexUnavailable { .. } => "index_unavailable",
            VaultError::Unsupported(_) => "unsupported",
            VaultError::Database(_) => "database_error",
            VaultError::Other(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = VaultError::io(
            "/tmp/missing.pdf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.pdf"));
        assert!(msg.contains("gone"));
        assert_eq!(err.code(), "io_error");
    }

    #[test]
    fn anyhow_round_trip_keeps_kind() {
        let err: anyhow::Error = VaultError::IndexUnavailable {
            path: PathBuf::from("data/index.json"),
        }
        .into();
        let kind = err.downcast_ref::<VaultError>().map(VaultError::code);
        assert_eq!(kind, Some("index_unavailable"));
    }
}
