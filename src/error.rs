use std::path::PathBuf;

/// Conditions that end a run. Per-unit and per-reference problems never
/// reach this type; they are recorded as warnings on the
/// [`ConsolidationResult`](crate::ConsolidationResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    #[error("invalid URL \"{input}\": {source}")]
    InvalidUrl {
        input: String,
        source: url::ParseError,
    },

    #[error("provided path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no content found in {0}")]
    NoContentFound(String),

    #[error("all {total} units failed to render, nothing to assemble")]
    AllUnitsFailed { total: usize },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("failed to emit {}: {message}", .path.display())]
    Emit { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConsolidationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(err.to_string())
    }
}
