use std::path::PathBuf;

/// Errors that can occur across the Corvid pipeline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use corvid_core::CorvidError;
///
/// let err = CorvidError::Config("max_files must be at least 1".into());
/// assert!(err.to_string().contains("max_files"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CorvidError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Diff parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Analysis capability API or response error.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// GitHub API failure.
    #[error("github error: {0}")]
    Git(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
