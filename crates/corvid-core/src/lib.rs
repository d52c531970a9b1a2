//! Core types, configuration, and error handling for the Corvid pipeline.
//!
//! This crate provides the shared foundation used by all other Corvid crates:
//! - [`CorvidError`] — unified error type using `thiserror`
//! - [`CorvidConfig`] — configuration loaded from `.corvid.toml`
//! - Shared types: [`FileChange`], [`DiffHunk`], [`CodeChunk`], [`FocusArea`],
//!   [`Severity`], [`Finding`], [`FileReport`], [`ReviewReport`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{AnalystConfig, CorvidConfig, OutputConfig, ReviewConfig, ReviewLevel};
pub use error::CorvidError;
pub use types::{
    ChangeKind, CodeChunk, DiffHunk, FileChange, FileReport, Finding, FocusArea, FocusOutcome,
    FocusStatus, OutputFormat, Recommendation, ReviewReport, Severity, SeverityCounts,
};

/// A convenience `Result` type for Corvid operations.
pub type Result<T> = std::result::Result<T, CorvidError>;
