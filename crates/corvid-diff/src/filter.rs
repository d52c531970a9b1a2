//! Pre-analysis file filtering.
//!
//! Decides which changed files are eligible for review before anything is sent
//! to the analysis capability: exclude-pattern matching, a per-file size cap,
//! a supported-type gate, and a stable prefix cap on the total file count.

use std::fmt;
use std::path::{Path, PathBuf};

use corvid_core::{ChangeKind, CorvidError, FileChange, ReviewConfig};

/// Eligibility filter for changed files.
///
/// Pure over its inputs: the same diff and configuration always produce the
/// same partition. Acceptance follows diff order, so the file-count cap is a
/// stable prefix truncation.
///
/// # Examples
///
/// ```
/// use corvid_core::ReviewConfig;
/// use corvid_diff::filter::FileFilter;
///
/// let filter = FileFilter::new(&ReviewConfig::default()).unwrap();
/// assert!(filter.is_excluded("Cargo.lock"));
/// assert!(!filter.is_excluded("src/main.rs"));
/// ```
pub struct FileFilter {
    exclude_patterns: Vec<glob::Pattern>,
    max_files: usize,
    max_size_bytes: usize,
}

impl FileFilter {
    /// Build a filter from review configuration, compiling exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Config`] for a malformed glob pattern. A bad
    /// pattern is a configuration error, never a silent per-file skip.
    pub fn new(config: &ReviewConfig) -> Result<Self, CorvidError> {
        let mut exclude_patterns = Vec::with_capacity(config.exclude_patterns.len());
        for raw in &config.exclude_patterns {
            let pattern = glob::Pattern::new(raw).map_err(|e| {
                CorvidError::Config(format!("invalid exclude pattern '{raw}': {e}"))
            })?;
            exclude_patterns.push(pattern);
        }

        Ok(Self {
            exclude_patterns,
            max_files: config.max_files,
            max_size_bytes: config.max_file_size_kb * 1024,
        })
    }

    /// Check whether a path matches any exclude pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.matching_pattern(Path::new(path)).is_some()
    }

    /// Partition changed files into an eligible prefix and skip records.
    ///
    /// # Examples
    ///
    /// ```
    /// use corvid_core::ReviewConfig;
    /// use corvid_diff::filter::FileFilter;
    /// use corvid_diff::parser::parse_unified_diff;
    ///
    /// let diff = "diff --git a/src/main.rs b/src/main.rs\n\
    ///             --- a/src/main.rs\n\
    ///             +++ b/src/main.rs\n\
    ///             @@ -1,2 +1,3 @@\n\
    ///              line\n\
    ///             +new\n";
    /// let changes = parse_unified_diff(diff).unwrap();
    /// let filter = FileFilter::new(&ReviewConfig::default()).unwrap();
    /// let result = filter.filter(changes);
    /// assert_eq!(result.kept.len(), 1);
    /// assert!(result.skipped.is_empty());
    /// ```
    pub fn filter(&self, changes: Vec<FileChange>) -> FilterResult {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();

        for change in changes {
            match self.check_skip(&change, kept.len()) {
                Some(reason) => skipped.push(SkippedFile {
                    path: change.path.clone(),
                    reason,
                }),
                None => kept.push(change),
            }
        }

        FilterResult { kept, skipped }
    }

    fn check_skip(&self, change: &FileChange, accepted: usize) -> Option<SkipReason> {
        if change.kind == ChangeKind::Deleted {
            return Some(SkipReason::NotReviewable);
        }

        if let Some(pattern) = self.matching_pattern(&change.path) {
            return Some(SkipReason::PatternMatch(pattern));
        }

        if !is_supported_type(&change.path) {
            return Some(SkipReason::UnsupportedType);
        }

        if change.size_bytes > self.max_size_bytes {
            return Some(SkipReason::TooLarge {
                size_bytes: change.size_bytes,
                limit_bytes: self.max_size_bytes,
            });
        }

        if accepted >= self.max_files {
            return Some(SkipReason::FileLimitReached(self.max_files));
        }

        None
    }

    fn matching_pattern(&self, path: &Path) -> Option<String> {
        let path_str = path.to_string_lossy();
        let file_name = path.file_name().map(|f| f.to_string_lossy());

        for pattern in &self.exclude_patterns {
            if pattern.matches(&path_str) {
                return Some(pattern.to_string());
            }
            if let Some(name) = &file_name {
                if pattern.matches(name) {
                    return Some(pattern.to_string());
                }
            }
        }
        None
    }
}

/// Result of filtering a diff's files.
pub struct FilterResult {
    /// Files that passed the filter, in diff order.
    pub kept: Vec<FileChange>,
    /// Files that were skipped, with reasons, in diff order.
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: PathBuf,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Reason a file was skipped. Skips are recorded, never errors.
///
/// # Examples
///
/// ```
/// use corvid_diff::filter::SkipReason;
///
/// let reason = SkipReason::FileLimitReached(20);
/// assert_eq!(format!("{reason}"), "file limit reached (20)");
/// ```
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// Matched an exclude pattern.
    PatternMatch(String),
    /// Changed content exceeds the size cap.
    TooLarge { size_bytes: usize, limit_bytes: usize },
    /// The accepted-file count already hit the configured maximum.
    FileLimitReached(usize),
    /// Not a reviewable text type.
    UnsupportedType,
    /// Nothing reviewable remains (e.g. the file was deleted).
    NotReviewable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PatternMatch(pat) => write!(f, "pattern: {pat}"),
            SkipReason::TooLarge {
                size_bytes,
                limit_bytes,
            } => write!(f, "too large ({size_bytes} bytes > {limit_bytes} bytes)"),
            SkipReason::FileLimitReached(max) => write!(f, "file limit reached ({max})"),
            SkipReason::UnsupportedType => write!(f, "unsupported file type"),
            SkipReason::NotReviewable => write!(f, "not reviewable"),
        }
    }
}

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "jsx", "tsx", "java", "cpp", "cc", "c", "h", "hpp", "cs", "php",
    "rb", "go", "swift", "kt", "scala", "sql", "sh", "bash", "yml", "yaml", "json", "xml",
    "html", "css", "scss", "sass", "less", "vue", "svelte", "dart", "lua", "clj", "ex", "exs",
    "md", "rst", "toml", "txt", "cfg", "ini", "conf", "proto", "tf", "ps1",
];

const SPECIAL_FILES: &[&str] = &[
    "makefile",
    "dockerfile",
    "jenkinsfile",
    "vagrantfile",
    "gemfile",
    "rakefile",
    "procfile",
    "cmakelists.txt",
];

fn is_supported_type(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        return SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str());
    }
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    SPECIAL_FILES.contains(&file_name.as_str())
}
