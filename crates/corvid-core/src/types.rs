use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a file was touched by the diff.
///
/// # Examples
///
/// ```
/// use corvid_core::ChangeKind;
///
/// let kind = ChangeKind::Modified;
/// assert_eq!(format!("{kind}"), "modified");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Newly created file.
    Added,
    /// Existing file changed in place.
    Modified,
    /// File removed.
    Deleted,
    /// File moved or renamed.
    Renamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// A single hunk from a unified diff.
///
/// `content` holds the raw marker-prefixed lines (`+`, `-`, or space), one per
/// line, exactly as they appeared in the diff body.
///
/// # Examples
///
/// ```
/// use corvid_core::DiffHunk;
///
/// let hunk = DiffHunk {
///     old_start: 10,
///     old_lines: 2,
///     new_start: 10,
///     new_lines: 3,
///     content: " fn main() {\n+    run();\n }\n".into(),
/// };
/// assert_eq!(hunk.new_lines, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
    /// Raw diff content for this hunk.
    pub content: String,
}

/// One file touched by the diff, with its ordered hunks.
///
/// `size_bytes` is the cumulative byte length of the hunk content — the diff is
/// the pipeline's only input, so there is no working tree to stat.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use corvid_core::{ChangeKind, FileChange};
///
/// let change = FileChange {
///     path: PathBuf::from("src/auth.rs"),
///     old_path: None,
///     kind: ChangeKind::Modified,
///     hunks: vec![],
///     size_bytes: 0,
/// };
/// assert_eq!(change.kind, ChangeKind::Modified);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path in the new version (old path for deletions).
    pub path: PathBuf,
    /// Previous path, set for renames.
    pub old_path: Option<PathBuf>,
    /// Classification of the change.
    pub kind: ChangeKind,
    /// Parsed hunks, in diff order.
    pub hunks: Vec<DiffHunk>,
    /// Cumulative byte length of hunk content.
    pub size_bytes: usize,
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} hunks)", self.path.display(), self.kind, self.hunks.len())
    }
}

/// A bounded slice of a file's changed region, safe to send to analysis.
///
/// Line numbers are 1-based and inclusive, in the *new* version of the file.
/// Chunks of the same file never overlap, and their union covers every changed
/// line.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use corvid_core::CodeChunk;
///
/// let chunk = CodeChunk {
///     file_path: PathBuf::from("src/lib.rs"),
///     start_line: 8,
///     end_line: 14,
///     content: "fn f() {}\n".into(),
///     index: 0,
/// };
/// assert!(chunk.contains_line(10));
/// assert!(!chunk.contains_line(15));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChunk {
    /// Path of the owning file.
    pub file_path: PathBuf,
    /// First line of the chunk (1-based, new file).
    pub start_line: u32,
    /// Last line of the chunk (1-based, inclusive).
    pub end_line: u32,
    /// Chunk source text, one new-file line per line, markers stripped.
    pub content: String,
    /// Sequence index within the owning file.
    pub index: usize,
}

impl CodeChunk {
    /// Returns `true` if `line` falls inside this chunk's range.
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Number of lines in the chunk.
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// One analytical lens applied to a chunk.
///
/// The set of focuses is closed: each differs only in the prompt sent to the
/// analysis capability, so runtime-registered plugins would buy nothing.
///
/// # Examples
///
/// ```
/// use corvid_core::FocusArea;
///
/// let focus: FocusArea = "security".parse().unwrap();
/// assert_eq!(focus, FocusArea::Security);
/// assert_eq!(FocusArea::all().len(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    /// Vulnerabilities, unsafe input handling, secrets.
    Security,
    /// Algorithmic cost, allocations, blocking calls.
    Performance,
    /// Bugs, maintainability, error handling.
    Quality,
    /// Doc comments, API docs, readability.
    Documentation,
}

impl FocusArea {
    /// All focus areas in canonical order.
    pub fn all() -> [FocusArea; 4] {
        [
            FocusArea::Security,
            FocusArea::Performance,
            FocusArea::Quality,
            FocusArea::Documentation,
        ]
    }

    /// Stable lowercase name, matching the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            FocusArea::Security => "security",
            FocusArea::Performance => "performance",
            FocusArea::Quality => "quality",
            FocusArea::Documentation => "documentation",
        }
    }
}

impl fmt::Display for FocusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FocusArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "security" => Ok(FocusArea::Security),
            "performance" => Ok(FocusArea::Performance),
            "quality" => Ok(FocusArea::Quality),
            "documentation" | "docs" => Ok(FocusArea::Documentation),
            other => Err(format!("unknown focus area: {other}")),
        }
    }
}

/// Finding severity.
///
/// # Examples
///
/// ```
/// use corvid_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"critical\"").unwrap();
/// assert_eq!(s, Severity::Critical);
/// assert!(Severity::High.meets_threshold(Severity::Medium));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed before merge.
    Critical,
    /// Likely defect, should be fixed.
    High,
    /// Worth addressing.
    Medium,
    /// Minor or stylistic.
    Low,
}

impl Severity {
    /// Returns `true` if `self` is at least as severe as `threshold`.
    ///
    /// Severity order: Critical > High > Medium > Low.
    ///
    /// # Examples
    ///
    /// ```
    /// use corvid_core::Severity;
    ///
    /// assert!(Severity::Critical.meets_threshold(Severity::High));
    /// assert!(Severity::High.meets_threshold(Severity::High));
    /// assert!(!Severity::Low.meets_threshold(Severity::High));
    /// ```
    pub fn meets_threshold(self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" | "major" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" | "minor" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One reported issue from the analysis capability.
///
/// `line` is `None` for summary-level findings; those are folded into the PR
/// summary and never emitted as line comments.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use corvid_core::{Finding, FocusArea, Severity};
///
/// let finding = Finding {
///     file_path: PathBuf::from("src/auth.rs"),
///     line: Some(42),
///     severity: Severity::High,
///     focus: FocusArea::Security,
///     message: "Token compared with non-constant-time equality".into(),
///     suggestion: Some("Use a constant-time comparison".into()),
/// };
/// assert_eq!(finding.severity, Severity::High);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Path to the file being commented on.
    pub file_path: PathBuf,
    /// Line number in the new version, if the finding is line-anchored.
    pub line: Option<u32>,
    /// Severity of the finding.
    pub severity: Severity,
    /// Which lens produced the finding.
    pub focus: FocusArea,
    /// Explanation of the issue.
    pub message: String,
    /// Optional fix suggestion.
    pub suggestion: Option<String>,
}

/// Coverage status of one focus area for one file.
///
/// # Examples
///
/// ```
/// use corvid_core::FocusStatus;
///
/// assert_eq!(format!("{}", FocusStatus::Partial), "partial");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusStatus {
    /// Every task for the focus succeeded.
    Ok,
    /// Some tasks for the focus failed.
    Partial,
    /// No task for the focus succeeded.
    Failed,
}

impl fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusStatus::Ok => write!(f, "ok"),
            FocusStatus::Partial => write!(f, "partial"),
            FocusStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-focus coverage entry in a [`FileReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusOutcome {
    /// The focus area.
    pub focus: FocusArea,
    /// Its coverage status for the file.
    pub status: FocusStatus,
}

/// Aggregated, deduplicated findings for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    /// Path of the file.
    pub path: PathBuf,
    /// Deduplicated findings, most severe first.
    pub findings: Vec<Finding>,
    /// Coverage status per enabled focus, in canonical focus order.
    pub focus_outcomes: Vec<FocusOutcome>,
}

impl FileReport {
    /// Returns `true` if any focus has degraded (partial or failed) coverage.
    pub fn has_reduced_coverage(&self) -> bool {
        self.focus_outcomes
            .iter()
            .any(|o| o.status != FocusStatus::Ok)
    }
}

/// Finding counts by severity.
///
/// # Examples
///
/// ```
/// use corvid_core::{SeverityCounts, Severity};
///
/// let mut counts = SeverityCounts::default();
/// counts.record(Severity::High);
/// counts.record(Severity::High);
/// counts.record(Severity::Low);
/// assert_eq!(counts.high, 2);
/// assert_eq!(counts.total(), 3);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    /// Increment the counter for `severity`.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// Total findings across all severities.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Overall merge recommendation, chosen by a fixed rule over the severity
/// histogram.
///
/// # Examples
///
/// ```
/// use corvid_core::Recommendation;
///
/// assert_eq!(Recommendation::RequestChanges.slug(), "request_changes");
/// assert!(format!("{}", Recommendation::LooksGood).contains("Looks good"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// At least one critical finding.
    RequestChanges,
    /// High-severity findings above the configured threshold.
    NeedsAttention,
    /// Findings exist but nothing blocking.
    ApproveWithSuggestions,
    /// No findings at all.
    LooksGood,
}

impl Recommendation {
    /// Stable machine-readable identifier.
    pub fn slug(self) -> &'static str {
        match self {
            Recommendation::RequestChanges => "request_changes",
            Recommendation::NeedsAttention => "needs_attention",
            Recommendation::ApproveWithSuggestions => "approve_with_suggestions",
            Recommendation::LooksGood => "looks_good",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::RequestChanges => write!(f, "Request changes"),
            Recommendation::NeedsAttention => write!(f, "Needs attention"),
            Recommendation::ApproveWithSuggestions => write!(f, "Approve with suggestions"),
            Recommendation::LooksGood => write!(f, "Looks good"),
        }
    }
}

/// Final output of one pipeline run.
///
/// `counts` is computed over deduplicated findings only — it is always exactly
/// the number of findings reachable through `files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// Per-file reports, in diff order.
    pub files: Vec<FileReport>,
    /// Severity histogram over all contained findings.
    pub counts: SeverityCounts,
    /// Overall recommendation.
    pub recommendation: Recommendation,
}

impl ReviewReport {
    /// Total number of findings across all files.
    pub fn total_issues(&self) -> usize {
        self.counts.total()
    }

    /// Iterate all findings across all files.
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        self.files.iter().flat_map(|f| f.findings.iter())
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use corvid_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
