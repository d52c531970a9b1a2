use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CorvidError;
use crate::types::FocusArea;

/// Top-level configuration loaded from `.corvid.toml`.
///
/// Constructed once, immutable afterwards, and passed by reference through the
/// pipeline — no component reads ambient state.
///
/// # Examples
///
/// ```
/// use corvid_core::CorvidConfig;
///
/// let config = CorvidConfig::default();
/// assert_eq!(config.review.max_files, 20);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorvidConfig {
    /// Analysis capability (LLM provider) settings.
    #[serde(default)]
    pub analyst: AnalystConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Output formatting settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl CorvidConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Io`] if the file cannot be read, or
    /// [`CorvidError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use corvid_core::CorvidConfig;
    /// use std::path::Path;
    ///
    /// let config = CorvidConfig::from_file(Path::new(".corvid.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CorvidError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use corvid_core::CorvidConfig;
    ///
    /// let toml = r#"
    /// [review]
    /// max_files = 10
    /// "#;
    /// let config = CorvidConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.max_files, 10);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CorvidError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric bounds. Violations are fatal before dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), CorvidError> {
        let r = &self.review;
        if r.max_files == 0 {
            return Err(CorvidError::Config("max_files must be at least 1".into()));
        }
        if r.concurrency == 0 {
            return Err(CorvidError::Config("concurrency must be at least 1".into()));
        }
        if r.timeout_seconds == 0 {
            return Err(CorvidError::Config("timeout_seconds must be at least 1".into()));
        }
        if r.max_attempts == 0 {
            return Err(CorvidError::Config("max_attempts must be at least 1".into()));
        }
        if r.requests_per_minute == 0 {
            return Err(CorvidError::Config(
                "requests_per_minute must be at least 1".into(),
            ));
        }
        if let Some(lines) = r.max_chunk_lines {
            if lines == 0 {
                return Err(CorvidError::Config("max_chunk_lines must be at least 1".into()));
            }
        }
        if !(r.dedup_similarity > 0.0 && r.dedup_similarity <= 1.0) {
            return Err(CorvidError::Config(
                "dedup_similarity must be in (0.0, 1.0]".into(),
            ));
        }
        if self.output.max_comment_length == 0 {
            return Err(CorvidError::Config(
                "max_comment_length must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Focus areas enabled by the review level and the per-focus flags.
    ///
    /// Quality review is always on. The `basic` level drops performance and
    /// documentation regardless of flags; `comprehensive` forces every focus on.
    ///
    /// # Examples
    ///
    /// ```
    /// use corvid_core::{CorvidConfig, FocusArea, ReviewLevel};
    ///
    /// let mut config = CorvidConfig::default();
    /// config.review.review_level = ReviewLevel::Basic;
    /// let focuses = config.enabled_focuses();
    /// assert!(focuses.contains(&FocusArea::Quality));
    /// assert!(!focuses.contains(&FocusArea::Performance));
    /// ```
    pub fn enabled_focuses(&self) -> Vec<FocusArea> {
        let r = &self.review;
        let (security, performance, documentation) = match r.review_level {
            ReviewLevel::Basic => (r.enable_security, false, false),
            ReviewLevel::Standard => {
                (r.enable_security, r.enable_performance, r.enable_documentation)
            }
            ReviewLevel::Comprehensive => (true, true, true),
        };

        let mut focuses = Vec::new();
        if security {
            focuses.push(FocusArea::Security);
        }
        if performance {
            focuses.push(FocusArea::Performance);
        }
        focuses.push(FocusArea::Quality);
        if documentation {
            focuses.push(FocusArea::Documentation);
        }
        focuses
    }

    /// Maximum chunk size in lines, from the explicit setting or the level
    /// default (basic 200, standard 120, comprehensive 80).
    pub fn chunk_lines(&self) -> u32 {
        self.review.max_chunk_lines.unwrap_or(match self.review.review_level {
            ReviewLevel::Basic => 200,
            ReviewLevel::Standard => 120,
            ReviewLevel::Comprehensive => 80,
        })
    }

    /// Whether line comments should be emitted. The `basic` level suppresses
    /// them even when the output toggle is on.
    pub fn line_comments_enabled(&self) -> bool {
        self.output.line_comments && self.review.review_level != ReviewLevel::Basic
    }
}

/// Depth of the review.
///
/// # Examples
///
/// ```
/// use corvid_core::ReviewLevel;
///
/// let level: ReviewLevel = "comprehensive".parse().unwrap();
/// assert_eq!(level, ReviewLevel::Comprehensive);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewLevel {
    /// Quality (+ security if enabled), large chunks, summary only.
    Basic,
    /// All flagged focuses, medium chunks.
    #[default]
    Standard,
    /// Every focus forced on, fine-grained chunks.
    Comprehensive,
}

impl fmt::Display for ReviewLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewLevel::Basic => write!(f, "basic"),
            ReviewLevel::Standard => write!(f, "standard"),
            ReviewLevel::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

impl FromStr for ReviewLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(ReviewLevel::Basic),
            "standard" => Ok(ReviewLevel::Standard),
            "comprehensive" => Ok(ReviewLevel::Comprehensive),
            other => Err(format!("unknown review level: {other}")),
        }
    }
}

/// Analysis capability configuration.
///
/// # Examples
///
/// ```
/// use corvid_core::AnalystConfig;
///
/// let config = AnalystConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Provider name (e.g. `"openai"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use corvid_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.max_files, 20);
/// assert_eq!(config.max_file_size_kb, 500);
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Depth of the review (default: standard).
    #[serde(default)]
    pub review_level: ReviewLevel,
    /// Maximum number of files reviewed per run; acceptance is a stable
    /// prefix of the eligible list in diff order (default: 20).
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Glob patterns excluded from review. A malformed pattern is a fatal
    /// configuration error.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    /// Files with more changed content than this are skipped (default: 500).
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: usize,
    /// Enable the security focus (default: true).
    #[serde(default = "default_true")]
    pub enable_security: bool,
    /// Enable the performance focus (default: true).
    #[serde(default = "default_true")]
    pub enable_performance: bool,
    /// Enable the documentation focus (default: true).
    #[serde(default = "default_true")]
    pub enable_documentation: bool,
    /// Maximum chunk size in lines; unset means the level default.
    pub max_chunk_lines: Option<u32>,
    /// Unchanged context lines included on each side of a changed run
    /// (default: 3).
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
    /// Worker pool size (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-task deadline in seconds (default: 300).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Wall-clock budget for the whole run in seconds (default: 1800).
    #[serde(default = "default_run_deadline_seconds")]
    pub run_deadline_seconds: u64,
    /// Attempts per task including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Capability invocations allowed per minute, independent of pool width
    /// (default: 60).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// High-severity findings above this count downgrade the recommendation
    /// to "needs attention" (default: 3).
    #[serde(default = "default_high_findings_threshold")]
    pub high_findings_threshold: usize,
    /// Word-overlap ratio at which two same-line messages are considered
    /// duplicates (default: 0.7).
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f64,
}

fn default_max_files() -> usize {
    20
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "*.lock",
        "*.min.js",
        "*.bundle.js",
        "*.map",
        "node_modules/**",
        "vendor/**",
        "dist/**",
        "build/**",
        "target/**",
        ".git/**",
        "__pycache__/**",
        "coverage/**",
        "*.log",
        "*.tmp",
        ".env",
        ".env.*",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_size_kb() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_context_lines() -> u32 {
    3
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_run_deadline_seconds() -> u64 {
    1800
}

fn default_max_attempts() -> u32 {
    3
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_high_findings_threshold() -> usize {
    3
}

fn default_dedup_similarity() -> f64 {
    0.7
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            review_level: ReviewLevel::default(),
            max_files: default_max_files(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size_kb: default_max_file_size_kb(),
            enable_security: true,
            enable_performance: true,
            enable_documentation: true,
            max_chunk_lines: None,
            context_lines: default_context_lines(),
            concurrency: default_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            run_deadline_seconds: default_run_deadline_seconds(),
            max_attempts: default_max_attempts(),
            requests_per_minute: default_requests_per_minute(),
            high_findings_threshold: default_high_findings_threshold(),
            dedup_similarity: default_dedup_similarity(),
        }
    }
}

/// Output formatting configuration.
///
/// # Examples
///
/// ```
/// use corvid_core::OutputConfig;
///
/// let config = OutputConfig::default();
/// assert!(config.pr_summary);
/// assert_eq!(config.max_comment_length, 500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Emit line-anchored comments (default: true).
    #[serde(default = "default_true")]
    pub line_comments: bool,
    /// Emit the PR summary document (default: true).
    #[serde(default = "default_true")]
    pub pr_summary: bool,
    /// Maximum length of one comment body; longer messages are truncated at a
    /// word boundary with an explicit marker (default: 500).
    #[serde(default = "default_max_comment_length")]
    pub max_comment_length: usize,
    /// Maximum findings listed in the summary's top-issues section
    /// (default: 10).
    #[serde(default = "default_max_summary_findings")]
    pub max_summary_findings: usize,
}

fn default_max_comment_length() -> usize {
    500
}

fn default_max_summary_findings() -> usize {
    10
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            line_comments: true,
            pr_summary: true,
            max_comment_length: default_max_comment_length(),
            max_summary_findings: default_max_summary_findings(),
        }
    }
}
