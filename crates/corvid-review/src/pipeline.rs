use std::fmt;
use std::sync::Arc;

use corvid_core::{CorvidConfig, CorvidError, ReviewReport, Severity};
use indicatif::ProgressBar;
use serde::Serialize;

use corvid_diff::chunker::chunk_file;
use corvid_diff::filter::FileFilter;
use corvid_diff::parser::parse_unified_diff;

use crate::aggregate::ResultAggregator;
use crate::analyst::Analyst;
use crate::dispatcher::{AgentDispatcher, DispatchConfig};

/// Statistics about one review run.
///
/// # Examples
///
/// ```
/// use corvid_review::pipeline::RunStats;
///
/// let stats = RunStats {
///     files_changed: 5,
///     files_reviewed: 3,
///     files_skipped: 2,
///     chunks: 7,
///     tasks: 21,
///     failed_tasks: 1,
///     model: "gpt-4o".into(),
///     timestamp: chrono::Utc::now(),
/// };
/// assert_eq!(stats.files_changed, stats.files_reviewed + stats.files_skipped);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Files present in the diff.
    pub files_changed: usize,
    /// Files that passed the filter.
    pub files_reviewed: usize,
    /// Files skipped by the filter.
    pub files_skipped: usize,
    /// Chunks produced across all reviewed files.
    pub chunks: usize,
    /// Dispatched (chunk, focus) tasks.
    pub tasks: usize,
    /// Tasks that ended in terminal failure.
    pub failed_tasks: usize,
    /// Model identifier used for the run.
    pub model: String,
    /// When the run completed.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Result of a completed review run: the report plus run statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    /// The aggregated review report.
    pub report: ReviewReport,
    /// Statistics about the run.
    pub stats: RunStats,
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Review Results")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Model: {} | Files: {} reviewed, {} skipped | Chunks: {} | Tasks: {} ({} failed)\n",
            self.stats.model,
            self.stats.files_reviewed,
            self.stats.files_skipped,
            self.stats.chunks,
            self.stats.tasks,
            self.stats.failed_tasks,
        )?;
        writeln!(f, "Recommendation: {}\n", self.report.recommendation)?;

        if self.report.total_issues() == 0 {
            writeln!(f, "No issues found.")?;
        } else {
            for finding in self.report.all_findings() {
                let label = match finding.severity {
                    Severity::Critical => "CRITICAL",
                    Severity::High => "HIGH",
                    Severity::Medium => "MEDIUM",
                    Severity::Low => "LOW",
                };
                match finding.line {
                    Some(line) => writeln!(
                        f,
                        "[{label}] {}:{line} ({})",
                        finding.file_path.display(),
                        finding.focus,
                    )?,
                    None => writeln!(
                        f,
                        "[{label}] {} ({})",
                        finding.file_path.display(),
                        finding.focus,
                    )?,
                }
                writeln!(f, "  {}", finding.message)?;
                if let Some(s) = &finding.suggestion {
                    writeln!(f, "  Suggestion: {s}")?;
                }
                writeln!(f)?;
            }
        }

        let degraded: Vec<&corvid_core::FileReport> = self
            .report
            .files
            .iter()
            .filter(|file| file.has_reduced_coverage())
            .collect();
        if !degraded.is_empty() {
            writeln!(f, "Reduced coverage:")?;
            for file in degraded {
                for outcome in &file.focus_outcomes {
                    if outcome.status != corvid_core::FocusStatus::Ok {
                        writeln!(
                            f,
                            "  {} — {}: {}",
                            file.path.display(),
                            outcome.focus,
                            outcome.status,
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Orchestrates the full pipeline: parse, filter, chunk, dispatch, aggregate.
///
/// Always produces a report once dispatch has started; only configuration
/// errors abort the run.
pub struct ReviewPipeline {
    analyst: Arc<dyn Analyst>,
    config: CorvidConfig,
    progress: Option<ProgressBar>,
}

impl ReviewPipeline {
    /// Create a pipeline over the given analysis capability.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Config`] if the configuration fails validation.
    pub fn new(analyst: Arc<dyn Analyst>, config: CorvidConfig) -> Result<Self, CorvidError> {
        config.validate()?;
        Ok(Self {
            analyst,
            config,
            progress: None,
        })
    }

    /// Attach a progress bar, ticked per completed analysis task.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run a review over a unified diff and return the aggregated outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Parse`] for a malformed diff and
    /// [`CorvidError::Config`] for a malformed exclude pattern. Task-level
    /// failures never abort the run; they surface as reduced coverage in the
    /// report.
    pub async fn review_diff(&self, diff: &str) -> Result<ReviewOutcome, CorvidError> {
        let changes = parse_unified_diff(diff)?;
        let files_changed = changes.len();

        let filter = FileFilter::new(&self.config.review)?;
        let filtered = filter.filter(changes);
        for skip in &filtered.skipped {
            eprintln!("skipping {}: {}", skip.path.display(), skip.reason);
        }

        let focuses = self.config.enabled_focuses();
        let max_lines = self.config.chunk_lines();
        let context = self.config.review.context_lines;

        let mut file_order = Vec::with_capacity(filtered.kept.len());
        let mut chunks = Vec::new();
        for change in &filtered.kept {
            file_order.push(change.path.clone());
            chunks.extend(chunk_file(change, max_lines, context));
        }
        let chunk_count = chunks.len();
        let task_count = chunk_count * focuses.len();

        let mut dispatcher = AgentDispatcher::new(
            Arc::clone(&self.analyst),
            DispatchConfig::from_review(&self.config.review),
        );
        if let Some(pb) = &self.progress {
            dispatcher = dispatcher.with_progress(pb.clone());
        }

        let outcomes = dispatcher.dispatch(chunks, &focuses).await;
        let failed_tasks = outcomes.iter().filter(|o| o.result.is_err()).count();

        let aggregator = ResultAggregator::new(&self.config.review);
        let report = aggregator.aggregate(&file_order, &outcomes, &focuses);

        Ok(ReviewOutcome {
            report,
            stats: RunStats {
                files_changed,
                files_reviewed: filtered.kept.len(),
                files_skipped: filtered.skipped.len(),
                chunks: chunk_count,
                tasks: task_count,
                failed_tasks,
                model: self.analyst.model().to_string(),
                timestamp: chrono::Utc::now(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::AnalysisError;
    use async_trait::async_trait;
    use corvid_core::{CodeChunk, Finding, FocusArea};
    use std::path::PathBuf;

    struct OkStub;

    #[async_trait]
    impl Analyst for OkStub {
        async fn analyze(
            &self,
            chunk: &CodeChunk,
            focus: FocusArea,
        ) -> Result<Vec<Finding>, AnalysisError> {
            Ok(vec![Finding {
                file_path: chunk.file_path.clone(),
                line: Some(chunk.start_line),
                severity: Severity::Medium,
                focus,
                message: format!("finding in chunk {}", chunk.index),
                suggestion: None,
            }])
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    const DIFF: &str = "\
diff --git a/src/a.rs b/src/a.rs
--- a/src/a.rs
+++ b/src/a.rs
@@ -1,3 +1,4 @@
 fn a() {
+    step();
 }
 // end
diff --git a/Cargo.lock b/Cargo.lock
--- a/Cargo.lock
+++ b/Cargo.lock
@@ -1 +1,2 @@
 [package]
+version = \"2\"
diff --git a/src/b.rs b/src/b.rs
--- a/src/b.rs
+++ b/src/b.rs
@@ -10,3 +10,4 @@
 fn b() {
+    other();
 }
 // end
";

    fn config() -> CorvidConfig {
        let mut config = CorvidConfig::default();
        config.review.concurrency = 2;
        config.review.requests_per_minute = 60_000;
        config
    }

    #[tokio::test]
    async fn end_to_end_review_over_stub() {
        let pipeline = ReviewPipeline::new(Arc::new(OkStub), config()).unwrap();
        let outcome = pipeline.review_diff(DIFF).await.unwrap();

        assert_eq!(outcome.stats.files_changed, 3);
        assert_eq!(outcome.stats.files_reviewed, 2);
        assert_eq!(outcome.stats.files_skipped, 1);
        assert_eq!(outcome.stats.chunks, 2);
        assert_eq!(outcome.stats.failed_tasks, 0);
        assert_eq!(outcome.stats.model, "stub-model");

        // Files keep diff order, lock file filtered out.
        let paths: Vec<&PathBuf> = outcome.report.files.iter().map(|f| &f.path).collect();
        assert_eq!(paths, vec![&PathBuf::from("src/a.rs"), &PathBuf::from("src/b.rs")]);

        // One deduplicated finding per (chunk, focus); counts match.
        assert_eq!(
            outcome.report.total_issues(),
            outcome.report.all_findings().count()
        );
        assert!(outcome.report.total_issues() > 0);
    }

    #[tokio::test]
    async fn bad_exclude_pattern_aborts_before_dispatch() {
        let mut config = config();
        config.review.exclude_patterns = vec!["broken[".into()];
        let pipeline = ReviewPipeline::new(Arc::new(OkStub), config).unwrap();
        let result = pipeline.review_diff(DIFF).await;
        assert!(matches!(result, Err(CorvidError::Config(_))));
    }

    #[tokio::test]
    async fn invalid_numeric_bound_rejected_at_construction() {
        let mut config = config();
        config.review.concurrency = 0;
        let result = ReviewPipeline::new(Arc::new(OkStub), config);
        assert!(matches!(result, Err(CorvidError::Config(_))));
    }

    #[tokio::test]
    async fn empty_diff_produces_empty_report() {
        let pipeline = ReviewPipeline::new(Arc::new(OkStub), config()).unwrap();
        let outcome = pipeline.review_diff("").await.unwrap();
        assert_eq!(outcome.report.total_issues(), 0);
        assert!(outcome.report.files.is_empty());
        assert_eq!(
            outcome.report.recommendation,
            corvid_core::Recommendation::LooksGood
        );
    }

    #[tokio::test]
    async fn display_renders_findings_and_stats() {
        let pipeline = ReviewPipeline::new(Arc::new(OkStub), config()).unwrap();
        let outcome = pipeline.review_diff(DIFF).await.unwrap();
        let text = format!("{outcome}");
        assert!(text.contains("Review Results"));
        assert!(text.contains("stub-model"));
        assert!(text.contains("[MEDIUM]"));
        assert!(text.contains("Recommendation:"));
    }
}
