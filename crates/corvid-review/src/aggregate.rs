//! Merges per-(chunk, focus) outcomes into per-file reports and the final
//! review report.
//!
//! Findings are validated against the line ranges that were actually
//! analyzed, deduplicated (same line, near-identical message, higher severity
//! wins), and counted only after deduplication. A malformed finding degrades
//! to a dropped finding plus a warning, never an aborted report.

use std::collections::HashSet;
use std::path::PathBuf;

use corvid_core::{
    FileReport, Finding, FocusArea, FocusOutcome, FocusStatus, Recommendation, ReviewConfig,
    ReviewReport, Severity, SeverityCounts,
};

use crate::dispatcher::TaskOutcome;

/// Builds [`ReviewReport`]s from dispatch outcomes.
///
/// # Examples
///
/// ```
/// use corvid_core::ReviewConfig;
/// use corvid_review::aggregate::ResultAggregator;
///
/// let aggregator = ResultAggregator::new(&ReviewConfig::default());
/// let report = aggregator.aggregate(&[], &[], &[]);
/// assert_eq!(report.total_issues(), 0);
/// ```
pub struct ResultAggregator {
    high_threshold: usize,
    similarity: f64,
}

impl ResultAggregator {
    /// Create an aggregator with the configured dedup and recommendation
    /// tunables.
    pub fn new(config: &ReviewConfig) -> Self {
        Self {
            high_threshold: config.high_findings_threshold,
            similarity: config.dedup_similarity,
        }
    }

    /// Merge all outcomes into one report, preserving `file_order`.
    ///
    /// Files without outcomes (nothing was chunked) produce no report entry.
    /// Severity counts are taken over deduplicated findings only.
    pub fn aggregate(
        &self,
        file_order: &[PathBuf],
        outcomes: &[TaskOutcome],
        focuses: &[FocusArea],
    ) -> ReviewReport {
        let mut files = Vec::new();
        let mut counts = SeverityCounts::default();

        for path in file_order {
            let file_outcomes: Vec<&TaskOutcome> = outcomes
                .iter()
                .filter(|o| o.chunk.file_path == *path)
                .collect();
            if file_outcomes.is_empty() {
                continue;
            }

            let report = self.file_report(path, &file_outcomes, focuses);
            for finding in &report.findings {
                counts.record(finding.severity);
            }
            files.push(report);
        }

        let recommendation = self.recommend(&counts);
        ReviewReport {
            files,
            counts,
            recommendation,
        }
    }

    fn file_report(
        &self,
        path: &PathBuf,
        outcomes: &[&TaskOutcome],
        focuses: &[FocusArea],
    ) -> FileReport {
        // Line ranges that produced findings. A finding anchored outside
        // every analyzed range is malformed and dropped.
        let analyzed: Vec<(u32, u32)> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| (o.chunk.start_line, o.chunk.end_line))
            .collect();

        let mut findings: Vec<Finding> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flat_map(|fs| fs.iter().cloned())
            .collect();

        let before = findings.len();
        findings.retain(|f| match f.line {
            None => true,
            Some(line) => analyzed.iter().any(|(s, e)| line >= *s && line <= *e),
        });
        if findings.len() < before {
            eprintln!(
                "warning: dropped {} finding(s) outside analyzed ranges for {}",
                before - findings.len(),
                path.display()
            );
        }

        let findings = self.dedupe(findings);

        let focus_outcomes = focuses
            .iter()
            .map(|focus| {
                let mut ok = 0usize;
                let mut failed = 0usize;
                for o in outcomes.iter().filter(|o| o.focus == *focus) {
                    if o.result.is_ok() {
                        ok += 1;
                    } else {
                        failed += 1;
                    }
                }
                let status = if failed == 0 && ok > 0 {
                    FocusStatus::Ok
                } else if ok > 0 {
                    FocusStatus::Partial
                } else {
                    FocusStatus::Failed
                };
                FocusOutcome {
                    focus: *focus,
                    status,
                }
            })
            .collect();

        FileReport {
            path: path.clone(),
            findings,
            focus_outcomes,
        }
    }

    /// Deduplicate findings that share a line (or are both summary-level)
    /// and carry near-identical messages, keeping the higher severity.
    ///
    /// Sorting most-severe-first before merging makes the pass idempotent:
    /// the survivor of a duplicate group is fixed on the first pass.
    pub fn dedupe(&self, mut findings: Vec<Finding>) -> Vec<Finding> {
        findings.sort_by_key(|f| (severity_rank(f.severity), f.line.unwrap_or(u32::MAX)));

        let mut kept: Vec<Finding> = Vec::new();
        'next: for finding in findings {
            for existing in &kept {
                if existing.line == finding.line
                    && similar_messages(&existing.message, &finding.message, self.similarity)
                {
                    continue 'next;
                }
            }
            kept.push(finding);
        }
        kept
    }

    fn recommend(&self, counts: &SeverityCounts) -> Recommendation {
        if counts.critical > 0 {
            Recommendation::RequestChanges
        } else if counts.high > self.high_threshold {
            Recommendation::NeedsAttention
        } else if counts.total() > 0 {
            Recommendation::ApproveWithSuggestions
        } else {
            Recommendation::LooksGood
        }
    }
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
    }
}

/// Case-insensitive containment, or word-set Dice coefficient at or above
/// `threshold`.
fn similar_messages(a: &str, b: &str, threshold: f64) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    if a.contains(&b) || b.contains(&a) {
        return true;
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    let shared = words_a.intersection(&words_b).count();
    let dice = (2 * shared) as f64 / (words_a.len() + words_b.len()) as f64;
    dice >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TaskFailure;
    use corvid_core::CodeChunk;
    use std::sync::Arc;

    fn chunk(path: &str, index: usize, start: u32, end: u32) -> Arc<CodeChunk> {
        Arc::new(CodeChunk {
            file_path: PathBuf::from(path),
            start_line: start,
            end_line: end,
            content: String::new(),
            index,
        })
    }

    fn finding(path: &str, line: Option<u32>, severity: Severity, message: &str) -> Finding {
        Finding {
            file_path: PathBuf::from(path),
            line,
            severity,
            focus: FocusArea::Quality,
            message: message.into(),
            suggestion: None,
        }
    }

    fn ok_outcome(chunk: Arc<CodeChunk>, focus: FocusArea, findings: Vec<Finding>) -> TaskOutcome {
        TaskOutcome {
            chunk,
            focus,
            attempts: 1,
            result: Ok(findings),
        }
    }

    fn failed_outcome(chunk: Arc<CodeChunk>, focus: FocusArea) -> TaskOutcome {
        TaskOutcome {
            chunk,
            focus,
            attempts: 3,
            result: Err(TaskFailure::RetriesExhausted("timeout".into())),
        }
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(&ReviewConfig::default())
    }

    #[test]
    fn same_line_similar_messages_keep_higher_severity() {
        let c = chunk("a.rs", 0, 1, 50);
        let outcomes = vec![ok_outcome(
            Arc::clone(&c),
            FocusArea::Quality,
            vec![
                finding("a.rs", Some(10), Severity::Medium, "missing null check"),
                finding("a.rs", Some(10), Severity::High, "missing null check for input"),
            ],
        )];

        let report = aggregator().aggregate(
            &[PathBuf::from("a.rs")],
            &outcomes,
            &[FocusArea::Quality],
        );

        assert_eq!(report.files[0].findings.len(), 1);
        assert_eq!(report.files[0].findings[0].severity, Severity::High);
        assert_eq!(report.counts.high, 1);
        assert_eq!(report.counts.medium, 0);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let agg = aggregator();
        let findings = vec![
            finding("a.rs", Some(5), Severity::Low, "unused variable x"),
            finding("a.rs", Some(5), Severity::Medium, "unused variable x is never read"),
            finding("a.rs", Some(9), Severity::High, "possible panic on empty vec"),
            finding("a.rs", None, Severity::Low, "file lacks module docs"),
            finding("a.rs", None, Severity::Low, "file lacks module docs"),
        ];

        let once = agg.dedupe(findings);
        let twice = agg.dedupe(once.clone());

        assert_eq!(once.len(), 3);
        let key = |fs: &[Finding]| -> Vec<(Option<u32>, String)> {
            fs.iter().map(|f| (f.line, f.message.clone())).collect()
        };
        assert_eq!(key(&once), key(&twice));
    }

    #[test]
    fn different_lines_are_not_deduplicated() {
        let agg = aggregator();
        let findings = vec![
            finding("a.rs", Some(5), Severity::Low, "missing null check"),
            finding("a.rs", Some(6), Severity::Low, "missing null check"),
        ];
        assert_eq!(agg.dedupe(findings).len(), 2);
    }

    #[test]
    fn findings_outside_analyzed_ranges_dropped() {
        let c = chunk("a.rs", 0, 10, 20);
        let outcomes = vec![ok_outcome(
            c,
            FocusArea::Quality,
            vec![
                finding("a.rs", Some(15), Severity::Medium, "in range"),
                finding("a.rs", Some(99), Severity::Critical, "hallucinated line"),
                finding("a.rs", None, Severity::Low, "summary level"),
            ],
        )];

        let report = aggregator().aggregate(
            &[PathBuf::from("a.rs")],
            &outcomes,
            &[FocusArea::Quality],
        );

        let lines: Vec<Option<u32>> = report.files[0].findings.iter().map(|f| f.line).collect();
        assert!(lines.contains(&Some(15)));
        assert!(lines.contains(&None));
        assert!(!lines.contains(&Some(99)));
        // The dropped critical must not leak into the histogram.
        assert_eq!(report.counts.critical, 0);
    }

    #[test]
    fn focus_status_reflects_task_results() {
        let c0 = chunk("a.rs", 0, 1, 10);
        let c1 = chunk("a.rs", 1, 20, 30);
        let outcomes = vec![
            ok_outcome(Arc::clone(&c0), FocusArea::Security, vec![]),
            ok_outcome(Arc::clone(&c1), FocusArea::Security, vec![]),
            ok_outcome(Arc::clone(&c0), FocusArea::Quality, vec![]),
            failed_outcome(Arc::clone(&c1), FocusArea::Quality),
            failed_outcome(c0, FocusArea::Performance),
            failed_outcome(c1, FocusArea::Performance),
        ];

        let report = aggregator().aggregate(
            &[PathBuf::from("a.rs")],
            &outcomes,
            &[FocusArea::Security, FocusArea::Performance, FocusArea::Quality],
        );

        let statuses: Vec<(FocusArea, FocusStatus)> = report.files[0]
            .focus_outcomes
            .iter()
            .map(|o| (o.focus, o.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (FocusArea::Security, FocusStatus::Ok),
                (FocusArea::Performance, FocusStatus::Failed),
                (FocusArea::Quality, FocusStatus::Partial),
            ]
        );
        assert!(report.files[0].has_reduced_coverage());
    }

    #[test]
    fn recommendation_rules() {
        let agg = aggregator();

        let mut counts = SeverityCounts::default();
        assert_eq!(agg.recommend(&counts), Recommendation::LooksGood);

        counts.low = 2;
        assert_eq!(agg.recommend(&counts), Recommendation::ApproveWithSuggestions);

        counts.high = 4; // above the default threshold of 3
        assert_eq!(agg.recommend(&counts), Recommendation::NeedsAttention);

        counts.critical = 1;
        assert_eq!(agg.recommend(&counts), Recommendation::RequestChanges);
    }

    #[test]
    fn high_threshold_is_configurable() {
        let config = ReviewConfig {
            high_findings_threshold: 0,
            ..ReviewConfig::default()
        };
        let agg = ResultAggregator::new(&config);
        let counts = SeverityCounts {
            high: 1,
            ..SeverityCounts::default()
        };
        assert_eq!(agg.recommend(&counts), Recommendation::NeedsAttention);
    }

    #[test]
    fn files_keep_diff_order_and_unchunked_files_are_absent() {
        let outcomes = vec![
            ok_outcome(chunk("b.rs", 0, 1, 5), FocusArea::Quality, vec![]),
            ok_outcome(chunk("a.rs", 0, 1, 5), FocusArea::Quality, vec![]),
        ];

        let order = [
            PathBuf::from("a.rs"),
            PathBuf::from("renamed-only.rs"),
            PathBuf::from("b.rs"),
        ];
        let report = aggregator().aggregate(&order, &outcomes, &[FocusArea::Quality]);

        let paths: Vec<&PathBuf> = report.files.iter().map(|f| &f.path).collect();
        assert_eq!(paths, vec![&PathBuf::from("a.rs"), &PathBuf::from("b.rs")]);
    }

    #[test]
    fn findings_sorted_most_severe_first() {
        let c = chunk("a.rs", 0, 1, 100);
        let outcomes = vec![ok_outcome(
            c,
            FocusArea::Quality,
            vec![
                finding("a.rs", Some(50), Severity::Low, "nit"),
                finding("a.rs", Some(10), Severity::Critical, "boom"),
                finding("a.rs", Some(30), Severity::Medium, "hmm"),
            ],
        )];

        let report = aggregator().aggregate(
            &[PathBuf::from("a.rs")],
            &outcomes,
            &[FocusArea::Quality],
        );

        let severities: Vec<Severity> =
            report.files[0].findings.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn word_overlap_similarity_catches_reordered_messages() {
        assert!(similar_messages(
            "query built with string concatenation risks sql injection",
            "sql injection risk: query built with string concatenation",
            0.7,
        ));
        assert!(!similar_messages(
            "missing null check",
            "integer overflow in loop counter",
            0.7,
        ));
    }
}
