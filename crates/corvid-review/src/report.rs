//! Renders an aggregated review into a PR summary and line comments.
//!
//! Findings without a line number are folded into the summary only. Long
//! messages are truncated at a word boundary with an explicit marker, never
//! silently cut mid-word.

use std::path::PathBuf;

use corvid_core::{CorvidConfig, Finding, FocusStatus, ReviewReport, Severity};

/// A comment bound to an exact file path and line.
#[derive(Debug, Clone)]
pub struct LineComment {
    /// Target file path, taken directly from the source finding.
    pub path: PathBuf,
    /// Target line in the new version of the file.
    pub line: u32,
    /// Rendered comment body.
    pub body: String,
}

/// Renders [`ReviewReport`]s under the configured output limits.
///
/// # Examples
///
/// ```
/// use corvid_core::{CorvidConfig, Recommendation, ReviewReport, SeverityCounts};
/// use corvid_review::report::ReportFormatter;
///
/// let formatter = ReportFormatter::new(&CorvidConfig::default());
/// let report = ReviewReport {
///     files: vec![],
///     counts: SeverityCounts::default(),
///     recommendation: Recommendation::LooksGood,
/// };
/// let summary = formatter.summary(&report).unwrap();
/// assert!(summary.contains("Looks good"));
/// ```
pub struct ReportFormatter {
    line_comments: bool,
    pr_summary: bool,
    max_comment_length: usize,
    max_summary_findings: usize,
}

impl ReportFormatter {
    /// Create a formatter from the effective configuration.
    pub fn new(config: &CorvidConfig) -> Self {
        Self {
            line_comments: config.line_comments_enabled(),
            pr_summary: config.output.pr_summary,
            max_comment_length: config.output.max_comment_length,
            max_summary_findings: config.output.max_summary_findings,
        }
    }

    /// Render the PR summary document, or `None` when summaries are off.
    pub fn summary(&self, report: &ReviewReport) -> Option<String> {
        if !self.pr_summary {
            return None;
        }

        let mut out = String::new();
        out.push_str("## Corvid review\n\n");
        out.push_str(&format!("**Recommendation:** {}\n\n", report.recommendation));

        out.push_str("| Severity | Count |\n|---|---|\n");
        out.push_str(&format!("| Critical | {} |\n", report.counts.critical));
        out.push_str(&format!("| High | {} |\n", report.counts.high));
        out.push_str(&format!("| Medium | {} |\n", report.counts.medium));
        out.push_str(&format!("| Low | {} |\n\n", report.counts.low));

        let total = report.total_issues();
        if total == 0 {
            out.push_str("No issues found.\n");
        } else {
            out.push_str("### Top findings\n\n");
            for finding in report.all_findings().take(self.max_summary_findings) {
                let location = match finding.line {
                    Some(line) => format!("`{}:{line}`", finding.file_path.display()),
                    None => format!("`{}`", finding.file_path.display()),
                };
                out.push_str(&format!(
                    "- {} **{}** ({}) {location} — {}\n",
                    severity_emoji(finding.severity),
                    finding.severity,
                    finding.focus,
                    truncate_message(&finding.message, self.max_comment_length),
                ));
            }
            if total > self.max_summary_findings {
                out.push_str(&format!(
                    "\n… and {} more finding(s).\n",
                    total - self.max_summary_findings
                ));
            }
        }

        let degraded: Vec<String> = report
            .files
            .iter()
            .filter(|f| f.has_reduced_coverage())
            .map(|f| {
                let parts: Vec<String> = f
                    .focus_outcomes
                    .iter()
                    .filter(|o| o.status != FocusStatus::Ok)
                    .map(|o| format!("{}: {}", o.focus, o.status))
                    .collect();
                format!("- `{}` — {}", f.path.display(), parts.join(", "))
            })
            .collect();
        if !degraded.is_empty() {
            out.push_str("\n### Reduced coverage\n\n");
            out.push_str(
                "Some analyses did not complete; findings for these files may be incomplete.\n\n",
            );
            for line in degraded {
                out.push_str(&line);
                out.push('\n');
            }
        }

        Some(out)
    }

    /// Render one line comment per line-anchored finding.
    ///
    /// Summary-level findings (no line) never become line comments.
    pub fn line_comments(&self, report: &ReviewReport) -> Vec<LineComment> {
        if !self.line_comments {
            return Vec::new();
        }

        report
            .all_findings()
            .filter_map(|finding| {
                let line = finding.line?;
                Some(LineComment {
                    path: finding.file_path.clone(),
                    line,
                    body: self.comment_body(finding),
                })
            })
            .collect()
    }

    fn comment_body(&self, finding: &Finding) -> String {
        let mut body = format!(
            "{} **{}** ({})\n\n{}",
            severity_emoji(finding.severity),
            finding.severity,
            finding.focus,
            truncate_message(&finding.message, self.max_comment_length),
        );
        if let Some(suggestion) = &finding.suggestion {
            body.push_str(&format!(
                "\n\n**Suggestion:** {}",
                truncate_message(suggestion, self.max_comment_length)
            ));
        }
        body
    }

    /// Machine-readable run outputs for exit-code and gating decisions.
    pub fn machine_outputs(&self, report: &ReviewReport) -> Vec<(String, String)> {
        vec![
            ("total_issues".into(), report.total_issues().to_string()),
            ("critical_count".into(), report.counts.critical.to_string()),
            ("high_count".into(), report.counts.high.to_string()),
            ("medium_count".into(), report.counts.medium.to_string()),
            ("low_count".into(), report.counts.low.to_string()),
            ("files_reviewed".into(), report.files.len().to_string()),
            (
                "recommendation".into(),
                report.recommendation.slug().to_string(),
            ),
        ]
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "\u{1f6a8}",
        Severity::High => "\u{1f41b}",
        Severity::Medium => "\u{26a0}\u{fe0f}",
        Severity::Low => "\u{1f4a1}",
    }
}

const TRUNCATION_MARKER: &str = "… [truncated]";

/// Cut `text` to at most `max` bytes at a word boundary and append an
/// explicit marker.
fn truncate_message(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut cut = 0;
    for (idx, ch) in text.char_indices() {
        if idx > max {
            break;
        }
        if ch.is_whitespace() {
            cut = idx;
        }
    }
    if cut == 0 {
        // One giant word: fall back to the last char boundary within the cap.
        cut = text
            .char_indices()
            .take_while(|(idx, _)| *idx <= max)
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(0);
    }

    format!("{}{TRUNCATION_MARKER}", text[..cut].trim_end())
}
