//! Splits a file's changed regions into bounded analysis chunks.
//!
//! Walks the file's hunks in order, collects runs of changed lines plus a
//! fixed context window of unchanged lines on each side, merges runs whose
//! windows touch, and closes a chunk whenever the accumulated size would
//! exceed the maximum. The resulting chunk ranges are contiguous,
//! non-overlapping, and together cover every changed line.

use corvid_core::{CodeChunk, DiffHunk, FileChange};

/// One new-file line carried by a hunk.
#[derive(Debug, Clone)]
struct HunkLine {
    /// 1-based line number in the new file.
    number: u32,
    /// Line text with the diff marker stripped.
    text: String,
    /// Whether the line was added by the diff.
    changed: bool,
}

/// A contiguous slice of hunk lines selected for analysis.
#[derive(Debug, Clone)]
struct Region {
    lines: Vec<HunkLine>,
}

/// Lazy, finite, restartable chunk sequence for one [`FileChange`].
///
/// Recreate (or clone) the chunker to restart the sequence from the top.
///
/// # Examples
///
/// ```
/// use corvid_core::{ChangeKind, DiffHunk, FileChange};
/// use corvid_diff::chunker::Chunker;
///
/// let change = FileChange {
///     path: "src/lib.rs".into(),
///     old_path: None,
///     kind: ChangeKind::Modified,
///     hunks: vec![DiffHunk {
///         old_start: 1,
///         old_lines: 3,
///         new_start: 1,
///         new_lines: 3,
///         content: " fn main() {\n+    run();\n }\n".into(),
///     }],
///     size_bytes: 0,
/// };
/// let chunks: Vec<_> = Chunker::new(&change, 100, 3).collect();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].start_line, 1);
/// assert_eq!(chunks[0].end_line, 3);
/// ```
#[derive(Clone)]
pub struct Chunker {
    file_path: std::path::PathBuf,
    regions: Vec<Region>,
    max_lines: usize,
    region_idx: usize,
    offset: usize,
    next_index: usize,
}

impl Chunker {
    /// Build a chunker over `change` with the given chunk size cap and
    /// context window.
    ///
    /// `max_lines` is clamped to at least 1. A file with zero changed lines
    /// (pure rename or permission change) yields no chunks.
    pub fn new(change: &FileChange, max_lines: u32, context_lines: u32) -> Self {
        let regions = change
            .hunks
            .iter()
            .flat_map(|hunk| hunk_regions(hunk, context_lines as usize))
            .collect();

        Self {
            file_path: change.path.clone(),
            regions,
            max_lines: max_lines.max(1) as usize,
            region_idx: 0,
            offset: 0,
            next_index: 0,
        }
    }
}

impl Iterator for Chunker {
    type Item = CodeChunk;

    fn next(&mut self) -> Option<CodeChunk> {
        let region = loop {
            let region = self.regions.get(self.region_idx)?;
            if self.offset < region.lines.len() {
                break region;
            }
            self.region_idx += 1;
            self.offset = 0;
        };

        // A run larger than the cap is force-split at the size boundary,
        // never dropped.
        let end = (self.offset + self.max_lines).min(region.lines.len());
        let slice = &region.lines[self.offset..end];
        self.offset = end;

        let mut content = String::new();
        for line in slice {
            content.push_str(&line.text);
            content.push('\n');
        }

        let chunk = CodeChunk {
            file_path: self.file_path.clone(),
            start_line: slice[0].number,
            end_line: slice[slice.len() - 1].number,
            content,
            index: self.next_index,
        };
        self.next_index += 1;
        Some(chunk)
    }
}

/// Collect all chunks for one file.
///
/// # Examples
///
/// ```
/// use corvid_core::{ChangeKind, FileChange};
/// use corvid_diff::chunker::chunk_file;
///
/// let rename_only = FileChange {
///     path: "renamed.rs".into(),
///     old_path: Some("original.rs".into()),
///     kind: ChangeKind::Renamed,
///     hunks: vec![],
///     size_bytes: 0,
/// };
/// assert!(chunk_file(&rename_only, 100, 3).is_empty());
/// ```
pub fn chunk_file(change: &FileChange, max_lines: u32, context_lines: u32) -> Vec<CodeChunk> {
    Chunker::new(change, max_lines, context_lines).collect()
}

/// Extract the changed-run regions of one hunk, each expanded by the context
/// window and merged where the expansions overlap or touch.
fn hunk_regions(hunk: &DiffHunk, context: usize) -> Vec<Region> {
    let lines = new_file_lines(hunk);
    if lines.is_empty() {
        return Vec::new();
    }

    // Indices into `lines` of changed-run boundaries, expanded by context.
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        if line.changed {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            spans.push(expand(start, i - 1, context, lines.len()));
        }
    }
    if let Some(start) = run_start {
        spans.push(expand(start, lines.len() - 1, context, lines.len()));
    }

    // Merge touching or overlapping spans so chunks never overlap.
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.0 <= last.1 + 1 => last.1 = last.1.max(span.1),
            _ => merged.push(span),
        }
    }

    merged
        .into_iter()
        .map(|(start, end)| Region {
            lines: lines[start..=end].to_vec(),
        })
        .collect()
}

fn expand(start: usize, end: usize, context: usize, len: usize) -> (usize, usize) {
    let lo = start.saturating_sub(context);
    let hi = (end + context).min(len - 1);
    (lo, hi)
}

/// Project a hunk's marker-prefixed content onto new-file lines. Removed
/// lines do not exist in the new file and are dropped.
fn new_file_lines(hunk: &DiffHunk) -> Vec<HunkLine> {
    let mut lines = Vec::new();
    let mut number = hunk.new_start;

    for raw in hunk.content.lines() {
        let mut chars = raw.chars();
        if let Some(marker @ ('+' | ' ')) = chars.next() {
            lines.push(HunkLine {
                number,
                text: chars.as_str().to_string(),
                changed: marker == '+',
            });
            number += 1;
        }
    }

    lines
}
