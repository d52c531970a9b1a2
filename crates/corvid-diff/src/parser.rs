use std::path::PathBuf;

use corvid_core::{ChangeKind, CorvidError, DiffHunk, FileChange};

/// Parse a unified diff string (as produced by `git diff`) into ordered
/// [`FileChange`] entries.
///
/// Handles standard unified diff format including new files, deleted files,
/// renamed files, quoted paths, and binary files (which are skipped). File
/// order follows the diff.
///
/// # Errors
///
/// Returns [`CorvidError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use corvid_diff::parser::parse_unified_diff;
///
/// let changes = parse_unified_diff("").unwrap();
/// assert!(changes.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<FileChange>, CorvidError> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut current: Option<FileBuilder> = None;
    let mut current_hunk: Option<DiffHunk> = None;

    for line in input.lines() {
        if line.starts_with("diff --git ") {
            flush_hunk(&mut current, &mut current_hunk);
            if let Some(builder) = current.take() {
                if let Some(change) = builder.build() {
                    files.push(change);
                }
            }
            current = Some(FileBuilder::default());
            continue;
        }

        // Implicitly start a file if we see a header but have no current file.
        // This handles standard patches that lack the "diff --git" command line.
        if line.starts_with("--- ") && current.is_none() {
            current = Some(FileBuilder::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.is_binary = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.is_new = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.is_deleted = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("rename from ") {
            file.is_rename = true;
            file.old_path = Some(PathBuf::from(path.trim()));
            continue;
        }

        if let Some(path) = line.strip_prefix("rename to ") {
            file.is_rename = true;
            file.new_path = PathBuf::from(path.trim());
            continue;
        }

        if line.starts_with("index ") || line.starts_with("similarity index") {
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            let parsed = parse_path(path);
            if parsed != PathBuf::from("/dev/null") {
                file.old_path.get_or_insert(parsed);
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            if path == "/dev/null" {
                file.is_deleted = true;
            } else {
                file.new_path = parse_path(path);
            }
            continue;
        }

        if line.starts_with("@@ ") {
            flush_hunk(&mut current, &mut current_hunk);
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            current_hunk = Some(DiffHunk {
                old_start,
                old_lines,
                new_start,
                new_lines,
                content: String::new(),
            });
            continue;
        }

        if line == "\\ No newline at end of file" {
            continue;
        }

        if let Some(hunk) = current_hunk.as_mut() {
            if line.starts_with('+') || line.starts_with('-') || line.starts_with(' ') {
                hunk.content.push_str(line);
                hunk.content.push('\n');
            }
        }
    }

    flush_hunk(&mut current, &mut current_hunk);
    if let Some(builder) = current.take() {
        if let Some(change) = builder.build() {
            files.push(change);
        }
    }

    Ok(files)
}

#[derive(Default)]
struct FileBuilder {
    old_path: Option<PathBuf>,
    new_path: PathBuf,
    hunks: Vec<DiffHunk>,
    is_new: bool,
    is_deleted: bool,
    is_rename: bool,
    is_binary: bool,
}

impl FileBuilder {
    fn build(self) -> Option<FileChange> {
        if self.is_binary {
            return None;
        }

        let kind = if self.is_rename {
            ChangeKind::Renamed
        } else if self.is_new {
            ChangeKind::Added
        } else if self.is_deleted {
            ChangeKind::Deleted
        } else {
            ChangeKind::Modified
        };

        // Deletions have no new path; report them under the old one.
        let path = if self.new_path.as_os_str().is_empty() {
            self.old_path.clone()?
        } else {
            self.new_path
        };

        let size_bytes = self.hunks.iter().map(|h| h.content.len()).sum();
        let old_path = if kind == ChangeKind::Renamed {
            self.old_path
        } else {
            None
        };

        Some(FileChange {
            path,
            old_path,
            kind,
            hunks: self.hunks,
            size_bytes,
        })
    }
}

fn flush_hunk(current: &mut Option<FileBuilder>, hunk: &mut Option<DiffHunk>) {
    if let Some(h) = hunk.take() {
        if let Some(file) = current.as_mut() {
            file.hunks.push(h);
        }
    }
}

fn parse_path(raw: &str) -> PathBuf {
    let normalized = raw.trim_matches('"');

    if normalized == "/dev/null" {
        return PathBuf::from("/dev/null");
    }

    let stripped = normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized);

    PathBuf::from(stripped)
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), CorvidError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| CorvidError::Parse(format!("invalid hunk header: {line}")))?;

    let parts: Vec<&str> = inner.split(' ').collect();
    if parts.len() != 2 {
        return Err(CorvidError::Parse(format!("invalid hunk header: {line}")));
    }

    let old = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| CorvidError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| CorvidError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), CorvidError> {
    if let Some((start, count)) = range.split_once(',') {
        let s = start
            .parse()
            .map_err(|_| CorvidError::Parse(format!("invalid range number in: {context}")))?;
        let c = count
            .parse()
            .map_err(|_| CorvidError::Parse(format!("invalid range count in: {context}")))?;
        Ok((s, c))
    } else {
        let s = range
            .parse()
            .map_err(|_| CorvidError::Parse(format!("invalid range number in: {context}")))?;
        Ok((s, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_returns_empty_vec() {
        let files = parse_unified_diff("").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn single_file_single_hunk() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    println!(\"hello\");
     let x = 1;
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("src/main.rs"));
        assert_eq!(files[0].kind, ChangeKind::Modified);
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[0].hunks[0].old_start, 1);
        assert_eq!(files[0].hunks[0].old_lines, 3);
        assert_eq!(files[0].hunks[0].new_start, 1);
        assert_eq!(files[0].hunks[0].new_lines, 4);
        assert!(files[0].hunks[0].content.contains("+    println!"));
        assert!(files[0].size_bytes > 0);
    }

    #[test]
    fn single_file_multiple_hunks() {
        let diff = "\
diff --git a/lib.rs b/lib.rs
--- a/lib.rs
+++ b/lib.rs
@@ -1,3 +1,4 @@
 fn foo() {
+    bar();
 }
@@ -10,3 +11,4 @@
 fn baz() {
+    qux();
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].hunks[0].new_start, 1);
        assert_eq!(files[0].hunks[1].new_start, 11);
    }

    #[test]
    fn multiple_files_keep_diff_order() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 line1
+line2
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("a.rs"));
        assert_eq!(files[1].path, PathBuf::from("b.rs"));
    }

    #[test]
    fn new_file() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,3 @@
+fn hello() {
+    println!(\"new\");
+}
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, ChangeKind::Added);
        assert_eq!(files[0].path, PathBuf::from("new.rs"));
        assert!(files[0].old_path.is_none());
    }

    #[test]
    fn deleted_file_reported_under_old_path() {
        let diff = "\
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,3 +0,0 @@
-fn goodbye() {
-    println!(\"old\");
-}
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, ChangeKind::Deleted);
        assert_eq!(files[0].path, PathBuf::from("old.rs"));
    }

    #[test]
    fn renamed_file_keeps_both_paths() {
        let diff = "\
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, ChangeKind::Renamed);
        assert_eq!(files[0].path, PathBuf::from("new_name.rs"));
        assert_eq!(files[0].old_path, Some(PathBuf::from("old_name.rs")));
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn binary_files_skipped() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
diff --git a/code.rs b/code.rs
--- a/code.rs
+++ b/code.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("code.rs"));
    }

    #[test]
    fn no_newline_marker_not_captured() {
        let diff = "\
diff --git a/f.rs b/f.rs
--- a/f.rs
+++ b/f.rs
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        let content = &files[0].hunks[0].content;
        assert!(!content.contains("No newline"));
        assert!(content.contains("-old"));
        assert!(content.contains("+new"));
    }

    #[test]
    fn malformed_hunk_header_is_parse_error() {
        let diff = "\
diff --git a/f.rs b/f.rs
--- a/f.rs
+++ b/f.rs
@@ garbage @@
+line
";
        let result = parse_unified_diff(diff);
        assert!(matches!(result, Err(CorvidError::Parse(_))));
    }

    #[test]
    fn quoted_paths_are_parsed() {
        let diff = r#"--- "a/src/my file.rs"
+++ "b/src/my file.rs"
@@ -1 +1,2 @@
 old
+new
"#;
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("src/my file.rs"));
    }

    #[test]
    fn size_accumulates_across_hunks() {
        let diff = "\
diff --git a/s.rs b/s.rs
--- a/s.rs
+++ b/s.rs
@@ -1 +1,2 @@
 a
+b
@@ -5 +6,2 @@
 c
+d
";
        let files = parse_unified_diff(diff).unwrap();
        let expected: usize = files[0].hunks.iter().map(|h| h.content.len()).sum();
        assert_eq!(files[0].size_bytes, expected);
    }
}
