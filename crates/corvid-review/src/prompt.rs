use corvid_core::{CodeChunk, Finding, FocusArea, Severity};
use serde::Deserialize;

const RESPONSE_CONTRACT: &str = "\
Respond with a JSON object:
{
  \"findings\": [
    {
      \"line\": 42,
      \"severity\": \"critical\" | \"high\" | \"medium\" | \"low\",
      \"message\": \"Clear explanation of the issue\",
      \"suggestion\": \"Optional fix suggestion\"
    }
  ]
}

Use the absolute line numbers shown in the code block. Use null for \"line\"
when an issue applies to the whole excerpt rather than one line.
If you find no issues, return: { \"findings\": [] }";

/// Build the system prompt for one focus area.
///
/// Each focus differs only in the review lens; the response contract is
/// shared.
///
/// # Examples
///
/// ```
/// use corvid_core::FocusArea;
/// use corvid_review::prompt::system_prompt;
///
/// let prompt = system_prompt(FocusArea::Security);
/// assert!(prompt.contains("vulnerabilities"));
/// assert!(prompt.contains("findings"));
/// ```
pub fn system_prompt(focus: FocusArea) -> String {
    let lens = match focus {
        FocusArea::Security => {
            "You are a security analyst reviewing a code change. Look only for: \
             injection vulnerabilities, unsafe handling of untrusted input, \
             authentication and authorization gaps, hardcoded secrets or credentials, \
             insecure cryptography, and path traversal. \
             Do not comment on style or general quality."
        }
        FocusArea::Performance => {
            "You are a performance analyst reviewing a code change. Look only for: \
             avoidable algorithmic cost, redundant allocations or copies, \
             unbounded growth of collections, blocking calls on hot or async paths, \
             and N+1 query patterns. \
             Do not comment on style or general quality."
        }
        FocusArea::Quality => {
            "You are an expert code reviewer. Look for genuine bugs: logic errors, \
             off-by-one mistakes, unhandled error paths, race conditions, resource \
             leaks, and broken invariants. Mention maintainability only when it \
             hides a likely defect."
        }
        FocusArea::Documentation => {
            "You are a documentation reviewer. Look for: public APIs missing doc \
             comments, comments contradicting the code they describe, and misleading \
             names. Only flag omissions on code that is newly added or changed."
        }
    };

    format!(
        "{lens}\n\n\
         Rules:\n\
         - Only report issues you are certain about\n\
         - Reference line numbers from the excerpt\n\
         - Do not speculate about code you cannot see\n\
         - If unsure, do not report\n\n\
         {RESPONSE_CONTRACT}"
    )
}

/// Build the user prompt for one chunk.
///
/// Frames the excerpt with its exact new-file line range so the capability
/// can anchor findings to absolute positions.
///
/// # Examples
///
/// ```
/// use corvid_core::CodeChunk;
/// use corvid_review::prompt::chunk_prompt;
///
/// let chunk = CodeChunk {
///     file_path: "src/auth.rs".into(),
///     start_line: 10,
///     end_line: 12,
///     content: "let x = 1;\n".into(),
///     index: 0,
/// };
/// let prompt = chunk_prompt(&chunk);
/// assert!(prompt.contains("lines 10-12"));
/// assert!(prompt.contains("rust"));
/// ```
pub fn chunk_prompt(chunk: &CodeChunk) -> String {
    let language = language_hint(chunk);
    let mut numbered = String::new();
    for (offset, line) in chunk.content.lines().enumerate() {
        numbered.push_str(&format!("{:>5} | {line}\n", chunk.start_line + offset as u32));
    }

    format!(
        "Review this changed excerpt from `{}` (lines {}-{}):\n\n```{language}\n{numbered}```\n",
        chunk.file_path.display(),
        chunk.start_line,
        chunk.end_line,
    )
}

/// Best-effort language hint from the file extension, for prompt framing.
fn language_hint(chunk: &CodeChunk) -> &'static str {
    match chunk
        .file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
    {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "kt" => "kotlin",
        "swift" => "swift",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        _ => "",
    }
}

#[derive(Deserialize)]
struct CapabilityResponse {
    findings: Vec<RawFinding>,
}

#[derive(Deserialize)]
struct RawFinding {
    line: Option<serde_json::Value>,
    severity: String,
    message: String,
    suggestion: Option<String>,
}

/// Parse the capability's JSON response into validated [`Finding`]s.
///
/// Handles markdown code fences around the JSON. An unparseable response is
/// an error (the dispatcher records it as a permanent task failure); an
/// individually invalid entry is skipped with a warning.
///
/// # Examples
///
/// ```
/// use corvid_core::{CodeChunk, FocusArea};
/// use corvid_review::prompt::parse_findings;
///
/// let chunk = CodeChunk {
///     file_path: "a.rs".into(),
///     start_line: 1,
///     end_line: 5,
///     content: String::new(),
///     index: 0,
/// };
/// let findings = parse_findings(r#"{"findings":[]}"#, &chunk, FocusArea::Quality).unwrap();
/// assert!(findings.is_empty());
/// ```
pub fn parse_findings(
    response: &str,
    chunk: &CodeChunk,
    focus: FocusArea,
) -> Result<Vec<Finding>, String> {
    let cleaned = strip_code_fences(response);

    let parsed: CapabilityResponse = serde_json::from_str(cleaned)
        .map_err(|e| format!("unparseable findings response: {e}"))?;

    let mut findings = Vec::new();
    for raw in parsed.findings {
        let line = match &raw.line {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(n)) => match n.as_u64() {
                Some(l) if l > 0 => Some(l as u32),
                _ => {
                    eprintln!("warning: skipping finding with invalid line: {n}");
                    continue;
                }
            },
            Some(other) => {
                eprintln!("warning: skipping finding with non-numeric line: {other}");
                continue;
            }
        };

        let Ok(severity) = raw.severity.parse::<Severity>() else {
            eprintln!("warning: skipping finding with unknown severity: {}", raw.severity);
            continue;
        };

        if raw.message.trim().is_empty() {
            continue;
        }

        findings.push(Finding {
            file_path: chunk.file_path.clone(),
            line,
            severity,
            focus,
            message: raw.message,
            suggestion: raw.suggestion,
        });
    }

    Ok(findings)
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
