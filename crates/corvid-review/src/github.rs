use corvid_core::{CorvidError, Recommendation};

use crate::report::LineComment;

/// GitHub pull-request client for fetching diffs and posting reviews.
///
/// # Examples
///
/// ```
/// use corvid_review::github::parse_pr_reference;
///
/// let (owner, repo, number) = parse_pr_reference("rust-lang/rust#12345").unwrap();
/// assert_eq!(owner, "rust-lang");
/// assert_eq!(repo, "rust");
/// assert_eq!(number, 12345);
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
}

impl GitHubClient {
    /// Create a client from an explicit token or the `GITHUB_TOKEN`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Config`] if no token is available, or
    /// [`CorvidError::Git`] if the client cannot be built.
    pub fn new(token: Option<&str>) -> Result<Self, CorvidError> {
        let token = match token {
            Some(t) => t.to_string(),
            None => std::env::var("GITHUB_TOKEN").map_err(|_| {
                CorvidError::Config(
                    "GITHUB_TOKEN not set. Pass --github-token or set GITHUB_TOKEN env var".into(),
                )
            })?,
        };

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .map_err(|e| CorvidError::Git(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::new();

        Ok(Self {
            octocrab,
            http,
            token,
        })
    }

    /// Fetch the unified diff for a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Git`] on network or API errors.
    pub async fn get_pr_diff(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> Result<String, CorvidError> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/pulls/{pr_number}");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3.diff")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "corvid")
            .send()
            .await
            .map_err(|e| CorvidError::Git(format!("failed to fetch PR diff: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorvidError::Git(format!("GitHub API error {status}: {body}")));
        }

        response
            .text()
            .await
            .map_err(|e| CorvidError::Git(format!("failed to read diff response: {e}")))
    }

    /// Post the review summary and line comments as a single PR review.
    ///
    /// The review event follows the recommendation: request-changes maps to
    /// `REQUEST_CHANGES`, everything else to `COMMENT`.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Git`] on API errors.
    pub async fn post_review(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        summary: &str,
        comments: &[LineComment],
        recommendation: Recommendation,
    ) -> Result<(), CorvidError> {
        let review_comments: Vec<serde_json::Value> = comments
            .iter()
            .map(|c| {
                serde_json::json!({
                    "path": c.path.to_string_lossy(),
                    "line": c.line,
                    "side": "RIGHT",
                    "body": c.body,
                })
            })
            .collect();

        let event = match recommendation {
            Recommendation::RequestChanges => "REQUEST_CHANGES",
            _ => "COMMENT",
        };

        let route = format!("/repos/{owner}/{repo}/pulls/{pr_number}/reviews");
        let body = serde_json::json!({
            "event": event,
            "body": summary,
            "comments": review_comments,
        });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| CorvidError::Git(format!("failed to post review: {e}")))?;

        Ok(())
    }
}

/// Parse a PR reference string (`owner/repo#number`) into its components.
///
/// # Errors
///
/// Returns [`CorvidError::Config`] if the format is invalid.
///
/// # Examples
///
/// ```
/// use corvid_review::github::parse_pr_reference;
///
/// let (owner, repo, num) = parse_pr_reference("octocat/hello-world#42").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// assert_eq!(num, 42);
/// ```
pub fn parse_pr_reference(pr_ref: &str) -> Result<(String, String, u64), CorvidError> {
    let Some((owner_repo, number_str)) = pr_ref.split_once('#') else {
        return Err(CorvidError::Config(format!(
            "invalid PR reference '{pr_ref}', expected owner/repo#number"
        )));
    };
    let Some((owner, repo)) = owner_repo.split_once('/') else {
        return Err(CorvidError::Config(format!(
            "invalid PR reference '{pr_ref}', expected owner/repo#number"
        )));
    };
    let number: u64 = number_str
        .parse()
        .map_err(|_| CorvidError::Config(format!("invalid PR number: {number_str}")))?;
    Ok((owner.to_string(), repo.to_string(), number))
}
