use std::io::IsTerminal;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};

use corvid_core::{CorvidConfig, OutputFormat, ReviewLevel, Severity};
use corvid_review::analyst::HttpAnalyst;
use corvid_review::github::{parse_pr_reference, GitHubClient};
use corvid_review::pipeline::{ReviewOutcome, ReviewPipeline};
use corvid_review::report::ReportFormatter;

#[derive(Parser)]
#[command(
    name = "corvid",
    version,
    about = "Automated AI pull-request review",
    long_about = "Corvid reviews pull requests with an LLM analysis capability under\n\
                   strict concurrency, timeout, retry, and rate-limit discipline.\n\n\
                   It always produces a report: isolated task failures degrade coverage\n\
                   markers instead of failing the run.\n\n\
                   Examples:\n  \
                     git diff main | corvid review        Review a diff from stdin\n  \
                     corvid review --file changes.patch   Review a diff from a file\n  \
                     corvid review --pr owner/repo#42     Review a GitHub pull request\n  \
                     corvid review --pr owner/repo#42 --post  Post the review to GitHub\n  \
                     corvid review --fail-on high         Gate CI on high-severity findings\n  \
                     corvid focuses                       Show enabled focus areas"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .corvid.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown summary"
    )]
    format: OutputFormat,

    /// Enable verbose output (machine-readable run outputs on stderr)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Review a diff and report findings
    #[command(long_about = "Review a diff and report findings.\n\n\
        Reads a unified diff from stdin, a file, or a GitHub pull request,\n\
        dispatches chunked analysis tasks across the enabled focus areas,\n\
        and prints an aggregated report.\n\n\
        Examples:\n  git diff | corvid review\n  corvid review --pr owner/repo#42 --post\n  corvid review --file changes.patch --fail-on high")]
    Review {
        /// GitHub pull request reference (owner/repo#number)
        #[arg(long)]
        pr: Option<String>,

        /// Read diff from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Post the review back to the pull request (requires --pr)
        #[arg(long)]
        post: bool,

        /// GitHub token (default: GITHUB_TOKEN env var)
        #[arg(long)]
        github_token: Option<String>,

        /// Override the configured review level (basic|standard|comprehensive)
        #[arg(long)]
        level: Option<ReviewLevel>,

        /// Exit non-zero when a finding meets this severity
        #[arg(long)]
        fail_on: Option<Severity>,
    },
    /// Show the focus areas enabled by the effective configuration
    Focuses,
}

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Review {
            pr,
            file,
            post,
            github_token,
            level,
            fail_on,
        } => {
            if let Some(level) = level {
                config.review.review_level = level;
            }
            let args = ReviewArgs {
                pr,
                file,
                post,
                github_token,
                fail_on,
            };
            run_review(config, cli.format, cli.verbose, args).await
        }
        Command::Focuses => {
            println!("Review level: {}", config.review.review_level);
            for focus in config.enabled_focuses() {
                println!("  {focus}");
            }
            Ok(())
        }
    }
}

struct ReviewArgs {
    pr: Option<String>,
    file: Option<PathBuf>,
    post: bool,
    github_token: Option<String>,
    fail_on: Option<Severity>,
}

fn load_config(path: Option<&std::path::Path>) -> Result<CorvidConfig> {
    match path {
        Some(path) => CorvidConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to load config from {}", path.display())),
        None => {
            let default_path = std::path::Path::new(".corvid.toml");
            if default_path.exists() {
                CorvidConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err("failed to load .corvid.toml")
            } else {
                Ok(CorvidConfig::default())
            }
        }
    }
}

async fn run_review(
    mut config: CorvidConfig,
    format: OutputFormat,
    verbose: bool,
    args: ReviewArgs,
) -> Result<()> {
    if args.post && args.pr.is_none() {
        miette::bail!("--post requires --pr");
    }

    let diff = read_diff(
        args.pr.as_deref(),
        args.file.as_deref(),
        args.github_token.as_deref(),
    )
    .await?;
    if diff.trim().is_empty() {
        println!("Nothing to review: empty diff.");
        return Ok(());
    }

    if config.analyst.api_key.is_none() {
        config.analyst.api_key = std::env::var("CORVID_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
    }

    let analyst = Arc::new(HttpAnalyst::new(&config.analyst).into_diagnostic()?);
    let formatter = ReportFormatter::new(&config);
    let mut pipeline = ReviewPipeline::new(analyst, config).into_diagnostic()?;

    if std::io::stderr().is_terminal() {
        let bar = indicatif::ProgressBar::new(0);
        bar.set_style(
            indicatif::ProgressStyle::with_template("{spinner} analyzing {pos}/{len} tasks")
                .into_diagnostic()?,
        );
        pipeline = pipeline.with_progress(bar);
    }

    let outcome = pipeline.review_diff(&diff).await.into_diagnostic()?;

    render(&outcome, &formatter, format)?;

    if verbose {
        eprintln!();
        for (key, value) in formatter.machine_outputs(&outcome.report) {
            eprintln!("{key}={value}");
        }
    }

    if args.post {
        let pr_ref = args.pr.as_deref().unwrap_or_default();
        let (owner, repo, number) = parse_pr_reference(pr_ref).into_diagnostic()?;
        let client = GitHubClient::new(args.github_token.as_deref()).into_diagnostic()?;
        let summary = formatter
            .summary(&outcome.report)
            .unwrap_or_else(|| format!("Corvid review: {}", outcome.report.recommendation));
        let comments = formatter.line_comments(&outcome.report);
        client
            .post_review(
                &owner,
                &repo,
                number,
                &summary,
                &comments,
                outcome.report.recommendation,
            )
            .await
            .into_diagnostic()?;
        eprintln!(
            "Posted review with {} line comment(s) to {pr_ref}",
            comments.len()
        );
    }

    if let Some(threshold) = args.fail_on {
        let blocking = outcome
            .report
            .all_findings()
            .any(|f| f.severity.meets_threshold(threshold));
        if blocking {
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn read_diff(
    pr: Option<&str>,
    file: Option<&std::path::Path>,
    github_token: Option<&str>,
) -> Result<String> {
    if let Some(pr_ref) = pr {
        let (owner, repo, number) = parse_pr_reference(pr_ref).into_diagnostic()?;
        let client = GitHubClient::new(github_token).into_diagnostic()?;
        return client
            .get_pr_diff(&owner, &repo, number)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to fetch diff for {pr_ref}"));
    }

    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read {}", path.display()));
    }

    if std::io::stdin().is_terminal() {
        miette::bail!(
            "no diff on stdin. Pipe a diff (git diff | corvid review), \
             or use --file / --pr"
        );
    }

    let mut diff = String::new();
    std::io::stdin()
        .read_to_string(&mut diff)
        .into_diagnostic()
        .wrap_err("failed to read diff from stdin")?;
    Ok(diff)
}

fn render(
    outcome: &ReviewOutcome,
    formatter: &ReportFormatter,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{outcome}"),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(outcome).into_diagnostic()?
            );
        }
        OutputFormat::Markdown => match formatter.summary(&outcome.report) {
            Some(summary) => println!("{summary}"),
            None => println!("{outcome}"),
        },
    }
    Ok(())
}
