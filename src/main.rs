//! Rank the health of pinned Python dependencies.
//!
//! # Overview
//!
//! `pip-rank` reads a pinned requirements file, queries PyPI and GitHub for
//! every `name==version` entry, and reports which dependencies deserve a
//! closer look: the oldest pins, the least popular packages, and the ones
//! that cannot be traced to a public repository at all.
//!
//! # Quick Start
//!
//! ```bash
//! pip-rank requirements.txt
//! ```
//!
//! This prints a summary to the terminal and writes the full metric grid to
//! `pip-rank.csv`.
//!
//! # Basic Usage
//!
//! **Choose the output file:**
//! ```bash
//! pip-rank requirements.txt --output audit.csv
//! ```
//!
//! **Show more entries per summary section:**
//! ```bash
//! pip-rank requirements.txt --top 10
//! ```
//!
//! **Query only one registry:**
//! ```bash
//! pip-rank requirements.txt --source pypi
//! ```
//!
//! **Bound the fetch phase:**
//! ```bash
//! pip-rank requirements.txt --time-budget 30
//! ```
//!
//! Fetches still in flight when the budget expires are reported as failures;
//! the run itself always completes and reports what it got.
//!
//! # Input Format
//!
//! Only exact pins (`name==version`) are analyzed. Comments, blank lines,
//! editable installs (`-e ...`), local paths, and range requirements
//! (`>=`, `~=`, bare names) are skipped, and each skipped line is listed in
//! the summary with the reason. If the same package is pinned twice, the
//! last pin wins.
//!
//! # GitHub Integration
//!
//! Repository metrics come from the GitHub REST API. Unauthenticated access
//! works but is limited to 60 requests/hour; provide a token to raise that
//! to 5000:
//!
//! ```bash
//! export GITHUB_TOKEN=ghp_xxxxxxxxxxxxxxxxxxxx
//! pip-rank requirements.txt
//! ```
//!
//! A package's repository is inferred from its PyPI metadata. Packages whose
//! repository cannot be inferred appear under "Not located on GitHub" rather
//! than failing the run.
//!
//! # Configuration
//!
//! Settings can live in a `pip-rank.toml` file in the working directory, or
//! in a file named with `--config`. Command-line flags override the file.
//!
//! ```toml
//! top_k = 5
//! concurrency = 10
//! time_budget = 60
//! cache_ttl_days = 30
//! sources = ["pypi", "github"]
//! ```
//!
//! # Caching
//!
//! Source responses are cached on disk (default: the platform cache
//! directory under `pip-rank/`) and reused until they are `cache_ttl_days`
//! old, so repeated runs over the same requirements file are fast and cheap
//! on API quota. Use `--cache-dir` to relocate the cache.

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, ValueEnum};
use core::time::Duration;
use directories::BaseDirs;
use ohno::IntoAppError;
use pip_rank::Result;
use pip_rank::cache::SourceCache;
use pip_rank::config::{Config, SourceKind};
use pip_rank::fetch::{Progress, ProgressReporter, Scheduler};
use pip_rank::misc::ColorMode;
use pip_rank::report::{aggregate, generate_console, generate_csv};
use pip_rank::requirements;
use pip_rank::sources::{GitHubSource, PyPiSource, REQUEST_TIMEOUT, Source};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

#[derive(Parser, Debug)]
#[command(name = "pip-rank", version, about)]
#[command(styles = CLAP_STYLES)]
struct Args {
    /// Pinned requirements file to analyze
    #[arg(value_name = "REQUIREMENTS")]
    input: Utf8PathBuf,

    /// File the full metric grid is written to
    #[arg(long, short = 'o', value_name = "PATH", default_value = "pip-rank.csv")]
    output: Utf8PathBuf,

    /// Path to configuration file [default: pip-rank.toml]
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    github_token: Option<String>,

    /// Directory where source responses are cached [default: platform cache dir]
    #[arg(long, value_name = "PATH")]
    cache_dir: Option<Utf8PathBuf>,

    /// Number of entries shown per summary section
    #[arg(long, value_name = "COUNT")]
    top: Option<usize>,

    /// Maximum in-flight requests per source
    #[arg(long, value_name = "COUNT")]
    concurrency: Option<usize>,

    /// Wall-clock budget for the fetch phase, in seconds
    #[arg(long, value_name = "SECONDS")]
    time_budget: Option<u64>,

    /// Source to query; repeat the flag to query several
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<SourceKind>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none")]
    log_level: LogLevel,
}

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    if log_level == LogLevel::None {
        return;
    }

    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug) || matches!(log_level, LogLevel::Trace))
        .init();
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(top) = args.top {
        config.top_k = top;
    }

    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    if let Some(budget) = args.time_budget {
        config.time_budget = Some(budget);
    }

    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
}

/// Build the enabled source clients, each with its own cache directory.
fn build_sources(config: &Config, args: &Args, cache_root: &Path) -> Result<Vec<Arc<dyn Source>>> {
    let ttl = config.cache_ttl();
    let cache_for = |name: &str| SourceCache::new(cache_root.join(name), ttl);

    let mut kinds = config.sources.clone();
    kinds.sort_unstable();
    kinds.dedup();

    let mut sources: Vec<Arc<dyn Source>> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        match kind {
            SourceKind::Pypi => {
                let client = reqwest::Client::builder()
                    .user_agent("pip-rank")
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .into_app_err("unable to build HTTP client")?;
                sources.push(Arc::new(PyPiSource::new(client, Some(cache_for("pypi")))));
            }
            SourceKind::Github => {
                let source = GitHubSource::new(args.github_token.as_deref(), Some(cache_for("github")))?;
                sources.push(Arc::new(source));
            }
        }
    }

    Ok(sources)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let (mut config, warnings) = Config::load(args.config.as_ref())?;
    apply_overrides(&mut config, &args);

    if !warnings.is_empty() {
        eprintln!("\n⚠️  Configuration validation warnings:");
        for warning in &warnings {
            eprintln!("   {warning}");
        }
        eprintln!();
    }

    let content =
        fs::read_to_string(&args.input).into_app_err_with(|| format!("unable to read requirements file '{}'", args.input))?;
    let parsed = requirements::parse_str(&content);

    let cache_root = if let Some(dir) = &args.cache_dir {
        dir.as_std_path().to_path_buf()
    } else {
        BaseDirs::new()
            .into_app_err("unable to determine cache directory")?
            .cache_dir()
            .join("pip-rank")
    };

    let sources = build_sources(&config, &args, &cache_root)?;

    // When logging is enabled the bar would interleave with log lines, so it
    // gets an infinite delay and never shows.
    let delay = if args.log_level == LogLevel::None {
        Duration::from_millis(500)
    } else {
        Duration::MAX
    };
    let use_colors = args.color.should_colorize();
    let progress: Arc<dyn Progress> = Arc::new(ProgressReporter::new(delay, use_colors));
    progress.set_phase("Fetching");

    let budget = config.time_budget.map(Duration::from_secs);
    let scheduler = Scheduler::new(sources, config.concurrency, budget, &progress);
    let outcomes = scheduler.run(&parsed.packages).await?;
    progress.done();

    let report = aggregate(&parsed, &outcomes, Utc::now());

    let mut console = String::new();
    generate_console(&report, config.top_k, use_colors, &mut console)?;
    print!("{console}");

    let mut grid = String::new();
    generate_csv(&report, &mut grid)?;
    fs::write(&args.output, grid).into_app_err_with(|| format!("unable to write results to '{}'", args.output))?;
    println!("\nSaved results to {}", args.output);

    Ok(())
}
