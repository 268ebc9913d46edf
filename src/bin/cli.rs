//! Missing issues audit CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use issue_audit::{
    error::{AppError, Result},
    models::{AuditConfiguration, AuditMode, Domain, Settings, parse_story_range},
    pipeline::{AuditOrchestrator, AuditOutcome},
    services::{FileCatalog, GitHubScanner},
    storage::ResultCache,
    utils::log,
};
use tokio_util::sync::CancellationToken;

/// Audit story implementation issues across frontend and backend repositories
#[derive(Parser, Debug)]
#[command(name = "issue-audit", version, about = "Missing implementation issues audit")]
struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long, default_value = "audit.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an audit
    Audit(AuditArgs),

    /// Inspect or maintain the scan result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Validate the settings file
    Validate,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// full, incremental-date, incremental-range or resume
    /// (inferred from the scope flags when omitted)
    #[arg(long)]
    mode: Option<String>,

    /// First processing date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last processing date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Audit stories processed in the last N days
    #[arg(long)]
    days_back: Option<u32>,

    /// Story number range, START-END
    #[arg(long)]
    story_range: Option<String>,

    /// Resume an interrupted audit
    #[arg(long)]
    resume: bool,

    /// Only audit stories up to this number when resuming
    #[arg(long)]
    resume_from: Option<u32>,

    /// Ignore cached scan results
    #[arg(long)]
    no_cache: bool,

    /// Record that missing issues should be created
    #[arg(long)]
    create_issues: bool,

    /// Output directory for audit results
    #[arg(long)]
    output: Option<PathBuf>,

    /// Delay before each API call, in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    rate_limit_delay: Option<i64>,

    /// Calls between batch pauses
    #[arg(long)]
    batch_size: Option<u32>,

    /// Also match issue titles by containment
    #[arg(long)]
    fuzzy: bool,

    /// GitHub token (defaults to the environment variable named in settings)
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show cache size
    Stats,
    /// Remove expired and corrupt entries
    Cleanup,
    /// Remove every entry
    Clear,
    /// Remove entries for one repository
    Invalidate {
        /// frontend or backend
        #[arg(long)]
        domain: String,
        /// Repository as owner/name
        #[arg(long)]
        repo: String,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Audit mode from `--mode`, or from the scope flags when it is omitted.
///
/// Scope flags that select different modes conflict, and so does an explicit
/// full audit combined with any of them.
fn resolve_mode(args: &AuditArgs) -> Result<AuditMode> {
    let mut implied = Vec::new();
    if args.resume || args.resume_from.is_some() {
        implied.push(AuditMode::Resume);
    }
    if args.story_range.is_some() {
        implied.push(AuditMode::IncrementalRange);
    }
    if args.days_back.is_some() || args.start_date.is_some() || args.end_date.is_some() {
        implied.push(AuditMode::IncrementalDate);
    }

    let Some(name) = &args.mode else {
        return match implied.as_slice() {
            [] => Ok(AuditMode::Full),
            [mode] => Ok(*mode),
            _ => Err(AppError::config_with_hint(
                "conflicting audit scope flags",
                "combine at most one of --resume, --story-range or a date window",
            )),
        };
    };

    let mode = AuditMode::parse(name).ok_or_else(|| {
        AppError::config_with_hint(
            format!("unknown audit mode '{name}'"),
            "use full, incremental-date, incremental-range or resume",
        )
    })?;
    if mode == AuditMode::Full && !implied.is_empty() {
        return Err(AppError::config_with_hint(
            "a full audit cannot be limited by scope flags",
            "drop --mode full, or drop --resume, --story-range and the date flags",
        ));
    }
    Ok(mode)
}

/// Build the run configuration from command line flags.
fn build_configuration(args: &AuditArgs, settings: &Settings) -> Result<AuditConfiguration> {
    let mode = resolve_mode(args)?;

    let token = args
        .token
        .clone()
        .or_else(|| std::env::var(&settings.github.token_env).ok())
        .unwrap_or_default();

    let mut builder = AuditConfiguration::builder()
        .mode(mode)
        .github_token(token)
        .start_date(args.start_date)
        .end_date(args.end_date)
        .days_back(args.days_back)
        .resume_mode(args.resume)
        .resume_from_story(args.resume_from)
        .use_cache(!args.no_cache)
        .create_issues(args.create_issues)
        .fuzzy_title_match(args.fuzzy)
        .rate_limit_delay_ms(
            args.rate_limit_delay
                .unwrap_or(settings.rate_limit.base_delay_ms as i64),
        )
        .batch_size(args.batch_size.unwrap_or(settings.rate_limit.batch_size));

    if let Some(range) = &args.story_range {
        let (start, end) = parse_story_range(range)?;
        builder = builder.story_range(start, end);
    }
    if let Some(output) = &args.output {
        builder = builder.output_directory(output);
    }
    builder.build()
}

async fn run_audit(args: AuditArgs, settings: Settings) -> Result<()> {
    let config = build_configuration(&args, &settings)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupt received, cancelling audit...");
            on_signal.cancel();
        }
    });

    let scanner = GitHubScanner::new(&settings.github, config.github_token.expose())?;
    let catalog = FileCatalog::from_config(&settings.paths);
    let orchestrator =
        AuditOrchestrator::new(settings, Arc::new(scanner), Arc::new(catalog), cancel);

    let run = orchestrator.run(&config).await?;

    match run.outcome {
        AuditOutcome::Complete => {
            ::log::info!("All processed stories have frontend and backend issues.");
        }
        AuditOutcome::MissingIssues { frontend, backend } => {
            ::log::info!(
                "Found {} missing issues ({} frontend, {} backend):",
                frontend + backend,
                frontend,
                backend
            );
            for missing in run.result.all_missing() {
                log::sub_item(&format!(
                    "#{} [{}] {} -> {}",
                    missing.story_number,
                    missing.domain,
                    missing.expected_title,
                    missing.target_repository
                ));
            }
            if config.create_issues {
                ::log::warn!(
                    "Issue creation requested for {} issues; create them from {}",
                    frontend + backend,
                    config.output_directory.join("last-audit.json").display()
                );
            }
        }
    }
    Ok(())
}

async fn run_cache(action: CacheAction, settings: &Settings) -> Result<()> {
    let cache = ResultCache::with_ttl_hours(&settings.cache.directory, settings.cache.ttl_hours);

    match action {
        CacheAction::Stats => {
            let stats = cache.statistics().await?;
            log::summary(
                "Cache",
                &[
                    ("Directory", cache.root_dir().display().to_string()),
                    ("Entries", stats.file_count.to_string()),
                    ("Size", format!("{} bytes", stats.total_bytes)),
                    ("TTL", format!("{}h", settings.cache.ttl_hours)),
                ],
            );
        }
        CacheAction::Cleanup => {
            let removed = cache.cleanup_expired().await?;
            ::log::info!("Removed {} expired entries", removed);
        }
        CacheAction::Clear => {
            cache.invalidate_all().await?;
        }
        CacheAction::Invalidate { domain, repo } => {
            let domain = Domain::parse(&domain).ok_or_else(|| {
                AppError::config_with_hint(
                    format!("unknown domain '{domain}'"),
                    "use frontend or backend",
                )
            })?;
            cache.invalidate_repository(domain, &repo).await?;
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load_or_default(&cli.config);
    ::log::info!("Loaded settings from {}", cli.config.display());

    match cli.command {
        Command::Audit(args) => run_audit(args, settings).await,
        Command::Cache { action } => run_cache(action, &settings).await,
        Command::Validate => {
            ::log::info!("Validating settings...");
            settings.validate()?;
            ::log::info!("✓ Settings OK");
            Ok(())
        }
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => {
            ::log::info!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            ::log::error!("{}: {}", e.class(), e);
            if let Some(hint) = e.hint() {
                ::log::error!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
