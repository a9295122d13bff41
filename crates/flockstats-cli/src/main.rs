//! flockstats - giving, attendance and outreach statistics from the command line.
//!
//! Stats are served from the local cache when fresh and revalidated in the
//! background; `watch` keeps a subject on screen and refreshes it periodically.

mod report;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flockstats_core::{
    AnalyticsService, Config, GetStatsOptions, RefreshScheduler, StatsSnapshot, SubjectId,
};

const USAGE: &str = "\
Usage: flockstats [--log-dir DIR] [--json] <command>

Commands:
  show <subject>... [--force]   Print statistics for one or more subjects
  watch <subject>               Keep a subject on screen, refreshing periodically
  cache [clear]                 List (or clear) cached statistics

Subjects:
  user:<id>  member:<id>  org";

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "flockstats.log";

#[derive(Debug, PartialEq)]
enum Command {
    Show { subjects: Vec<SubjectId>, force: bool },
    Watch(SubjectId),
    Cache { clear: bool },
}

#[derive(Debug, PartialEq)]
struct Cli {
    log_dir: Option<PathBuf>,
    json: bool,
    command: Command,
}

impl Cli {
    fn parse(args: &[String]) -> Result<Self> {
        let mut log_dir = None;
        let mut json = false;
        let mut force = false;
        let mut positional = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--log-dir" => {
                    let dir = iter.next().context("--log-dir needs a directory")?;
                    log_dir = Some(PathBuf::from(dir));
                }
                "--json" => json = true,
                "--force" | "-f" => force = true,
                flag if flag.starts_with('-') => bail!("Unknown option: {}", flag),
                _ => positional.push(arg.as_str()),
            }
        }

        let (name, rest) = positional.split_first().context("No command given")?;
        let command = match *name {
            "show" => {
                if rest.is_empty() {
                    bail!("show needs at least one subject");
                }
                let subjects = rest
                    .iter()
                    .map(|s| s.parse::<SubjectId>().map_err(anyhow::Error::msg))
                    .collect::<Result<Vec<_>>>()?;
                Command::Show { subjects, force }
            }
            "watch" => match rest {
                [subject] => Command::Watch(subject.parse::<SubjectId>().map_err(anyhow::Error::msg)?),
                _ => bail!("watch needs exactly one subject"),
            },
            "cache" => match rest {
                [] => Command::Cache { clear: false },
                ["clear"] => Command::Cache { clear: true },
                _ => bail!("Unknown cache command"),
            },
            other => bail!("Unknown command: {}", other),
        };

        Ok(Self { log_dir, json, command })
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must stay alive for file logs to be flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let cli = match Cli::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("flockstats starting");

    let config = Config::load()?;
    let service = AnalyticsService::from_config(&config, Config::token_from_env())?;

    match cli.command {
        Command::Show { subjects, force } => show(&service, subjects, force, cli.json).await,
        Command::Watch(subject) => watch(&service, &config, &subject, cli.json).await,
        Command::Cache { clear } => cache(&service, clear),
    }
}

fn print_snapshot(snapshot: &StatsSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print!("{}", report::render(snapshot));
    }
    Ok(())
}

async fn show(service: &AnalyticsService, subjects: Vec<SubjectId>, force: bool, json: bool) -> Result<()> {
    let results = if subjects.len() == 1 || force {
        let options = GetStatsOptions { force_refresh: force };
        let mut results = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let result = service.get_stats(&subject, options).await;
            results.push((subject, result));
        }
        results
    } else {
        let mut results = service.prefetch(subjects).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    };

    let mut failed = 0;
    for (subject, result) in results {
        match result {
            Ok(snapshot) => print_snapshot(&snapshot, json)?,
            Err(e) => {
                failed += 1;
                eprintln!("[{}] {}", subject, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} subject(s) could not be loaded", failed);
    }
    Ok(())
}

async fn watch(service: &AnalyticsService, config: &Config, subject: &SubjectId, json: bool) -> Result<()> {
    let scheduler = RefreshScheduler::new(service.clone(), config.poll_interval());
    let mut rx = service.subscribe(subject);
    let token = scheduler.start(subject);

    print_snapshot(&rx.borrow_and_update().clone(), json)?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.is_busy() && !json {
                    println!("{}", report::status_line(&snapshot));
                } else {
                    print_snapshot(&snapshot, json)?;
                }
            }
        }
    }

    scheduler.cancel(&token);
    info!(subject = %subject, "Stopped watching");
    Ok(())
}

fn cache(service: &AnalyticsService, clear: bool) -> Result<()> {
    let store = service.cache();
    if clear {
        let count = store.entries().len();
        store.clear();
        println!("Cleared {} cached subject(s)", count);
        return Ok(());
    }

    let entries = store.entries();
    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }
    let now = store.now_millis();
    for entry in &entries {
        println!("{}", report::cache_line(entry, now, store.is_fresh(entry)));
    }
    Ok(())
}
