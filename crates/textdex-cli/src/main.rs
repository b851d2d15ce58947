//! textdex - accent-insensitive search over project files.
//!
//! Thin front-end over `textdex-core`: registers roots, scans, searches and
//! prints results as they stream in. Ctrl-C cancels the running command.

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use textdex_core::content::normalized_part;
use textdex_core::{
    AppConfig, CancellationToken, SearchDefaults, SearchRequest, SearchService, ServiceConfig,
    TextdexError,
};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "textdex")]
#[command(about = "Accent-insensitive content search for project workspaces")]
struct Args {
    /// Index database (defaults to the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Per-file parse timeout in seconds
    #[arg(long, global = true)]
    parse_timeout: Option<u64>,

    /// Concurrent parse/hash jobs
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a root directory for a project
    AddRoot { project: String, path: PathBuf },

    /// Refresh the file catalogue of a project
    Scan {
        project: String,
        /// Only scan below this path instead of every registered root
        #[arg(long)]
        scope: Option<PathBuf>,
    },

    /// Search a project
    Search {
        project: String,
        query: String,
        #[arg(long)]
        scope: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = SearchDefaults::MAX_RESULTS)]
        max_results: usize,
        /// Scan before searching
        #[arg(long)]
        scan: bool,
        /// Print one JSON object per result
        #[arg(long)]
        json: bool,
    },

    /// Print the indexed (normalized) text of a file
    Show { path: PathBuf },

    /// Print index statistics as JSON
    Stats,

    /// Optimize the full-text index and checkpoint the database
    Compact {
        /// Rebuild the full-text index from cached content first
        #[arg(long)]
        rebuild: bool,
    },
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
        .join(AppConfig::APP_NAME)
        .join(AppConfig::DB_FILENAME)
}

fn service_config(args: &Args) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    if let Some(secs) = args.parse_timeout {
        config.parse_timeout = Duration::from_secs(secs);
    }
    if let Some(jobs) = args.jobs {
        config.max_parallelism = jobs;
    }
    config
}

/// Cancel `cancel` on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

async fn run(args: Args, service: SearchService, cancel: CancellationToken) -> Result<()> {
    match args.command {
        Command::AddRoot { project, path } => {
            let added = service.register_project_root(&project, &path)?;
            if added {
                println!("Added {} to {}", path.display(), project);
            } else {
                println!("{} is already a root of {}", path.display(), project);
            }
        }
        Command::Scan { project, scope } => {
            let summary = service
                .ensure_files_scanned(&project, scope.as_deref(), &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Search {
            project,
            query,
            scope,
            max_results,
            scan,
            json,
        } => {
            if scan {
                service
                    .ensure_files_scanned(&project, scope.as_deref(), &cancel)
                    .await?;
            }

            let mut request = SearchRequest::new(query, project).with_max_results(max_results);
            if let Some(scope) = scope {
                request = request.with_scope(scope);
            }

            let mut print_error = None;
            let paths = service
                .search(&request, &cancel, |record, matches| {
                    let line = if json {
                        let hit = output::JsonHit {
                            path: &record.path,
                            name: &record.name,
                            matches,
                        };
                        match serde_json::to_string(&hit) {
                            Ok(line) => line,
                            Err(e) => {
                                print_error.get_or_insert(e.to_string());
                                return;
                            }
                        }
                    } else {
                        output::render_hit(record, matches)
                    };
                    println!("{}", line);
                })
                .await?;

            if let Some(error) = print_error {
                anyhow::bail!("failed to serialize results: {}", error);
            }
            if !json {
                eprintln!("{} result(s)", paths.len());
            }
        }
        Command::Show { path } => {
            let merged = service.get_or_build_indexed_content(&path, &cancel).await?;
            println!("{}", normalized_part(&merged));
        }
        Command::Stats => {
            let stats = serde_json::json!({
                "index": service.index_stats()?,
                "content": service.content_stats(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Compact { rebuild } => {
            service.compact(rebuild).await?;
            println!("Index compacted");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so results can be piped
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let db_path = args.db.clone().unwrap_or_else(default_db_path);
    debug!("Using database {}", db_path.display());

    let service = SearchService::open(&db_path, service_config(&args))
        .with_context(|| format!("failed to open index at {}", db_path.display()))?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match run(args, service, cancel).await {
        Err(e) if matches!(e.downcast_ref::<TextdexError>(), Some(TextdexError::Cancelled)) => {
            eprintln!("Cancelled");
            std::process::exit(130);
        }
        other => other,
    }
}
