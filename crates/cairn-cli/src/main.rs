//! Cairn CLI - Command-line interface for the climbing logbook
//!
//! Log ascents and sessions from the terminal and drive sync by hand.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_core::db::SqliteStore;
use cairn_core::models::AscentStyle;
use cairn_core::remote::HttpRemote;
use cairn_core::store::LocalStore;
use cairn_core::sync::{SyncConfig, SyncCoordinator, SyncOutcome, SystemClock};
use cairn_core::{ClimbSession, Collection, LogEntry};
use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "Climbing logbook with background sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log an ascent
    #[command(alias = "log")]
    Add {
        /// Route or boulder name
        route: String,
        /// Grade as you call it (e.g. "7a+", "V6", "5.12a")
        grade: String,
        /// Ascent style
        #[arg(long, value_enum, default_value_t = StyleArg::Redpoint)]
        style: StyleArg,
        /// Day of the ascent (YYYY-MM-DD, defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
        /// Attempts on the day
        #[arg(long, default_value = "1")]
        attempts: u32,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record a climbing session
    Session {
        /// Crag or gym name
        location: String,
        /// Session date (YYYY-MM-DD, defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List recent entries or sessions
    List {
        /// What to list
        #[arg(long, value_enum, default_value_t = CollectionArg::Entries)]
        collection: CollectionArg,
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry or session
    Delete {
        /// Record ID
        id: String,
        /// Which collection the record belongs to
        #[arg(long, value_enum, default_value_t = CollectionArg::Entries)]
        collection: CollectionArg,
    },
    /// Sync with the remote backend
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Show sync state: watermarks and unsynced counts
    Status,
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum StyleArg {
    Onsight,
    Flash,
    Redpoint,
    Attempt,
}

impl From<StyleArg> for AscentStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Onsight => Self::Onsight,
            StyleArg::Flash => Self::Flash,
            StyleArg::Redpoint => Self::Redpoint,
            StyleArg::Attempt => Self::Attempt,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CollectionArg {
    Entries,
    Sessions,
}

impl From<CollectionArg> for Collection {
    fn from(collection: CollectionArg) -> Self {
        match collection {
            CollectionArg::Entries => Self::Entries,
            CollectionArg::Sessions => Self::Sessions,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] cairn_core::Error),
    #[error(transparent)]
    Sync(#[from] cairn_core::sync::SyncError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid record ID: {0}")]
    InvalidId(String),
    #[error(
        "Sync is not configured. Set CAIRN_REMOTE_URL and CAIRN_REMOTE_TOKEN to enable `cairn sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cairn=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            route,
            grade,
            style,
            date,
            attempts,
            notes,
        }) => run_add(&route, &grade, style, date, attempts, notes, &db_path)?,
        Some(Commands::Session {
            location,
            date,
            notes,
        }) => run_session(&location, date, notes, &db_path)?,
        Some(Commands::List {
            collection,
            limit,
            json,
        }) => run_list(collection.into(), limit, json, &db_path)?,
        Some(Commands::Delete { id, collection }) => run_delete(&id, collection.into(), &db_path)?,
        Some(Commands::Sync { command: None }) => run_sync(&db_path).await?,
        Some(Commands::Sync {
            command: Some(SyncCommands::Status),
        }) => run_sync_status(&db_path)?,
        Some(Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit, json }),
        }) => run_sync_conflicts(limit, json, &db_path)?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

fn run_add(
    route: &str,
    grade: &str,
    style: StyleArg,
    date: Option<NaiveDate>,
    attempts: u32,
    notes: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = SqliteStore::open(db_path)?;

    let mut entry = LogEntry::new(
        route,
        grade,
        style.into(),
        date.unwrap_or_else(|| Utc::now().date_naive()),
    );
    entry.attempts = attempts;
    entry.notes = notes.unwrap_or_default();

    let record = entry.to_record(Utc::now().timestamp_millis())?;
    store.upsert_local(&record)?;

    println!("{}", entry.id);
    Ok(())
}

fn run_session(
    location: &str,
    date: Option<NaiveDate>,
    notes: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = SqliteStore::open(db_path)?;

    let mut session = ClimbSession::new(location, date.unwrap_or_else(|| Utc::now().date_naive()));
    session.notes = notes.unwrap_or_default();

    let record = session.to_record(Utc::now().timestamp_millis())?;
    store.upsert_local(&record)?;

    println!("{}", session.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EntryListItem {
    id: String,
    climbed_on: String,
    grade: String,
    style: String,
    route: String,
    attempts: u32,
    synced: bool,
}

fn run_list(
    collection: Collection,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = SqliteStore::open(db_path)?;
    let records = store.list_active(collection, limit)?;

    match collection {
        Collection::Entries => {
            let mut items = Vec::with_capacity(records.len());
            for record in &records {
                let entry = LogEntry::from_record(record)?;
                items.push(EntryListItem {
                    id: entry.id.to_string(),
                    climbed_on: entry.climbed_on.to_string(),
                    grade: entry.grade,
                    style: entry.style.to_string(),
                    route: entry.route,
                    attempts: entry.attempts,
                    synced: !record.needs_sync,
                });
            }
            if as_json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in items {
                    let marker = if item.synced { " " } else { "*" };
                    println!(
                        "{}{}  {}  {:<6} {:<8}  {}",
                        short_id(&item.id),
                        marker,
                        item.climbed_on,
                        item.grade,
                        item.style,
                        item.route
                    );
                }
            }
        }
        Collection::Sessions => {
            let mut sessions = Vec::with_capacity(records.len());
            for record in &records {
                sessions.push((ClimbSession::from_record(record)?, !record.needs_sync));
            }
            if as_json {
                let items: Vec<&ClimbSession> = sessions.iter().map(|(s, _)| s).collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for (session, synced) in sessions {
                    let marker = if synced { " " } else { "*" };
                    println!(
                        "{}{}  {}  {}",
                        short_id(&session.id.to_string()),
                        marker,
                        session.date,
                        session.location
                    );
                }
            }
        }
    }

    Ok(())
}

fn run_delete(id: &str, collection: Collection, db_path: &Path) -> Result<(), CliError> {
    let id: Uuid = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.to_string()))?;

    let store = SqliteStore::open(db_path)?;
    store.soft_delete_local(collection, id, Utc::now().timestamp_millis())?;

    println!("{id}");
    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let (url, token) = remote_config_from_env().ok_or(CliError::SyncNotConfigured)?;

    let store = Arc::new(SqliteStore::open(db_path)?);
    let remote = HttpRemote::new(url, token)?;
    let coordinator = SyncCoordinator::new(store, remote, SystemClock, SyncConfig::default());

    let outcome = coordinator.request_sync().await;
    print_outcome(&outcome);

    if outcome.aborted.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &SyncOutcome) {
    println!(
        "Pulled {} ({} applied), pushed {}, deferred {}",
        outcome.pulled, outcome.applied, outcome.pushed, outcome.deferred
    );
    for failure in &outcome.pull_failures {
        eprintln!("Pull interrupted for {}: {}", failure.collection, failure.error);
    }
    for failure in &outcome.failures {
        eprintln!(
            "Gave up on {} {}: {}",
            failure.collection, failure.entity_id, failure.error
        );
    }
    if let Some(reason) = &outcome.aborted {
        eprintln!("Sync aborted: {reason:?}");
    } else if outcome.is_clean() {
        println!("Sync completed");
    }
}

fn run_sync_status(db_path: &Path) -> Result<(), CliError> {
    let store = SqliteStore::open(db_path)?;
    for collection in Collection::ALL {
        let checkpoint = store.load_checkpoint(collection)?;
        let dirty = store.collect_dirty(collection)?.len();
        let last = if checkpoint.last_synced_at == 0 {
            "never".to_string()
        } else {
            checkpoint.last_synced_at.to_string()
        };
        println!("{collection}: last synced {last}, {dirty} unsynced");
    }
    Ok(())
}

fn run_sync_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = SqliteStore::open(db_path)?;
    let conflicts = store.list_conflicts(limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
    } else if conflicts.is_empty() {
        println!("No conflicts recorded");
    } else {
        for conflict in conflicts {
            println!(
                "{}  {} {}  {} won (local {} vs remote {})",
                conflict.resolved_at,
                conflict.collection,
                short_id(&conflict.entity_id.to_string()),
                conflict.winner.as_str(),
                conflict.local_updated_at,
                conflict.remote_updated_at
            );
        }
    }
    Ok(())
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CAIRN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cairn")
        .join("cairn.db")
}

fn remote_config_from_env() -> Option<(String, String)> {
    let url = env::var("CAIRN_REMOTE_URL").ok()?;
    let token = env::var("CAIRN_REMOTE_TOKEN").ok()?;

    if url.is_empty() || token.is_empty() {
        return None;
    }

    Some((url, token))
}
