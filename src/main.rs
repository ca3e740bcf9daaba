//! famledger CLI - Command-line interface for the family ledger

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use famledger::config::{self, LedgerConfig};
use famledger::{Store, Trash};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;

#[derive(Parser)]
#[command(name = "famledger")]
#[command(version)]
#[command(about = "Personal & family finance ledger backed by a local SQLite file")]
#[command(long_about = r#"
famledger keeps income, expenses, loans, debts, accounts, budgets and
recurring items in a single local database file, with a trash bin that
keeps deleted records for a retention window.

Example usage:
  famledger init
  famledger add expenses --data '{"date":"2024-03-02","amount":42.5,"category":"food"}'
  famledger group expenses --by category
  famledger report --month 2024-03
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (default: ./famledger.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show declared collections and the indexes present on disk
    Schema,

    /// Add a new record, generating its id when missing
    Add {
        collection: String,
        /// Record as a JSON object
        #[arg(long)]
        data: String,
    },

    /// Insert or replace a record (must carry its id)
    Put {
        collection: String,
        /// Record as a JSON object
        #[arg(long)]
        data: String,
    },

    /// Show one record
    Get { collection: String, id: String },

    /// Move a record to the trash (or remove it outright with --hard)
    Delete {
        collection: String,
        id: String,
        #[arg(long)]
        hard: bool,
    },

    /// Find records by an indexed field
    Query {
        collection: String,
        /// Indexed field name
        #[arg(short, long)]
        index: String,
        /// Value to match; parsed as JSON when possible
        value: String,
    },

    /// List every record in a collection
    List { collection: String },

    /// Total a numeric field
    Sum {
        collection: String,
        #[arg(long, default_value = "amount")]
        field: String,
        /// Only records dated in this month (YYYY-MM)
        #[arg(long)]
        month: Option<String>,
    },

    /// Group records by a field and total a numeric field per group
    Group {
        collection: String,
        #[arg(long)]
        by: String,
        #[arg(long, default_value = "amount")]
        sum: String,
    },

    /// Percentage change between two amounts
    Variance {
        #[arg(allow_negative_numbers = true)]
        current: f64,
        #[arg(allow_negative_numbers = true)]
        previous: f64,
    },

    /// Income, spending and change against the previous month
    Report {
        /// Month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Budget usage per category for a month
    Budget {
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Active savings goals and their progress
    Goals,

    /// Show recurring items and overdue debts, optionally posting the items
    Due {
        /// Reference date (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Record due occurrences as income/expenses and advance their dates
        #[arg(long)]
        post: bool,
    },

    /// Inspect or manage the trash bin
    Trash {
        #[command(subcommand)]
        action: TrashAction,
    },

    /// Export all records to a timestamped JSON file
    Export {
        /// Output directory (default: config export_dir or current dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        include_trash: bool,
    },

    /// Import records from an export file
    Import {
        file: PathBuf,
        /// Empty each imported collection first
        #[arg(long)]
        replace: bool,
    },

    /// Show record counts per collection
    Stats,

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum TrashAction {
    /// List trash entries
    List,
    /// Put a trashed record back into its collection
    Restore { id: String },
    /// Permanently remove one entry now
    Discard { id: String },
    /// Permanently remove entries past the retention window
    Purge,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a JSON success envelope for `command`
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    debug_assert!(!output_mode.is_human());
    let envelope = serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// An opened ledger: store session plus the settings it was opened with
pub struct Ledger {
    pub store: Store,
    pub trash: Trash,
    pub config: LedgerConfig,
    pub base: PathBuf,
}

impl Ledger {
    fn open(config_path: Option<&Path>, database: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = config::load_config(config_path)?.unwrap_or_default();
        let base = config_path
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let db_path = database.unwrap_or_else(|| config.database_path_in(&base));
        config::ensure_db_dir(&db_path)?;

        let mut store = Store::open(&db_path, config.registry())?;
        if let Some(report) = store.last_upgrade() {
            tracing::info!("{}", report);
        }

        // Expired trash is cleared on every start
        let trash = Trash::new(config.retention_days());
        let purged = trash.purge_expired(&mut store)?;
        if !purged.is_empty() {
            tracing::debug!("Startup purge removed {} trash entries", purged.len());
        }

        Ok(Self {
            store,
            trash,
            config,
            base,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    let result = run(cli, output_mode);
    if let Err(e) = &result {
        if output_mode.is_human() {
            famledger::ui::error(&format!("{:#}", e));
        } else {
            let envelope = serde_json::json!({ "ok": false, "error": format!("{:#}", e) });
            println!("{}", envelope);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli, output_mode: OutputMode) -> anyhow::Result<()> {
    let config_path = cli.config;
    let database = cli.database;
    let open = || Ledger::open(config_path.as_deref(), database.clone());

    match cli.command {
        Commands::Version => commands::run_version(output_mode),
        Commands::Variance { current, previous } => commands::run_variance(output_mode, current, previous),
        Commands::Init { force } => {
            commands::run_init(output_mode, config_path.as_deref(), database.clone(), force)
        }
        Commands::Schema => commands::run_schema(&open()?, output_mode),
        Commands::Add { collection, data } => commands::run_add(&open()?, output_mode, &collection, &data),
        Commands::Put { collection, data } => commands::run_put(&open()?, output_mode, &collection, &data),
        Commands::Get { collection, id } => commands::run_get(&open()?, output_mode, &collection, &id),
        Commands::Delete { collection, id, hard } => {
            commands::run_delete(&mut open()?, output_mode, &collection, &id, hard)
        }
        Commands::Query { collection, index, value } => {
            commands::run_query(&open()?, output_mode, &collection, &index, &value)
        }
        Commands::List { collection } => commands::run_list(&open()?, output_mode, &collection),
        Commands::Sum { collection, field, month } => {
            commands::run_sum(&open()?, output_mode, &collection, &field, month.as_deref())
        }
        Commands::Group { collection, by, sum } => {
            commands::run_group(&open()?, output_mode, &collection, &by, &sum)
        }
        Commands::Report { month } => commands::run_report(&open()?, output_mode, month.as_deref()),
        Commands::Budget { month } => commands::run_budget(&open()?, output_mode, month.as_deref()),
        Commands::Goals => commands::run_goals(&open()?, output_mode),
        Commands::Due { date, post } => commands::run_due(&mut open()?, output_mode, date, post),
        Commands::Trash { action } => match action {
            TrashAction::List => commands::run_trash_list(&open()?, output_mode),
            TrashAction::Restore { id } => commands::run_trash_restore(&mut open()?, output_mode, &id),
            TrashAction::Discard { id } => commands::run_trash_discard(&open()?, output_mode, &id),
            TrashAction::Purge => commands::run_trash_purge(&mut open()?, output_mode),
        },
        Commands::Export { out, include_trash } => {
            commands::run_export(&open()?, output_mode, out, include_trash)
        }
        Commands::Import { file, replace } => commands::run_import(&mut open()?, output_mode, &file, replace),
        Commands::Stats => commands::run_stats(&open()?, output_mode),
    }
}
