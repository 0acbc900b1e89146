mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    ImportArgs, MealEdit, Reported, cmd_add, cmd_dates, cmd_delete, cmd_edit, cmd_export,
    cmd_import, cmd_list, json_error, print_notifications,
};
use crate::config::Config;
use morsel_core::error::JournalError;
use morsel_core::notify::{Dispatcher, NotificationSink, Severity};
use morsel_core::reconcile::ResolutionMode;
use morsel_core::service::JournalService;

#[derive(Parser)]
#[command(
    name = "morsel",
    version,
    about = "A small meal journal",
    long_about = "Log what you ate, where, and how you felt about it.\n\
                  Export a range of days to JSON and import it elsewhere."
)]
struct Cli {
    /// Path to the journal database (default: platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a meal
    Add {
        /// What you ate
        description: String,
        /// Where you ate it
        #[arg(short, long)]
        place: String,
        /// How you felt
        #[arg(short, long)]
        emotion: String,
        /// When ("YYYY-MM-DD HH:MM", "YYYY-MM-DDTHH:MM" or RFC 3339; default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of a logged meal
    Edit {
        /// Meal ID
        id: i64,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
        /// New place
        #[arg(short, long)]
        place: Option<String>,
        /// New emotion
        #[arg(short, long)]
        emotion: Option<String>,
        /// New date and time
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the meals of one day, newest first
    List {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the days that have meals
    Dates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export meals between two dates (inclusive) as JSON
    Export {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Import meals from a JSON export
    Import {
        /// File to read ("-" or omitted: stdin)
        file: Option<PathBuf>,
        /// What to do with meals whose ID already exists: duplicate or overwrite
        #[arg(long, value_name = "MODE")]
        on_conflict: Option<ResolutionMode>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Add { json, .. }
            | Commands::Edit { json, .. }
            | Commands::Delete { json, .. }
            | Commands::List { json, .. }
            | Commands::Dates { json }
            | Commands::Import { json, .. } => *json,
            Commands::Export { .. } => false,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let notes = Dispatcher::global();
    let json = cli.command.json();
    let result = run(cli, &notes).await;

    if let Err(e) = &result {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        }
        // Service errors were already posted as notifications.
        if !(e.is::<JournalError>() || e.is::<Reported>()) {
            notes.notify(&format!("{e:#}"), Severity::Error);
        }
    }
    print_notifications(&notes);

    if result.is_err() {
        process::exit(1);
    }
}

async fn run(cli: Cli, notes: &Arc<Dispatcher>) -> Result<()> {
    let config = Config::load(cli.db)?;
    debug!(db = %config.db_path.display(), data_dir = %config.data_dir.display(), "using journal");

    let sink: Arc<dyn NotificationSink> = notes.clone();
    let svc = JournalService::open(config.db_path, sink);

    match cli.command {
        Commands::Add {
            description,
            place,
            emotion,
            at,
            json,
        } => cmd_add(&svc, description, place, emotion, at.as_deref(), json).await,
        Commands::Edit {
            id,
            description,
            place,
            emotion,
            at,
            json,
        } => {
            let edit = MealEdit {
                description,
                place,
                emotion,
                at,
            };
            cmd_edit(&svc, id, edit, json).await
        }
        Commands::Delete { id, json } => cmd_delete(&svc, id, json).await,
        Commands::List { date, json } => cmd_list(&svc, date, json).await,
        Commands::Dates { json } => cmd_dates(&svc, json).await,
        Commands::Export { from, to, output } => {
            cmd_export(&svc, from.as_deref(), to.as_deref(), output.as_deref()).await
        }
        Commands::Import {
            file,
            on_conflict,
            json,
        } => {
            let args = ImportArgs {
                file,
                on_conflict,
                json,
            };
            cmd_import(&svc, notes, args).await
        }
    }
}
