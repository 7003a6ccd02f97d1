//! `teamcal` CLI — manage team availability from the command line.
//!
//! Every command prints a JSON document on stdout. Failures print
//! `{"success":false,"message":...}` and exit non-zero. Logs go to stderr and
//! are controlled by `TEAMCAL_LOG` (default `warn`).
//!
//! ## Usage
//!
//! ```sh
//! # Register users (the first one becomes an admin)
//! teamcal user add --name Alice --email alice@example.com --department Eng
//!
//! # Create availability from a JSON body (stdin or -i)
//! echo '{"startDate":"2024-01-01","timeStart":"09:00","timeEnd":"10:00","status":"AVAILABLE",
//!        "recurrence":{"freq":"WEEKLY","byDay":["MO","WE"],"until":"2024-03-31"}}' \
//!   | teamcal create --as alice@example.com
//!
//! # Calendar items for a date range
//! teamcal list --as alice@example.com --start 2024-01-01 --end 2024-01-31
//!
//! # Edit one occurrence, or the whole series with --all
//! teamcal update <INSTANCE_ID> --as alice@example.com -i body.json
//! teamcal delete <INSTANCE_ID> --as alice@example.com --all
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use teamcal_engine::model::Actor;
use teamcal_engine::request::{parse_body, parse_user_ids, AvailabilityQuery, DeleteAvailability};
use teamcal_engine::store::{self, AvailabilityStore};
use teamcal_engine::{
    AvailabilityService, EngineConfig, TeamcalError, TracingNotifier, UpdateAvailability,
};
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TEAMCAL_LOG";

#[derive(Parser)]
#[command(name = "teamcal", version, about = "Recurring team availability manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides the config file and TEAMCAL_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config file (defaults to ./teamcal.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Create availability from a JSON body
    Create {
        /// Email of the acting user
        #[arg(long = "as", value_name = "EMAIL")]
        actor: String,
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// List calendar items in an inclusive date range
    List {
        #[arg(long = "as", value_name = "EMAIL")]
        actor: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Comma-separated user ids (honored for admins only)
        #[arg(long)]
        users: Option<String>,
    },
    /// Update an instance, its following occurrences, a range, or the whole series
    Update {
        /// Instance id
        id: Uuid,
        #[arg(long = "as", value_name = "EMAIL")]
        actor: String,
        /// Apply to the whole series
        #[arg(long)]
        all: bool,
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Delete an instance, its following occurrences, a range, or the whole series
    Delete {
        /// Instance id
        id: Uuid,
        #[arg(long = "as", value_name = "EMAIL")]
        actor: String,
        /// Delete the whole series
        #[arg(long)]
        all: bool,
        /// Optional JSON body with `applyFromDate` or `applyToRange`
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        department: Option<String>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<Value> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let store = AvailabilityStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database: {}", config.database_path.display())
    })?;
    let mut service = AvailabilityService::new(store, TracingNotifier, config);

    let output = match cli.command {
        Commands::User {
            command:
                UserCommands::Add {
                    name,
                    email,
                    department,
                },
        } => {
            let user = service.register_user(&name, &email, department.as_deref())?;
            json!({ "success": true, "user": user })
        }
        Commands::Create { actor, input } => {
            let actor = resolve_actor(&service, &actor)?;
            let body = parse_body(&read_input(input.as_deref())?)?;
            let outcome = service.create(&actor, &body)?;
            serde_json::to_value(outcome)?
        }
        Commands::List {
            actor,
            start,
            end,
            users,
        } => {
            let actor = resolve_actor(&service, &actor)?;
            let user_ids = users.as_deref().map(parse_user_ids).transpose()?;
            let query = AvailabilityQuery::new(start, end).with_users(user_ids.unwrap_or_default());
            json!({ "success": true, "data": service.list(&actor, &query)? })
        }
        Commands::Update {
            id,
            actor,
            all,
            input,
        } => {
            let actor = resolve_actor(&service, &actor)?;
            let body: UpdateAvailability = parse_body(&read_input(input.as_deref())?)?;
            let scope = body.scope(all)?;
            service.update(&actor, id, scope, &body)?;
            json!({ "success": true, "message": "Availability updated successfully" })
        }
        Commands::Delete {
            id,
            actor,
            all,
            input,
        } => {
            let actor = resolve_actor(&service, &actor)?;
            let body: DeleteAvailability = match input {
                Some(path) => parse_body(&read_input(Some(&path))?)?,
                None => DeleteAvailability::default(),
            };
            service.delete(&actor, id, body.scope(all)?)?;
            json!({ "success": true, "message": "Availability deleted successfully" })
        }
    };

    Ok(output)
}

/// Look up the acting user by email.
fn resolve_actor(service: &AvailabilityService, email: &str) -> Result<Actor> {
    let user = store::find_user_by_email(service.store().conn(), email)?
        .with_context(|| format!("No user registered with email '{email}'"))?;
    Ok(user.actor())
}

/// Render an error as the failure envelope.
fn failure(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<TeamcalError>() {
        Some(TeamcalError::Conflict { details }) => json!({
            "success": false,
            "message": err.to_string(),
            "details": details,
        }),
        Some(TeamcalError::Storage(_)) => {
            // SQLite messages can carry statement text; keep them in the log only.
            error!("{err:#}");
            json!({ "success": false, "message": "Internal storage error" })
        }
        Some(engine) => json!({ "success": false, "message": engine.to_string() }),
        None => json!({ "success": false, "message": format!("{err:#}") }),
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
