//! Operations dashboard backend.
//!
//! `serve` runs the HTTP API; the other subcommands are operator tools that
//! work on the store directly.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ops_dashboard::config::{AppConfig, ServeConfig};
use ops_dashboard::credentials::CredentialService;
use ops_dashboard::db::Database;
use ops_dashboard::models::{RegisterOutcome, RegisterPayload, Role};
use ops_dashboard::records::RecordAccessor;
use ops_dashboard::transfer::CsvTransfer;

#[derive(Parser, Debug)]
#[command(name = "ops-dashboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve(ServeConfig),

    /// Load every CSV in a directory, one table per file.
    Ingest {
        /// Directory to scan; defaults to the data directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Create a user account.
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long, env = "DASHBOARD_NEW_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, default_value = "user", value_parser = parse_role)]
        role: Role,
    },

    /// Drop a domain table.
    DropTable {
        table: String,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    ops_dashboard::init_tracing(cli.config.log_dir.as_deref())
        .map_err(|error| anyhow::anyhow!(error))
        .context("failed to initialise logging")?;

    let db_path = cli.config.database_path();
    match cli.command {
        Command::Serve(serve) => {
            ops_dashboard::serve(&cli.config, &serve).await?;
        }
        Command::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| cli.config.data_dir.clone());
            let db = Database::new(&db_path)?;
            let transfer = CsvTransfer::new(db.clone(), RecordAccessor::new(db));
            let reports = transfer
                .ingest_dir(&dir)
                .with_context(|| format!("failed to ingest {}", dir.display()))?;
            for report in reports {
                println!("{}: {} rows, {} columns", report.table, report.rows, report.columns.len());
            }
        }
        Command::CreateUser { username, password, role } => {
            let credentials = CredentialService::new(Database::new(&db_path)?);
            let payload = RegisterPayload {
                username: username.trim().to_string(),
                password,
                password_confirmation: None,
                role,
            };
            match credentials.register_from_payload(&payload)? {
                RegisterOutcome::Created => println!("created {} ({})", payload.username, role.as_str()),
                RegisterOutcome::Duplicate => anyhow::bail!("user '{}' already exists", payload.username),
            }
        }
        Command::DropTable { table } => {
            let db = Database::new(&db_path)?;
            CsvTransfer::new(db.clone(), RecordAccessor::new(db)).drop_table(&table)?;
            println!("dropped {}", table);
        }
    }

    Ok(())
}
