use anyhow::{Context, Result};
use argus_core::{ledger, Ledger, LedgerPolicy, LedgerRow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

const BUS_NAME: &str = "org.argus.Argus1";
const OBJECT_PATH: &str = "/org/argus/Argus1";

#[derive(Parser)]
#[command(name = "argus", about = "Argus detection log CLI")]
struct Cli {
    /// Known-identity ledger file
    #[arg(long, default_value = "assets/Attendance.csv", global = true)]
    ledger: PathBuf,

    /// Unknown-face log file
    #[arg(long, default_value = "assets/UnknownLog.csv", global = true)]
    unknown_log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Truncate the ledger to its header row
    ClearLogs {
        /// Rewrite the file directly instead of asking the running daemon
        #[arg(long)]
        offline: bool,
    },
    /// Print ledger rows
    Ledger {
        /// Only rows for this name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print logged unknown faces
    Unknowns,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ClearLogs { offline: true } => {
            Ledger::new(&cli.ledger, LedgerPolicy::default())
                .clear()
                .with_context(|| format!("clearing {}", cli.ledger.display()))?;
            println!("Cleared {}", cli.ledger.display());
        }
        Commands::ClearLogs { offline: false } => {
            let reply = call_daemon("ClearLogs").await?;
            let cleared: bool = reply.body().deserialize().context("decoding ClearLogs reply")?;
            if cleared {
                println!("Ledger cleared");
            }
        }
        Commands::Ledger { name } => {
            let rows = read(&cli.ledger)?;
            let name = name.map(|n| n.to_uppercase());
            let rows: Vec<_> = rows
                .into_iter()
                .filter(|r| name.as_ref().map_or(true, |n| &r.name == n))
                .collect();
            print_rows(&rows);
        }
        Commands::Unknowns => {
            print_rows(&read(&cli.unknown_log)?);
        }
        Commands::Status => {
            let reply = call_daemon("Status").await?;
            let status: String = reply.body().deserialize().context("decoding Status reply")?;
            let value: serde_json::Value =
                serde_json::from_str(&status).context("daemon returned invalid status")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<Vec<LedgerRow>> {
    ledger::read_rows(path).with_context(|| format!("reading {}", path.display()))
}

fn print_rows(rows: &[LedgerRow]) {
    if rows.is_empty() {
        println!("No entries");
        return;
    }
    for row in rows {
        println!(
            "{:<20} {}  {:>6.2}",
            row.name,
            row.last_timestamp.format(argus_core::record::TIMESTAMP_FORMAT),
            row.last_confidence
        );
    }
    println!("{} entries", rows.len());
}

async fn call_daemon(method: &str) -> Result<zbus::Message> {
    tracing::debug!(method, "calling argusd");
    let conn = zbus::Connection::session()
        .await
        .context("connecting to session bus")?;
    conn.call_method(Some(BUS_NAME), OBJECT_PATH, Some(BUS_NAME), method, &())
        .await
        .with_context(|| format!("calling {method} on argusd (is it running?)"))
}
