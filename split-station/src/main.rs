use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use label_printer::{PrinterConfig, PrinterLink};
use shared::models::User;
use split_station::store::InventoryStore;
use split_station::utils::init_logger_with_file;
use split_station::{Config, SplitError, SplitOrchestrator, SqliteInventoryStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Split warehouse boxes and print their labels
#[derive(Debug, Parser)]
#[command(name = "split-station", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the box with this batch number
    Lookup { batch: String },

    /// Split a box into the given quantities (the first stays in the original box)
    Split {
        batch: String,
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        quantities: Vec<f64>,
        #[arg(long, env = "SPLIT_USER_ID")]
        user_id: i64,
        #[arg(long, env = "SPLIT_USER_NAME", default_value = "")]
        user_name: String,
    },

    /// Printer endpoint settings
    Printer {
        #[command(subcommand)]
        action: PrinterAction,
    },
}

#[derive(Debug, Subcommand)]
enum PrinterAction {
    /// Print the current printer settings
    Show,
    /// Change and save the printer endpoint (a split waiting to retry picks it up)
    Set {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check that the printer accepts connections
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env();
    let _log_guard = init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    match cli.command {
        Command::Lookup { batch } => lookup(&config, &batch).await,
        Command::Split {
            batch,
            quantities,
            user_id,
            user_name,
        } => split(&config, &batch, &quantities, User::new(user_id, user_name)).await,
        Command::Printer { action } => printer(&config, action).await,
    }
}

async fn lookup(config: &Config, batch: &str) -> anyhow::Result<()> {
    let store = SqliteInventoryStore::connect(&config.database_url).await?;
    let source = store
        .find_batch(batch)
        .await
        .with_context(|| format!("Looking up batch {batch}"))?;
    println!("{}", serde_json::to_string_pretty(&source)?);
    Ok(())
}

async fn split(
    config: &Config,
    batch: &str,
    quantities: &[f64],
    user: User,
) -> anyhow::Result<()> {
    let store = SqliteInventoryStore::connect(&config.database_url).await?;
    let printer_config = PrinterConfig::load_or_default(&config.printer_config);
    let link = PrinterLink::new(printer_config.clone())?;
    let orch = SplitOrchestrator::new(store, link, &printer_config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling split");
            on_signal.cancel();
        }
    });

    loop {
        // Nothing is persisted before printing succeeds, so every run starts from a fresh read
        let source = orch
            .find_batch(batch)
            .await
            .with_context(|| format!("Looking up batch {batch}"))?;

        match orch
            .execute_with_cancel(&source, quantities, &user, &cancel)
            .await
        {
            Ok(outcome) => {
                for unit in &outcome.units {
                    println!("{}\t{}", unit.batch_id, unit.quantity);
                }
                info!(batch, units = outcome.units.len(), "Split completed");
                return Ok(());
            }
            Err(SplitError::Print(e)) => {
                eprintln!("{e}");
                if !confirm("Printer problem. Retry the split?").await? {
                    bail!("Split aborted by operator");
                }
                // The operator may have fixed the endpoint with `printer set` meanwhile
                let latest = PrinterConfig::load_or_default(&config.printer_config);
                let mut link = orch.printer().await;
                if *link.config() != latest {
                    link.reconfigure(latest).await?;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(format!("{question} [y/N] ").as_bytes())
        .await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

async fn printer(config: &Config, action: PrinterAction) -> anyhow::Result<()> {
    let path = &config.printer_config;
    match action {
        PrinterAction::Show => {
            let printer_config = PrinterConfig::load_or_default(path);
            println!("{}", serde_json::to_string_pretty(&printer_config)?);
        }
        PrinterAction::Set { host, port } => {
            let mut printer_config = PrinterConfig::load_or_default(path);
            if let Some(host) = host {
                printer_config.host = host;
            }
            if let Some(port) = port {
                printer_config.port = port;
            }
            printer_config.validate()?;
            printer_config.save(path)?;
            println!("Printer set to {}", printer_config.addr());
        }
        PrinterAction::Test => {
            let printer_config = PrinterConfig::load_or_default(path);
            PrinterLink::test_connection(&printer_config)
                .await
                .with_context(|| format!("Printer {} unreachable", printer_config.addr()))?;
            println!("Printer {} reachable", printer_config.addr());
        }
    }
    Ok(())
}
