use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pickup_api::PickupApi;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "recogidas")]
#[command(about = "Pickup records CLI")]
struct Cli {
    #[arg(long, default_value = "./recogidas.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Append the rows of a carrier workbook.
    Import(ImportArgs),
    /// Grouped listing, or every raw row with `--raw`.
    List(ListArgs),
    Search(SearchArgs),
    /// Write every raw row as CSV.
    Export(ExportArgs),
    /// Delete every stored pickup.
    Clear,
    Status,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, default_value_t = false)]
    raw: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long)]
    query: String,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long, default_value = "./export.csv")]
    out: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() {
    init_tracing();

    if let Err(err) = run(Cli::parse()) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let export_path = match &cli.command {
        Command::Export(args) => args.out.clone(),
        _ => PathBuf::from("./export.csv"),
    };
    let api = PickupApi::new(cli.db, export_path);

    let value = match cli.command {
        Command::Import(args) => serde_json::to_value(api.import_workbook_file(&args.file)?)?,
        Command::List(args) if args.raw => serde_json::to_value(api.list_all()?)?,
        Command::List(_) => serde_json::to_value(api.list_grouped()?)?,
        Command::Search(args) => serde_json::to_value(api.search(&args.query)?)?,
        Command::Export(_) => serde_json::to_value(api.export()?)?,
        Command::Clear => serde_json::to_value(api.clear()?)?,
        Command::Status => serde_json::to_value(api.status()?)?,
    };
    emit_json(value)
}
