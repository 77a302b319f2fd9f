//! Slotgate CLI Entry Point
//!
//! Subcommands:
//! - `serve` - line-delimited JSON host loop on stdio
//! - `exec` - run one batch given on the command line
//! - `keys` - list the symbolic command surface
//! - `init` - write a starter configuration file
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use slotgate::config::{config_path, save_config, template};
use slotgate::{
    load_with_precedence, CommandBatch, CommandTable, ConfigLocation, DatabaseType, Dispatcher,
    Driver, ExtensionConfig, InboundRequest, SlotRegistry,
};

/// Slotgate - command-routed gateway onto six database connection slots
#[derive(Parser)]
#[command(name = "slotgate")]
#[command(about = "Maps symbolic host commands onto six addressable database connection slots")]
#[command(version)]
struct Cli {
    /// Configuration file (default: .slotgate/config.json, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve command batches on stdin/stdout, one JSON batch per line
    Serve,

    /// Run one batch built from the arguments and print the result
    Exec {
        /// Commands as NAME or NAME=VALUE, e.g. CONNECT "setQUERY=SELECT 1" READ
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// List every symbolic command name
    Keys,

    /// Write a starter configuration file
    Init {
        /// Database engine for every slot
        #[arg(long, default_value = "postgres", value_parser = parse_engine)]
        engine: DatabaseType,

        /// Write to the user config directory instead of the current directory
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

enum Action {
    Serve,
    Exec(Vec<InboundRequest>),
}

fn parse_engine(raw: &str) -> Result<DatabaseType, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown engine '{raw}' (expected postgres, mysql or sqlite)"))
}

fn parse_request(arg: &str) -> InboundRequest {
    match arg.split_once('=') {
        Some((name, value)) => InboundRequest::with_value(name, value),
        None => InboundRequest::new(arg),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,slotgate=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let envelope = json!({
                "ok": false,
                "error": { "code": "FATAL", "message": format!("{e:#}") },
            });
            println!("{envelope}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let action = match cli.command {
        Commands::Keys => {
            let table = CommandTable::standard();
            println!("{}", serde_json::to_string_pretty(&table.names())?);
            return Ok(());
        }
        Commands::Init { engine, global, force } => {
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            let path = config_path(location)?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            save_config(&path, &template(engine))?;
            println!("{}", json!({ "ok": true, "path": path.display().to_string() }));
            return Ok(());
        }
        Commands::Serve => Action::Serve,
        Commands::Exec { commands } => Action::Exec(commands.iter().map(String::as_str).map(parse_request).collect()),
    };

    let (config, source) =
        load_with_precedence(cli.config.as_deref()).context("Failed to load configuration")?;
    match &source {
        Some(path) => tracing::info!(path = %path.display(), engine = %config.engine, "configuration loaded"),
        None => tracing::warn!("no configuration file found, every slot is Not Configured"),
    }

    match config.engine {
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => run(slotgate::PostgresDriver, config, action).await,
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => run(slotgate::MySqlDriver, config, action).await,
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => run(slotgate::SqliteDriver, config, action).await,
        #[allow(unreachable_patterns)]
        other => Err(anyhow!("engine '{other}' is not compiled into this build")),
    }
}

async fn run<D: Driver>(driver: D, config: ExtensionConfig, action: Action) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(Arc::new(SlotRegistry::from_config(driver, config)));

    match action {
        Action::Serve => slotgate::host::serve(dispatcher).await,
        Action::Exec(commands) => {
            let mut batch = CommandBatch::new(commands);
            dispatcher.dispatch_batch(&mut batch).await;
            dispatcher.registry().close_all().await;
            println!("{}", serde_json::to_string_pretty(&batch)?);
            Ok(())
        }
    }
}
