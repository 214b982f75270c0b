// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tome - extension registry and lifecycle manager.
//!
//! This is the binary entry point: it loads configuration, opens the
//! registry, and dispatches to the command modules.

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tome_config::TomeConfig;
use tome_core::{SourceId, TomeError};
use tome_extension::ExtensionManager;
use tome_storage::Database;

use crate::output::Output;

/// Tome - extension registry and lifecycle manager.
#[derive(Parser, Debug)]
#[command(name = "tome", version, about, long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Browse and manage extensions.
    #[command(subcommand)]
    Extensions(ExtensionsCommand),
    /// Inspect and call installed sources.
    #[command(subcommand)]
    Sources(SourcesCommand),
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ExtensionsCommand {
    /// List catalog and installed extensions.
    List {
        /// Refresh the catalog even if the refresh interval has not elapsed.
        #[arg(long)]
        refresh: bool,
    },
    /// Install an extension from the catalog.
    Install {
        pkg: String,
        /// Reinstall if already installed.
        #[arg(long)]
        force: bool,
    },
    /// Install an extension package from a local file.
    InstallFile { path: PathBuf },
    /// Uninstall an extension.
    Uninstall { pkg: String },
    /// Apply the staged update of an installed extension.
    Update { pkg: String },
}

#[derive(Subcommand, Debug)]
enum SourcesCommand {
    /// List sources of installed extensions.
    List,
    /// Call a method on a source.
    Invoke {
        id: SourceId,
        method: String,
        /// JSON arguments passed to the method.
        #[arg(value_parser = parse_json_args)]
        args: Option<serde_json::Value>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print the effective settings.
    Check,
}

fn parse_json_args(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match tome_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tome_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);
    let out = Output::new(cli.json, cli.plain);

    if let Err(e) = run(cli.command, &config, &out).await {
        out.error(&e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &TomeConfig, out: &Output) -> Result<(), TomeError> {
    if let Commands::Config(ConfigCommand::Check) = command {
        return commands::config_check(config, out);
    }

    let db = Arc::new(Database::open(&config.storage.database_path, config.storage.wal_mode).await?);
    let manager = ExtensionManager::new(Arc::clone(&db), config)?;

    let result = match command {
        Commands::Extensions(cmd) => match cmd {
            ExtensionsCommand::List { refresh } => {
                commands::list_extensions(&manager, refresh, out).await
            }
            ExtensionsCommand::Install { pkg, force } => {
                commands::install(&manager, &pkg, force, out).await
            }
            ExtensionsCommand::InstallFile { path } => {
                commands::install_file(&manager, &path, out).await
            }
            ExtensionsCommand::Uninstall { pkg } => commands::uninstall(&manager, &pkg, out).await,
            ExtensionsCommand::Update { pkg } => commands::update(&manager, &pkg, out).await,
        },
        Commands::Sources(cmd) => match cmd {
            SourcesCommand::List => commands::list_sources(&manager, out).await,
            SourcesCommand::Invoke { id, method, args } => {
                let args = args.unwrap_or(serde_json::Value::Null);
                commands::invoke(&manager, id, &method, args, out).await
            }
        },
        Commands::Config(_) => Ok(()),
    };

    if let Err(e) = db.checkpoint().await {
        tracing::warn!(error = %e, "WAL checkpoint on exit failed");
    }
    result
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tome={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
