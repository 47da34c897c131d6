// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! # cozy-apps
//!
//! Installs, updates and removes the webapps and konnectors of a Cozy
//! instance.
//!
//! ## Commands
//!
//! - `cozy-apps install|update|uninstall <slug>` - Drive one installer
//! - `cozy-apps show|list` - Inspect installed manifests
//! - `cozy-apps update-all` - Update every installed application
//! - `cozy-apps config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use cozy_apps::commands::{self, AppCommand, ConfigCommand};
use cozy_apps_core::domain::config::AppsConfigManifest;

/// Cozy application installer
#[derive(Parser)]
#[command(name = "cozy-apps")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "COZY_APPS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to spec.logging.level
    #[arg(long, global = true, env = "COZY_APPS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    App(AppCommand),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loading errors are reported again by the command itself
    let config = AppsConfigManifest::load_or_default(cli.config.clone()).ok();
    init_logging(&cozy_apps::log_level(cli.log_level, config.as_ref()))?;

    match cli.command {
        Some(Commands::App(command)) => commands::app::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
