// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Application commands
//!
//! Commands: install, update, uninstall, show, list, update-all

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use cozy_apps_core::application::InstallerOptions;
use cozy_apps_core::domain::app::{AppState, AppType};
use cozy_apps_core::domain::manifest::{AppManifest, Manifest};
use cozy_apps_core::domain::repository::Document;

use crate::embedded::EmbeddedInstaller;

#[derive(Subcommand)]
pub enum AppCommand {
    /// Install an application from a source URL
    Install {
        #[arg(value_name = "SLUG")]
        slug: String,

        /// git://, git+https://, registry://slug/channel or https://...tar.gz
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Application type (webapp or konnector)
        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,
    },

    /// Update an installed application
    Update {
        #[arg(value_name = "SLUG")]
        slug: String,

        /// New source URL (default: the installed one)
        #[arg(short, long)]
        source: Option<String>,

        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,

        /// Accept the new permissions requested by the update
        #[arg(long)]
        ack_permissions: bool,
    },

    /// Remove an installed application
    Uninstall {
        #[arg(value_name = "SLUG")]
        slug: String,

        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,
    },

    /// Show the manifest of an installed application (JSON)
    Show {
        #[arg(value_name = "SLUG")]
        slug: String,

        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,
    },

    /// List installed applications
    List {
        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,
    },

    /// Update every installed application
    #[command(name = "update-all")]
    UpdateAll {
        #[arg(short = 't', long = "type", default_value = "webapp")]
        app_type: AppType,

        /// Number of updates running at the same time
        #[arg(short = 'j', long, default_value = "4")]
        concurrency: usize,

        #[arg(long)]
        ack_permissions: bool,
    },
}

pub async fn handle_command(command: AppCommand, config_path: Option<PathBuf>) -> Result<()> {
    let embedded = EmbeddedInstaller::new(config_path)?;

    match command {
        AppCommand::Install {
            slug,
            source,
            app_type,
        } => {
            let man = embedded
                .run(InstallerOptions::install(app_type, slug, source))
                .await
                .context("Installation failed")?;
            print_done("Installed", &man);
        }
        AppCommand::Update {
            slug,
            source,
            app_type,
            ack_permissions,
        } => {
            let mut opts = InstallerOptions::update(app_type, slug).with_permissions_acked(ack_permissions);
            opts.source_url = source;
            let man = embedded.run(opts).await.context("Update failed")?;
            match &man.doc().available_version {
                Some(pending) => println!(
                    "{}",
                    format!(
                        "⚠ {} {} requests new permissions; run again with --ack-permissions",
                        man.slug(),
                        pending
                    )
                    .yellow()
                ),
                None => print_done("Updated", &man),
            }
        }
        AppCommand::Uninstall { slug, app_type } => {
            embedded
                .run(InstallerOptions::delete(app_type, slug.clone()))
                .await
                .context("Uninstall failed")?;
            println!("{}", format!("✓ {} {} removed", app_type, slug).green());
        }
        AppCommand::Show { slug, app_type } => {
            let man = embedded.show(app_type, &slug).await?;
            let json = man.to_json()?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        AppCommand::List { app_type } => list(&embedded, app_type).await?,
        AppCommand::UpdateAll {
            app_type,
            concurrency,
            ack_permissions,
        } => {
            let outcomes = embedded.update_all(app_type, concurrency, ack_permissions).await?;
            for outcome in &outcomes {
                match (&outcome.result, outcome.new_version(), outcome.pending_version()) {
                    (Err(e), _, _) => println!("  {} {}: {}", "✗".red(), outcome.slug.bold(), e),
                    (Ok(_), _, Some(pending)) => {
                        println!("  {} {}: {} needs permissions", "⚠".yellow(), outcome.slug.bold(), pending)
                    }
                    (Ok(_), Some(version), None) => println!(
                        "  {} {}: {} → {}",
                        "✓".green(),
                        outcome.slug.bold(),
                        outcome.previous_version,
                        version
                    ),
                    (Ok(_), None, None) => {
                        println!("  {} {}: up to date", "·".dimmed(), outcome.slug.bold())
                    }
                }
            }
            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} updates failed", failed, outcomes.len());
            }
        }
    }

    Ok(())
}

async fn list(embedded: &EmbeddedInstaller, app_type: AppType) -> Result<()> {
    let manifests = embedded.list(app_type).await?;
    if manifests.is_empty() {
        println!("{}", format!("No {} installed", app_type).yellow());
        return Ok(());
    }

    println!("{:<24} {:<52} {}", "SLUG", "VERSION", "STATE");
    for man in manifests {
        let state = match man.state() {
            AppState::Ready => man.state().to_string().green(),
            AppState::Errored => man.state().to_string().red(),
            _ => man.state().to_string().yellow(),
        };
        println!("{:<24} {:<52} {}", man.slug().bold(), man.version(), state);
    }
    Ok(())
}

fn print_done(verb: &str, man: &AppManifest) {
    println!(
        "{}",
        format!("✓ {} {} {} ({})", verb, man.app_type(), man.slug(), man.version()).green()
    );
}
