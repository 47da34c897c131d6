// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use cozy_apps_core::domain::config::{AppsConfigManifest, FsConfig};

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./cozy-apps.yaml)
        #[arg(short, long, default_value = "./cozy-apps.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = AppsConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. COZY_APPS_CONFIG_PATH: {}",
            std::env::var("COZY_APPS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./cozy-apps.yaml");
        println!("  4. ~/.cozy/apps.yaml");
        println!("  5. /etc/cozy/apps.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Domain: {}", config.spec.domain);
    println!();

    println!("{}", "Storage:".bold());
    match &config.spec.fs {
        FsConfig::Local { path } => println!("  Local directory: {}", path.display()),
        FsConfig::Swift { url, .. } => println!("  Swift: {}", url),
    }
    match &config.spec.couchdb {
        Some(couchdb) => println!("  CouchDB: {}", couchdb.url),
        None => println!("  CouchDB: {}", "(in memory)".dimmed()),
    }
    println!();

    println!("{}", "Registries:".bold());
    if config.spec.registries.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for registry in &config.spec.registries {
        println!("  - {}", registry);
    }
    println!();

    println!("{}", "HTTP:".bold());
    println!("  Manifest timeout: {}s", config.spec.http.manifest_timeout_secs);
    println!("  Fetch timeout: {}s", config.spec.http.fetch_timeout_secs);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = AppsConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = AppsConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_writes_template() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("cozy-apps.yaml");
        generate(output.clone(), false).await.unwrap();
        let written = std::fs::read_to_string(output).unwrap();
        assert_eq!(written, MINIMAL_TEMPLATE);
    }
}
