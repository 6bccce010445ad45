// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_context::ContextConfigManifest;

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

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./aegis-context.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = ContextConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. AEGIS_CONTEXT_CONFIG_PATH: {}",
            std::env::var("AEGIS_CONTEXT_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-context.yaml");
        println!("  4. ~/.aegis/context.yaml");
        println!("  5. /etc/aegis/context.yaml");
        match ContextConfigManifest::discover_config() {
            Some(found) => println!("  Using: {}", found.display().to_string().green()),
            None => println!("  Using: {}", "built-in defaults".dimmed()),
        }
        println!();
    }

    let spec = &manifest.spec;
    println!("{} {}", "Configuration:".bold(), manifest.metadata.name);
    println!();

    println!("{}", "Monitor:".bold());
    println!("  Interval: {:?}", spec.monitor.interval);
    println!("  Probe timeout: {:?}", spec.monitor.probe_timeout);
    println!("  Change sensitivity: {}", spec.monitor.change_sensitivity);
    println!();

    println!("{}", "Optimizer:".bold());
    println!("  Interval: {:?}", spec.optimizer.interval);
    println!("  Mode: {:?}", spec.optimizer.mode);
    println!("  Learning rate: {}", spec.optimizer.learning_rate);
    println!("  Confidence threshold: {}", spec.optimizer.confidence_threshold);
    println!();

    println!("{}", "Decision engine:".bold());
    println!("  Confidence threshold: {}", spec.decision.confidence_threshold);
    println!("  Max alternatives: {}", spec.decision.max_alternatives);
    println!("  Learning rate: {}", spec.decision.learning_rate);
    println!();

    println!("{}", "History:".bold());
    println!("  Capacity: {}", spec.history.capacity);
    println!("  Pattern detection: every {:?}", spec.history.pattern_detection_interval);
    println!("  Prediction horizon: {:?}", spec.history.prediction_horizon);
    println!();

    println!("{}", "Adaptation:".bold());
    println!("  Auto adapt: {}", spec.adaptation.auto_adapt);
    println!("  Max per minute: {}", spec.adaptation.max_per_minute);
    println!("  Suggestion cooldown: {:?}", spec.adaptation.suggestion_cooldown);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = ContextConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    manifest
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    ContextConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_config_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.yaml");

        generate(&path, false).unwrap();
        validate(Some(path.clone())).unwrap();

        assert!(generate(&path, false).is_err());
        generate(&path, true).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context.yaml");
        std::fs::write(
            &path,
            "apiVersion: 100monkeys.ai/v1\nkind: ContextConfig\nmetadata:\n  name: bad\nspec:\n  adaptation:\n    max_per_minute: 0\n",
        )
        .unwrap();

        assert!(validate(Some(path)).is_err());
    }
}
