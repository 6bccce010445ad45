// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run command
//!
//! Drives the context awareness service for a fixed number of cycles against
//! either a scripted telemetry replay (`--frames`) or the live host, and
//! prints the environment and decision of each cycle followed by insights.

use anyhow::{Context, Result};
use clap::Args;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use aegis_context::application::{ContextAwarenessService, ContextInsights};
use aegis_context::infrastructure::{
    HostTelemetryProvider, InMemoryPersistenceStore, ScriptedTelemetryProvider,
};
use aegis_context::{
    ContextConfigManifest, ContextSnapshot, ContextualDecision, HealthStatus, TelemetryProvider,
};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON file holding an array of telemetry frames to replay instead of
    /// reading the live host
    #[arg(long, value_name = "FILE")]
    pub frames: Option<PathBuf>,

    /// Number of cycles to run
    #[arg(long, default_value_t = 1)]
    pub cycles: u32,

    /// Pause between cycles, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub pause_ms: u64,

    /// Directory for learned state; restored before and saved after the run
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Print final insights as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let manifest = ContextConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let telemetry: Arc<dyn TelemetryProvider> = match &args.frames {
        Some(path) => {
            let provider = ScriptedTelemetryProvider::from_json_file(path)
                .with_context(|| format!("Failed to read telemetry frames from {:?}", path))?;
            info!(frames = provider.frame_count(), "Replaying scripted telemetry");
            Arc::new(provider)
        }
        None => {
            info!("Reading live host telemetry");
            Arc::new(HostTelemetryProvider::new())
        }
    };

    let service = match &args.state_dir {
        Some(dir) => {
            let service =
                ContextAwarenessService::with_local_store(manifest.spec, telemetry, dir.clone())?;
            let samples = service.history().load().await;
            let patterns = service.optimizer().load().await;
            info!(samples, patterns, "Restored learned state from {:?}", dir);
            service
        }
        None => ContextAwarenessService::new(
            manifest.spec,
            telemetry,
            Arc::new(InMemoryPersistenceStore::new()),
        )?,
    };

    for cycle in 1..=args.cycles {
        let decision = service.run_once().await?;
        let decision = service
            .decision_engine()
            .decision(decision.id)
            .unwrap_or(decision);

        println!("{}", format!("── Cycle {}/{} ──", cycle, args.cycles).bold());
        if let Some(environment) = service.get_current_environment() {
            print_environment(&environment);
        }
        print_decision(&decision);
        println!();

        if args.pause_ms > 0 && cycle < args.cycles {
            tokio::time::sleep(Duration::from_millis(args.pause_ms)).await;
        }
    }

    let insights = service.get_insights();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        print_insights(&insights);
    }

    if args.state_dir.is_some() {
        service.save().await?;
        println!("{}", "✓ Learned state saved".green());
    }

    Ok(())
}

fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "n/a".to_string(),
    }
}

fn colored_health(status: HealthStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        HealthStatus::Excellent | HealthStatus::Good => label.green(),
        HealthStatus::Fair => label.yellow(),
        HealthStatus::Poor | HealthStatus::Critical => label.red(),
    }
}

fn print_environment(environment: &ContextSnapshot) {
    println!("{}", "Environment:".bold());
    println!(
        "  Health: {} ({:.0})",
        colored_health(environment.health),
        environment.health_score
    );
    println!(
        "  CPU: {}  Memory: {}  Disk: {}",
        format_percent(environment.metrics.cpu_percent),
        format_percent(environment.metrics.memory_percent),
        format_percent(environment.metrics.disk_percent)
    );
    println!(
        "  Pressure: {:.2}  Applications: {}  Relationships: {}",
        environment.resource_pressure.overall,
        environment.applications.len(),
        environment.relationship_count
    );
    for change in environment.recent_changes.iter().rev().take(3) {
        println!(
            "  {} {} ({:?}, significance {:.2})",
            "Δ".cyan(),
            change.description,
            change.severity,
            change.significance
        );
    }
}

fn print_decision(decision: &ContextualDecision) {
    println!("{}", "Decision:".bold());
    match decision.selected_alternative() {
        Some(selected) => println!(
            "  {} → {} (score {:.2})",
            decision.decision_type,
            selected.alternative.id.bold(),
            selected.overall_score
        ),
        None => println!("  {} → {}", decision.decision_type, "no action".dimmed()),
    }
    println!(
        "  Confidence: {:.2} ({:?})  Executed: {}",
        decision.confidence,
        decision.confidence_tier,
        if decision.executed {
            "yes".green()
        } else {
            "no".dimmed()
        }
    );
    for reason in &decision.reasoning {
        println!("  - {}", reason);
    }
}

fn print_insights(insights: &ContextInsights) {
    println!("{}", "Insights:".bold());
    if let Some(health) = &insights.health {
        println!(
            "  Health: {} ({:.0})",
            colored_health(health.status),
            health.score
        );
        for recommendation in &health.recommendations {
            println!("    • {}", recommendation);
        }
    }
    println!(
        "  Monitor: {} captures, {} changes, {} relationships",
        insights.monitor.captures,
        insights.monitor.changes_recorded,
        insights.monitor.relationships_discovered
    );
    println!(
        "  Optimizer: {} decisions, {} applied, {} patterns, state {}",
        insights.optimizer.decisions_made,
        insights.optimizer.decisions_applied,
        insights.optimizer.learned_patterns,
        insights
            .optimizer
            .current_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "  Decisions: {} made, {} executed, success rate {}",
        insights.decisions.stats.decisions_made,
        insights.decisions.stats.executed,
        insights
            .decisions
            .success_rate
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!(
        "  History: {} samples, {} patterns, prediction accuracy {}",
        insights.history.samples_recorded,
        insights.history.patterns,
        insights
            .history
            .accuracy()
            .map(|a| format!("{:.0}%", a * 100.0))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!(
        "  Adaptations: {} applied, {} rate limited, {} without handler, {} rejected",
        insights.adaptations.applied,
        insights.adaptations.rate_limited,
        insights.adaptations.no_handler,
        insights.adaptations.rejected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(42.26)), "42.3%");
        assert_eq!(format_percent(None), "n/a");
    }

    #[tokio::test]
    async fn test_run_replays_frames_and_saves_state() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames.json");
        std::fs::write(
            &frames,
            r#"[
                {"metrics": {"cpu_percent": 10.0, "memory_percent": 20.0}},
                {"metrics": {"cpu_percent": 85.0, "memory_percent": 90.0}}
            ]"#,
        )
        .unwrap();
        let state = dir.path().join("state");

        let args = RunArgs {
            frames: Some(frames),
            cycles: 2,
            pause_ms: 0,
            state_dir: Some(state.clone()),
            json: true,
        };
        execute(args, None).await.unwrap();

        assert!(state.join("context_history.samples.json").exists());
    }

    #[tokio::test]
    async fn test_run_defaults_to_live_host() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        let args = RunArgs {
            frames: None,
            cycles: 1,
            pause_ms: 0,
            state_dir: Some(state.clone()),
            json: true,
        };
        execute(args, None).await.unwrap();

        let saved = std::fs::read(state.join("context_history.samples.json")).unwrap();
        let samples: Vec<serde_json::Value> = serde_json::from_slice(&saved).unwrap();
        assert_eq!(samples.len(), 1);
        // A real host always has at least this process running.
        assert!(!samples[0]["active_apps"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_frames_file_is_an_error() {
        let args = RunArgs {
            frames: Some(PathBuf::from("/nonexistent/frames.json")),
            cycles: 1,
            pause_ms: 0,
            state_dir: None,
            json: false,
        };
        assert!(execute(args, None).await.is_err());
    }
}
