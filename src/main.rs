mod simulate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use vanet_engine::{CycleReport, ScenarioOrchestrator};
use vanet_settings::{load_settings, load_settings_from_path, AdvisorSettings};
use vanet_telemetry::{init_telemetry, with_bootstrap_logging, MetricsRecorder, TelemetryConfig};

use crate::simulate::{TrafficConfig, TrafficGenerator};

#[derive(Parser)]
#[command(name = "vanet-advisor", version, about = "Driver advisories from V2V/V2I message batches")]
struct Cli {
    /// Settings file (defaults to ~/.vanet/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one cycle over a JSON array of messages.
    Run {
        #[arg(long)]
        input: PathBuf,
    },
    /// Feed synthetic traffic through consecutive cycles sharing one context store.
    Simulate {
        #[arg(long, default_value_t = 2)]
        steps: usize,
        #[arg(long, default_value_t = 50)]
        messages: usize,
        /// Packet loss probability.
        #[arg(long, default_value_t = 0.1, value_parser = parse_probability)]
        loss: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is outside [0, 1]"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = with_bootstrap_logging(|| match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => load_settings().context("loading settings"),
    })?;

    let telemetry = init_telemetry(telemetry_config(&settings));
    let metrics = telemetry.metrics();

    let orchestrator = build_orchestrator(&settings, metrics.clone())?;

    match cli.command {
        Command::Run { input } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let values: Vec<serde_json::Value> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array of messages", input.display()))?;
            let report = orchestrator.run_cycle_values(values).await?;
            print_report(&report)?;
        }
        Command::Simulate {
            steps,
            messages,
            loss,
            seed,
        } => {
            let mut generator = TrafficGenerator::new(TrafficConfig { messages, loss }, seed);
            for step in 1..=steps {
                let batch = generator.batch();
                info!(step, messages = batch.len(), "simulated batch received");
                let report = orchestrator.run_cycle(batch).await?;
                print_report(&report)?;
            }
        }
    }

    if let Some(metrics) = metrics {
        info!(
            metrics = %serde_json::to_string(&metrics.snapshot())?,
            "metrics snapshot"
        );
    }
    Ok(())
}

fn telemetry_config(settings: &AdvisorSettings) -> TelemetryConfig {
    TelemetryConfig {
        json: settings.logging.json,
        ..TelemetryConfig::default()
    }
    .with_level_name(&settings.logging.level)
    .with_module_level_names(&settings.logging.modules)
}

fn build_orchestrator(
    settings: &AdvisorSettings,
    metrics: Option<Arc<MetricsRecorder>>,
) -> anyhow::Result<ScenarioOrchestrator> {
    let backend = vanet_llm::backend_from_settings(&settings.backend)
        .context("configuring instruction backend")?;
    let orchestrator = ScenarioOrchestrator::from_settings(settings, Some(backend));
    Ok(match metrics {
        Some(m) => orchestrator.with_metrics(m),
        None => orchestrator,
    })
}

fn print_report(report: &CycleReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}
