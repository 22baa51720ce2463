//! autoflow
//!
//! Command-line front end for the automation engine. Logs go to stderr so
//! stdout carries only JSON results.

mod engine;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use af_automation::{AutomationDefinition, AutomationResult};
use af_config::{load_yaml_path, EngineConfig};
use af_core::Event;
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::Engine;

#[derive(Parser)]
#[command(name = "autoflow")]
#[command(about = "Evaluate events against trigger/condition/action automations")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the configured automations and dispatch a stream of events
    ///
    /// Events are read one JSON object per line, e.g.
    /// `{"event_type": "motion", "data": {"area": "porch"}}`.
    /// One JSON result is printed per automation and event.
    Run {
        /// Engine configuration file
        #[arg(short, long, env = "AUTOFLOW_CONFIG")]
        config: PathBuf,

        /// Event file (JSON lines); reads stdin when omitted
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Run one automation definition against one event without registering it
    Playground {
        /// Automation definition (YAML or JSON)
        #[arg(short, long)]
        automation: PathBuf,

        /// Event (JSON)
        #[arg(short, long)]
        event: PathBuf,

        /// Attach the execution trace to the result
        #[arg(short, long)]
        trace: bool,

        /// Engine configuration to take settings from
        #[arg(short, long, env = "AUTOFLOW_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    match Cli::parse().command {
        Command::Run { config, events } => run(&config, events.as_deref()),
        Command::Playground {
            automation,
            event,
            trace,
            config,
        } => playground(&automation, &event, trace, config.as_deref()),
    }
}

fn run(config_path: &Path, events: Option<&Path>) -> Result<()> {
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let engine = Engine::from_config(&config)?;
    let mut notifications = engine.bus.subscribe_all();

    let input: Box<dyn BufRead> = match events {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut dispatched = 0usize;

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = index + 1, error = %err, "Skipping malformed event");
                continue;
            }
        };

        let results = engine
            .dispatch(event)
            .with_context(|| format!("dispatch failed for event on line {}", index + 1))?;
        for result in &results {
            write_result(&mut out, result, false)?;
        }
        dispatched += 1;

        while let Ok(notification) = notifications.try_recv() {
            debug!(event_type = %notification.event_type, "Lifecycle notification");
        }
    }

    info!(events = dispatched, "Event stream finished");
    Ok(())
}

fn playground(
    automation_path: &Path,
    event_path: &Path,
    trace: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    // Only the playground automation runs
    config.automations.clear();
    let engine = Engine::from_config(&config)?;

    let definition: AutomationDefinition = serde_yaml::from_value(load_yaml_path(automation_path)?)
        .with_context(|| format!("invalid automation in {}", automation_path.display()))?;

    let event: Event = serde_json::from_reader(BufReader::new(
        File::open(event_path).with_context(|| format!("failed to open {}", event_path.display()))?,
    ))
    .with_context(|| format!("invalid event in {}", event_path.display()))?;

    let result = engine.playground(definition, event, trace)?;
    write_result(&mut io::stdout().lock(), &result, true)
}

fn write_result(out: &mut impl Write, result: &AutomationResult, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, result)?;
    } else {
        serde_json::to_writer(&mut *out, result)?;
    }
    writeln!(out)?;
    Ok(())
}
