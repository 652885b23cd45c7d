//! casedesk - drive the call coordinator from the command line

mod script;

use anyhow::{Context, Result};
use casedesk_call_coordinator::adapters::{MemoryChannel, MemoryTelephony};
use casedesk_call_coordinator::disposition::MemoryDispositionSink;
use casedesk_call_coordinator::logging::parse_log_level;
use casedesk_call_coordinator::{
    normalize_number, setup_logging, CallCoordinator, CoordinatorConfig, CoordinatorEvent,
    LoggingConfig,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use script::Simulation;

#[derive(Parser, Debug)]
#[command(author, version, about = "Agent call coordinator tools", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CASEDESK_LOG", default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted call scenario against in-memory adapters
    Simulate {
        /// JSON script of steps
        #[arg(short, long)]
        script: PathBuf,

        /// Coordinator config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print coordinator events as they happen
        #[arg(long)]
        events: bool,
    },

    /// Validate a coordinator config file and print the effective values
    CheckConfig {
        path: PathBuf,
    },

    /// Normalize phone numbers the way outbound dialing does
    Normalize {
        #[arg(required = true)]
        numbers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&cli.log_level)?);
    if cli.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    match cli.command {
        Command::Simulate {
            script,
            config,
            events,
        } => simulate(script, config, events).await,
        Command::CheckConfig { path } => check_config(path),
        Command::Normalize { numbers } => {
            normalize(&numbers);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<CoordinatorConfig> {
    let config = match path {
        Some(path) => CoordinatorConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CoordinatorConfig::new().with_room_key("simulator"),
    };
    config.validate()?;
    Ok(config)
}

async fn simulate(script_path: PathBuf, config: Option<PathBuf>, print_events: bool) -> Result<()> {
    let steps = script::load(&script_path)?;
    let config = load_config(config)?;

    let telephony = Arc::new(MemoryTelephony::new());
    let channel = Arc::new(MemoryChannel::new());
    let coordinator =
        CallCoordinator::start(config, telephony.clone(), channel.clone(), "simulator-token")?;

    let printer = print_events.then(|| {
        let mut stream = coordinator.subscribe();
        tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                match event {
                    // One line per second of talk time is noise
                    CoordinatorEvent::StateChanged { .. } => {}
                    CoordinatorEvent::ShutDown => {
                        println!("  event: {:?}", event);
                        break;
                    }
                    other => println!("  event: {:?}", other),
                }
            }
        })
    });

    let sim = Simulation {
        coordinator: coordinator.clone(),
        telephony,
        channel,
        sink: MemoryDispositionSink::new(),
    };

    info!("Running {} steps from {}", steps.len(), script_path.display());
    for (index, step) in steps.iter().enumerate() {
        let snapshot = sim
            .run_step(step)
            .await
            .with_context(|| format!("step {} ({:?})", index + 1, step))?;
        println!("[{:>2}] {:<40} {}", index + 1, format!("{:?}", step), snapshot.status_line());
    }

    for record in sim.sink.records() {
        println!("disposition: {}", record.to_json()?);
    }

    coordinator.logout().await?;
    if let Some(printer) = printer {
        printer.await.context("event printer")?;
    }
    Ok(())
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = load_config(Some(path))?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn normalize(numbers: &[String]) {
    for raw in numbers {
        match normalize_number(raw) {
            Ok(number) => println!("{} -> {}", raw, number),
            Err(e) => println!("{} -> error: {}", raw, e),
        }
    }
}
