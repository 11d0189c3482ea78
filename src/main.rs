//! Stand-alone runner for the monochromator actuator.
//!
//! Drives the plugin against the simulated spectrometer the same way the
//! acquisition host would: initialize, run one command through the polling
//! loop, print the status messages, close.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use daq_monochromator::config::MonochromatorConfig;
use daq_monochromator::plugins::monochromator::{GRATING, TAU};
use daq_monochromator::{Actuator, DaqMove, DaqMoveMonochromator, StatusSink, ThreadCommand};

#[derive(Debug, Parser)]
#[command(name = "daq_monochromator")]
#[command(about = "Run the monochromator actuator plugin against a simulated spectrometer")]
struct Cli {
    /// TOML configuration file (environment overrides use MONOCHROMATOR_*).
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective configuration as TOML.
    Config,
    /// Initialize and print the settings tree as JSON.
    Info,
    /// Print the current position.
    Position,
    /// Move to an absolute wavelength (axis units).
    MoveAbs {
        /// Target position.
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Move by a relative amount (axis units).
    MoveRel {
        /// Step, may be negative.
        #[arg(allow_negative_numbers = true)]
        delta: f64,
    },
    /// Move to the reference wavelength.
    Home,
    /// Set the time constant in milliseconds.
    SetTau {
        /// Time constant in ms.
        ms: f64,
    },
    /// Select a grating.
    SetGrating {
        /// Grating name as reported by the driver.
        name: String,
    },
    /// Ask the actuator to stop.
    Stop,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("daq_monochromator={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_status(rx: &mut UnboundedReceiver<ThreadCommand>) {
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            ThreadCommand::UpdateStatus(msg) => println!("status: {}", msg),
            ThreadCommand::MoveDone(pos) => println!("move done: {}", pos),
            ThreadCommand::OutOfBounds { requested, clamped } => {
                println!("out of bounds: {} clamped to {}", requested, clamped)
            }
            ThreadCommand::Timeout(pos) => println!("timeout at {}", pos),
            ThreadCommand::CurrentPosition(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MonochromatorConfig::load_from(cli.config.as_ref())
        .context("failed to load configuration")?;
    init_tracing(&config.application.log_level);

    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let (status, mut rx) = StatusSink::channel();
    let plugin = DaqMoveMonochromator::with_mock(&config, status);
    let mut axis = DaqMove::new(config.application.name.clone(), plugin, &config.axis);

    let init = axis.init(None).await?;
    print_status(&mut rx);
    if !init.initialized {
        anyhow::bail!("{}", init.info);
    }

    let result = run(&mut axis, &cli.command).await;
    print_status(&mut rx);
    axis.quit().await?;
    result
}

async fn run(axis: &mut DaqMove<DaqMoveMonochromator>, command: &Command) -> Result<()> {
    match command {
        Command::Config => {}
        Command::Info => {
            let settings = axis.actuator().context().settings.to_json();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Position => {
            let pos = axis.get_position().await?;
            println!("{}: {}", axis.title(), pos);
        }
        Command::MoveAbs { value } => {
            axis.move_abs(*value).await?;
        }
        Command::MoveRel { delta } => {
            axis.move_rel(*delta).await?;
        }
        Command::Home => {
            axis.move_home().await?;
        }
        Command::SetTau { ms } => {
            axis.set_setting(TAU, (*ms).into()).await?;
            println!("tau = {} ms", ms);
        }
        Command::SetGrating { name } => {
            axis.set_setting(GRATING, name.as_str().into()).await?;
            println!("grating = {}", name);
        }
        Command::Stop => {
            axis.stop().await?;
        }
    }
    Ok(())
}
