//! hare-gate - queue consumers behind a shared rate-limit gate

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod logging;
mod queue;
mod simulation;

use commands::{cmd_config_init, cmd_config_show, cmd_parse_hint, cmd_run};
use config::Config;
use logging::{init_cli_logging, init_logging};

#[derive(Parser)]
#[command(name = "hare-gate")]
#[command(about = "Cooldown gate for consumers of a rate-limited service")]
#[command(after_help = "\
QUICK START:
  hare-gate config init           # Write ./hare-gate.toml
  hare-gate run                   # Drive the simulated queue
  hare-gate parse-hint \"120\"      # Check a Retry-After value")]
struct Cli {
  /// Configuration file (default: ./hare-gate.toml, then the user config)
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run queue consumers against the simulated service
  Run {
    /// Number of concurrent consumers
    #[arg(short, long)]
    workers: Option<usize>,
    /// Number of requests to enqueue
    #[arg(short, long)]
    requests: Option<usize>,
    /// Give up on admission after this many milliseconds
    #[arg(long, value_name = "MS")]
    max_wait_ms: Option<u64>,
  },
  /// Parse a Retry-After value the way the gate does
  ParseHint {
    /// Header value: seconds, RFC 3339 or HTTP-date
    value: String,
  },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[derive(Subcommand)]
enum ConfigCommand {
  /// Show the effective configuration
  Show,
  /// Write the default configuration to ./hare-gate.toml
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Run {
      workers,
      requests,
      max_wait_ms,
    } => {
      let mut config = Config::load(cli.config.as_deref())?;
      if let Some(workers) = workers {
        config.simulation.workers = workers;
      }
      if let Some(requests) = requests {
        config.simulation.requests = requests;
      }
      if max_wait_ms.is_some() {
        config.gate.max_wait_ms = max_wait_ms;
      }

      let _guard = init_logging(&config.log);
      cmd_run(config).await
    }
    Commands::ParseHint { value } => {
      init_cli_logging();
      cmd_parse_hint(&value).await
    }
    Commands::Config { command } => {
      init_cli_logging();
      match command {
        ConfigCommand::Show => {
          let config = Config::load(cli.config.as_deref())?;
          cmd_config_show(&config, cli.config.is_some()).await
        }
        ConfigCommand::Init { force } => cmd_config_init(force).await,
      }
    }
  }
}
