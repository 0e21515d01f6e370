mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use converge_lib::config::ConvergeConfig;

use crate::output::OutputFormat;

/// converge - compile releases and bootstrap a machine's agent
#[derive(Parser)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Config file (default: $CONVERGE_CONFIG or <config dir>/config.yml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile packages and rendered template archives for a deployment
  Compile {
    /// Deployment file
    deployment: PathBuf,

    /// Number of instances compiled concurrently
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Print the apply spec for one instance
  Spec {
    /// Deployment file
    deployment: PathBuf,

    /// Job name
    #[arg(long)]
    job: String,

    /// Instance index
    #[arg(long, default_value_t = 0)]
    index: u32,
  },

  /// Install the agent and monit and register them with the supervisor
  Provision,

  /// Write agent settings for an instance and wait for the agent to answer
  Configure {
    /// Deployment file
    deployment: PathBuf,

    /// Job name
    #[arg(long)]
    job: String,

    /// Instance index
    #[arg(long, default_value_t = 0)]
    index: u32,

    /// Delay between handshake attempts (e.g. "2s")
    #[arg(long, value_parser = humantime::parse_duration)]
    handshake_interval: Option<Duration>,

    /// Maximum handshake attempts
    #[arg(long)]
    handshake_attempts: Option<u32>,
  },

  /// Remove a rendered archive left behind by an interrupted compile
  CleanArchive {
    /// Archive path
    path: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = ConvergeConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;

  match cli.command {
    Commands::Compile {
      deployment,
      jobs,
      output,
    } => cmd::cmd_compile(&config, &deployment, jobs, output),
    Commands::Spec { deployment, job, index } => cmd::cmd_spec(&config, &deployment, &job, index),
    Commands::Provision => cmd::cmd_provision(&config),
    Commands::Configure {
      deployment,
      job,
      index,
      handshake_interval,
      handshake_attempts,
    } => {
      let mut config = config;
      override_handshake(&mut config, handshake_interval, handshake_attempts);
      cmd::cmd_configure(&config, &deployment, &job, index)
    }
    Commands::CleanArchive { path } => cmd::cmd_clean_archive(&config, &path),
  }
}

fn override_handshake(config: &mut ConvergeConfig, interval: Option<Duration>, attempts: Option<u32>) {
  if let Some(interval) = interval {
    config.handshake.interval = interval;
  }
  if let Some(attempts) = attempts {
    config.handshake.max_attempts = attempts;
  }
}
