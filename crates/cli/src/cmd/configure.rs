//! Implementation of the `converge configure` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use converge_lib::agent::AgentClient;
use converge_lib::config::ConvergeConfig;

use super::{find_target, load_deployment, machine_provisioner};
use crate::output::{Outcome, Report, print_waiting};

/// Write the infrastructure settings for `job/index` and wait until the
/// agent answers a ping.
pub fn cmd_configure(config: &ConvergeConfig, file: &Path, job: &str, index: u32) -> Result<()> {
  let start = Instant::now();
  let deployment = load_deployment(file)?;
  let (_, instance) = find_target(&deployment, job, index)?;
  let provisioner = machine_provisioner(config)?;

  print_waiting(&instance.slug(), &config.handshake_policy());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let reply = rt.block_on(async {
    let client = provisioner
      .configure(instance)
      .await
      .with_context(|| format!("Failed to configure agent for {}", instance.slug()))?;
    client.ping().await.context("Agent stopped responding")
  })?;

  Report::new(Outcome::AgentReady)
    .fact("Instance", instance.slug())
    .fact("Ping", reply)
    .took(start)
    .print();

  Ok(())
}
