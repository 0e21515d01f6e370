//! Implementation of the `converge provision` command.

use std::time::Instant;

use anyhow::{Context, Result};

use converge_lib::config::ConvergeConfig;

use super::machine_provisioner;
use crate::output::{Outcome, Report};

pub fn cmd_provision(config: &ConvergeConfig) -> Result<()> {
  let start = Instant::now();
  let provisioner = machine_provisioner(config)?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(provisioner.provision()).context("Provision failed")?;

  Report::new(Outcome::Provisioned)
    .fact("Target root", config.target_root.display())
    .took(start)
    .print();

  Ok(())
}
