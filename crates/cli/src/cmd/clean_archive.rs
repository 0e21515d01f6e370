//! Implementation of the `converge clean-archive` command.

use std::path::Path;

use anyhow::{Context, Result};

use converge_lib::config::ConvergeConfig;
use converge_lib::templates_compiler::RenderedArchivesCompiler;

use crate::output::{Outcome, Report};

pub fn cmd_clean_archive(config: &ConvergeConfig, path: &Path) -> Result<()> {
  let archives = RenderedArchivesCompiler::new(config.store_paths().tmp());
  archives
    .clean_up(path)
    .with_context(|| format!("Failed to remove {}", path.display()))?;

  Report::new(Outcome::ArchiveRemoved).fact("Path", path.display()).print();
  Ok(())
}
