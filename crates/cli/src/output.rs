//! How converge commands report what they did.
//!
//! Every command ends with a [`Report`]: a colored headline naming the
//! outcome followed by labelled facts about the deployment, instance or
//! machine it touched.

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use converge_lib::provisioner::RetryPolicy;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Compiled,
  Provisioned,
  AgentReady,
  ArchiveRemoved,
}

impl Outcome {
  fn headline(self) -> &'static str {
    match self {
      Outcome::Compiled => "Compile complete!",
      Outcome::Provisioned => "Agent provisioned!",
      Outcome::AgentReady => "Agent is responding!",
      Outcome::ArchiveRemoved => "Removed rendered archive",
    }
  }
}

pub struct Report {
  outcome: Outcome,
  facts: Vec<(&'static str, String)>,
}

impl Report {
  pub fn new(outcome: Outcome) -> Self {
    Self {
      outcome,
      facts: Vec::new(),
    }
  }

  pub fn fact(mut self, label: &'static str, value: impl ToString) -> Self {
    self.facts.push((label, value.to_string()));
    self
  }

  pub fn took(self, start: Instant) -> Self {
    self.fact("Duration", format_elapsed(start.elapsed()))
  }

  pub fn print(&self) {
    println!();
    println!(
      "{} {}",
      "✓".if_supports_color(Stream::Stdout, |s| s.green()),
      self.outcome.headline()
    );
    for (label, value) in &self.facts {
      println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
    }
  }
}

/// Announce the readiness wait before `configure` starts pinging.
pub fn print_waiting(instance: &str, policy: &RetryPolicy) {
  println!(
    "{} Waiting for the agent of {} (every {}, up to {} attempts)",
    "•".if_supports_color(Stream::Stdout, |s| s.blue()),
    instance,
    humantime::format_duration(policy.interval),
    policy.max_attempts
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Elapsed time to millisecond precision.
fn format_elapsed(elapsed: Duration) -> String {
  let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}
