//! Client side of the agent protocol needed to reach a booted machine.
//!
//! Only `ping` is implemented; it is what proves the agent is ready to
//! receive an apply spec.

mod http;

use std::future::Future;

use thiserror::Error;

pub use http::{HttpAgentClient, HttpAgentClientFactory};

#[derive(Debug, Error)]
pub enum AgentError {
  #[error("invalid agent endpoint {endpoint}: {message}")]
  InvalidEndpoint { endpoint: String, message: String },

  #[error("agent request failed: {0}")]
  Request(#[source] reqwest::Error),

  #[error("agent responded with HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("unexpected agent response: {0}")]
  Response(String),

  #[error("agent returned exception: {0}")]
  Exception(String),
}

pub trait AgentClient: Send + Sync {
  /// Liveness check. Returns the agent's reply value.
  fn ping(&self) -> impl Future<Output = Result<String, AgentError>> + Send;
}

/// Builds clients bound to a message-bus endpoint.
pub trait AgentClientFactory: Send + Sync {
  type Client: AgentClient;

  fn build(&self, mbus: &str) -> Result<Self::Client, AgentError>;
}
