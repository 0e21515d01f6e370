use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{AgentClient, AgentClientFactory, AgentError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
  method: &'a str,
  arguments: Vec<Value>,
  reply_to: String,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
  #[serde(default)]
  value: Option<Value>,
  #[serde(default)]
  exception: Option<AgentException>,
}

#[derive(Debug, Deserialize)]
struct AgentException {
  message: String,
}

/// Agent client speaking JSON over HTTPS.
///
/// Credentials come from the userinfo part of the endpoint URL. The agent
/// serves a self-signed certificate, so certificate verification is off.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
  http: reqwest::Client,
  url: Url,
  user: String,
  password: Option<String>,
}

impl HttpAgentClient {
  pub fn new(mbus: &str) -> Result<Self, AgentError> {
    let invalid = |message: String| AgentError::InvalidEndpoint {
      endpoint: redact(mbus),
      message,
    };

    let mut url = Url::parse(mbus).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }

    let user = url.username().to_string();
    let password = url.password().map(str::to_string);
    url
      .set_username("")
      .and_then(|_| url.set_password(None))
      .map_err(|_| invalid("cannot strip credentials".to_string()))?;
    let url = url.join("agent").map_err(|e| invalid(e.to_string()))?;

    let http = reqwest::Client::builder()
      .danger_accept_invalid_certs(true)
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(AgentError::Request)?;

    Ok(Self {
      http,
      url,
      user,
      password,
    })
  }

  async fn send(&self, method: &str, arguments: Vec<Value>) -> Result<Value, AgentError> {
    let request = AgentRequest {
      method,
      arguments,
      reply_to: uuid::Uuid::new_v4().to_string(),
    };

    let mut builder = self.http.post(self.url.clone()).json(&request);
    if !self.user.is_empty() {
      builder = builder.basic_auth(&self.user, self.password.as_ref());
    }

    debug!(method = %method, url = %self.url, "sending agent request");
    let response = builder.send().await.map_err(AgentError::Request)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(AgentError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let body: AgentResponse = response
      .json()
      .await
      .map_err(|e| AgentError::Response(e.to_string()))?;

    if let Some(exception) = body.exception {
      return Err(AgentError::Exception(exception.message));
    }
    body
      .value
      .ok_or_else(|| AgentError::Response("missing value".to_string()))
  }
}

impl AgentClient for HttpAgentClient {
  async fn ping(&self) -> Result<String, AgentError> {
    let value = self.send("ping", Vec::new()).await?;
    Ok(match value {
      Value::String(s) => s,
      other => other.to_string(),
    })
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAgentClientFactory;

impl AgentClientFactory for HttpAgentClientFactory {
  type Client = HttpAgentClient;

  fn build(&self, mbus: &str) -> Result<HttpAgentClient, AgentError> {
    HttpAgentClient::new(mbus)
  }
}

/// Endpoint with the password masked, for error messages.
fn redact(mbus: &str) -> String {
  match Url::parse(mbus) {
    Ok(mut url) if url.password().is_some() => {
      let _ = url.set_password(Some("***"));
      url.to_string()
    }
    Ok(url) => url.to_string(),
    Err(_) => mbus.to_string(),
  }
}
