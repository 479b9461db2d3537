use super::{Panel, PanelError, Request};
use crate::{config, retry_queue::Method, secrets::SecretValue};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;

const UNKNOWN_ERROR: &str = "unknown error";

/// Panel client speaking JSON over HTTP(S) with a bearer token.
#[derive(Debug)]
pub struct HttpPanel {
    client: reqwest::Client,
    api_url: String,
    token: Option<SecretValue>,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpPanel {
    pub fn new(config: &config::panel::Definition, token: Option<SecretValue>) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("backup-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpPanel {
            client,
            api_url: format!("{}/api", config.url.trim_end_matches('/')),
            token,
            timeout: config.timeout,
            health_timeout: config.health_timeout,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        // queue files written by older agents carry the api prefix
        let endpoint = if endpoint.starts_with("/api/") {
            &endpoint[4..]
        } else {
            endpoint
        };
        format!("{}{}", self.api_url, endpoint)
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| UNKNOWN_ERROR.to_owned())
}

#[async_trait::async_trait]
impl Panel for HttpPanel {
    async fn is_available(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!(%error, "panel health check failed");
                false
            }
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(method = %request.method, endpoint = %request.endpoint))]
    async fn send(&self, request: &Request) -> Result<Value, PanelError> {
        let url = self.url(&request.endpoint);
        let mut builder = match request.method {
            Method::Get => self.client.get(url).query(&request.payload),
            Method::Post => self.client.post(url).json(&request.payload),
        }
        .timeout(self.timeout)
        .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PanelError::Unreachable(e.into()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PanelError::Unreachable(e.into()))?;
        tracing::debug!(status = status.as_u16(), "panel responded");

        if !status.is_success() {
            return Err(PanelError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(PanelError::InvalidResponse)
    }
}
