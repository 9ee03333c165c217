//! HTTP processor client: `POST {"name": url}`, plain-text response.

use super::{ProcessError, Processor};
use crate::config::ProcessorConfig;
use crate::config::secrets::{ExposeSecret, SecretString};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Request body. The processor reads the URL from `name`.
#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    name: &'a str,
}

/// Calls a remote processor over HTTP.
pub struct HttpProcessor {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl HttpProcessor {
    pub fn new(config: &ProcessorConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dispatchq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        })
    }

    async fn send(&self, url: &str, timeout: Duration) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&ProcessRequest { name: url });
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        request.send().await
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    async fn process(&self, url: &str, timeout: Duration) -> Result<String, ProcessError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ProcessError::Timeout(timeout)
            } else {
                ProcessError::Transport(e.to_string())
            }
        };

        let response = self.send(url, timeout).await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "processor rejected item");
            return Err(ProcessError::Status(status.as_u16()));
        }

        // The request timeout also covers reading the body.
        response.text().await.map_err(classify)
    }
}
