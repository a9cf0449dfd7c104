//! HTTP-backed [`LlmClient`].
//!
//! Talks to a generic messages-style completion endpoint: this assumes a
//! JSON body shaped like `{system, messages, tools, session_handle}` in,
//! `{content, session_handle, input_tokens, output_tokens}` out — the same
//! request/response shape this crate defines, so any adapter in front of a
//! concrete vendor API can speak it unmodified. Retries mirror the
//! substrate client's policy: up to 3 attempts at the runtime layer before
//! the ticket is failed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;

use crate::config::LlmConfig;
use crate::error::LlmError;

use super::{LlmClient, TurnRequest, TurnResponse};

const MAX_ATTEMPTS: u32 = 3;

pub struct HttpLlmProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmProvider {
    pub fn new(config: &LlmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build llm http client");

        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.as_ref().map(|k| k.expose_secret().to_string()),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmProvider {
    async fn turn(&self, req: TurnRequest) -> Result<TurnResponse, LlmError> {
        let provider = "llm_provider";
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let mut builder = self.http.post(format!("{}/v1/turns", self.base_url)).json(&req);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let result = builder.send().await;
            match result {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    last_err = Some(LlmError::RateLimited {
                        provider: provider.to_string(),
                    });
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = Some(LlmError::RequestFailed {
                        provider: provider.to_string(),
                        reason: format!("status {}", resp.status()),
                    });
                }
                Ok(resp) if resp.status().is_success() => {
                    let body: WireTurnResponse = resp.json().await.map_err(|e| {
                        LlmError::RequestFailed {
                            provider: provider.to_string(),
                            reason: format!("invalid response body: {e}"),
                        }
                    })?;
                    return Ok(body.into());
                }
                Ok(resp) => {
                    return Err(LlmError::RequestFailed {
                        provider: provider.to_string(),
                        reason: format!("status {}", resp.status()),
                    });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(LlmError::Timeout {
                        provider: provider.to_string(),
                    });
                }
                Err(e) => {
                    last_err = Some(LlmError::RequestFailed {
                        provider: provider.to_string(),
                        reason: e.to_string(),
                    });
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
            }
        }

        Err(last_err.unwrap_or(LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: "exhausted retries".to_string(),
        }))
    }
}

#[derive(serde::Deserialize)]
struct WireTurnResponse {
    content: Vec<super::ContentBlock>,
    session_handle: Option<String>,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<WireTurnResponse> for TurnResponse {
    fn from(w: WireTurnResponse) -> Self {
        TurnResponse {
            content: w.content,
            session_handle: w.session_handle,
            input_tokens: w.input_tokens,
            output_tokens: w.output_tokens,
        }
    }
}
