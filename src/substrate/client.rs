//! HTTP gateway to the substrate service.
//!
//! The only path by which the orchestrator mutates the knowledge store.
//! Wraps every request in the retry policy and circuit breaker; nothing
//! else in the crate is permitted to speak HTTP to substrate directly.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, SubstrateConfig};
use crate::error::SubstrateError;
use crate::model::WorkOutput;
use crate::substrate::circuit_breaker::CircuitBreaker;
use crate::substrate::types::*;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Per-request auth override (prefers the caller's user JWT over the
/// process-wide service secret).
#[derive(Debug, Clone, Default)]
pub struct AuthOverride {
    pub user_token: Option<String>,
}

pub struct SubstrateClient {
    http: Client,
    config: SubstrateConfig,
    breaker: CircuitBreaker,
}

impl SubstrateClient {
    pub fn new(config: SubstrateConfig, cb_config: &CircuitBreakerConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(20)
            .build()
            .expect("failed to build substrate http client");

        Self {
            http,
            config,
            breaker: CircuitBreaker::new(cb_config),
        }
    }

    fn bearer(&self, auth: &AuthOverride) -> Option<String> {
        auth.user_token
            .clone()
            .or_else(|| self.config.user_token.as_ref().map(|s| s.expose_secret().to_string()))
            .or_else(|| {
                self.config
                    .service_secret
                    .as_ref()
                    .map(|s| s.expose_secret().to_string())
            })
    }

    async fn request<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        auth: &AuthOverride,
        body: Option<&B>,
        query: Option<&[(&str, String)]>,
    ) -> Result<R, SubstrateError> {
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if !self.breaker.allow_request() {
                return Err(SubstrateError::CircuitOpen);
            }

            let url = format!("{}{}", self.config.base_url, path);
            let mut req = self.http.request(method.clone(), &url);
            if let Some(token) = self.bearer(auth) {
                req = req.bearer_auth(token);
            }
            req = req.header("X-Service-Name", "work-orchestrator");
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(query) = query {
                req = req.query(query);
            }

            let result = req.send().await;

            let outcome = match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.breaker.record_success();
                        let parsed = resp.json::<R>().await.map_err(|e| {
                            SubstrateError::Transport(format!("invalid response body: {e}"))
                        })?;
                        return Ok(parsed);
                    }
                    let message = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<no body>".to_string());
                    self.breaker.record_failure();
                    Err(SubstrateError::Http {
                        status: status.as_u16(),
                        message,
                    })
                }
                Err(e) => {
                    self.breaker.record_failure();
                    Err(SubstrateError::Transport(e.to_string()))
                }
            };

            match outcome {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_err = Some(e);
                    if !retryable || attempt == MAX_ATTEMPTS {
                        break;
                    }
                    let backoff = backoff_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        path,
                        backoff_ms = backoff.as_millis() as u64,
                        "substrate request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(last_err.unwrap_or(SubstrateError::Transport("exhausted retries".into())))
    }

    pub async fn health(&self) -> Result<(), SubstrateError> {
        self.request::<(), serde_json::Value>(Method::GET, "/health", &AuthOverride::default(), None, None)
            .await
            .map(|_| ())
    }

    pub async fn create_basket(
        &self,
        auth: &AuthOverride,
        req: CreateBasketRequest,
    ) -> Result<CreateBasketResponse, SubstrateError> {
        self.request(Method::POST, "/api/baskets", auth, Some(&req), None)
            .await
    }

    pub async fn get_basket_blocks(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        states: Option<&[&str]>,
        limit: Option<u32>,
    ) -> Result<Vec<Block>, SubstrateError> {
        let mut query = Vec::new();
        if let Some(states) = states {
            query.push(("states", states.join(",")));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.request::<(), Vec<Block>>(
            Method::GET,
            &format!("/api/baskets/{basket_id}/blocks"),
            auth,
            None,
            Some(&query),
        )
        .await
    }

    /// Idempotency key = deterministic hash of the content bytes.
    pub async fn create_dump(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        content: &str,
    ) -> Result<CreateDumpResponse, SubstrateError> {
        let key = idempotency_key(content);
        let req = CreateDumpRequest {
            basket_id,
            content: content.to_string(),
            idempotency_key: key,
        };
        self.request(Method::POST, "/api/dumps", auth, Some(&req), None)
            .await
    }

    pub async fn create_work_output(
        &self,
        auth: &AuthOverride,
        req: CreateWorkOutputRequest,
    ) -> Result<CreateWorkOutputResponse, SubstrateError> {
        self.request(Method::POST, "/api/work-outputs", auth, Some(&req), None)
            .await
    }

    pub async fn list_work_outputs(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        filter: &ListWorkOutputsFilter,
    ) -> Result<Vec<WorkOutput>, SubstrateError> {
        let mut query = Vec::new();
        if let Some(t) = filter.work_ticket_id {
            query.push(("work_ticket_id", t.to_string()));
        }
        if let Some(s) = &filter.supervision_status {
            query.push(("supervision_status", s.clone()));
        }
        if let Some(a) = &filter.agent_kind {
            query.push(("agent_kind", a.clone()));
        }
        if let Some(o) = &filter.output_type {
            query.push(("output_type", o.clone()));
        }
        self.request::<(), Vec<WorkOutput>>(
            Method::GET,
            &format!("/api/baskets/{basket_id}/work-outputs"),
            auth,
            None,
            Some(&query),
        )
        .await
    }

    pub async fn get_work_output(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
    ) -> Result<WorkOutput, SubstrateError> {
        self.request::<(), WorkOutput>(
            Method::GET,
            &format!("/api/work-outputs/{output_id}"),
            auth,
            None,
            None,
        )
        .await
    }

    pub async fn update_work_output(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        req: UpdateWorkOutputRequest,
    ) -> Result<(), SubstrateError> {
        self.request::<_, serde_json::Value>(
            Method::PATCH,
            &format!("/api/work-outputs/{output_id}"),
            auth,
            Some(&req),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn mark_output_promoted(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        req: MarkOutputPromotedRequest,
    ) -> Result<(), SubstrateError> {
        self.request::<_, serde_json::Value>(
            Method::POST,
            &format!("/api/work-outputs/{output_id}/promoted"),
            auth,
            Some(&req),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn skip_output_promotion(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        req: SkipPromotionRequest,
    ) -> Result<(), SubstrateError> {
        self.request::<_, serde_json::Value>(
            Method::POST,
            &format!("/api/work-outputs/{output_id}/skip-promotion"),
            auth,
            Some(&req),
            None,
        )
        .await
        .map(|_| ())
    }

    /// Writes a block directly, bypassing governance: the scaffolder's
    /// foundational intent block is written pre-accepted, not proposed.
    pub async fn create_block(
        &self,
        auth: &AuthOverride,
        req: CreateBlockRequest,
    ) -> Result<CreateBlockResponse, SubstrateError> {
        self.request(Method::POST, "/api/blocks", auth, Some(&req), None)
            .await
    }

    pub async fn create_proposal(
        &self,
        auth: &AuthOverride,
        req: CreateProposalRequest,
    ) -> Result<CreateProposalResponse, SubstrateError> {
        self.request(Method::POST, "/api/proposals", auth, Some(&req), None)
            .await
    }

    pub async fn get_reference_assets(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        agent_kind: &str,
        ticket_id: Uuid,
        permanence: Option<&str>,
    ) -> Result<Vec<ReferenceAsset>, SubstrateError> {
        let mut query = vec![
            ("agent_kind", agent_kind.to_string()),
            ("ticket_id", ticket_id.to_string()),
        ];
        if let Some(p) = permanence {
            query.push(("permanence", p.to_string()));
        }
        self.request::<(), Vec<ReferenceAsset>>(
            Method::GET,
            &format!("/api/baskets/{basket_id}/reference-assets"),
            auth,
            None,
            Some(&query),
        )
        .await
    }

    pub async fn initiate_work(
        &self,
        auth: &AuthOverride,
        req: InitiateWorkRequest,
    ) -> Result<WorkStatusResponse, SubstrateError> {
        self.request(Method::POST, "/api/work/initiate", auth, Some(&req), None)
            .await
    }

    pub async fn get_work_status(
        &self,
        auth: &AuthOverride,
        work_id: Uuid,
    ) -> Result<WorkStatusResponse, SubstrateError> {
        self.request::<(), WorkStatusResponse>(
            Method::GET,
            &format!("/api/work/{work_id}/status"),
            auth,
            None,
            None,
        )
        .await
    }

    pub async fn read_context(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        item_type: &str,
        item_key: Option<&str>,
    ) -> Result<Option<ContextItem>, SubstrateError> {
        let mut query = vec![("item_type", item_type.to_string()), ("limit", "1".to_string())];
        if let Some(k) = item_key {
            query.push(("item_key", k.to_string()));
        }
        let items = self
            .request::<(), Vec<ContextItem>>(
                Method::GET,
                &format!("/api/baskets/{basket_id}/context-items"),
                auth,
                None,
                Some(&query),
            )
            .await?;
        Ok(items.into_iter().next())
    }

    pub async fn write_context(
        &self,
        auth: &AuthOverride,
        req: WriteContextRequest,
    ) -> Result<WriteContextResponse, SubstrateError> {
        self.request(Method::PUT, "/api/context-items", auth, Some(&req), None)
            .await
    }

    pub async fn list_context(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        tier: Option<&str>,
    ) -> Result<Vec<ContextItem>, SubstrateError> {
        let mut query = Vec::new();
        if let Some(tier) = tier {
            query.push(("tier", tier.to_string()));
        }
        self.request::<(), Vec<ContextItem>>(
            Method::GET,
            &format!("/api/baskets/{basket_id}/context-items"),
            auth,
            None,
            Some(&query),
        )
        .await
    }
}

fn idempotency_key(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << (attempt - 1).min(4));
    let capped = exp.min(BACKOFF_MAX);
    // +/- 20% jitter so concurrent retries don't thunder.
    let jitter_frac = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_secs_f64(capped.as_secs_f64() * jitter_frac).min(BACKOFF_MAX)
}

/// Shared, process-wide substrate client handle.
pub type SharedSubstrateClient = Arc<SubstrateClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_deterministic() {
        let a = idempotency_key("hello world");
        let b = idempotency_key("hello world");
        assert_eq!(a, b);
        let c = idempotency_key("hello world!");
        assert_ne!(a, c);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let b1 = backoff_for_attempt(1);
        let b2 = backoff_for_attempt(2);
        assert!(b1 <= Duration::from_secs(2));
        assert!(b2 <= Duration::from_secs(4));
        for attempt in 1..=10 {
            assert!(backoff_for_attempt(attempt) <= BACKOFF_MAX);
        }
    }
}
