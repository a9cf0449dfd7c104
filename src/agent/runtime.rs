//! Agent Runtime — the per-ticket tool loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, LlmError};
use crate::llm::{ContentBlock, LlmClient, Message, Role, TurnEvent, TurnRequest};
use crate::progress::{ProgressChannel, ProgressEvent, ProgressEventType};
use crate::tools::{ToolCatalog, ToolContext};

use super::prompt::{DynamicContext, SystemPromptBuilder, TaskDirective};

/// Fixed string returned when the tool loop exhausts its iteration budget
/// without the model terminating on its own.
pub const ITERATION_CAP_APOLOGY: &str =
    "I wasn't able to finish this task within the available turns. Here is what I \
     completed before stopping; please review the outputs emitted so far.";

#[derive(Debug, Clone)]
pub struct EmittedOutputRecord {
    pub output_id: Uuid,
    pub confidence: f32,
    pub requires_review: bool,
}

#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_use_id: String,
    pub name: String,
    pub args: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeOutput {
    pub response_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub work_outputs: Vec<EmittedOutputRecord>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub iterations: u32,
    pub hit_iteration_cap: bool,
    /// Set when any emitted output warrants human review before the ticket
    /// can be marked `completed`.
    pub checkpoint_raised: bool,
    /// Provider-side conversation handle as of the last turn, if the
    /// provider returned one — persisted back onto the session by the
    /// ticket executor.
    pub session_handle: Option<String>,
}

pub struct RunRequest {
    pub ticket_id: Uuid,
    pub task: TaskDirective,
    pub dynamic_context: DynamicContext,
    /// Pre-computed context envelope document, prepended as a leading user
    /// message when present.
    pub context_envelope: Option<String>,
    pub session_handle: Option<String>,
    pub tool_ctx: ToolContext,
    pub cancel: Arc<AtomicBool>,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolCatalog>,
    progress: Arc<ProgressChannel>,
    config: Arc<AppConfig>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolCatalog>,
        progress: Arc<ProgressChannel>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            llm,
            tools,
            progress,
            config,
        }
    }

    /// Drives the bounded tool loop to completion.
    pub async fn run(&self, req: RunRequest) -> Result<RuntimeOutput, AppError> {
        let agent_kind = req.tool_ctx.agent_kind;
        let system = SystemPromptBuilder::build(agent_kind, &req.dynamic_context);
        let tools = self.tools.specs_for(agent_kind);

        let mut messages = Vec::with_capacity(2);
        if let Some(envelope) = &req.context_envelope {
            messages.push(Message::text(Role::User, envelope.clone()));
        }
        messages.push(Message::text(Role::User, req.task.render()));

        let mut session_handle = req.session_handle;
        let mut response_text = String::new();
        let mut tool_calls = Vec::new();
        let mut work_outputs: Vec<EmittedOutputRecord> = Vec::new();
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut seen_tool_use = false;

        let max_iterations = self.config.tool_loop_max_iterations;

        for iteration in 1..=max_iterations {
            if req.cancel.load(Ordering::SeqCst) {
                return Err(AppError::Cancelled);
            }

            let turn = TurnRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                session_handle: session_handle.clone(),
            };

            let response = self.llm.turn(turn).await.map_err(llm_error_to_app)?;
            session_handle = response.session_handle.clone().or(session_handle);
            input_tokens += response.input_tokens;
            output_tokens += response.output_tokens;

            let text = response.text();
            if !text.is_empty() {
                response_text = text;
            }

            if !response.has_tool_use() {
                return Ok(RuntimeOutput {
                    response_text,
                    tool_calls,
                    work_outputs,
                    input_tokens,
                    output_tokens,
                    iterations: iteration,
                    hit_iteration_cap: false,
                    checkpoint_raised: work_outputs.iter().any(|o| o.requires_review),
                    session_handle,
                });
            }

            if !seen_tool_use {
                seen_tool_use = true;
                self.progress
                    .emit(
                        ProgressEvent::new(req.ticket_id, ProgressEventType::ToolStart)
                            .with_step("tool_use_started"),
                    )
                    .await;
            }

            let assistant_content = response.content.clone();
            messages.push(Message {
                role: Role::Assistant,
                content: assistant_content,
            });

            let mut results = Vec::new();
            for (id, name, args) in response.tool_uses() {
                if req.cancel.load(Ordering::SeqCst) {
                    return Err(AppError::Cancelled);
                }

                let (value, is_error) = self
                    .tools
                    .dispatch(name, args.clone(), &req.tool_ctx)
                    .await;

                if name == "emit_work_output" && !is_error {
                    if let Some(record) = parse_emitted_output(args, &value) {
                        work_outputs.push(record);
                    }
                }

                self.progress
                    .emit(
                        ProgressEvent::new(req.ticket_id, ProgressEventType::ToolResult)
                            .with_step(name)
                            .with_payload(serde_json::json!({"tool": name, "is_error": is_error})),
                    )
                    .await;

                tool_calls.push(ToolCallRecord {
                    tool_use_id: id.to_string(),
                    name: name.to_string(),
                    args: args.clone(),
                    is_error,
                });

                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.to_string(),
                    content: value,
                    is_error,
                });
            }

            messages.push(Message::tool_results(results));
        }

        Ok(RuntimeOutput {
            response_text: ITERATION_CAP_APOLOGY.to_string(),
            tool_calls,
            work_outputs,
            input_tokens,
            output_tokens,
            iterations: max_iterations,
            hit_iteration_cap: true,
            checkpoint_raised: false,
            session_handle,
        })
    }

    /// Streaming variant: yields `{type, data}` events instead of a single
    /// batched result, for SSE
    /// consumption through the progress channel. Iteration/tool-dispatch
    /// semantics mirror [`AgentRuntime::run`]; this entrypoint additionally
    /// forwards each provider-level event onto the ticket's progress
    /// buffer as it is produced.
    pub async fn run_streaming(&self, req: RunRequest) -> Result<RuntimeOutput, AppError> {
        let agent_kind = req.tool_ctx.agent_kind;
        let system = SystemPromptBuilder::build(agent_kind, &req.dynamic_context);
        let tools = self.tools.specs_for(agent_kind);

        let mut messages = Vec::with_capacity(2);
        if let Some(envelope) = &req.context_envelope {
            messages.push(Message::text(Role::User, envelope.clone()));
        }
        messages.push(Message::text(Role::User, req.task.render()));

        let mut session_handle = req.session_handle;
        let mut response_text = String::new();
        let mut tool_calls = Vec::new();
        let mut work_outputs: Vec<EmittedOutputRecord> = Vec::new();
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;

        let max_iterations = self.config.tool_loop_max_iterations;

        for iteration in 1..=max_iterations {
            if req.cancel.load(Ordering::SeqCst) {
                return Err(AppError::Cancelled);
            }

            let turn = TurnRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                session_handle: session_handle.clone(),
            };

            let mut stream = self.llm.turn_stream(turn).await.map_err(llm_error_to_app)?;
            let mut final_response = None;

            use futures::StreamExt;
            while let Some(event) = stream.next().await {
                match event {
                    TurnEvent::TextDelta(delta) => {
                        self.progress
                            .emit(
                                ProgressEvent::new(req.ticket_id, ProgressEventType::Progress)
                                    .with_step("text_delta")
                                    .with_payload(serde_json::json!({"delta": delta})),
                            )
                            .await;
                    }
                    TurnEvent::ToolStart { id, name } => {
                        self.progress
                            .emit(
                                ProgressEvent::new(req.ticket_id, ProgressEventType::ToolStart)
                                    .with_step(&name)
                                    .with_payload(serde_json::json!({"tool_use_id": id})),
                            )
                            .await;
                    }
                    TurnEvent::ToolResult { id, content } => {
                        self.progress
                            .emit(
                                ProgressEvent::new(req.ticket_id, ProgressEventType::ToolResult)
                                    .with_payload(serde_json::json!({"tool_use_id": id, "content": content})),
                            )
                            .await;
                    }
                    TurnEvent::Final(response) => {
                        final_response = Some(response);
                    }
                }
            }

            let Some(response) = final_response else {
                return Err(AppError::LlmTransient(
                    "provider stream ended without a final response".to_string(),
                ));
            };

            session_handle = response.session_handle.clone().or(session_handle);
            input_tokens += response.input_tokens;
            output_tokens += response.output_tokens;

            let text = response.text();
            if !text.is_empty() {
                response_text = text;
            }

            if !response.has_tool_use() {
                return Ok(RuntimeOutput {
                    response_text,
                    tool_calls,
                    work_outputs,
                    input_tokens,
                    output_tokens,
                    iterations: iteration,
                    hit_iteration_cap: false,
                    checkpoint_raised: work_outputs.iter().any(|o| o.requires_review),
                    session_handle,
                });
            }

            messages.push(Message {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            let mut results = Vec::new();
            for (id, name, args) in response.tool_uses() {
                if req.cancel.load(Ordering::SeqCst) {
                    return Err(AppError::Cancelled);
                }

                let (value, is_error) = self
                    .tools
                    .dispatch(name, args.clone(), &req.tool_ctx)
                    .await;

                if name == "emit_work_output" && !is_error {
                    if let Some(record) = parse_emitted_output(args, &value) {
                        work_outputs.push(record);
                    }
                }

                tool_calls.push(ToolCallRecord {
                    tool_use_id: id.to_string(),
                    name: name.to_string(),
                    args: args.clone(),
                    is_error,
                });

                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.to_string(),
                    content: value,
                    is_error,
                });
            }

            messages.push(Message::tool_results(results));
        }

        Ok(RuntimeOutput {
            response_text: ITERATION_CAP_APOLOGY.to_string(),
            tool_calls,
            work_outputs,
            input_tokens,
            output_tokens,
            iterations: max_iterations,
            hit_iteration_cap: true,
            checkpoint_raised: false,
            session_handle,
        })
    }
}

fn parse_emitted_output(args: &Value, result: &Value) -> Option<EmittedOutputRecord> {
    let output_id = result.get("id").and_then(|v| v.as_str())?;
    let output_id = Uuid::parse_str(output_id).ok()?;
    let confidence = args.get("confidence").and_then(|v| v.as_f64()).unwrap_or(1.0) as f32;
    let requires_review = confidence < 0.7
        || args
            .get("metadata")
            .and_then(|m| m.get("requires_review"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
    Some(EmittedOutputRecord {
        output_id,
        confidence,
        requires_review,
    })
}

fn llm_error_to_app(e: LlmError) -> AppError {
    AppError::LlmTransient(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::DatabaseError;
    use crate::model::{
        AgentKind, AgentSession, Project, ProjectStatus, PromotionMode, WorkRequest, WorkTicket, WorkTicketStatus,
    };
    use crate::recipe::RecipeCatalog;
    use crate::substrate::SubstrateClient;
    use crate::ticket::{AdmitRecipeRequest, TicketAdmission};
    use crate::tools::{ToolCatalog, ToolSchema, WorkTool};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Always returns exactly one tool-use block calling `noop`, never
    /// terminating on its own — used to drive the loop into its iteration
    /// cap.
    struct AlwaysToolUseLlm;

    #[async_trait]
    impl LlmClient for AlwaysToolUseLlm {
        async fn turn(&self, _req: TurnRequest) -> Result<TurnResponse, LlmError> {
            Ok(TurnResponse {
                content: vec![ContentBlock::ToolUse {
                    id: "call-1".to_string(),
                    name: "noop".to_string(),
                    input: serde_json::json!({}),
                }],
                session_handle: Some("handle-1".to_string()),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    struct NoopTool;

    #[async_trait]
    impl WorkTool for NoopTool {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("noop", "does nothing")
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct UnreachableDb;

    #[async_trait]
    impl Database for UnreachableDb {
        async fn ensure_workspace(&self, _id: Uuid, _name: &str) -> Result<(), DatabaseError> {
            unreachable!("noop tool does not touch the database")
        }
        async fn create_project(&self, _p: &Project) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_project(&self, _id: Uuid) -> Result<Option<Project>, DatabaseError> {
            unreachable!()
        }
        async fn get_project_by_basket(&self, _id: Uuid) -> Result<Option<Project>, DatabaseError> {
            unreachable!()
        }
        async fn list_projects_for_workspace(&self, _id: Uuid) -> Result<Vec<Project>, DatabaseError> {
            unreachable!()
        }
        async fn update_project_status(&self, _id: Uuid, _s: ProjectStatus) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn update_project_promotion_settings(
            &self,
            _id: Uuid,
            _m: PromotionMode,
            _t: &[String],
        ) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn has_active_subscription(
            &self,
            _user_id: &str,
            _workspace_id: Uuid,
            _agent_kind: AgentKind,
        ) -> Result<bool, DatabaseError> {
            unreachable!()
        }
        async fn count_trial_work_requests(&self, _user_id: &str, _workspace_id: Uuid) -> Result<u32, DatabaseError> {
            unreachable!()
        }
        async fn insert_work_request(&self, _r: &WorkRequest) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_work_request(&self, _id: Uuid) -> Result<Option<WorkRequest>, DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_completed(&self, _id: Uuid, _s: Option<&str>) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_work_request_failed(&self, _id: Uuid, _m: &str) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_session_by_basket_agent_kind(
            &self,
            _basket_id: Uuid,
            _agent_kind: AgentKind,
        ) -> Result<Option<AgentSession>, DatabaseError> {
            unreachable!()
        }
        async fn get_session(&self, _id: Uuid) -> Result<Option<AgentSession>, DatabaseError> {
            unreachable!()
        }
        async fn insert_session(&self, _s: &AgentSession) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn update_session_handle(&self, _id: Uuid, _h: &str) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn update_session_state(&self, _id: Uuid, _s: &serde_json::Value) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn insert_ticket(&self, _t: &WorkTicket) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn get_ticket(&self, _id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
            unreachable!()
        }
        async fn get_ticket_by_work_request(&self, _id: Uuid) -> Result<Option<WorkTicket>, DatabaseError> {
            unreachable!()
        }
        async fn mark_ticket_running(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn mark_ticket_terminal(&self, _id: Uuid, _status: WorkTicketStatus) -> Result<(), DatabaseError> {
            unreachable!()
        }
        async fn increment_ticket_output_count(&self, _id: Uuid) -> Result<(), DatabaseError> {
            unreachable!()
        }
    }

    struct UnreachableTicketAdmission;

    #[async_trait]
    impl TicketAdmission for UnreachableTicketAdmission {
        async fn admit_recipe(&self, _req: AdmitRecipeRequest) -> Result<Uuid, AppError> {
            unreachable!("noop tool never calls trigger_recipe")
        }
    }

    fn test_config() -> AppConfig {
        use crate::config::{AuthConfig, CircuitBreakerConfig, DatabaseConfig, LlmConfig, SubstrateConfig};
        use secrecy::SecretString;

        AppConfig {
            substrate: SubstrateConfig {
                base_url: "http://localhost:10000".to_string(),
                user_token: None,
                service_secret: None,
                timeout: Duration::from_secs(30),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                cooldown: Duration::from_secs(60),
                half_open_max_requests: 3,
            },
            database: DatabaseConfig {
                url: SecretString::from("postgres://localhost/test".to_string()),
                pool_size: 1,
            },
            auth: AuthConfig {
                jwt_secret: SecretString::from("test-secret".to_string()),
            },
            llm: LlmConfig {
                base_url: "http://localhost:9000".to_string(),
                api_key: None,
            },
            http_port: 8080,
            trial_cap: 10,
            work_platform_url: "http://localhost:8080".to_string(),
            tool_loop_max_iterations: 10,
        }
    }

    #[tokio::test]
    async fn tool_loop_terminates_within_max_iterations() {
        let config = Arc::new(test_config());
        let tools = Arc::new(ToolCatalog::new(vec![Arc::new(NoopTool)]));
        let progress = Arc::new(ProgressChannel::new());
        let llm: Arc<dyn LlmClient> = Arc::new(AlwaysToolUseLlm);
        let runtime = AgentRuntime::new(llm, Arc::clone(&tools), progress, Arc::clone(&config));

        let substrate = Arc::new(SubstrateClient::new(config.substrate.clone(), &config.circuit_breaker));
        let ticket_id = Uuid::new_v4();
        let tool_ctx = ToolContext {
            basket_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            ticket_id,
            agent_kind: AgentKind::Research,
            session_id: Uuid::new_v4(),
            auth: crate::substrate::AuthOverride::default(),
            substrate,
            db: Arc::new(UnreachableDb),
            config: Arc::clone(&config),
            recipes: Arc::new(RecipeCatalog::new()),
            ticket_admission: Arc::new(UnreachableTicketAdmission),
        };

        let req = RunRequest {
            ticket_id,
            task: TaskDirective {
                work_mode: "deep_dive".to_string(),
                description: "investigate X".to_string(),
                parameters: serde_json::json!({}),
            },
            dynamic_context: DynamicContext::default(),
            context_envelope: None,
            session_handle: None,
            tool_ctx,
            cancel: Arc::new(AtomicBool::new(false)),
        };

        let output = runtime.run(req).await.expect("runtime never errors on a no-op loop");

        assert_eq!(output.iterations, 10);
        assert!(output.hit_iteration_cap);
        assert_eq!(output.response_text, ITERATION_CAP_APOLOGY);
        assert_eq!(output.tool_calls.len(), 10);
        assert!(!output.checkpoint_raised);
    }
}
