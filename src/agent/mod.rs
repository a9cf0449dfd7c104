//! Agent Runtime.
//!
//! One runtime instance per in-flight ticket: builds the system prompt,
//! drives the bounded LLM tool loop, and reports emitted outputs and
//! checkpoint status back to the ticket executor.

mod prompt;
mod runtime;

pub use prompt::{ContextSummary, DynamicContext, SystemPromptBuilder, TaskDirective};
pub use runtime::{
    AgentRuntime, EmittedOutputRecord, RunRequest, RuntimeOutput, ToolCallRecord,
    ITERATION_CAP_APOLOGY,
};
