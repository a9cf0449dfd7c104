//! `document_skill` — provider-hosted document generation (PPTX/XLSX/DOCX/
//! PDF). Declared so the model knows the capability
//! exists; the provider renders the file and the model is expected to
//! record the resulting metadata via `emit_work_output` in a follow-up
//! tool call.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::tool::{ToolContext, ToolError, ToolSchema, WorkTool};

pub struct DocumentSkillTool;

#[async_trait]
impl WorkTool for DocumentSkillTool {
    fn name(&self) -> &'static str {
        "document_skill"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "document_skill",
            "Generate a PPTX, XLSX, DOCX, or PDF document from the given \
             skill and spec. Provider-hosted: the provider renders the file \
             and returns its metadata; record it via emit_work_output.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "skill_id": {"type": "string"},
                "spec": {"type": "object"}
            },
            "required": ["skill_id", "spec"]
        }))
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        Err(ToolError::ProviderHosted(
            "document_skill is executed by the provider, not dispatched locally".to_string(),
        ))
    }
}
