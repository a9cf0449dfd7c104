//! `emit_work_output` — the canonical path by which agent text becomes a
//! user-visible, reviewable artifact.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::model::OutputType;
use crate::substrate::types::CreateWorkOutputRequest;
use crate::tools::tool::{ToolContext, ToolError, ToolSchema, WorkTool};

pub struct EmitWorkOutputTool;

#[async_trait]
impl WorkTool for EmitWorkOutputTool {
    fn name(&self) -> &'static str {
        "emit_work_output"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "emit_work_output",
            "Persist one structured artifact (finding, recommendation, insight, \
             draft, report section, etc.) for human review.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "output_type": {
                    "type": "string",
                    "enum": ["finding", "recommendation", "insight", "draft_content",
                             "content_variant", "content_asset", "report_section",
                             "document", "error"]
                },
                "title": {"type": "string"},
                "body": {},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "source_context_ids": {"type": "array", "items": {"type": "string"}},
                "tool_call_id": {"type": "string"}
            },
            "required": ["output_type", "title", "body", "confidence"]
        }))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let output_type_str = args
            .get("output_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters("output_type is required".to_string()))?;
        let output_type = OutputType::parse(output_type_str)
            .ok_or_else(|| ToolError::InvalidParameters(format!("unknown output_type: {output_type_str}")))?;

        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters("title is required".to_string()))?
            .to_string();

        let body = args
            .get("body")
            .cloned()
            .ok_or_else(|| ToolError::InvalidParameters("body is required".to_string()))?;

        let confidence = args
            .get("confidence")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ToolError::InvalidParameters("confidence is required".to_string()))?
            as f32;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ToolError::InvalidParameters(
                "confidence must be within [0, 1]".to_string(),
            ));
        }

        let source_context_ids: Vec<Uuid> = args
            .get("source_context_ids")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default();

        let tool_call_id = args
            .get("tool_call_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let request = CreateWorkOutputRequest {
            basket_id: ctx.basket_id,
            work_ticket_id: ctx.ticket_id,
            agent_kind: ctx.agent_kind.as_str().to_string(),
            output_type: output_type.as_str().to_string(),
            title,
            body,
            confidence,
            source_context_ids,
            tool_call_id,
        };

        let response = ctx.substrate.create_work_output(&ctx.auth, request).await?;

        Ok(serde_json::json!({"id": response.id}))
    }
}
