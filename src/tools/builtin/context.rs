//! `read_context`, `write_context`, `list_context`.

use async_trait::async_trait;
use serde_json::Value;

use crate::substrate::types::WriteContextRequest;
use crate::tools::tool::{ToolContext, ToolError, ToolSchema, WorkTool};

/// item_type → required content field names. Absence means no schema is
/// registered for that type, so completeness is defined as 1.0.
fn required_fields(item_type: &str) -> Option<&'static [&'static str]> {
    match item_type {
        "problem" => Some(&["statement", "audience"]),
        "customer" => Some(&["segment", "pain_points"]),
        "brand" => Some(&["voice", "tone"]),
        _ => None,
    }
}

/// item_type → tier. Foundation-tier writes are subject to the workspace's
/// governance policy, enforced substrate-side; this orchestrator only
/// needs to pick the right tier to send.
fn tier_for(item_type: &str) -> &'static str {
    match item_type {
        "problem" | "customer" | "brand" => "foundation",
        _ => "working",
    }
}

fn completeness(item_type: &str, content: &Value) -> f32 {
    let Some(fields) = required_fields(item_type) else {
        return 1.0;
    };
    if fields.is_empty() {
        return 1.0;
    }
    let obj = content.as_object();
    let filled = fields
        .iter()
        .filter(|f| {
            obj.and_then(|o| o.get(**f))
                .map(|v| !v.is_null())
                .unwrap_or(false)
        })
        .count();
    filled as f32 / fields.len() as f32
}

pub struct ReadContextTool;

#[async_trait]
impl WorkTool for ReadContextTool {
    fn name(&self) -> &'static str {
        "read_context"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "read_context",
            "Read the designated context item from this project's basket.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "item_type": {"type": "string"},
                "item_key": {"type": "string"},
                "fields": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["item_type"]
        }))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let item_type = args
            .get("item_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters("item_type is required".to_string()))?;
        let item_key = args.get("item_key").and_then(|v| v.as_str());
        let fields = args
            .get("fields")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>());

        let item = ctx
            .substrate
            .read_context(&ctx.auth, ctx.basket_id, item_type, item_key)
            .await?;

        let Some(item) = item else {
            return Ok(serde_json::json!({"found": false}));
        };

        let content = match fields {
            Some(wanted) if !wanted.is_empty() => {
                let mut filtered = serde_json::Map::new();
                if let Some(obj) = item.content.as_object() {
                    for key in wanted {
                        if let Some(v) = obj.get(key) {
                            filtered.insert(key.to_string(), v.clone());
                        }
                    }
                }
                Value::Object(filtered)
            }
            _ => item.content,
        };

        Ok(serde_json::json!({
            "found": true,
            "tier": item.tier,
            "content": content,
            "completeness_score": item.completeness_score,
            "updated_at": item.updated_at,
        }))
    }
}

pub struct WriteContextTool;

#[async_trait]
impl WorkTool for WriteContextTool {
    fn name(&self) -> &'static str {
        "write_context"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "write_context",
            "Upsert a context item for this project's basket, or propose it if \
             it is foundation-tier and the workspace requires approval.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "item_type": {"type": "string"},
                "item_key": {"type": "string"},
                "content": {"type": "object"},
                "title": {"type": "string"}
            },
            "required": ["item_type", "content"]
        }))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let item_type = args
            .get("item_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParameters("item_type is required".to_string()))?
            .to_string();
        let item_key = args
            .get("item_key")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let content = args
            .get("content")
            .cloned()
            .ok_or_else(|| ToolError::InvalidParameters("content is required".to_string()))?;
        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let score = completeness(&item_type, &content);
        let tier = tier_for(&item_type).to_string();

        let req = WriteContextRequest {
            basket_id: ctx.basket_id,
            item_type,
            item_key,
            tier,
            content,
            title,
            completeness_score: score,
        };

        let response = ctx.substrate.write_context(&ctx.auth, req).await?;

        Ok(serde_json::json!({
            "action": response.action,
            "requires_approval": response.governance_proposal_id.is_some(),
            "governance_proposal_id": response.governance_proposal_id,
        }))
    }
}

pub struct ListContextTool;

#[async_trait]
impl WorkTool for ListContextTool {
    fn name(&self) -> &'static str {
        "list_context"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "list_context",
            "List active context items for this project's basket, grouped by tier.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "tier": {"type": "string", "enum": ["foundation", "working", "ephemeral"]}
            },
            "required": []
        }))
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let tier = args.get("tier").and_then(|v| v.as_str());
        let items = ctx.substrate.list_context(&ctx.auth, ctx.basket_id, tier).await?;

        let known_types = ["problem", "customer", "brand"];
        let present: std::collections::HashSet<_> =
            items.iter().map(|i| i.item_type.clone()).collect();
        let missing: Vec<_> = known_types
            .iter()
            .filter(|t| !present.contains(**t))
            .map(|t| t.to_string())
            .collect();

        let mut by_tier: std::collections::BTreeMap<String, Vec<&crate::substrate::types::ContextItem>> =
            std::collections::BTreeMap::new();
        for item in &items {
            by_tier.entry(item.tier.clone()).or_default().push(item);
        }

        let tier_summaries: Vec<Value> = by_tier
            .iter()
            .map(|(tier, items)| {
                serde_json::json!({
                    "tier": tier,
                    "count": items.len(),
                    "items": items.iter().map(|i| serde_json::json!({
                        "item_type": i.item_type,
                        "item_key": i.item_key,
                        "completeness_score": i.completeness_score,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();

        let overall_completeness = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|i| i.completeness_score).sum::<f32>() / items.len() as f32
        };

        Ok(serde_json::json!({
            "tiers": tier_summaries,
            "missing": missing,
            "overall_completeness": overall_completeness,
        }))
    }
}
