//! System prompt and initial task message construction.

use serde::{Deserialize, Serialize};

use crate::model::AgentKind;

/// Referenced assets, prior approved outputs, and (optionally) a top-k
/// context slice — assembled by the ticket executor before the runtime is
/// invoked. Inserted as summaries, never whole documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicContext {
    pub referenced_asset_titles: Vec<String>,
    pub prior_approved_output_titles: Vec<String>,
    pub top_context_items: Vec<ContextSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub item_type: String,
    pub summary: String,
}

/// Task description plus agent-kind-specific parameters, formatted into a
/// single directive prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDirective {
    pub work_mode: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl TaskDirective {
    pub fn render(&self) -> String {
        let params = serde_json::to_string_pretty(&self.parameters).unwrap_or_default();
        format!(
            "Work mode: {}\n\nTask:\n{}\n\nParameters:\n{}",
            self.work_mode, self.description, params
        )
    }
}

pub struct SystemPromptBuilder;

impl SystemPromptBuilder {
    /// Concatenates identity/quality rules, static orchestration
    /// principles, and the dynamic context block. Bounded in size —
    /// context enters as summaries, never raw documents.
    pub fn build(agent_kind: AgentKind, context: &DynamicContext) -> String {
        let mut sections = vec![
            identity_section(agent_kind).to_string(),
            ORCHESTRATION_PRINCIPLES.to_string(),
        ];

        let dynamic = render_dynamic_context(context);
        if !dynamic.is_empty() {
            sections.push(dynamic);
        }

        sections.join("\n\n")
    }
}

fn identity_section(agent_kind: AgentKind) -> &'static str {
    match agent_kind {
        AgentKind::Research => {
            "You are the research specialist for this project. Investigate the \
             assigned topic, cite the context you drew on, and never assert a \
             finding you would not stand behind at a lower confidence. When a \
             claim is speculative, emit it with confidence < 0.7 rather than \
             overstating certainty."
        }
        AgentKind::Content => {
            "You are the content specialist for this project. Draft copy that \
             matches the project's established brand voice. Prefer concrete, \
             specific language over generic marketing phrasing. Every draft is \
             an output, not a final publish — supervision reviews it before it \
             reaches the knowledge store."
        }
        AgentKind::Reporting => {
            "You are the reporting specialist for this project. Summarize \
             activity and findings accurately; do not invent figures that \
             are not traceable to context you read. Prefer report_section \
             outputs structured around a clear narrative."
        }
        AgentKind::ThinkingPartner => {
            "You are the thinking partner for this project: a conversational \
             collaborator with a hierarchy of specialist agents you can \
             dispatch work to via trigger_recipe. Help the user reason \
             through problems, and delegate concrete execution work rather \
             than attempting it yourself."
        }
    }
}

const ORCHESTRATION_PRINCIPLES: &str = "\
Operating principles:
- The knowledge store (the \"substrate\") is the durable source of truth \
for this project. You reach it only through your tools; you cannot write \
to it directly.
- Use `emit_work_output` for every structured artifact you produce — a \
finding, a recommendation, an insight, a content draft, or a report \
section. Text in your reply that never becomes a work output is not \
visible to the user's review queue.
- Read before you write: use `read_context` and `list_context` to check \
what is already known about this project before duplicating it.
- Tool calls happen in the order you issue them and their results are \
returned to you in that same order. Do not call a tool you do not need.";

fn render_dynamic_context(context: &DynamicContext) -> String {
    let mut lines = Vec::new();

    if !context.referenced_asset_titles.is_empty() {
        lines.push(format!(
            "Referenced assets available this ticket: {}",
            context.referenced_asset_titles.join(", ")
        ));
    }

    if !context.prior_approved_output_titles.is_empty() {
        lines.push(format!(
            "Prior approved outputs in this project: {}",
            context.prior_approved_output_titles.join(", ")
        ));
    }

    if !context.top_context_items.is_empty() {
        lines.push("Relevant context:".to_string());
        for item in &context.top_context_items {
            lines.push(format!("- [{}] {}", item.item_type, item.summary));
        }
    }

    if lines.is_empty() {
        return String::new();
    }

    format!("Context for this ticket:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_directive_renders_parameters() {
        let task = TaskDirective {
            work_mode: "deep_dive".to_string(),
            description: "Investigate X".to_string(),
            parameters: serde_json::json!({"topic": "X"}),
        };
        let rendered = task.render();
        assert!(rendered.contains("deep_dive"));
        assert!(rendered.contains("Investigate X"));
        assert!(rendered.contains("topic"));
    }

    #[test]
    fn dynamic_context_is_empty_when_nothing_to_show() {
        let context = DynamicContext::default();
        assert_eq!(render_dynamic_context(&context), "");
    }

    #[test]
    fn system_prompt_includes_identity_and_dynamic_context() {
        let context = DynamicContext {
            referenced_asset_titles: vec!["Q3 deck".to_string()],
            ..Default::default()
        };
        let prompt = SystemPromptBuilder::build(AgentKind::Research, &context);
        assert!(prompt.contains("research specialist"));
        assert!(prompt.contains("Q3 deck"));
    }
}
