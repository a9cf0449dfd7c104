//! Built-in tool implementations.

mod context;
mod document_skill;
mod output;
mod recipes;
mod web_search;

use std::sync::Arc;

use super::tool::WorkTool;

pub use context::{ListContextTool, ReadContextTool, WriteContextTool};
pub use document_skill::DocumentSkillTool;
pub use output::EmitWorkOutputTool;
pub use recipes::{ListRecipesTool, TriggerRecipeTool};
pub use web_search::WebSearchTool;

/// Every tool in the core catalog, ready to hand to [`super::ToolCatalog::new`].
pub fn all() -> Vec<Arc<dyn WorkTool>> {
    vec![
        Arc::new(EmitWorkOutputTool),
        Arc::new(ReadContextTool),
        Arc::new(WriteContextTool),
        Arc::new(ListContextTool),
        Arc::new(ListRecipesTool),
        Arc::new(TriggerRecipeTool),
        Arc::new(WebSearchTool),
        Arc::new(DocumentSkillTool),
    ]
}
