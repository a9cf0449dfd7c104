//! Tool Catalog & Dispatch.
//!
//! Named tool handlers with JSON-Schema contracts, invoked by name from the
//! agent runtime's tool loop. A [`WorkTool`] is the unit of dispatch;
//! [`ToolCatalog`] is the name → handler registry.

pub mod builtin;

mod registry;
mod tool;

pub use registry::ToolCatalog;
pub use tool::{ToolContext, ToolError, ToolSchema, WorkTool};
