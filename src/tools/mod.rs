//! LLM tool surface
//!
//! [`schema`] declares the catalog, [`facade`] implements one method per
//! tool over the registry's current connection, and [`dispatch`] maps JSON
//! calls onto the facade.

pub mod dispatch;
pub mod facade;
pub mod schema;

pub use dispatch::{Submission, ToolCall, ToolDispatcher, error_payload};
pub use facade::DatabaseTools;
pub use schema::{ToolSchema, ToolSpec, catalog, find_tool, function_definitions};
