//! The `Tool` extension trait and its registry.
//!
//! Tools are the unit the MCP surface dispatches to (`SPEC_FULL.md`
//! §6): each implements [`Tool`] and is handed a [`ToolContext`]
//! wrapping the shared [`Context`](crate::context::Context) — storage
//! collections, the ranking engine, caches, and resilience all reach a
//! handler through that one bridge, the same shape the teacher's
//! `ToolContext` used over a bare `Config`.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use serde_json::{json, Value};
//! use noesis_core::traits::{Tool, ToolContext};
//!
//! pub struct PingTool;
//!
//! #[async_trait]
//! impl Tool for PingTool {
//!     fn name(&self) -> &str { "ping" }
//!     fn description(&self) -> &str { "Liveness probe" }
//!
//!     fn parameters_schema(&self) -> Value {
//!         json!({ "type": "object", "properties": {} })
//!     }
//!
//!     async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value> {
//!         Ok(json!({ "pong": true }))
//!     }
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;

/// A tool an agent can discover and call through the tool surface.
///
/// Implement this trait to add a tool. Tools are registered at startup
/// via [`ToolRegistry::register`] and exposed as `GET /tools/list` for
/// discovery and `POST /tools/{name}` for invocation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's name.
    ///
    /// Used as the route path (`POST /tools/{name}`) and in
    /// `GET /tools/list` responses. Should be a lowercase identifier
    /// with underscores (e.g. `"concept_search"`).
    fn name(&self) -> &str;

    /// Returns a one-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool is one of the eight named in the tool surface
    /// (as opposed to a custom addition). Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// Returns the JSON Schema for this tool's parameters.
    ///
    /// Must be a valid JSON Schema object with `type: "object"`,
    /// `properties`, and optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with validated parameters.
    ///
    /// # Arguments
    ///
    /// * `params` — JSON parameters (always a JSON object).
    /// * `ctx` — Bridge to storage, ranking, and caches.
    ///
    /// # Returns
    ///
    /// A JSON value wrapped in `{ "result": ... }` by the HTTP layer,
    /// or converted to `{ "error": { "code", "message" } }` on failure.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Context bridge for tool execution, created once per invocation from
/// the shared [`Context`].
pub struct ToolContext {
    pub ctx: Arc<Context>,
}

impl ToolContext {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

/// Registry of available tools, looked up by name for dispatch.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a tool registry pre-loaded with the eight tools named in
    /// the tool surface (`SPEC_FULL.md` §6).
    pub fn with_builtins() -> Self {
        use crate::tools::{
            BroadChunksSearchTool, CatalogSearchTool, CategorySearchTool, ConceptSearchTool,
            ExtractConceptsTool, ListCategoriesTool, ListConceptsInCategoryTool,
            SourceChunksSearchTool,
        };

        let mut registry = Self::new();
        registry.register(Box::new(ConceptSearchTool));
        registry.register(Box::new(CatalogSearchTool));
        registry.register(Box::new(BroadChunksSearchTool));
        registry.register(Box::new(SourceChunksSearchTool));
        registry.register(Box::new(ExtractConceptsTool));
        registry.register(Box::new(ListCategoriesTool));
        registry.register(Box::new(CategorySearchTool));
        registry.register(Box::new(ListConceptsInCategoryTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get all registered tools.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Return the count of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
