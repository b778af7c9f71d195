//! Tool trait contract for registry-managed capabilities.
//!
//! ```rust
//! use qprovider::ToolDefinition;
//! use qtooling::{FunctionTool, Tool};
//!
//! let tool = FunctionTool::new(
//!     ToolDefinition::new("echo", Some("Echoes input".to_string()), serde_json::json!({"type": "string"})),
//!     |args| async move { Ok(args) },
//! );
//!
//! assert_eq!(tool.definition().name, "echo");
//! ```

use std::future::Future;
use std::sync::Arc;

use qcommon::BoxFuture;
use qprovider::ToolDefinition;

use crate::ToolError;

pub type ToolFuture<'a, T> = BoxFuture<'a, T>;

/// A locally executable function the model may request.
///
/// The executor maps the model-supplied argument JSON string to a result
/// string; any failure is carried as a [`ToolError`] so the caller can decide
/// how to surface it to the model.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn invoke<'a>(&'a self, args_json: &'a str) -> ToolFuture<'a, Result<String, ToolError>>;
}

type ToolHandler =
    dyn Fn(String) -> ToolFuture<'static, Result<String, ToolError>> + Send + Sync;

pub struct FunctionTool {
    definition: ToolDefinition,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler: Arc<ToolHandler> = Arc::new(move |args_json| Box::pin(handler(args_json)));

        Self {
            definition,
            handler,
        }
    }
}

impl Tool for FunctionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn invoke<'a>(&'a self, args_json: &'a str) -> ToolFuture<'a, Result<String, ToolError>> {
        (self.handler)(args_json.to_string())
    }
}
