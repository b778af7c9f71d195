//! Tool registry with validated registration and timeout-aware execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;
use futures_util::future::{select, Either};
use futures_util::{pin_mut, FutureExt};
use qprovider::ToolDefinition;
use serde_json::Value;

use crate::{FunctionTool, Tool, ToolError};

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Registers a tool after validating its definition. A later registration
    /// under the same name replaces the earlier one.
    pub fn register<T>(&mut self, tool: T) -> Result<(), ToolError>
    where
        T: Tool + 'static,
    {
        let definition = tool.definition();
        definition
            .validate()
            .map_err(|error| ToolError::invalid_arguments(error.message))?;

        self.tools.insert(definition.name, Arc::new(tool));
        Ok(())
    }

    /// Registers a closure-backed tool. The parameter schema is supplied as a
    /// JSON string; invalid JSON fails the registration.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        parameters_json: &str,
        handler: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let parameters: Value = serde_json::from_str(parameters_json).map_err(|error| {
            ToolError::invalid_arguments(format!("tool parameters must be valid JSON: {error}"))
        })?;

        self.register(FunctionTool::new(
            ToolDefinition::new(name, description, parameters),
            handler,
        ))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// Definitions of every registered tool, ordered by name for a stable
    /// wire body.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self
            .tools
            .values()
            .map(|tool| tool.definition())
            .collect::<Vec<_>>();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up and invokes a tool by name, applying the registry timeout.
    pub async fn execute(&self, name: &str, args_json: &str) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::not_found(format!("tool '{name}' is not registered")))?;

        let invocation = tool.invoke(args_json);

        if let Some(timeout) = self.timeout {
            let invoke = invocation.fuse();
            let delay = Delay::new(timeout).fuse();
            pin_mut!(invoke, delay);

            match select(invoke, delay).await {
                Either::Left((result, _)) => result,
                Either::Right((_elapsed, _)) => Err(ToolError::timeout(format!(
                    "tool '{name}' timed out after {timeout:?}"
                ))),
            }
        } else {
            invocation.await
        }
    }
}
