//! Short-lived orchestration scope: context preparation, the Re-Act loop,
//! and structured-output self-correction.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use qmemory::MemoryManager;
use qprovider::{
    ChatProvider, Content, ContentPart, GenerationOptions, Message, TokenUsage, ToolCall,
};
use qtooling::{ToolError, ToolErrorKind, ToolRegistry};
use serde::de::DeserializeOwned;

use crate::aggregator::{DeltaBatcher, ToolCallAssembler};
use crate::extract::extract_json;
use crate::{ChatError, TokenSink, TurnParams};

/// One orchestration context bound to a client.
///
/// A scope carries registered tools, the tool-round bound, and the usage of
/// the last provider turn. It is created per top-level conversation call and
/// is not meant to outlive it.
pub struct ChatScope {
    provider: Arc<dyn ChatProvider>,
    memory: Arc<MemoryManager>,
    tools: ToolRegistry,
    max_tool_rounds: u32,
    max_json_retries: u32,
    last_usage: Option<TokenUsage>,
}

impl ChatScope {
    pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;
    pub const DEFAULT_MAX_JSON_RETRIES: u32 = 3;

    pub(crate) fn new(provider: Arc<dyn ChatProvider>, memory: Arc<MemoryManager>) -> Self {
        Self {
            provider,
            memory,
            tools: ToolRegistry::new(),
            max_tool_rounds: Self::DEFAULT_MAX_TOOL_ROUNDS,
            max_json_retries: Self::DEFAULT_MAX_JSON_RETRIES,
            last_usage: None,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_max_json_retries(mut self, retries: u32) -> Self {
        self.max_json_retries = retries;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tools.set_timeout(Some(timeout));
        self
    }

    /// Usage reported by the most recent provider turn, when any.
    pub fn last_usage(&self) -> Option<TokenUsage> {
        self.last_usage
    }

    /// Registers a local executor for a model-callable function. The
    /// parameter schema is a JSON string; invalid JSON is an argument error.
    pub fn register_tool<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_json: &str,
        executor: F,
    ) -> Result<(), ChatError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.tools
            .register_fn(name, Some(description.into()), parameters_json, executor)
            .map_err(|error| ChatError::argument(error.message))
    }

    /// Runs a non-streaming conversation turn and returns the final text.
    pub async fn ask(
        &mut self,
        input: impl Into<String>,
        params: TurnParams,
    ) -> Result<String, ChatError> {
        let input = input.into();
        let (messages, write) = self.prepare_text_context(&input, &params).await?;
        self.run_loop(messages, &params, write, None).await
    }

    /// Runs a streaming conversation turn, delivering batched text chunks to
    /// `sink`, and returns the full accumulated text.
    pub async fn ask_stream(
        &mut self,
        input: impl Into<String>,
        params: TurnParams,
        sink: TokenSink,
    ) -> Result<String, ChatError> {
        let input = input.into();
        let (messages, write) = self.prepare_text_context(&input, &params).await?;
        self.run_loop(messages, &params, write, Some(sink)).await
    }

    /// Multimodal turn. Templates do not apply to parts content.
    pub async fn ask_parts(
        &mut self,
        parts: Vec<ContentPart>,
        params: TurnParams,
    ) -> Result<String, ChatError> {
        let (messages, write) = self.prepare_parts_context(parts, &params).await?;
        self.run_loop(messages, &params, write, None).await
    }

    pub async fn ask_parts_stream(
        &mut self,
        parts: Vec<ContentPart>,
        params: TurnParams,
        sink: TokenSink,
    ) -> Result<String, ChatError> {
        let (messages, write) = self.prepare_parts_context(parts, &params).await?;
        self.run_loop(messages, &params, write, Some(sink)).await
    }

    /// Asks for a value of `T`, re-prompting the provider with a correction
    /// message when the sanitized output fails to deserialize. Only
    /// deserialization failures trigger the retry; anything else propagates.
    pub async fn ask_structured<T: DeserializeOwned>(
        &mut self,
        input: impl Into<String>,
        params: TurnParams,
    ) -> Result<T, ChatError> {
        let mut last_response = self.ask(input, params.clone()).await?;
        let mut attempts = 0u32;

        loop {
            let cleaned = extract_json(&last_response);
            match serde_json::from_str::<T>(&cleaned) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempts += 1;
                    if attempts > self.max_json_retries {
                        return Err(ChatError::serialization(format!(
                            "structured output failed after {attempts} attempts: {error}"
                        )));
                    }

                    tracing::debug!(attempt = attempts, error = %error, "re-prompting for valid JSON");

                    // Correction turns bypass memory and pin the temperature
                    // low for a deterministic reply.
                    let correction = format!(
                        "Previous JSON invalid: {error}. Return ONLY JSON. Original content: {last_response}"
                    );
                    let mut options = params.options.clone();
                    options.temperature = Some(0.1);

                    let response = self
                        .provider
                        .chat(vec![Message::user(correction)], options)
                        .await?;
                    if response.usage.is_some() {
                        self.last_usage = response.usage;
                    }
                    last_response = response.content;
                }
            }
        }
    }

    async fn prepare_text_context(
        &self,
        input: &str,
        params: &TurnParams,
    ) -> Result<(Vec<Message>, bool), ChatError> {
        let reads = params.strategy.reads();
        let writes = params.strategy.writes();
        let template = params
            .template
            .as_deref()
            .filter(|template| !template.trim().is_empty());

        let mut messages = Vec::new();

        if let Some(template) = template {
            if template.contains("{{history}}") && !reads {
                return Err(ChatError::argument(
                    "template uses {{history}} but the memory strategy disables reads",
                ));
            }

            let mut rendered = template.replace("{{it}}", input);
            if template.contains("{{history}}") {
                let formatter = params.formatter.clone().unwrap_or_default();
                let history = self
                    .memory
                    .current_history(params.window, None, false)
                    .await?;
                rendered = rendered.replace("{{history}}", &formatter.render(&history));
            }

            if let Some(system) = self
                .memory
                .effective_system_prompt(params.system_override.as_deref())
                .await?
            {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(rendered));
        } else if reads {
            let history = self
                .memory
                .current_history(params.window, params.system_override.as_deref(), true)
                .await?;
            messages.extend(history);
            messages.push(Message::user(input));
        } else {
            if let Some(system) = self
                .memory
                .effective_system_prompt(params.system_override.as_deref())
                .await?
            {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(input));
        }

        if writes {
            // The raw input is stored, not the templated form.
            self.memory.append(Message::user(input)).await?;
        }

        Ok((messages, writes))
    }

    async fn prepare_parts_context(
        &self,
        parts: Vec<ContentPart>,
        params: &TurnParams,
    ) -> Result<(Vec<Message>, bool), ChatError> {
        let reads = params.strategy.reads();
        let writes = params.strategy.writes();

        let mut messages = Vec::new();
        if reads {
            let history = self
                .memory
                .current_history(params.window, params.system_override.as_deref(), true)
                .await?;
            messages.extend(history);
        } else if let Some(system) = self
            .memory
            .effective_system_prompt(params.system_override.as_deref())
            .await?
        {
            messages.push(Message::system(system));
        }

        let user = Message::user(Content::Parts(parts));
        messages.push(user.clone());

        if writes {
            self.memory.append(user).await?;
        }

        Ok((messages, writes))
    }

    async fn run_loop(
        &mut self,
        mut messages: Vec<Message>,
        params: &TurnParams,
        write: bool,
        sink: Option<TokenSink>,
    ) -> Result<String, ChatError> {
        let mut options = params.options.clone();
        self.merge_tools(&mut options);

        let mut last_text = String::new();
        for _round in 0..self.max_tool_rounds.max(1) {
            let (text, tool_calls, usage) = match &sink {
                Some(sink) => self.stream_round(&messages, &options, sink).await?,
                None => self.chat_round(&messages, &options).await?,
            };

            if usage.is_some() {
                self.last_usage = usage;
            }
            last_text = text.clone();

            let assistant = Message::assistant_with_tool_calls(text, tool_calls.clone());
            messages.push(assistant.clone());
            if write {
                self.memory.append(assistant).await?;
            }

            if tool_calls.is_empty() {
                return Ok(last_text);
            }

            self.dispatch_tool_calls(&tool_calls, &mut messages, write)
                .await?;
        }

        tracing::warn!(
            max_tool_rounds = self.max_tool_rounds,
            "tool round limit reached before a tool-call-free turn"
        );
        Ok(last_text)
    }

    async fn chat_round(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<(String, Vec<ToolCall>, Option<TokenUsage>), ChatError> {
        let response = self
            .provider
            .chat(messages.to_vec(), options.clone())
            .await?;

        Ok((
            response.content,
            response.tool_calls.unwrap_or_default(),
            response.usage,
        ))
    }

    async fn stream_round(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        sink: &TokenSink,
    ) -> Result<(String, Vec<ToolCall>, Option<TokenUsage>), ChatError> {
        let mut stream = self
            .provider
            .stream(messages.to_vec(), options.clone())
            .await?;

        let mut batcher = DeltaBatcher::new(Arc::clone(sink));
        let mut assembler = ToolCallAssembler::new();
        let mut usage = None;
        let mut stream_error = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(response) => {
                    batcher.push(&response.content);
                    if let Some(fragments) = &response.tool_calls {
                        for fragment in fragments {
                            assembler.absorb(fragment);
                        }
                    }
                    if response.usage.is_some() {
                        usage = response.usage;
                    }
                }
                Err(error) => {
                    stream_error = Some(error);
                    break;
                }
            }
        }

        // Flush already-observed bytes before surfacing any error.
        let text = batcher.finish().await;
        if let Some(error) = stream_error {
            return Err(error.into());
        }

        Ok((text, assembler.finish(), usage))
    }

    async fn dispatch_tool_calls(
        &mut self,
        tool_calls: &[ToolCall],
        messages: &mut Vec<Message>,
        write: bool,
    ) -> Result<(), ChatError> {
        for call in tool_calls {
            let name = call.function.name.as_str();
            let output = match self.tools.execute(name, &call.function.arguments).await {
                Ok(output) => output,
                Err(error) if error.kind == ToolErrorKind::NotFound => {
                    format!("Error executing tool '{name}': not registered")
                }
                Err(error) => format!("Error executing tool '{name}': {}", error.message),
            };

            let message = Message::tool(output, call.id.clone(), name);
            messages.push(message.clone());
            if write {
                self.memory.append(message).await?;
            }
        }

        Ok(())
    }

    fn merge_tools(&self, options: &mut GenerationOptions) {
        let mut merged = self.tools.definitions();
        if merged.is_empty() {
            return;
        }

        if let Some(caller_tools) = options.tools.take() {
            for tool in caller_tools {
                if !merged.iter().any(|existing| existing.name == tool.name) {
                    merged.push(tool);
                }
            }
        }

        options.tools = Some(merged);
    }
}
