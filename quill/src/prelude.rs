//! One-stop import for applications embedding the engine.

pub use crate::{
    token_sink, ChatError, ChatErrorKind, ChatProvider, ChatScope, Client, Content, ContentPart,
    GenerationOptions, HistoryFormatter, InMemorySessionStore, LlmResponse, MemoryManager,
    MemoryStrategy, Message, OpenAiConfig, OpenAiProvider, Role, SessionId, SessionStore,
    TokenSink, TokenUsage, ToolCall, ToolDefinition, ToolError, ToolRegistry, TurnParams,
};
pub use crate::{in_memory_client, openai_provider, user_message};
