//! Unified facade over the quill workspace crates.
//!
//! This crate is designed to be the single dependency for most applications.
//! It re-exports the core crates and provides convenience utilities and
//! macros for common setup and message-building flows.
//!
//! ```rust
//! use quill::{ql_messages, Role};
//!
//! let messages = ql_messages![
//!     system => "You are concise.",
//!     user => "Summarize the repo",
//! ];
//!
//! assert_eq!(messages.len(), 2);
//! assert_eq!(messages[0].role, Role::System);
//! ```

mod macros;

pub mod prelude;
pub mod util;

pub use qchat;
pub use qcommon;
pub use qmemory;
pub use qprovider;
pub use qtooling;

pub use qchat::{
    extract_json, token_sink, ChatError, ChatErrorKind, ChatScope, Client, ClientBuilder,
    HistoryFormatter, MemoryStrategy, SinkFuture, TokenSink, TurnParams,
};
pub use qcommon::{BoxFuture, MetadataMap, SessionId};
pub use qmemory::{
    EvictedSession, InMemorySessionStore, MemoryError, MemoryErrorKind, MemoryManager,
    SessionCache, SessionState, SessionStore,
};
pub use qprovider::{
    AudioSource, BoxedResponseStream, ChatProvider, Content, ContentPart, FunctionCall,
    GenerationOptions, ImageSource, LlmResponse, Message, OpenAiConfig, OpenAiHttpTransport,
    OpenAiProvider, OpenAiTransport, ProviderError, ProviderErrorKind, ProviderFuture, Role,
    SecretString, TokenUsage, ToolCall, ToolDefinition, VecResponseStream, VideoSource,
};
pub use qtooling::{
    parse_json_object, parse_json_value, required_string, FunctionTool, Tool, ToolError,
    ToolErrorKind, ToolFuture, ToolRegistry,
};

pub use util::{
    assistant_message, image_message, in_memory_client, openai_provider, system_message,
    user_message,
};

#[cfg(test)]
mod tests {
    use crate::Role;

    #[test]
    fn ql_msg_macro_creates_expected_message() {
        let message = crate::ql_msg!(user => "hello");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "hello");
    }

    #[test]
    fn ql_messages_macro_builds_message_vector() {
        let messages = crate::ql_messages![
            system => "You are concise.",
            user => "Summarize the repo",
        ];

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }
}
