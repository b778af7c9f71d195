//! Provider contract and OpenAI-compatible adapter for chat completions.
//!
//! ```rust
//! use qprovider::{GenerationOptions, Message};
//!
//! let messages = vec![
//!     Message::system("Be concise."),
//!     Message::user("Summarize this patch"),
//! ];
//! let options = GenerationOptions::new().with_temperature(0.2);
//!
//! assert_eq!(messages.len(), 2);
//! assert!(options.validate().is_ok());
//! ```

pub mod adapters;
mod config;
mod content;
mod error;
mod model;
mod provider;

pub use adapters::openai::{OpenAiHttpTransport, OpenAiProvider, OpenAiTransport};
pub use config::{OpenAiConfig, SecretString};
pub use content::{AudioSource, Content, ContentPart, ImageSource, VideoSource};
pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    FunctionCall, GenerationOptions, LlmResponse, Message, Role, TokenUsage, ToolCall,
    ToolDefinition,
};
pub use provider::{BoxedResponseStream, ChatProvider, ProviderFuture, VecResponseStream};
