//! Small convenience constructors and wiring helpers.

use std::sync::Arc;

use crate::{
    ChatError, ChatProvider, Client, Content, ContentPart, Message, OpenAiConfig, OpenAiProvider,
};

pub fn system_message(content: impl Into<Content>) -> Message {
    Message::system(content)
}

pub fn user_message(content: impl Into<Content>) -> Message {
    Message::user(content)
}

pub fn assistant_message(content: impl Into<Content>) -> Message {
    Message::assistant(content)
}

pub fn image_message(caption: impl Into<String>, url: impl Into<String>) -> Message {
    Message::user(vec![
        ContentPart::text(caption.into()),
        ContentPart::image_url(url),
    ])
}

/// An OpenAI-compatible provider from application-supplied settings.
pub fn openai_provider(config: OpenAiConfig) -> Arc<dyn ChatProvider> {
    Arc::new(OpenAiProvider::new(config))
}

/// A client over the given provider with the default in-process store; handy
/// for tests and prototypes.
pub async fn in_memory_client(provider: Arc<dyn ChatProvider>) -> Result<Client, ChatError> {
    Client::builder().provider(provider).build().await
}
