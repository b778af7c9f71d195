//! OpenAI provider implementation over transport and shared models.

use std::sync::Arc;

use crate::{
    BoxedResponseStream, ChatProvider, GenerationOptions, LlmResponse, Message, OpenAiConfig,
    ProviderError, ProviderFuture,
};

use super::transport::{OpenAiHttpTransport, OpenAiTransport};
use super::wire::build_api_request;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    transport: Arc<dyn OpenAiTransport>,
}

impl OpenAiProvider {
    /// Builds a provider with its own pooled HTTP transport.
    pub fn new(config: OpenAiConfig) -> Self {
        let transport = OpenAiHttpTransport::new(reqwest::Client::new(), config.base_url.clone());
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    /// Builds a provider over an externally owned transport. Used by tests
    /// and by applications that share a transport; `close` will not touch it.
    pub fn with_transport(config: OpenAiConfig, transport: Arc<dyn OpenAiTransport>) -> Self {
        Self { config, transport }
    }
}

impl ChatProvider for OpenAiProvider {
    fn chat<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<LlmResponse, ProviderError>> {
        Box::pin(async move {
            options.validate()?;
            let request = build_api_request(messages, &options, &self.config.default_model, false)?;
            self.transport.complete(request, &self.config.api_key).await
        })
    }

    fn stream<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<BoxedResponseStream, ProviderError>> {
        Box::pin(async move {
            options.validate()?;
            let request = build_api_request(messages, &options, &self.config.default_model, true)?;
            self.transport.stream(request, &self.config.api_key).await
        })
    }
}
