//! Provider contract for non-streaming and streaming chat operations.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::{GenerationOptions, LlmResponse, Message, ProviderError};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A cold stream of partial responses produced as the transport yields them.
pub type BoxedResponseStream =
    Pin<Box<dyn Stream<Item = Result<LlmResponse, ProviderError>> + Send>>;

pub trait ChatProvider: Send + Sync {
    /// Issues a single chat completion and returns the complete response.
    fn chat<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<LlmResponse, ProviderError>>;

    /// Issues a streaming chat completion. The stream ends when the transport
    /// signals end-of-stream or surfaces an error.
    fn stream<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<BoxedResponseStream, ProviderError>>;

    /// Idempotent release of owned transport resources. Implementations that
    /// did not create their transport must not close it.
    fn close<'a>(&'a self) -> ProviderFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// An in-memory response stream for tests and fakes.
#[derive(Debug, Default)]
pub struct VecResponseStream {
    items: VecDeque<Result<LlmResponse, ProviderError>>,
}

impl VecResponseStream {
    pub fn new(items: Vec<Result<LlmResponse, ProviderError>>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn boxed(self) -> BoxedResponseStream {
        Box::pin(self)
    }
}

impl Stream for VecResponseStream {
    type Item = Result<LlmResponse, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.items.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn vec_response_stream_yields_items_in_order() {
        let mut stream = VecResponseStream::new(vec![
            Ok(LlmResponse::text("one")),
            Ok(LlmResponse::text("two")),
        ])
        .boxed();

        let first = stream.next().await.expect("first item").expect("ok");
        assert_eq!(first.content, "one");

        let second = stream.next().await.expect("second item").expect("ok");
        assert_eq!(second.content, "two");

        assert!(stream.next().await.is_none());
    }
}
