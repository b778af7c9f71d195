//! OpenAI transport trait and reqwest-based HTTP implementation.

use async_stream::try_stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};

use crate::{BoxedResponseStream, LlmResponse, ProviderError, ProviderFuture, SecretString};

use super::wire::{chunk_to_responses, extract_error_message, status_to_error, ApiRequest, ApiStreamChunk};

pub trait OpenAiTransport: Send + Sync + std::fmt::Debug {
    fn complete<'a>(
        &'a self,
        request: ApiRequest,
        api_key: &'a SecretString,
    ) -> ProviderFuture<'a, Result<LlmResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: ApiRequest,
        api_key: &'a SecretString,
    ) -> ProviderFuture<'a, Result<BoxedResponseStream, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
}

impl OpenAiHttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn parse_error(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| format!("chat completion request failed with status {status}"));

        status_to_error(status, message)
    }

    fn send_error(err: reqwest::Error) -> ProviderError {
        ProviderError::unknown(err.to_string())
    }
}

impl OpenAiTransport for OpenAiHttpTransport {
    fn complete<'a>(
        &'a self,
        request: ApiRequest,
        api_key: &'a SecretString,
    ) -> ProviderFuture<'a, Result<LlmResponse, ProviderError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint("chat/completions"))
                .bearer_auth(api_key.expose())
                .json(&request)
                .send()
                .await
                .map_err(Self::send_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let parsed: super::wire::ApiResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::unknown(err.to_string()))?;

            LlmResponse::try_from(parsed)
        })
    }

    fn stream<'a>(
        &'a self,
        mut request: ApiRequest,
        api_key: &'a SecretString,
    ) -> ProviderFuture<'a, Result<BoxedResponseStream, ProviderError>> {
        Box::pin(async move {
            request.stream = true;
            let response = self
                .client
                .post(self.endpoint("chat/completions"))
                .bearer_auth(api_key.expose())
                .header("Accept", "text/event-stream")
                .header("Cache-Control", "no-cache")
                .json(&request)
                .send()
                .await
                .map_err(Self::send_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let stream = try_stream! {
                let mut body = response.bytes_stream();
                let mut lines = SseLineBuffer::default();
                let mut finished = false;

                while let Some(item) = body.next().await {
                    let bytes = item.map_err(|err| ProviderError::unknown(err.to_string()))?;
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|err| ProviderError::unknown(err.to_string()))?;

                    for line in lines.push(text) {
                        match decode_sse_line(&line)? {
                            SseEvent::Done => {
                                finished = true;
                                break;
                            }
                            SseEvent::Skip => {}
                            SseEvent::Chunk(chunk) => {
                                for response in chunk_to_responses(chunk)? {
                                    yield response;
                                }
                            }
                        }
                    }

                    if finished {
                        break;
                    }
                }
            };

            Ok(Box::pin(stream) as BoxedResponseStream)
        })
    }
}

/// Accumulates raw body bytes and hands back complete lines.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut lines = Vec::new();
        while let Some(newline_index) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_index).collect();
            lines.push(line.trim().to_string());
        }

        lines
    }
}

#[derive(Debug)]
pub(crate) enum SseEvent {
    Chunk(ApiStreamChunk),
    Done,
    Skip,
}

/// Decodes one SSE line. Malformed chunk payloads are logged and skipped
/// (keep-alive tolerance); only business errors terminate the stream.
pub(crate) fn decode_sse_line(line: &str) -> Result<SseEvent, ProviderError> {
    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim();
        if payload == "[DONE]" {
            return Ok(SseEvent::Done);
        }

        if payload.is_empty() {
            return Ok(SseEvent::Skip);
        }

        return match serde_json::from_str::<ApiStreamChunk>(payload) {
            Ok(chunk) => Ok(SseEvent::Chunk(chunk)),
            Err(error) => {
                tracing::debug!(error = %error, "skipping malformed stream chunk");
                Ok(SseEvent::Skip)
            }
        };
    }

    // Fallback for servers that answer with a plain JSON error body instead
    // of SSE framing.
    if line.starts_with('{') && line.contains("\"error\"") {
        let message = extract_error_message(line).unwrap_or_else(|| line.to_string());
        return Err(ProviderError::unknown(message));
    }

    Ok(SseEvent::Skip)
}

#[cfg(test)]
mod tests {
    use crate::ProviderErrorKind;

    use super::*;

    #[test]
    fn line_buffer_splits_on_newlines_across_pushes() {
        let mut buffer = SseLineBuffer::default();

        assert!(buffer.push("data: {\"a\"").is_empty());
        let lines = buffer.push(":1}\n\ndata: [DONE]\n");
        assert_eq!(
            lines,
            vec![
                "data: {\"a\":1}".to_string(),
                String::new(),
                "data: [DONE]".to_string(),
            ]
        );
    }

    #[test]
    fn done_payload_terminates_cleanly() {
        assert!(matches!(
            decode_sse_line("data: [DONE]").expect("done"),
            SseEvent::Done
        ));
    }

    #[test]
    fn empty_payload_and_comment_lines_are_skipped() {
        assert!(matches!(
            decode_sse_line("data:").expect("empty"),
            SseEvent::Skip
        ));
        assert!(matches!(
            decode_sse_line(": keep-alive").expect("comment"),
            SseEvent::Skip
        ));
        assert!(matches!(decode_sse_line("").expect("blank"), SseEvent::Skip));
    }

    #[test]
    fn malformed_chunk_is_skipped_not_fatal() {
        assert!(matches!(
            decode_sse_line("data: {not json").expect("skip"),
            SseEvent::Skip
        ));
    }

    #[test]
    fn plain_json_error_body_fails_with_unknown() {
        let error = decode_sse_line("{\"error\": {\"message\": \"bad model\"}}")
            .expect_err("error body should fail");
        assert_eq!(error.kind, ProviderErrorKind::Unknown);
        assert_eq!(error.message, "bad model");
    }

    #[test]
    fn chunk_payload_decodes() {
        let event =
            decode_sse_line("data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}").expect("ok");
        match event {
            SseEvent::Chunk(chunk) => assert_eq!(chunk.choices.len(), 1),
            _ => panic!("expected chunk"),
        }
    }
}
