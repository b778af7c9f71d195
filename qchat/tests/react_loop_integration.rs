use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use qchat::{token_sink, ChatErrorKind, Client, MemoryStrategy, TurnParams};
use qprovider::{
    BoxedResponseStream, ChatProvider, Content, ContentPart, FunctionCall, GenerationOptions,
    LlmResponse, Message, ProviderError, ProviderFuture, Role, TokenUsage, ToolCall,
    VecResponseStream,
};
use qtooling::{parse_json_object, required_string, ToolError};

/// Provider fake that replays scripted turns and records every request.
#[derive(Default)]
struct ScriptedProvider {
    chat_turns: Mutex<VecDeque<LlmResponse>>,
    stream_turns: Mutex<VecDeque<Vec<Result<LlmResponse, ProviderError>>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    options_seen: Mutex<Vec<GenerationOptions>>,
}

impl ScriptedProvider {
    fn with_chat_turns(turns: Vec<LlmResponse>) -> Arc<Self> {
        Arc::new(Self {
            chat_turns: Mutex::new(turns.into()),
            ..Self::default()
        })
    }

    fn with_stream_turns(turns: Vec<Vec<Result<LlmResponse, ProviderError>>>) -> Arc<Self> {
        Arc::new(Self {
            stream_turns: Mutex::new(turns.into()),
            ..Self::default()
        })
    }

    fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatProvider for ScriptedProvider {
    fn chat<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<LlmResponse, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(messages);
            self.options_seen
                .lock()
                .expect("options lock")
                .push(options);

            self.chat_turns
                .lock()
                .expect("turns lock")
                .pop_front()
                .ok_or_else(|| ProviderError::unknown("chat script exhausted"))
        })
    }

    fn stream<'a>(
        &'a self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> ProviderFuture<'a, Result<BoxedResponseStream, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(messages);
            self.options_seen
                .lock()
                .expect("options lock")
                .push(options);

            let items = self
                .stream_turns
                .lock()
                .expect("turns lock")
                .pop_front()
                .ok_or_else(|| ProviderError::unknown("stream script exhausted"))?;

            Ok(VecResponseStream::new(items).boxed())
        })
    }
}

fn weather_tool_call(arguments: &str) -> ToolCall {
    ToolCall::function("call_1", "get_weather", arguments)
}

fn fragment(index: u32, id: &str, name: &str, arguments: &str) -> LlmResponse {
    LlmResponse::default().with_tool_calls(vec![ToolCall {
        index,
        id: id.to_string(),
        kind: String::new(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }])
}

async fn client_with(provider: Arc<ScriptedProvider>) -> Client {
    Client::builder()
        .provider(provider)
        .build()
        .await
        .expect("client should build")
}

fn register_weather_tool(scope: &mut qchat::ChatScope) {
    scope
        .register_tool(
            "get_weather",
            "Returns the weather for a city",
            "{\"type\":\"object\",\"properties\":{\"city\":{\"type\":\"string\"}}}",
            |args| async move {
                let parsed = parse_json_object(&args)?;
                let city = required_string(&parsed, "city")?;
                if city.contains("Beijing") {
                    Ok("Sunny".to_string())
                } else {
                    Err(ToolError::execution(format!("no forecast for {city}")))
                }
            },
        )
        .expect("tool should register");
}

#[tokio::test]
async fn two_turn_react_loop_completes_with_tool_output() {
    let provider = ScriptedProvider::with_chat_turns(vec![
        LlmResponse::default().with_tool_calls(vec![weather_tool_call("{\"city\":\"Beijing\"}")]),
        LlmResponse::text("It is sunny in Beijing."),
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();
    register_weather_tool(&mut scope);

    let answer = scope
        .ask("Weather in Beijing?", TurnParams::new())
        .await
        .expect("turn should succeed");
    assert_eq!(answer, "It is sunny in Beijing.");

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);

    let second = &requests[1];
    let last = second.last().expect("second request has messages");
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.text(), "Sunny");
    assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(last.name.as_deref(), Some("get_weather"));

    // The session transcript carries the full Re-Act exchange, and every
    // tool message matches a preceding assistant tool call.
    let history = client
        .memory()
        .current_history(-1, None, false)
        .await
        .expect("history");
    let roles = history.iter().map(|m| m.role).collect::<Vec<_>>();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let assistant_calls = history[1]
        .tool_calls
        .as_ref()
        .expect("assistant tool calls persisted");
    assert_eq!(assistant_calls[0].id, "call_1");
    assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streaming_react_loop_reassembles_fragments_and_streams_text() {
    let usage = TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    };

    let provider = ScriptedProvider::with_stream_turns(vec![
        vec![
            Ok(fragment(0, "call_1", "get_weather", "")),
            Ok(fragment(0, "", "", "{\"city\":")),
            Ok(fragment(0, "", "", "\"Beijing\"}")),
            Ok(LlmResponse::default().with_usage(usage)),
        ],
        vec![
            Ok(LlmResponse::text("It is ")),
            Ok(LlmResponse::text("sunny in Beijing.")),
            Ok(LlmResponse::default().with_usage(usage)),
        ],
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();
    register_weather_tool(&mut scope);

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = {
        let received = Arc::clone(&received);
        token_sink(move |chunk| {
            let received = Arc::clone(&received);
            async move {
                received.lock().expect("received lock").push(chunk);
            }
        })
    };

    let answer = scope
        .ask_stream("Weather in Beijing?", TurnParams::new(), sink)
        .await
        .expect("stream turn should succeed");
    assert_eq!(answer, "It is sunny in Beijing.");
    assert_eq!(
        received.lock().expect("received lock").concat(),
        "It is sunny in Beijing."
    );
    assert_eq!(scope.last_usage().expect("usage").total_tokens, 15);

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);

    let tool_message = requests[1].last().expect("tool message");
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.text(), "Sunny");

    // Reassembled arguments reached the executor as one JSON document.
    let history = client
        .memory()
        .current_history(-1, None, false)
        .await
        .expect("history");
    let calls = history[1].tool_calls.as_ref().expect("assistant calls");
    assert_eq!(calls[0].function.arguments, "{\"city\":\"Beijing\"}");
    assert_eq!(calls[0].kind, "function");
}

#[tokio::test]
async fn structured_output_retries_once_with_a_correction_prompt() {
    #[derive(serde::Deserialize)]
    struct Extraction {
        result: i64,
    }

    let provider = ScriptedProvider::with_chat_turns(vec![
        LlmResponse::text("I am not JSON"),
        LlmResponse::text("{\"result\": 100}"),
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let value: Extraction = scope
        .ask_structured("Compute the result", TurnParams::new())
        .await
        .expect("structured output should succeed");
    assert_eq!(value.result, 100);

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 2);

    let correction = requests[1][0].text();
    assert!(correction.contains("Previous JSON invalid"));
    assert!(correction.contains("Return ONLY JSON"));
    assert!(correction.contains("I am not JSON"));

    let options = provider.options_seen.lock().expect("options lock").clone();
    assert_eq!(options[1].temperature, Some(0.1));
}

#[tokio::test]
async fn structured_output_gives_up_after_max_retries() {
    let provider = ScriptedProvider::with_chat_turns(vec![
        LlmResponse::text("nope"),
        LlmResponse::text("still nope"),
        LlmResponse::text("not happening"),
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope().with_max_json_retries(2);

    let error = scope
        .ask_structured::<serde_json::Value>("Give me JSON", TurnParams::new())
        .await
        .expect_err("structured output should fail");
    assert_eq!(error.kind, ChatErrorKind::Serialization);
    assert_eq!(provider.recorded_requests().len(), 3);
}

#[tokio::test]
async fn max_tool_rounds_returns_latest_text_without_raising() {
    let keep_calling = || {
        LlmResponse::text("working on it")
            .with_tool_calls(vec![weather_tool_call("{\"city\":\"Beijing\"}")])
    };
    let provider = ScriptedProvider::with_chat_turns(vec![keep_calling(), keep_calling()]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope().with_max_tool_rounds(2);
    register_weather_tool(&mut scope);

    let answer = scope
        .ask("Weather in Beijing?", TurnParams::new())
        .await
        .expect("round exhaustion must not raise");
    assert_eq!(answer, "working on it");
    assert_eq!(provider.recorded_requests().len(), 2);
}

#[tokio::test]
async fn unregistered_tool_becomes_an_error_text_result() {
    let provider = ScriptedProvider::with_chat_turns(vec![
        LlmResponse::default().with_tool_calls(vec![ToolCall::function(
            "call_9",
            "missing_tool",
            "{}",
        )]),
        LlmResponse::text("done"),
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let answer = scope
        .ask("Use the tool", TurnParams::new())
        .await
        .expect("turn should succeed");
    assert_eq!(answer, "done");

    let requests = provider.recorded_requests();
    let tool_message = requests[1].last().expect("tool message");
    assert_eq!(
        tool_message.text(),
        "Error executing tool 'missing_tool': not registered"
    );
}

#[tokio::test]
async fn failing_executor_becomes_an_error_text_result() {
    let provider = ScriptedProvider::with_chat_turns(vec![
        LlmResponse::default().with_tool_calls(vec![ToolCall::function(
            "call_1",
            "get_weather",
            "{\"city\":\"Atlantis\"}",
        )]),
        LlmResponse::text("done"),
    ]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();
    register_weather_tool(&mut scope);

    scope
        .ask("Weather in Atlantis?", TurnParams::new())
        .await
        .expect("turn should succeed");

    let requests = provider.recorded_requests();
    let tool_message = requests[1].last().expect("tool message");
    assert_eq!(
        tool_message.text(),
        "Error executing tool 'get_weather': no forecast for Atlantis"
    );
}

#[tokio::test]
async fn stateless_turns_leave_memory_untouched() {
    let provider = ScriptedProvider::with_chat_turns(vec![LlmResponse::text("reply")]);
    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    scope
        .ask(
            "ephemeral question",
            TurnParams::new().with_strategy(MemoryStrategy::Stateless),
        )
        .await
        .expect("turn should succeed");

    let history = client
        .memory()
        .current_history(-1, None, false)
        .await
        .expect("history");
    assert!(history.is_empty());

    // Stateless requests carry only the user turn.
    let requests = provider.recorded_requests();
    assert_eq!(requests[0].len(), 1);
    assert_eq!(requests[0][0].role, Role::User);
}

#[tokio::test]
async fn template_with_history_requires_read_access() {
    let provider = ScriptedProvider::with_chat_turns(vec![LlmResponse::text("unused")]);
    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let error = scope
        .ask(
            "hello",
            TurnParams::new()
                .with_template("Context: {{history}}\nQuestion: {{it}}")
                .with_strategy(MemoryStrategy::WriteOnly),
        )
        .await
        .expect_err("conflict should fail");

    assert_eq!(error.kind, ChatErrorKind::Argument);
    assert!(provider.recorded_requests().is_empty());
}

#[tokio::test]
async fn template_substitutes_input_and_keeps_raw_text_in_memory() {
    let provider = ScriptedProvider::with_chat_turns(vec![LlmResponse::text("ok")]);
    let client = client_with(provider.clone()).await;

    let session = client
        .memory()
        .current_session()
        .await
        .expect("default session");
    client
        .memory()
        .update_system_prompt(&session, Some("Session prompt"))
        .await
        .expect("prompt should set");

    let mut scope = client.scope();
    scope
        .ask(
            "hello",
            TurnParams::new().with_template("Q: {{it}}"),
        )
        .await
        .expect("turn should succeed");

    let requests = provider.recorded_requests();
    assert_eq!(requests[0].len(), 2);
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(requests[0][0].text(), "Session prompt");
    assert_eq!(requests[0][1].text(), "Q: hello");

    // Memory holds the raw input, not the templated form.
    let history = client
        .memory()
        .current_history(-1, None, false)
        .await
        .expect("history");
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text(), "hello");
}

#[tokio::test]
async fn temporary_system_override_beats_the_session_prompt() {
    let provider = ScriptedProvider::with_chat_turns(vec![LlmResponse::text("ok")]);
    let client = client_with(provider.clone()).await;

    let session = client
        .memory()
        .current_session()
        .await
        .expect("default session");
    client
        .memory()
        .update_system_prompt(&session, Some("Session prompt"))
        .await
        .expect("prompt should set");

    let mut scope = client.scope();
    scope
        .ask(
            "hello",
            TurnParams::new().with_system("Override prompt"),
        )
        .await
        .expect("turn should succeed");

    let requests = provider.recorded_requests();
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(requests[0][0].text(), "Override prompt");
}

#[tokio::test]
async fn multimodal_turns_send_parts_content_unchanged() {
    let provider = ScriptedProvider::with_chat_turns(vec![LlmResponse::text("a cat")]);
    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let answer = scope
        .ask_parts(
            vec![
                ContentPart::text("Look at this"),
                ContentPart::image_url("http://img.com"),
            ],
            TurnParams::new().with_strategy(MemoryStrategy::Stateless),
        )
        .await
        .expect("turn should succeed");
    assert_eq!(answer, "a cat");

    let requests = provider.recorded_requests();
    let user = &requests[0][0];
    match user.content.as_ref().expect("content") {
        Content::Parts(parts) => {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0], ContentPart::text("Look at this"));
            assert_eq!(parts[1], ContentPart::image_url("http://img.com"));
        }
        other => panic!("expected parts content, got {other:?}"),
    }
}

#[tokio::test]
async fn provider_errors_abort_the_loop() {
    let provider = Arc::new(ScriptedProvider::default());
    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let error = scope
        .ask("hello", TurnParams::new())
        .await
        .expect_err("exhausted script should error");
    assert_eq!(error.kind, ChatErrorKind::Provider);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_errors_flush_observed_bytes_before_raising() {
    let provider = ScriptedProvider::with_stream_turns(vec![vec![
        Ok(LlmResponse::text("partial ")),
        Ok(LlmResponse::text("answer")),
        Err(ProviderError::server("upstream died")),
    ]]);

    let client = client_with(provider.clone()).await;
    let mut scope = client.scope();

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = {
        let received = Arc::clone(&received);
        token_sink(move |chunk| {
            let received = Arc::clone(&received);
            async move {
                received.lock().expect("received lock").push(chunk);
            }
        })
    };

    let error = scope
        .ask_stream("hello", TurnParams::new(), sink)
        .await
        .expect_err("stream error should surface");
    assert_eq!(error.kind, ChatErrorKind::Provider);
    assert_eq!(
        received.lock().expect("received lock").concat(),
        "partial answer"
    );
}
