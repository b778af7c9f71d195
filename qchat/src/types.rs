//! Turn parameters, memory strategies, and consumer sink types.

use std::future::Future;
use std::sync::Arc;

use qcommon::BoxFuture;
use qprovider::{GenerationOptions, Message, Role};

/// How a turn interacts with session memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryStrategy {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
    Stateless,
}

impl MemoryStrategy {
    pub fn reads(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ReadOnly)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::ReadWrite | Self::WriteOnly)
    }
}

/// Renders history messages into the text substituted for `{{history}}`.
#[derive(Debug, Clone)]
pub struct HistoryFormatter {
    pub system_label: String,
    pub user_label: String,
    pub assistant_label: String,
    pub tool_label: String,
    pub separator: String,
}

impl Default for HistoryFormatter {
    fn default() -> Self {
        Self {
            system_label: "System".to_string(),
            user_label: "User".to_string(),
            assistant_label: "Assistant".to_string(),
            tool_label: "Tool".to_string(),
            separator: "\n".to_string(),
        }
    }
}

impl HistoryFormatter {
    pub fn render(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|message| format!("{}: {}", self.label(message.role), message.text()))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    fn label(&self, role: Role) -> &str {
        match role {
            Role::System => &self.system_label,
            Role::User => &self.user_label,
            Role::Assistant => &self.assistant_label,
            Role::Tool => &self.tool_label,
        }
    }
}

/// Per-turn parameters for the orchestrator scope.
#[derive(Debug, Clone)]
pub struct TurnParams {
    /// Prompt template; `{{it}}` is replaced with the user input and
    /// `{{history}}` with formatted history text.
    pub template: Option<String>,
    pub strategy: MemoryStrategy,
    /// History window: negative = all, zero = none, otherwise the last N.
    pub window: i32,
    /// Temporary system prompt; beats the session prompt for this turn.
    pub system_override: Option<String>,
    pub formatter: Option<HistoryFormatter>,
    pub options: GenerationOptions,
}

impl Default for TurnParams {
    fn default() -> Self {
        Self {
            template: None,
            strategy: MemoryStrategy::ReadWrite,
            window: -1,
            system_override: None,
            formatter: None,
            options: GenerationOptions::default(),
        }
    }
}

impl TurnParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_strategy(mut self, strategy: MemoryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_window(mut self, window: i32) -> Self {
        self.window = window;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_override = Some(system.into());
        self
    }

    pub fn with_formatter(mut self, formatter: HistoryFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

pub type SinkFuture = BoxFuture<'static, ()>;

/// A suspending consumer of streamed text chunks. Chunks arrive in order and
/// may be larger than single deltas when the consumer is slower than the
/// producer.
pub type TokenSink = Arc<dyn Fn(String) -> SinkFuture + Send + Sync>;

pub fn token_sink<F, Fut>(handler: F) -> TokenSink
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |chunk| Box::pin(handler(chunk)))
}
