//! Conversation orchestration over chat providers and session memory.
//!
//! ```rust
//! use qchat::{MemoryStrategy, TurnParams};
//!
//! let params = TurnParams::new()
//!     .with_strategy(MemoryStrategy::ReadOnly)
//!     .with_window(20)
//!     .with_system("Be concise.");
//!
//! assert!(params.strategy.reads());
//! assert!(!params.strategy.writes());
//! ```

mod aggregator;
mod client;
mod error;
mod extract;
mod scope;
mod types;

pub use client::{Client, ClientBuilder};
pub use error::{ChatError, ChatErrorKind};
pub use extract::extract_json;
pub use scope::ChatScope;
pub use types::{
    token_sink, HistoryFormatter, MemoryStrategy, SinkFuture, TokenSink, TurnParams,
};
