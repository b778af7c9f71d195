//! Hybrid session memory: LRU cache over durable storage with write-through
//! asynchronous persistence and single-flight hydration.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use qmemory::{InMemorySessionStore, MemoryManager};
//! use qprovider::Message;
//!
//! # async fn demo() -> Result<(), qmemory::MemoryError> {
//! let manager = MemoryManager::new(Arc::new(InMemorySessionStore::new()), 16);
//! manager.switch_to(&"session-1".into()).await?;
//! manager.append(Message::user("hello")).await?;
//!
//! let history = manager.current_history(-1, None, false).await?;
//! assert_eq!(history.len(), 1);
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod manager;
mod store;

pub use cache::{EvictedSession, SessionCache, SessionState};
pub use error::{MemoryError, MemoryErrorKind};
pub use manager::MemoryManager;
pub use store::{InMemorySessionStore, SessionStore};
