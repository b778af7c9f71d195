//! Session storage contract and a basic in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use qcommon::{BoxFuture, SessionId};
use qprovider::Message;

use crate::MemoryError;

/// Durable session storage.
///
/// Implementations must be safe for concurrent use across sessions and must
/// keep `append_message` calls ordered per session; the memory manager
/// guarantees the latter by dispatching from a single ordered queue.
pub trait SessionStore: Send + Sync {
    fn get_system_prompt<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<String>, MemoryError>>;

    fn set_system_prompt<'a>(
        &'a self,
        session_id: &'a SessionId,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    /// Returns stored messages in arrival order. A negative `limit` returns
    /// everything; a `limit` at or above the stored size returns everything;
    /// otherwise the last `limit` messages.
    fn get_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
        limit: i32,
    ) -> BoxFuture<'a, Result<Vec<Message>, MemoryError>>;

    fn append_message<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    /// Full overwrite of a session's prompt and transcript; used on eviction.
    fn save_full_context<'a>(
        &'a self,
        session_id: &'a SessionId,
        system_prompt: Option<&'a str>,
        messages: Vec<Message>,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    /// Drops the transcript but keeps the system prompt.
    fn clear_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    fn delete_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;
}

pub(crate) fn select_window(messages: &[Message], limit: i32) -> &[Message] {
    if limit < 0 {
        return messages;
    }

    let limit = limit as usize;
    if limit >= messages.len() {
        messages
    } else {
        &messages[messages.len() - limit..]
    }
}

#[derive(Debug, Default, Clone)]
struct StoredSession {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_system_prompt<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<String>, MemoryError>> {
        Box::pin(async move {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            Ok(sessions
                .get(session_id)
                .and_then(|session| session.system_prompt.clone()))
        })
    }

    fn set_system_prompt<'a>(
        &'a self,
        session_id: &'a SessionId,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            sessions
                .entry(session_id.clone())
                .or_default()
                .system_prompt = Some(prompt.to_string());

            Ok(())
        })
    }

    fn get_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
        limit: i32,
    ) -> BoxFuture<'a, Result<Vec<Message>, MemoryError>> {
        Box::pin(async move {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            Ok(sessions
                .get(session_id)
                .map(|session| select_window(&session.messages, limit).to_vec())
                .unwrap_or_default())
        })
    }

    fn append_message<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            sessions
                .entry(session_id.clone())
                .or_default()
                .messages
                .push(message);

            Ok(())
        })
    }

    fn save_full_context<'a>(
        &'a self,
        session_id: &'a SessionId,
        system_prompt: Option<&'a str>,
        messages: Vec<Message>,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            sessions.insert(
                session_id.clone(),
                StoredSession {
                    system_prompt: system_prompt.map(str::to_string),
                    messages,
                },
            );

            Ok(())
        })
    }

    fn clear_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            if let Some(session) = sessions.get_mut(session_id) {
                session.messages.clear();
            }

            Ok(())
        })
    }

    fn delete_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| MemoryError::storage("session store lock poisoned"))?;

            sessions.remove(session_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use qprovider::Message;

    use super::*;

    #[tokio::test]
    async fn get_messages_honors_limit_semantics() {
        let store = InMemorySessionStore::new();
        let id = SessionId::from("s1");

        for index in 0..4 {
            store
                .append_message(&id, Message::user(format!("m{index}")))
                .await
                .expect("append should work");
        }

        let all = store.get_messages(&id, -1).await.expect("all");
        assert_eq!(all.len(), 4);

        let oversize = store.get_messages(&id, 10).await.expect("oversize");
        assert_eq!(oversize.len(), 4);

        let last_two = store.get_messages(&id, 2).await.expect("last two");
        assert_eq!(last_two[0].text(), "m2");
        assert_eq!(last_two[1].text(), "m3");

        let none = store.get_messages(&id, 0).await.expect("none");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn clear_messages_keeps_the_system_prompt() {
        let store = InMemorySessionStore::new();
        let id = SessionId::from("s2");

        store
            .set_system_prompt(&id, "Be concise.")
            .await
            .expect("prompt should set");
        store
            .append_message(&id, Message::user("hello"))
            .await
            .expect("append should work");

        store.clear_messages(&id).await.expect("clear should work");

        let prompt = store.get_system_prompt(&id).await.expect("prompt");
        assert_eq!(prompt.as_deref(), Some("Be concise."));
        assert!(store.get_messages(&id, -1).await.expect("messages").is_empty());
    }

    #[tokio::test]
    async fn save_full_context_round_trips_prompt_and_messages() {
        let store = InMemorySessionStore::new();
        let id = SessionId::from("s3");

        let messages = vec![
            Message::user("question"),
            Message::assistant_with_tool_calls(
                "",
                vec![qprovider::ToolCall::function("call_1", "lookup", "{}")],
            ),
            Message::tool("result", "call_1", "lookup"),
        ];

        store
            .save_full_context(&id, Some("prompt"), messages.clone())
            .await
            .expect("save should work");

        let prompt = store.get_system_prompt(&id).await.expect("prompt");
        assert_eq!(prompt.as_deref(), Some("prompt"));

        let restored = store.get_messages(&id, -1).await.expect("messages");
        assert_eq!(restored, messages);
    }

    #[tokio::test]
    async fn delete_session_removes_all_state() {
        let store = InMemorySessionStore::new();
        let id = SessionId::from("s4");

        store
            .set_system_prompt(&id, "prompt")
            .await
            .expect("prompt should set");
        store.delete_session(&id).await.expect("delete should work");

        assert!(store.get_system_prompt(&id).await.expect("prompt").is_none());
    }
}
