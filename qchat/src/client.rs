//! Client owning the provider and the memory manager.

use std::sync::Arc;

use qcommon::SessionId;
use qmemory::{InMemorySessionStore, MemoryManager, SessionStore};
use qprovider::ChatProvider;

use crate::{ChatError, ChatScope};

/// The long-lived entry point: one client per configuration, exclusively
/// owning its provider and memory manager. Scopes are created per
/// orchestration call via [`Client::scope`].
pub struct Client {
    provider: Arc<dyn ChatProvider>,
    memory: Arc<MemoryManager>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Opens a fresh orchestration scope with default bounds.
    pub fn scope(&self) -> ChatScope {
        ChatScope::new(Arc::clone(&self.provider), Arc::clone(&self.memory))
    }

    pub fn memory(&self) -> Arc<MemoryManager> {
        Arc::clone(&self.memory)
    }

    pub fn provider(&self) -> Arc<dyn ChatProvider> {
        Arc::clone(&self.provider)
    }

    /// Deterministic release: drains pending persistence, then closes the
    /// provider transport.
    pub async fn close(self) -> Result<(), ChatError> {
        self.memory.shutdown().await?;
        self.provider.close().await;
        Ok(())
    }
}

pub struct ClientBuilder {
    provider: Option<Arc<dyn ChatProvider>>,
    store: Option<Arc<dyn SessionStore>>,
    cache_capacity: usize,
    default_session: SessionId,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            store: None,
            cache_capacity: 16,
            default_session: SessionId::from("default"),
        }
    }
}

impl ClientBuilder {
    pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn default_session(mut self, session: impl Into<SessionId>) -> Self {
        self.default_session = session.into();
        self
    }

    /// Builds the client and switches to the default session so that reads
    /// through the current pointer are always backed by a resident entry.
    pub async fn build(self) -> Result<Client, ChatError> {
        let provider = self
            .provider
            .ok_or_else(|| ChatError::state("client requires a provider"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));

        let memory = Arc::new(MemoryManager::new(store, self.cache_capacity));
        memory.switch_to(&self.default_session).await?;

        Ok(Client { provider, memory })
    }
}
