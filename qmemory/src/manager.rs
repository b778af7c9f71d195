//! Session lifecycle, cache arbitration, and write-through persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::future::Shared;
use futures_util::FutureExt;
use qcommon::{BoxFuture, SessionId};
use qprovider::Message;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::cache::{EvictedSession, SessionCache, SessionState};
use crate::store::select_window;
use crate::{MemoryError, SessionStore};

type HydrationFuture = Shared<BoxFuture<'static, Result<SessionState, MemoryError>>>;

#[derive(Debug)]
struct ManagerState {
    cache: SessionCache,
    current: Option<SessionId>,
}

enum PersistJob {
    SetSystemPrompt {
        id: SessionId,
        prompt: String,
    },
    Append {
        id: SessionId,
        message: Message,
    },
    SaveFullContext {
        id: SessionId,
        system_prompt: Option<String>,
        messages: Vec<Message>,
    },
    Clear {
        id: SessionId,
    },
    Delete {
        id: SessionId,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

impl PersistJob {
    fn describe(&self) -> (&'static str, Option<&SessionId>) {
        match self {
            Self::SetSystemPrompt { id, .. } => ("set_system_prompt", Some(id)),
            Self::Append { id, .. } => ("append_message", Some(id)),
            Self::SaveFullContext { id, .. } => ("save_full_context", Some(id)),
            Self::Clear { id } => ("clear_messages", Some(id)),
            Self::Delete { id } => ("delete_session", Some(id)),
            Self::Flush(_) => ("flush", None),
            Self::Shutdown => ("shutdown", None),
        }
    }
}

/// Owns the session cache and the background persistence dispatcher.
///
/// Cache access is serialized behind one suspending mutex whose critical
/// sections never await storage: every mutation is applied in memory first
/// and then enqueued on a single ordered queue drained by a background task,
/// which also gives per-session ordering of `append_message`. Dispatcher
/// failures are logged and never reach the foreground caller.
pub struct MemoryManager {
    store: Arc<dyn SessionStore>,
    state: Mutex<ManagerState>,
    hydrations: Arc<StdMutex<HashMap<SessionId, HydrationFuture>>>,
    jobs: mpsc::UnboundedSender<PersistJob>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

impl MemoryManager {
    /// Builds a manager over `store` with an LRU bound of `capacity` resident
    /// sessions. Must be called within an async runtime: the persistence
    /// dispatcher task is spawned here and lives until [`Self::shutdown`].
    pub fn new(store: Arc<dyn SessionStore>, capacity: usize) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = spawn_dispatcher(Arc::clone(&store), rx);

        Self {
            store,
            state: Mutex::new(ManagerState {
                cache: SessionCache::new(capacity),
                current: None,
            }),
            hydrations: Arc::new(StdMutex::new(HashMap::new())),
            jobs,
            worker: StdMutex::new(Some(worker)),
        }
    }

    /// Hydrates `id` from storage unless it is already resident. Concurrent
    /// preloads of the same id join a single in-flight hydration.
    pub async fn preload(&self, id: &SessionId) -> Result<(), MemoryError> {
        {
            let state = self.state.lock().await;
            if state.cache.contains(id) {
                return Ok(());
            }
        }

        let hydration = self.hydration_for(id);
        let hydrated = hydration.await?;

        let mut state = self.state.lock().await;
        if !state.cache.contains(id) {
            if let Some(evicted) = state.cache.insert(id.clone(), hydrated) {
                self.schedule_eviction_flush(evicted);
            }
        }

        Ok(())
    }

    /// Ensures a session exists in the cache, optionally setting its prompt.
    pub async fn create(
        &self,
        id: &SessionId,
        system_prompt: Option<&str>,
    ) -> Result<(), MemoryError> {
        let mut state = self.state.lock().await;

        if !state.cache.contains(id) {
            if let Some(evicted) = state.cache.insert(id.clone(), SessionState::default()) {
                self.schedule_eviction_flush(evicted);
            }
        }

        if let Some(prompt) = system_prompt {
            if let Some(entry) = state.cache.get_mut(id) {
                entry.system_prompt = Some(prompt.to_string());
            }
            self.enqueue(PersistJob::SetSystemPrompt {
                id: id.clone(),
                prompt: prompt.to_string(),
            });
        }

        Ok(())
    }

    /// Makes `id` the current session, hydrating it first when not resident.
    pub async fn switch_to(&self, id: &SessionId) -> Result<(), MemoryError> {
        {
            let mut state = self.state.lock().await;
            if state.cache.get(id).is_some() {
                state.current = Some(id.clone());
                return Ok(());
            }
        }

        self.preload(id).await?;

        let mut state = self.state.lock().await;
        state.current = Some(id.clone());
        Ok(())
    }

    /// Removes a session. The active session cannot be deleted.
    pub async fn delete(&self, id: &SessionId) -> Result<(), MemoryError> {
        {
            let mut state = self.state.lock().await;
            if state.current.as_ref() == Some(id) {
                return Err(MemoryError::invalid_request(format!(
                    "session '{id}' is active and cannot be deleted"
                )));
            }
            state.cache.remove(id);
        }

        self.enqueue(PersistJob::Delete { id: id.clone() });
        Ok(())
    }

    pub async fn update_system_prompt(
        &self,
        id: &SessionId,
        prompt: Option<&str>,
    ) -> Result<(), MemoryError> {
        {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.cache.get_mut(id) {
                entry.system_prompt = prompt.map(str::to_string);
            } else if prompt.is_some() {
                let entry = SessionState {
                    system_prompt: prompt.map(str::to_string),
                    messages: Vec::new(),
                };
                if let Some(evicted) = state.cache.insert(id.clone(), entry) {
                    self.schedule_eviction_flush(evicted);
                }
            }
        }

        if let Some(prompt) = prompt {
            self.enqueue(PersistJob::SetSystemPrompt {
                id: id.clone(),
                prompt: prompt.to_string(),
            });
        }

        Ok(())
    }

    /// Appends a message to the current session: write-through to the cache
    /// under the lock, then an asynchronous storage append.
    pub async fn append(&self, message: Message) -> Result<(), MemoryError> {
        let current = self.require_current().await?;
        self.preload(&current).await?;

        let mut state = self.state.lock().await;
        let entry = state
            .cache
            .get_mut(&current)
            .ok_or_else(|| MemoryError::storage(format!("session '{current}' left the cache mid-append")))?;
        entry.messages.push(message.clone());
        drop(state);

        self.enqueue(PersistJob::Append {
            id: current,
            message,
        });
        Ok(())
    }

    /// Messages of the current session, windowed to the last `window` items
    /// (negative = all, zero = none), optionally prefixed with a synthesized
    /// System message when an effective prompt exists. The temporary override
    /// beats the session's own prompt.
    pub async fn current_history(
        &self,
        window: i32,
        temp_system: Option<&str>,
        include_system: bool,
    ) -> Result<Vec<Message>, MemoryError> {
        let current = self.require_current().await?;
        self.preload(&current).await?;

        let mut state = self.state.lock().await;
        let entry = state
            .cache
            .get(&current)
            .ok_or_else(|| MemoryError::storage(format!("session '{current}' left the cache mid-read")))?;

        let mut history = Vec::new();
        if include_system {
            let effective = temp_system
                .map(str::to_string)
                .or_else(|| entry.system_prompt.clone());
            if let Some(prompt) = effective {
                history.push(Message::system(prompt));
            }
        }

        history.extend(select_window(&entry.messages, window).iter().cloned());
        Ok(history)
    }

    /// The prompt that would take effect for the current session, with the
    /// temporary override taking precedence. `None` when no session is
    /// current and no override is given.
    pub async fn effective_system_prompt(
        &self,
        temp_system: Option<&str>,
    ) -> Result<Option<String>, MemoryError> {
        if let Some(prompt) = temp_system {
            return Ok(Some(prompt.to_string()));
        }

        let Some(current) = self.current_session().await else {
            return Ok(None);
        };
        self.preload(&current).await?;

        let mut state = self.state.lock().await;
        Ok(state
            .cache
            .get(&current)
            .and_then(|entry| entry.system_prompt.clone()))
    }

    pub async fn current_session(&self) -> Option<SessionId> {
        self.state.lock().await.current.clone()
    }

    /// Truncates the current session's transcript, keeping its prompt.
    pub async fn clear_current(&self) -> Result<(), MemoryError> {
        let current = self.require_current().await?;

        {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.cache.get_mut(&current) {
                entry.messages.clear();
            }
        }

        self.enqueue(PersistJob::Clear { id: current });
        Ok(())
    }

    /// Waits until every persistence job enqueued so far has been executed.
    pub async fn flush(&self) -> Result<(), MemoryError> {
        let (done, waiter) = oneshot::channel();
        if self.jobs.send(PersistJob::Flush(done)).is_err() {
            return Ok(());
        }

        waiter
            .await
            .map_err(|_| MemoryError::other("persistence dispatcher stopped before flushing"))
    }

    /// Drains the persistence queue and stops the dispatcher. Part of client
    /// teardown; in-flight orchestrations are not affected.
    pub async fn shutdown(&self) -> Result<(), MemoryError> {
        let _ = self.jobs.send(PersistJob::Shutdown);

        let worker = self
            .worker
            .lock()
            .map_err(|_| MemoryError::other("dispatcher handle lock poisoned"))?
            .take();

        if let Some(worker) = worker {
            worker
                .await
                .map_err(|err| MemoryError::other(format!("persistence dispatcher panicked: {err}")))?;
        }

        Ok(())
    }

    async fn require_current(&self) -> Result<SessionId, MemoryError> {
        self.state
            .lock()
            .await
            .current
            .clone()
            .ok_or_else(|| MemoryError::invalid_request("no active session"))
    }

    fn hydration_for(&self, id: &SessionId) -> HydrationFuture {
        let mut hydrations = lock_registry(&self.hydrations);
        if let Some(existing) = hydrations.get(id) {
            return existing.clone();
        }

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.hydrations);
        let session_id = id.clone();

        let future: BoxFuture<'static, Result<SessionState, MemoryError>> =
            Box::pin(async move {
                let result = async {
                    let system_prompt = store.get_system_prompt(&session_id).await?;
                    let messages = store.get_messages(&session_id, -1).await?;
                    Ok(SessionState {
                        system_prompt,
                        messages,
                    })
                }
                .await;

                // The deferred removes itself on completion, success or not.
                lock_registry(&registry).remove(&session_id);
                result
            });

        let shared = future.shared();
        hydrations.insert(id.clone(), shared.clone());
        shared
    }

    fn schedule_eviction_flush(&self, evicted: EvictedSession) {
        tracing::debug!(
            session_id = %evicted.id,
            messages = evicted.state.messages.len(),
            "flushing evicted session to storage"
        );

        self.enqueue(PersistJob::SaveFullContext {
            id: evicted.id,
            system_prompt: evicted.state.system_prompt,
            messages: evicted.state.messages,
        });
    }

    fn enqueue(&self, job: PersistJob) {
        let (operation, _) = job.describe();
        if self.jobs.send(job).is_err() {
            tracing::warn!(operation, "persistence dispatcher is closed; dropping job");
        }
    }
}

fn lock_registry(
    registry: &StdMutex<HashMap<SessionId, HydrationFuture>>,
) -> std::sync::MutexGuard<'_, HashMap<SessionId, HydrationFuture>> {
    // The registry lock only guards map lookups; recover state on poison.
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_dispatcher(
    store: Arc<dyn SessionStore>,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            match job {
                PersistJob::Shutdown => break,
                PersistJob::Flush(done) => {
                    let _ = done.send(());
                }
                job => {
                    let (operation, id) = job.describe();
                    let session_id = id.cloned();
                    if let Err(error) = run_job(store.as_ref(), job).await {
                        tracing::warn!(
                            operation,
                            session_id = session_id.as_ref().map(|id| id.as_str()),
                            error = %error,
                            "background persistence failed"
                        );
                    }
                }
            }
        }
    })
}

async fn run_job(store: &dyn SessionStore, job: PersistJob) -> Result<(), MemoryError> {
    match job {
        PersistJob::SetSystemPrompt { id, prompt } => store.set_system_prompt(&id, &prompt).await,
        PersistJob::Append { id, message } => store.append_message(&id, message).await,
        PersistJob::SaveFullContext {
            id,
            system_prompt,
            messages,
        } => {
            store
                .save_full_context(&id, system_prompt.as_deref(), messages)
                .await
        }
        PersistJob::Clear { id } => store.clear_messages(&id).await,
        PersistJob::Delete { id } => store.delete_session(&id).await,
        PersistJob::Flush(_) | PersistJob::Shutdown => Ok(()),
    }
}
