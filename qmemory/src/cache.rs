//! Bounded access-ordered session cache.

use std::collections::{HashMap, VecDeque};

use qcommon::SessionId;
use qprovider::Message;

/// In-memory state of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
}

/// Entry removed from the cache to keep the resident set within bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictedSession {
    pub id: SessionId,
    pub state: SessionState,
}

/// Access-ordered map from session id to [`SessionState`] with a hard bound.
///
/// Every read or write promotes the touched entry to most-recently used; an
/// insertion that would exceed the bound removes the least-recently-used
/// entry and hands it back so the owner can flush it. Not internally
/// synchronized: the memory manager serializes access behind its own mutex.
#[derive(Debug)]
pub struct SessionCache {
    capacity: usize,
    entries: HashMap<SessionId, SessionState>,
    // Front is least-recently used, back is most-recently used.
    order: VecDeque<SessionId>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&mut self, id: &SessionId) -> Option<&SessionState> {
        if !self.entries.contains_key(id) {
            return None;
        }

        self.promote(id);
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut SessionState> {
        if !self.entries.contains_key(id) {
            return None;
        }

        self.promote(id);
        self.entries.get_mut(id)
    }

    /// Inserts or replaces an entry, returning the evicted LRU entry when the
    /// insertion pushed the resident set past the bound.
    pub fn insert(&mut self, id: SessionId, state: SessionState) -> Option<EvictedSession> {
        if self.entries.insert(id.clone(), state).is_some() {
            self.promote(&id);
            return None;
        }

        self.order.push_back(id);

        if self.entries.len() <= self.capacity {
            return None;
        }

        let evicted_id = self.order.pop_front()?;
        let state = self.entries.remove(&evicted_id)?;
        Some(EvictedSession {
            id: evicted_id,
            state,
        })
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<SessionState> {
        let state = self.entries.remove(id)?;
        self.order.retain(|entry| entry != id);
        Some(state)
    }

    fn promote(&mut self, id: &SessionId) {
        self.order.retain(|entry| entry != id);
        self.order.push_back(id.clone());
    }
}
