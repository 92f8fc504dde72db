//! Bounded per-session history of call milestones.

use std::collections::VecDeque;

use dashmap::DashMap;

use callwire_core::{SessionEvent, SessionId};

/// Per-session ring of milestone events.
///
/// Each session keeps at most `capacity` events; when the ring is full the
/// oldest event is dropped. Buffers are independent, so a chatty session
/// never evicts another session's history.
#[derive(Debug)]
pub struct SessionHistory {
    sessions: DashMap<SessionId, VecDeque<SessionEvent>>,
    capacity: usize,
}

impl SessionHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Appends a milestone to the session's ring, evicting the oldest
    /// entries beyond capacity.
    pub fn record(&self, session_id: &SessionId, event: SessionEvent) {
        let mut buffer = self.sessions.entry(session_id.clone()).or_default();
        buffer.push_back(event);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// Snapshot of the session's retained milestones, oldest first.
    ///
    /// Unknown sessions yield an empty list.
    #[must_use]
    pub fn snapshot(&self, session_id: &SessionId) -> Vec<SessionEvent> {
        self.sessions
            .get(session_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of sessions with at least one retained milestone.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
