//! DB session router — component I.
//!
//! Per spec: "Session state is mutated under the pool lock to avoid a
//! race where pool acquire races session pinning." Rather than give
//! `SessionTable` its own lock and hope callers always take locks in the
//! right order, `pool::Pool` embeds a `SessionTable` directly inside the
//! same `Mutex` that guards its idle/active connection lists — so there is
//! only one lock to take, and pinning a session during `acquire` is
//! trivially race-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::BackendId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone)]
pub struct SessionState {
    pub backend_id: Option<BackendId>,
    pub in_transaction: bool,
    pub last_activity_ms: u64,
}

impl SessionState {
    fn new(now_ms: u64) -> Self {
        Self {
            backend_id: None,
            in_transaction: false,
            last_activity_ms: now_ms,
        }
    }
}

/// A bounded table of DB sessions. Not thread-safe on its own — owned
/// exclusively by `pool::Pool`'s internal mutex-guarded state.
#[derive(Debug)]
pub struct SessionTable {
    capacity: usize,
    sessions: HashMap<SessionId, SessionState>,
    next_id: AtomicU64,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn new_session(&mut self, now_ms: u64) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, SessionState::new(now_ms));
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionState> {
        self.sessions.get(&id)
    }

    pub fn touch(&mut self, id: SessionId, now_ms: u64) {
        if let Some(s) = self.sessions.get_mut(&id) {
            s.last_activity_ms = now_ms;
        }
    }

    pub fn pin(&mut self, id: SessionId, backend: BackendId) {
        if let Some(s) = self.sessions.get_mut(&id) {
            s.backend_id = Some(backend);
        }
    }

    pub fn begin_transaction(&mut self, id: SessionId, backend: BackendId) {
        if let Some(s) = self.sessions.get_mut(&id) {
            s.backend_id = Some(backend);
            s.in_transaction = true;
        }
    }

    pub fn end_transaction(&mut self, id: SessionId) {
        if let Some(s) = self.sessions.get_mut(&id) {
            s.in_transaction = false;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ensures there's room for a new session: if the table is at
    /// capacity, evicts the oldest non-transactional entry. Returns
    /// `false` if every entry is transactional and none can be evicted
    /// (the caller should surface `Error::SessionsExhausted`, not
    /// `Error::NoTarget`, per the spec's Open Questions resolution).
    pub fn make_room(&mut self) -> bool {
        if self.sessions.len() < self.capacity {
            return true;
        }
        let oldest = self
            .sessions
            .iter()
            .filter(|(_, s)| !s.in_transaction)
            .min_by_key(|(_, s)| s.last_activity_ms)
            .map(|(id, _)| *id);
        match oldest {
            Some(id) => {
                self.sessions.remove(&id);
                true
            }
            None => false,
        }
    }
}

/// Thin facade used by callers that only need the session-routing
/// decision logic without touching `Pool` directly (e.g. unit tests).
/// Production code goes through `pool::Pool::route_query`.
pub struct SessionRouter;

impl SessionRouter {
    /// Decides whether a query on `session` should reuse its pinned
    /// backend: true when the query requires stickiness, or the session
    /// is mid-transaction and already has a backend.
    pub fn should_reuse(session: Option<&SessionState>, requires_sticky: bool) -> bool {
        match session {
            Some(s) if s.in_transaction && s.backend_id.is_some() => true,
            Some(s) if requires_sticky && s.backend_id.is_some() => true,
            _ => false,
        }
    }
}
