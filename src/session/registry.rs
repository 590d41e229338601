use super::types::{Session, generate_session_id};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Owner of every live session: the isolation boundary between users.
///
/// This is the only structure shared across sessions. Constructed at server
/// start and passed explicitly to whatever needs it; there is no process-
/// global session map. Critical sections are kept short so the expiry sweep
/// never stalls unrelated lookups.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.read().get(session_id).cloned()
    }

    /// Look up or create the session for `session_id`. Safe under concurrent
    /// invocation for the same id: exactly one session is created and losers
    /// of the race observe the winner's instance.
    pub fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        if let Some(session) = self.get(session_id) {
            return session;
        }
        Arc::clone(
            self.write()
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Session::new(session_id.to_string()))),
        )
    }

    /// Create a session under a freshly generated token.
    pub fn create(&self) -> Arc<Session> {
        let mut sessions = self.write();
        loop {
            let id = generate_session_id();
            if sessions.contains_key(&id) {
                continue;
            }
            let session = Arc::new(Session::new(id.clone()));
            sessions.insert(id, Arc::clone(&session));
            return session;
        }
    }

    /// Resolve an inbound session token. A known id returns its session; an
    /// absent or unknown id yields a brand-new session under a fresh token
    /// (client-supplied ids are never trusted into existence).
    pub fn resolve(&self, session_id: Option<&str>) -> Arc<Session> {
        if let Some(id) = session_id {
            if let Some(session) = self.get(id) {
                return session;
            }
        }
        self.create()
    }

    /// Drop all state for a session (explicit logout). A later lookup for the
    /// same id starts fresh.
    pub fn clear(&self, session_id: &str) -> bool {
        self.write().remove(session_id).is_some()
    }

    /// Remove sessions idle past `lifetime`. A session whose exclusion scope
    /// is currently held has an event in flight; it counts as seen and
    /// survives this round. Returns how many sessions were removed.
    pub fn sweep_expired(&self, lifetime: chrono::Duration) -> usize {
        let candidates: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, session)| session.idle_for() > lifetime)
            .map(|(id, _)| id.clone())
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let mut removed = 0;
        let mut sessions = self.write();
        for id in candidates {
            let Some(session) = sessions.get(&id).cloned() else {
                continue;
            };
            let Ok(guard) = session.states().try_lock() else {
                continue;
            };
            // Re-check under the write lock: the session may have been
            // touched since the candidate scan.
            if session.idle_for() > lifetime {
                drop(guard);
                sessions.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}
