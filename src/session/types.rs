use crate::schema::StateSchema;
use crate::state::StateInstance;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// Opaque, unguessable session token: 32 hex chars from the OS-seeded RNG.
/// The transport persists it (cookie or equivalent) and echoes it on every
/// inbound envelope.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// State instances of one session, keyed by state type. Lives behind the
/// session's exclusion scope; creation through [`StateTable::instance_mut`]
/// is idempotent, so exactly one instance exists per (session, state type).
#[derive(Debug, Default)]
pub struct StateTable {
    instances: HashMap<String, StateInstance>,
}

impl StateTable {
    pub fn instance_mut(&mut self, schema: &Arc<StateSchema>) -> &mut StateInstance {
        self.instances
            .entry(schema.name().to_string())
            .or_insert_with(|| StateInstance::new(Arc::clone(schema)))
    }

    pub fn get(&self, state_type: &str) -> Option<&StateInstance> {
        self.instances.get(state_type)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// One user's server-resident state.
///
/// The `states` mutex is the per-session exclusion scope: everything that
/// mutates this session's instances (event dispatch, background completion)
/// runs inside it, so concurrent inbound events never interleave their field
/// writes. Different sessions share nothing and run fully in parallel.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_seen_ms: AtomicI64,
    states: Mutex<StateTable>,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_seen_ms: AtomicI64::new(now.timestamp_millis()),
            states: Mutex::new(StateTable::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mark the session as seen; called on every inbound event.
    pub fn touch(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_seen_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_seen()
    }

    /// The per-session exclusion scope over its state instances.
    pub fn states(&self) -> &Mutex<StateTable> {
        &self.states
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: chrono::Duration) {
        let then = Utc::now() - by;
        self.last_seen_ms
            .store(then.timestamp_millis(), Ordering::Relaxed);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_seen", &self.last_seen())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaBuilder, VarType};
    use serde_json::json;

    fn schema() -> Arc<StateSchema> {
        let mut builder = SchemaBuilder::new("counter");
        builder
            .register_base("count", VarType::Int, json!(0))
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn session_ids_are_32_hex_chars_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn state_table_creates_instances_idempotently() {
        let session = Session::new(generate_session_id());
        let schema = schema();

        let mut states = session.states().lock().await;
        states.instance_mut(&schema).set("count", json!(7)).unwrap();
        // Second lookup returns the same instance, not a fresh one.
        let value = states.instance_mut(&schema).get("count").unwrap();
        assert_eq!(value, json!(7));
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn touch_refreshes_last_seen() {
        let session = Session::new(generate_session_id());
        session.backdate(chrono::Duration::hours(2));
        assert!(session.idle_for() >= chrono::Duration::hours(1));

        session.touch();
        assert!(session.idle_for() < chrono::Duration::minutes(1));
    }
}
