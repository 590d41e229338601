use crate::config::EngineConfig;
use crate::dispatch::{self, DispatchOutcome, EventEnvelope, HandlerValue, SyncEnvelope, normalize};
use crate::error::{DispatchError, SchemaError, SessionError};
use crate::schema::StateSchema;
use crate::session::SessionRegistry;
use crate::state::{Delta, StateInstance};
use crate::tasks::{self, TaskHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// The engine facade: registered state types, the session registry, and the
/// per-session outbound channels, wired together under one configuration.
///
/// Constructed at server start and shared via `Arc`; nothing here is a
/// process-wide singleton. The transport adapter feeds
/// [`Engine::dispatch`] with inbound envelopes and delivers whatever comes
/// back: either the returned outcome (request/response transports) or the
/// stream obtained from [`Engine::subscribe`] (push transports, which also
/// carry background-task envelopes).
pub struct Engine {
    config: EngineConfig,
    schemas: RwLock<HashMap<String, Arc<StateSchema>>>,
    registry: Arc<SessionRegistry>,
    outbound: Mutex<HashMap<String, UnboundedSender<SyncEnvelope>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            schemas: RwLock::new(HashMap::new()),
            registry: Arc::new(SessionRegistry::new()),
            outbound: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register a built state type. Registration happens once, at startup;
    /// re-registering a name is a programming defect and is rejected.
    pub fn register_schema(&self, schema: StateSchema) -> Result<(), SchemaError> {
        let mut schemas = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if schemas.contains_key(schema.name()) {
            return Err(SchemaError::DuplicateStateType {
                name: schema.name().to_string(),
            });
        }
        schemas.insert(schema.name().to_string(), Arc::new(schema));
        Ok(())
    }

    pub fn schema(&self, state_type: &str) -> Option<Arc<StateSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(state_type)
            .cloned()
    }

    /// Run one inbound event to completion: resolve (or create) the session,
    /// enter its exclusion scope, invoke the handler, and compute the delta.
    /// The delta is returned whether or not the handler succeeded, so already-
    /// applied partial mutations still reach the remote side.
    pub async fn dispatch(&self, envelope: EventEnvelope) -> DispatchOutcome {
        let EventEnvelope {
            session_id,
            state_type,
            handler,
            args,
        } = envelope;

        let Some(schema) = self.schema(&state_type) else {
            tracing::warn!(state_type = %state_type, "dispatch for unregistered state type");
            return DispatchOutcome {
                session_id: session_id.unwrap_or_default(),
                delta: Delta::default(),
                actions: Vec::new(),
                failure: Some(DispatchError::UnknownStateType { name: state_type }),
            };
        };

        let session = self.registry.resolve(session_id.as_deref());
        session.touch();

        let mut states = session.states().lock().await;
        let instance = states.instance_mut(&schema);
        let (actions, failure) = dispatch::invoke(&schema, instance, &handler, &args);
        if let Some(error) = &failure {
            tracing::debug!(handler = %handler, session = %session.id(), "dispatch failed: {error}");
        }
        let delta = instance.take_delta();

        let outcome = DispatchOutcome {
            session_id: session.id().to_string(),
            delta,
            actions,
            failure,
        };
        // Emitted inside the exclusion scope so subscribed transports observe
        // deltas in dispatch order.
        self.push_outbound(&outcome.to_envelope());
        drop(states);
        outcome
    }

    /// Apply a mutation outside the event path, the completion half of a
    /// background task. Re-acquires the session's exclusion scope, applies
    /// the closure, and emits the resulting envelope to any subscriber.
    /// A vanished session surfaces as [`SessionError::Gone`].
    pub async fn mutate<F>(
        &self,
        session_id: &str,
        state_type: &str,
        apply: F,
    ) -> crate::error::Result<DispatchOutcome>
    where
        F: FnOnce(&mut StateInstance) -> anyhow::Result<HandlerValue>,
    {
        let schema = self
            .schema(state_type)
            .ok_or_else(|| DispatchError::UnknownStateType {
                name: state_type.to_string(),
            })?;
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SessionError::Gone {
                session_id: session_id.to_string(),
            })?;
        session.touch();

        let mut states = session.states().lock().await;
        let instance = states.instance_mut(&schema);
        let (actions, failure) = match apply(instance) {
            Ok(value) => (normalize(value), None),
            Err(source) => (Vec::new(), Some(DispatchError::HandlerFailed(source))),
        };
        let delta = instance.take_delta();

        let outcome = DispatchOutcome {
            session_id: session.id().to_string(),
            delta,
            actions,
            failure,
        };
        self.push_outbound(&outcome.to_envelope());
        Ok(outcome)
    }

    /// Full-state envelope for a (re)connecting remote: every var of the
    /// state type, current values. Clears any pending delta, which the
    /// snapshot supersedes.
    pub async fn hydrate(
        &self,
        session_id: &str,
        state_type: &str,
    ) -> crate::error::Result<SyncEnvelope> {
        let schema = self
            .schema(state_type)
            .ok_or_else(|| DispatchError::UnknownStateType {
                name: state_type.to_string(),
            })?;
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SessionError::Gone {
                session_id: session_id.to_string(),
            })?;
        session.touch();

        let mut states = session.states().lock().await;
        let instance = states.instance_mut(&schema);
        let delta = instance.snapshot();
        let _ = instance.take_delta();

        Ok(SyncEnvelope {
            session_id: session.id().to_string(),
            delta,
            actions: Vec::new(),
            error: None,
        })
    }

    /// Per-session outbound stream. Every envelope this session produces,
    /// dispatch results and background completions alike, is mirrored here,
    /// in order. Subscribing again replaces the previous receiver.
    pub fn subscribe(&self, session_id: &str) -> UnboundedReceiver<SyncEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound_senders().insert(session_id.to_string(), tx);
        rx
    }

    pub fn unsubscribe(&self, session_id: &str) {
        self.outbound_senders().remove(session_id);
    }

    /// Tear down a session entirely: registry entry and outbound channel.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.outbound_senders().remove(session_id);
        self.registry.clear(session_id)
    }

    /// Spawn the periodic expiry sweep. The returned handle stops it.
    pub fn start_sweeper(self: &Arc<Self>) -> TaskHandle {
        let engine = Arc::clone(self);
        let lifetime = self.config.session.lifetime();
        tasks::periodic(self.config.session.sweep_interval(), None, move || {
            let engine = Arc::clone(&engine);
            async move {
                let removed = engine.registry.sweep_expired(lifetime);
                if removed > 0 {
                    tracing::info!(removed, "swept expired sessions");
                }
            }
        })
    }

    fn outbound_senders(
        &self,
    ) -> MutexGuard<'_, HashMap<String, UnboundedSender<SyncEnvelope>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_outbound(&self, envelope: &SyncEnvelope) {
        let mut senders = self.outbound_senders();
        if let Some(sender) = senders.get(&envelope.session_id) {
            if sender.send(envelope.clone()).is_err() {
                // Receiver side went away; drop the stale channel.
                senders.remove(&envelope.session_id);
            }
        }
    }
}
