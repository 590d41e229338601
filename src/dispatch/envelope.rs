//! Envelope contract between the engine and the transport adapter.
//!
//! The transport delivers inbound event envelopes and carries outbound sync
//! envelopes; how the bytes move (websocket, long-poll, …) is its concern.

use super::actions::Action;
use crate::state::Delta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound: one event invocation from the remote side. A missing or unknown
/// `session_id` makes the engine create a new session; the fresh token comes
/// back on the outbound envelope for the transport to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub session_id: Option<String>,
    pub state_type: String,
    pub handler: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventEnvelope {
    pub fn new(
        session_id: Option<String>,
        state_type: impl Into<String>,
        handler: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            session_id,
            state_type: state_type.into(),
            handler: handler.into(),
            args,
        }
    }
}

/// Outbound: the minimal change set plus side-effect instructions for one
/// cycle. Keys present in `delta` are exactly the vars that changed; an
/// absent key means "no change", never "unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub session_id: String,
    pub delta: Delta,
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEnvelope {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"delta":{},"actions":[],"error":"serialization failed"}"#.into())
    }
}
