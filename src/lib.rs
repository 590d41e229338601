#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

//! `prism`: reactive per-session state synchronization engine.
//!
//! The engine keeps server-resident, per-user application state consistent
//! with a remote presentation layer: it tracks which fields changed,
//! recomputes derived fields lazily through a traced dependency graph, and
//! emits the minimal deltas, plus out-of-band actions, that the remote side
//! needs to converge. Transport, rendering, persistence, and auth live
//! outside; the crate defines only the envelope contract it requires.

pub mod config;
pub mod dispatch;
mod engine;
pub mod error;
pub mod schema;
pub mod session;
pub mod state;
pub mod tasks;

pub use config::{EngineConfig, SessionConfig};
pub use dispatch::{
    Action, DispatchOutcome, EventEnvelope, HandlerValue, SyncEnvelope, ToastVariant, alert,
    normalize, redirect, refresh, toast, toast_with,
};
pub use engine::Engine;
pub use error::{
    DispatchError, EngineError, Result, SchemaError, SessionError, StateError, TaskError,
};
pub use schema::{
    ParamSpec, SETTER_PREFIX, SchemaBuilder, StateSchema, StateView, VarDescriptor, VarKind,
    VarType,
};
pub use session::{Session, SessionRegistry, StateTable, generate_session_id};
pub use state::{Delta, StateInstance};
pub use tasks::TaskHandle;
