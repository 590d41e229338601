//! Session lifecycle: opaque tokens, per-session exclusion scopes, and the
//! registry that isolates users from each other.

mod registry;
mod types;

pub use registry::SessionRegistry;
pub use types::{Session, StateTable, generate_session_id};
