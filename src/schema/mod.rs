//! Var descriptor model and dependency tracker.
//!
//! A state type is described once, at registration time, by an explicit
//! descriptor table: base vars carry a declared type and default, computed
//! vars carry an evaluation function whose reads are traced to build the
//! dependency graph. No runtime attribute interception is involved.

mod builder;
mod deps;
mod types;

pub use builder::{SchemaBuilder, StateSchema};
pub use types::{
    ComputeFn, HandlerDescriptor, HandlerFn, ParamSpec, SETTER_PREFIX, StateView, VarDescriptor,
    VarKind, VarType,
};

pub(crate) use types::json_type_name;
