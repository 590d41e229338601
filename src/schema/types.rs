use crate::dispatch::HandlerValue;
use crate::state::StateInstance;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Reserved prefix for derived setter handlers: base var `x` is addressable
/// as `set_x` without a user-declared handler.
pub const SETTER_PREFIX: &str = "set_";

// ─── Var descriptors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// Directly assignable field; mutations mark it dirty.
    Base,
    /// Derived field; re-evaluated from other vars, never assigned.
    Computed,
}

/// Declared type of a var or handler parameter, used to validate inbound
/// arguments before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarType {
    Bool,
    Int,
    Float,
    String,
    List,
    Object,
    Any,
}

impl VarType {
    /// Whether a serialized value is acceptable for this declared type.
    /// `null` is accepted everywhere (an absent value is not a type error).
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_boolean() || value.is_null(),
            Self::Int => value.is_i64() || value.is_u64() || value.is_null(),
            Self::Float => value.is_number() || value.is_null(),
            Self::String => value.is_string() || value.is_null(),
            Self::List => value.is_array() || value.is_null(),
            Self::Object => value.is_object() || value.is_null(),
        }
    }
}

/// Short JSON type tag for diagnostics.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Evaluation function of a computed var. Receives a read view over the
/// current field values; every access through the view is observable, which
/// is how dependencies are traced at registration time.
pub type ComputeFn = Arc<dyn Fn(&StateView<'_>) -> Value + Send + Sync>;

/// Static metadata for one declared var. Immutable once the schema is built.
#[derive(Clone)]
pub struct VarDescriptor {
    pub name: String,
    pub ty: VarType,
    pub kind: VarKind,
    /// Initial value; present for base vars only.
    pub default: Option<Value>,
    /// Evaluation function; present for computed vars only.
    pub compute: Option<ComputeFn>,
}

impl fmt::Debug for VarDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// Declared parameter of an event handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: VarType,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Event handler body. Runs with the state instance as receiver and the
/// validated argument list; whatever it returns is normalized into actions.
pub type HandlerFn =
    Arc<dyn Fn(&mut StateInstance, &[Value]) -> anyhow::Result<HandlerValue> + Send + Sync>;

#[derive(Clone)]
pub struct HandlerDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub run: HandlerFn,
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ─── Read view ──────────────────────────────────────────────────────────────

/// Read-only view over field values, handed to computed-var evaluation.
///
/// All reads funnel through one function so the schema builder can substitute
/// an instrumented reader that records accesses instead of a live instance.
pub struct StateView<'a> {
    read: &'a dyn Fn(&str) -> Value,
}

impl<'a> StateView<'a> {
    pub(crate) fn new(read: &'a dyn Fn(&str) -> Value) -> Self {
        Self { read }
    }

    /// Current value of a var; `null` for undeclared names.
    pub fn get(&self, name: &str) -> Value {
        (self.read)(name)
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name).as_i64().unwrap_or(0)
    }

    pub fn float(&self, name: &str) -> f64 {
        self.get(name).as_f64().unwrap_or(0.0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).as_bool().unwrap_or(false)
    }

    pub fn text(&self, name: &str) -> String {
        match self.get(name) {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn list(&self, name: &str) -> Vec<Value> {
        match self.get(name) {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}
