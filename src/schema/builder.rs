use super::deps::{self, ResolvedDeps};
use super::types::{
    ComputeFn, HandlerDescriptor, HandlerFn, ParamSpec, SETTER_PREFIX, StateView, VarDescriptor,
    VarKind, VarType,
};
use crate::dispatch::HandlerValue;
use crate::error::SchemaError;
use crate::state::StateInstance;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

// ─── Builder ────────────────────────────────────────────────────────────────

/// Registration surface for one state type.
///
/// Vars and handlers are registered explicitly, then `build` finalizes the
/// schema: dependencies are traced, cycles and setter collisions rejected.
/// Registration-time failures abort the build entirely; they indicate a
/// programming defect that cannot be safely ignored.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    vars: Vec<VarDescriptor>,
    index: HashMap<String, usize>,
    handlers: Vec<HandlerDescriptor>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            index: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    /// Declare a mutable base var with its type and default value.
    pub fn register_base(
        &mut self,
        name: impl Into<String>,
        ty: VarType,
        default: Value,
    ) -> Result<&mut Self, SchemaError> {
        let name = name.into();
        self.push_var(VarDescriptor {
            name,
            ty,
            kind: VarKind::Base,
            default: Some(default),
            compute: None,
        })
    }

    /// Declare a derived var. Its dependencies are traced at build time by
    /// running `compute` once against the declared defaults.
    pub fn register_computed(
        &mut self,
        name: impl Into<String>,
        compute: impl Fn(&StateView<'_>) -> Value + Send + Sync + 'static,
    ) -> Result<&mut Self, SchemaError> {
        let name = name.into();
        let compute: ComputeFn = Arc::new(compute);
        self.push_var(VarDescriptor {
            name,
            ty: VarType::Any,
            kind: VarKind::Computed,
            default: None,
            compute: Some(compute),
        })
    }

    /// Declare an event handler with its typed parameter list.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        run: impl Fn(&mut StateInstance, &[Value]) -> anyhow::Result<HandlerValue>
        + Send
        + Sync
        + 'static,
    ) -> Result<&mut Self, SchemaError> {
        let name = name.into();
        if self.handlers.iter().any(|h| h.name == name) {
            return Err(SchemaError::DuplicateHandler { name });
        }
        let run: HandlerFn = Arc::new(run);
        self.handlers.push(HandlerDescriptor { name, params, run });
        Ok(self)
    }

    fn push_var(&mut self, descriptor: VarDescriptor) -> Result<&mut Self, SchemaError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(SchemaError::DuplicateVar {
                name: descriptor.name,
            });
        }
        self.index
            .insert(descriptor.name.clone(), self.vars.len());
        self.vars.push(descriptor);
        Ok(self)
    }

    /// Finalize the schema. Traces computed-var dependencies, rejects cyclic
    /// definitions, and rejects handlers that shadow a derived setter name.
    pub fn build(self) -> Result<StateSchema, SchemaError> {
        let setter_names: HashSet<String> = self
            .vars
            .iter()
            .filter(|v| v.kind == VarKind::Base)
            .map(|v| format!("{SETTER_PREFIX}{}", v.name))
            .collect();
        for handler in &self.handlers {
            if setter_names.contains(&handler.name) {
                return Err(SchemaError::HandlerCollision {
                    name: handler.name.clone(),
                });
            }
        }

        let deps = deps::resolve(&self.vars, &self.index)?;
        let handlers = self
            .handlers
            .into_iter()
            .map(|h| (h.name.clone(), h))
            .collect();

        Ok(StateSchema {
            name: self.name,
            vars: self.vars,
            index: self.index,
            handlers,
            deps,
        })
    }
}

// ─── Built schema ───────────────────────────────────────────────────────────

/// Immutable description of one state type: its var descriptors, handler
/// table, and resolved dependency graph. Shared by every instance.
pub struct StateSchema {
    name: String,
    vars: Vec<VarDescriptor>,
    index: HashMap<String, usize>,
    handlers: HashMap<String, HandlerDescriptor>,
    deps: ResolvedDeps,
}

impl StateSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self, name: &str) -> Option<&VarDescriptor> {
        self.index.get(name).map(|i| &self.vars[*i])
    }

    /// Descriptors in declaration order. Delta emission relies on this order
    /// being stable.
    pub fn vars(&self) -> impl Iterator<Item = &VarDescriptor> {
        self.vars.iter()
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(name)
    }

    /// Names a handler invocation may use, declared handlers plus derived
    /// setters. Sorted for stable listings.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.extend(
            self.vars
                .iter()
                .filter(|v| v.kind == VarKind::Base)
                .map(|v| format!("{SETTER_PREFIX}{}", v.name)),
        );
        names.sort_unstable();
        names
    }

    /// If `handler_name` follows the derived-setter convention for a declared
    /// base var, the var it targets.
    pub fn setter_target(&self, handler_name: &str) -> Option<&str> {
        let target = handler_name.strip_prefix(SETTER_PREFIX)?;
        let descriptor = self.var(target)?;
        (descriptor.kind == VarKind::Base).then_some(&descriptor.name)
    }

    /// Direct dependency set of a computed var, as traced at build time.
    pub fn dependencies_of(&self, computed: &str) -> Option<&HashSet<String>> {
        self.deps.direct.get(computed)
    }

    /// Transitive dependency closure of a computed var.
    pub fn transitive_dependencies(&self, computed: &str) -> Option<&HashSet<String>> {
        self.deps.transitive.get(computed)
    }

    /// Computed vars whose cache must be invalidated when `var` changes.
    pub(crate) fn invalidated_by(&self, var: &str) -> impl Iterator<Item = &str> {
        self.deps
            .invalidates
            .get(var)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

impl fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSchema")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
