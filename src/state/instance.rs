use crate::error::StateError;
use crate::schema::{StateSchema, StateView, VarDescriptor, VarKind};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct CachedValue {
    pub value: Value,
    pub valid: bool,
}

/// Live field values for one (session, state type) pair.
///
/// Owned exclusively by its session: all mutation happens inside the
/// session's exclusion scope, through event dispatch or a background-task
/// completion. The dirty set records base vars whose stored value differs
/// from what was last emitted on the wire.
pub struct StateInstance {
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) values: HashMap<String, Value>,
    pub(crate) dirty: HashSet<String>,
    pub(crate) cache: HashMap<String, CachedValue>,
}

impl StateInstance {
    /// Fresh instance with every base var at its declared default. Nothing
    /// is dirty: a new instance has nothing to reconcile.
    pub fn new(schema: Arc<StateSchema>) -> Self {
        let values = schema
            .vars()
            .filter(|v| v.kind == VarKind::Base)
            .map(|v| {
                (
                    v.name.clone(),
                    v.default.clone().unwrap_or(Value::Null),
                )
            })
            .collect();
        Self {
            schema,
            values,
            dirty: HashSet::new(),
            cache: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Current value of a var. Base vars read from storage; computed vars
    /// read the cache when valid, otherwise evaluate fresh without storing
    /// (use [`StateInstance::get_computed`] on a mutable instance to cache).
    pub fn get(&self, name: &str) -> Result<Value, StateError> {
        let descriptor = self.schema.var(name).ok_or_else(|| StateError::UnknownVar {
            var: name.to_string(),
        })?;
        match descriptor.kind {
            VarKind::Base => Ok(self.values.get(name).cloned().unwrap_or(Value::Null)),
            VarKind::Computed => Ok(self.read_value(name)),
        }
    }

    /// Assign a base var. Returns whether the stored value actually changed:
    /// writing an equal value is a no-op that neither marks the var dirty nor
    /// invalidates anything.
    pub fn set(&mut self, name: &str, value: Value) -> Result<bool, StateError> {
        let schema = Arc::clone(&self.schema);
        let descriptor = schema.var(name).ok_or_else(|| StateError::UnknownVar {
            var: name.to_string(),
        })?;
        if descriptor.kind == VarKind::Computed {
            return Err(StateError::ReadOnly {
                var: name.to_string(),
            });
        }
        if self.values.get(name) == Some(&value) {
            return Ok(false);
        }
        self.values.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        for dependent in schema.invalidated_by(name) {
            if let Some(cached) = self.cache.get_mut(dependent) {
                cached.valid = false;
            }
        }
        Ok(true)
    }

    /// Value of a computed var: cached when valid, re-evaluated and cached
    /// otherwise. Reading never touches the dirty set; only base mutations
    /// are user-visible changes. Passing a base var name reads its stored
    /// value.
    pub fn get_computed(&mut self, name: &str) -> Result<Value, StateError> {
        let descriptor = self.schema.var(name).ok_or_else(|| StateError::UnknownVar {
            var: name.to_string(),
        })?;
        match descriptor.kind {
            VarKind::Base => Ok(self.values.get(name).cloned().unwrap_or(Value::Null)),
            VarKind::Computed => Ok(self.computed_value(name)),
        }
    }

    /// Restore every base var to its declared default, marking changed vars
    /// dirty so the remote view converges.
    pub fn reset(&mut self) {
        let schema = Arc::clone(&self.schema);
        for descriptor in schema.vars() {
            if descriptor.kind != VarKind::Base {
                continue;
            }
            let default = descriptor.default.clone().unwrap_or(Value::Null);
            // Declared base var with a base default: cannot fail.
            let _ = self.set(&descriptor.name, default);
        }
    }

    /// Whether any base var is awaiting delta emission.
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Cached-or-fresh value of a declared computed var, updating the cache.
    pub(crate) fn computed_value(&mut self, name: &str) -> Value {
        if let Some(cached) = self.cache.get(name) {
            if cached.valid {
                return cached.value.clone();
            }
        }
        let schema = Arc::clone(&self.schema);
        let Some(descriptor) = schema.var(name) else {
            return Value::Null;
        };
        let value = self.evaluate(descriptor);
        self.cache.insert(
            name.to_string(),
            CachedValue {
                value: value.clone(),
                valid: true,
            },
        );
        value
    }

    /// Read path used during computed-var evaluation. Base vars come from
    /// storage; computed dependencies use their cache when valid and are
    /// evaluated recursively otherwise. The schema build rejected cycles, so
    /// recursion terminates.
    fn read_value(&self, name: &str) -> Value {
        match self.schema.var(name) {
            Some(descriptor) if descriptor.kind == VarKind::Base => {
                self.values.get(name).cloned().unwrap_or(Value::Null)
            }
            Some(descriptor) => {
                if let Some(cached) = self.cache.get(name) {
                    if cached.valid {
                        return cached.value.clone();
                    }
                }
                self.evaluate(descriptor)
            }
            None => Value::Null,
        }
    }

    fn evaluate(&self, descriptor: &VarDescriptor) -> Value {
        let Some(compute) = descriptor.compute.as_ref() else {
            return Value::Null;
        };
        let read = |field: &str| self.read_value(field);
        compute(&StateView::new(&read))
    }
}

impl fmt::Debug for StateInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateInstance")
            .field("state_type", &self.schema.name())
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaBuilder, VarType};
    use serde_json::json;

    fn cart_schema() -> Arc<StateSchema> {
        let mut builder = SchemaBuilder::new("cart");
        builder
            .register_base("items", VarType::List, json!([]))
            .unwrap();
        builder
            .register_base("tax_rate", VarType::Float, json!(0.1))
            .unwrap();
        builder
            .register_computed("subtotal", |v| {
                json!(v.list("items").iter().filter_map(|i| i.as_f64()).sum::<f64>())
            })
            .unwrap();
        builder
            .register_computed("total", |v| {
                json!(v.float("subtotal") * (1.0 + v.float("tax_rate")))
            })
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn new_instance_starts_at_defaults_and_clean() {
        let instance = StateInstance::new(cart_schema());
        assert_eq!(instance.get("items").unwrap(), json!([]));
        assert!(!instance.has_dirty());
    }

    #[test]
    fn set_marks_dirty_and_invalidate_cascades() {
        let mut instance = StateInstance::new(cart_schema());
        assert_eq!(instance.get_computed("subtotal").unwrap(), json!(0.0));

        instance.set("items", json!([10.0, 20.0])).unwrap();
        assert!(instance.has_dirty());
        assert_eq!(instance.get_computed("subtotal").unwrap(), json!(30.0));
        assert!((instance.get_computed("total").unwrap().as_f64().unwrap() - 33.0).abs() < 1e-9);
    }

    #[test]
    fn equal_value_set_is_a_no_op() {
        let mut instance = StateInstance::new(cart_schema());
        let changed = instance.set("tax_rate", json!(0.1)).unwrap();
        assert!(!changed);
        assert!(!instance.has_dirty());
    }

    #[test]
    fn computed_vars_reject_assignment() {
        let mut instance = StateInstance::new(cart_schema());
        let err = instance.set("subtotal", json!(5)).unwrap_err();
        assert!(matches!(err, StateError::ReadOnly { var } if var == "subtotal"));
    }

    #[test]
    fn unknown_var_is_an_error() {
        let mut instance = StateInstance::new(cart_schema());
        assert!(matches!(
            instance.set("missing", json!(1)),
            Err(StateError::UnknownVar { .. })
        ));
        assert!(matches!(
            instance.get("missing"),
            Err(StateError::UnknownVar { .. })
        ));
    }

    #[test]
    fn cache_coherence_matches_fresh_evaluation() {
        let mut instance = StateInstance::new(cart_schema());
        for items in [json!([1.0]), json!([1.0, 2.0]), json!([5.0, 5.0, 5.0])] {
            instance.set("items", items).unwrap();
        }
        // Cached read after the mutation sequence equals evaluating fresh
        // against the final field values.
        let cached = instance.get_computed("subtotal").unwrap();
        assert_eq!(cached, json!(15.0));
        let again = instance.get_computed("subtotal").unwrap();
        assert_eq!(cached, again);
    }

    #[test]
    fn reading_computed_never_marks_dirty() {
        let mut instance = StateInstance::new(cart_schema());
        instance.get_computed("total").unwrap();
        assert!(!instance.has_dirty());
    }

    #[test]
    fn reset_restores_defaults_and_marks_changes_dirty() {
        let mut instance = StateInstance::new(cart_schema());
        instance.set("items", json!([1.0])).unwrap();
        let _ = instance.take_delta();

        instance.reset();
        assert_eq!(instance.get("items").unwrap(), json!([]));
        assert!(instance.has_dirty());
    }
}
