//! Dependency resolution for computed vars.
//!
//! Each computed var is evaluated once, at registration time, against an
//! instrumented read view whose values come from the declared defaults.
//! Every field access is recorded, producing the static dependency set for
//! that var. Chained computed vars resolve transitively; a var that ends up
//! reading itself (directly or through a chain) fails registration.

use super::types::{StateView, VarDescriptor, VarKind};
use crate::error::SchemaError;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Output of a full dependency resolution pass over one schema.
#[derive(Debug, Default)]
pub(crate) struct ResolvedDeps {
    /// computed var -> names it reads directly.
    pub direct: HashMap<String, HashSet<String>>,
    /// computed var -> transitive closure of names it depends on.
    pub transitive: HashMap<String, HashSet<String>>,
    /// any var -> computed vars whose cached value it invalidates.
    pub invalidates: HashMap<String, HashSet<String>>,
}

/// Trace every computed var in `vars` and build the dependency tables.
/// Deterministic: re-running over the same descriptors yields the same sets.
pub(crate) fn resolve(
    vars: &[VarDescriptor],
    index: &HashMap<String, usize>,
) -> Result<ResolvedDeps, SchemaError> {
    let tracer = Tracer {
        vars,
        index,
        direct: RefCell::new(HashMap::new()),
        memo: RefCell::new(HashMap::new()),
        stack: RefCell::new(Vec::new()),
        error: RefCell::new(None),
    };

    for descriptor in vars {
        if descriptor.kind == VarKind::Computed {
            tracer.trace(&descriptor.name);
        }
        if let Some(error) = tracer.error.borrow_mut().take() {
            return Err(error);
        }
    }

    let direct = tracer.direct.into_inner();
    let mut transitive: HashMap<String, HashSet<String>> = HashMap::new();
    for descriptor in vars {
        if descriptor.kind == VarKind::Computed {
            let closure = closure_of(&descriptor.name, &direct, index, vars);
            transitive.insert(descriptor.name.clone(), closure);
        }
    }

    let mut invalidates: HashMap<String, HashSet<String>> = HashMap::new();
    for (computed, deps) in &transitive {
        for dep in deps {
            invalidates
                .entry(dep.clone())
                .or_default()
                .insert(computed.clone());
        }
    }

    Ok(ResolvedDeps {
        direct,
        transitive,
        invalidates,
    })
}

fn closure_of(
    name: &str,
    direct: &HashMap<String, HashSet<String>>,
    index: &HashMap<String, usize>,
    vars: &[VarDescriptor],
) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut pending: Vec<String> = direct.get(name).into_iter().flatten().cloned().collect();
    while let Some(dep) = pending.pop() {
        if !out.insert(dep.clone()) {
            continue;
        }
        let is_computed = index
            .get(&dep)
            .is_some_and(|i| vars[*i].kind == VarKind::Computed);
        if is_computed {
            pending.extend(direct.get(&dep).into_iter().flatten().cloned());
        }
    }
    out
}

struct Tracer<'a> {
    vars: &'a [VarDescriptor],
    index: &'a HashMap<String, usize>,
    direct: RefCell<HashMap<String, HashSet<String>>>,
    memo: RefCell<HashMap<String, Value>>,
    stack: RefCell<Vec<String>>,
    error: RefCell<Option<SchemaError>>,
}

impl Tracer<'_> {
    /// Evaluate `name` against defaults, recording its reads. Returns the
    /// evaluated value so chained computed vars see real inputs.
    fn trace(&self, name: &str) -> Value {
        if let Some(value) = self.memo.borrow().get(name) {
            return value.clone();
        }
        if self.stack.borrow().iter().any(|entry| entry == name) {
            self.error
                .borrow_mut()
                .get_or_insert(SchemaError::CyclicComputed {
                    var: name.to_string(),
                });
            return Value::Null;
        }

        let Some(descriptor) = self.index.get(name).map(|i| &self.vars[*i]) else {
            return Value::Null;
        };
        let Some(compute) = descriptor.compute.as_ref() else {
            return Value::Null;
        };

        self.stack.borrow_mut().push(name.to_string());
        let reads = RefCell::new(HashSet::new());
        let read = |field: &str| -> Value {
            reads.borrow_mut().insert(field.to_string());
            self.value_of(field)
        };
        let value = compute(&StateView::new(&read));
        self.stack.borrow_mut().pop();

        self.direct
            .borrow_mut()
            .insert(name.to_string(), reads.into_inner());
        self.memo
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        value
    }

    fn value_of(&self, name: &str) -> Value {
        match self.index.get(name).map(|i| &self.vars[*i]) {
            Some(descriptor) if descriptor.kind == VarKind::Base => {
                descriptor.default.clone().unwrap_or(Value::Null)
            }
            Some(_) => self.trace(name),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::VarType;
    use serde_json::json;
    use std::sync::Arc;

    fn base(name: &str, default: Value) -> VarDescriptor {
        VarDescriptor {
            name: name.into(),
            ty: VarType::Any,
            kind: VarKind::Base,
            default: Some(default),
            compute: None,
        }
    }

    fn computed(
        name: &str,
        f: impl Fn(&StateView<'_>) -> Value + Send + Sync + 'static,
    ) -> VarDescriptor {
        VarDescriptor {
            name: name.into(),
            ty: VarType::Any,
            kind: VarKind::Computed,
            default: None,
            compute: Some(Arc::new(f)),
        }
    }

    fn index_of(vars: &[VarDescriptor]) -> HashMap<String, usize> {
        vars.iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect()
    }

    #[test]
    fn direct_reads_are_recorded() {
        let vars = vec![
            base("count", json!(0)),
            computed("double", |v| json!(v.int("count") * 2)),
        ];
        let index = index_of(&vars);
        let deps = resolve(&vars, &index).unwrap();
        assert_eq!(
            deps.direct["double"],
            HashSet::from(["count".to_string()])
        );
    }

    #[test]
    fn chained_computed_resolves_transitively() {
        let vars = vec![
            base("items", json!([10, 20])),
            base("tax_rate", json!(0.1)),
            computed("subtotal", |v| {
                json!(v.list("items").iter().filter_map(Value::as_f64).sum::<f64>())
            }),
            computed("tax", |v| json!(v.float("subtotal") * v.float("tax_rate"))),
            computed("total", |v| json!(v.float("subtotal") + v.float("tax"))),
        ];
        let index = index_of(&vars);
        let deps = resolve(&vars, &index).unwrap();

        let total = &deps.transitive["total"];
        assert!(total.contains("subtotal"));
        assert!(total.contains("tax"));
        assert!(total.contains("items"));
        assert!(total.contains("tax_rate"));

        // Mutating `items` must invalidate every downstream computed var.
        let invalidated = &deps.invalidates["items"];
        assert!(invalidated.contains("subtotal"));
        assert!(invalidated.contains("tax"));
        assert!(invalidated.contains("total"));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let vars = vec![computed("loop", |v| v.get("loop"))];
        let index = index_of(&vars);
        let err = resolve(&vars, &index).unwrap_err();
        assert!(matches!(err, SchemaError::CyclicComputed { var } if var == "loop"));
    }

    #[test]
    fn mutual_reference_is_a_cycle() {
        let vars = vec![
            computed("a", |v| v.get("b")),
            computed("b", |v| v.get("a")),
        ];
        let index = index_of(&vars);
        assert!(matches!(
            resolve(&vars, &index),
            Err(SchemaError::CyclicComputed { .. })
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let vars = vec![
            base("x", json!(1)),
            base("y", json!(2)),
            computed("sum", |v| json!(v.int("x") + v.int("y"))),
        ];
        let index = index_of(&vars);
        let first = resolve(&vars, &index).unwrap();
        let second = resolve(&vars, &index).unwrap();
        assert_eq!(first.direct, second.direct);
        assert_eq!(first.transitive, second.transitive);
    }

    #[test]
    fn unknown_reads_resolve_to_null_and_are_recorded() {
        let vars = vec![computed("ghost", |v| v.get("missing"))];
        let index = index_of(&vars);
        let deps = resolve(&vars, &index).unwrap();
        assert!(deps.direct["ghost"].contains("missing"));
    }
}
