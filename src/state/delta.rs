//! Delta computation.
//!
//! A delta carries exactly the vars whose externally-visible value changed
//! since the last flush: dirty base vars plus every computed var transitively
//! dependent on one of them. The remote side must be assumed to display any
//! computed var, so dependent computed values are always included.

use super::instance::StateInstance;
use crate::schema::VarKind;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Ordered var-name → value mapping, serialized as a JSON object. Key order
/// follows schema declaration order, so identical mutation sequences always
/// produce identical deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    entries: Vec<(String, Value)>,
}

impl Delta {
    pub(crate) fn from_entries(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DeltaVisitor;

        impl<'de> Visitor<'de> for DeltaVisitor {
            type Value = Delta;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of var names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Delta, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    entries.push((name, value));
                }
                Ok(Delta { entries })
            }
        }

        deserializer.deserialize_map(DeltaVisitor)
    }
}

impl StateInstance {
    /// Compute the delta for the current cycle and clear the dirty set, as
    /// one atomic step on the exclusively-owned instance. Immediately
    /// repeated calls yield an empty delta.
    pub fn take_delta(&mut self) -> Delta {
        if self.dirty.is_empty() {
            return Delta::default();
        }
        let schema = Arc::clone(&self.schema);

        let mut affected: HashSet<&str> = HashSet::new();
        for name in &self.dirty {
            affected.extend(schema.invalidated_by(name));
        }

        let mut entries = Vec::new();
        for descriptor in schema.vars() {
            match descriptor.kind {
                VarKind::Base if self.dirty.contains(&descriptor.name) => {
                    let value = self
                        .values
                        .get(&descriptor.name)
                        .cloned()
                        .unwrap_or(Value::Null);
                    entries.push((descriptor.name.clone(), value));
                }
                VarKind::Computed if affected.contains(descriptor.name.as_str()) => {
                    let value = self.computed_value(&descriptor.name);
                    entries.push((descriptor.name.clone(), value));
                }
                _ => {}
            }
        }

        self.dirty.clear();
        Delta::from_entries(entries)
    }

    /// Full view of every var, in declaration order, for hydrating a freshly
    /// connected remote. Leaves the dirty set untouched.
    pub fn snapshot(&mut self) -> Delta {
        let schema = Arc::clone(&self.schema);
        let mut entries = Vec::new();
        for descriptor in schema.vars() {
            let value = match descriptor.kind {
                VarKind::Base => self
                    .values
                    .get(&descriptor.name)
                    .cloned()
                    .unwrap_or(Value::Null),
                VarKind::Computed => self.computed_value(&descriptor.name),
            };
            entries.push((descriptor.name.clone(), value));
        }
        Delta::from_entries(entries)
    }
}
