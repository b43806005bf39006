//! Terraform Resources for Kowabunga
//!
//! Every resource is a [`Descriptor`]: its schema, wire type, reference table
//! and translation functions. The generic engine in [`crate::engine`] turns a
//! descriptor into a [`Resource`].

mod compute;
mod identity;
mod network;
mod project;
mod services;
mod storage;
mod topology;

pub use compute::{Instance, Kce, Volume};
pub use identity::{Team, User};
pub use network::{Adapter, NetGw, Subnet, VNet};
pub use project::Project;
pub use services::{DnsRecord, Kfs, Kgw};
pub use storage::{StorageNfs, StoragePool, Template};
pub use topology::{Host, Region, Zone};

use crate::engine::Managed;
use crate::error::{ProviderError, Result};
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{AttributeType, Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::session::Session;
use async_trait::async_trait;
use kowabunga_common::models::WireObject;
use kowabunga_common::Kind;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Result type for resource operations
pub type ResourceResult<T> = std::result::Result<T, Vec<Diagnostic>>;

/// Resource state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Build a state from a JSON object; anything else yields `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|obj| Self {
            values: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn to_object(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
    }

    pub fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.get(key).and_then(|v| v.as_object()).map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
    }

    /// Objects of a nested block list
    pub fn get_blocks(&self, key: &str) -> Vec<ResourceState> {
        self.get(key)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(ResourceState::from_value).collect())
            .unwrap_or_default()
    }

    pub fn require_string(&self, key: &str) -> Result<String> {
        self.get_string(key)
            .ok_or_else(|| ProviderError::MissingAttribute(key.to_string()))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)
            .ok_or_else(|| ProviderError::MissingAttribute(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Set an optional string, storing null for a missing or empty value.
    /// A current empty string stays as is, the API does not keep it.
    pub fn set_opt_string(&mut self, key: &str, value: Option<&str>) {
        match value.filter(|s| !s.is_empty()) {
            Some(s) => self.set(key, Value::from(s)),
            None if self.get_string(key).is_some_and(|s| s.is_empty()) => {}
            None => self.set(key, Value::Null),
        }
    }

    /// Set a list whose order carries no meaning, storing null for an empty
    /// list. The current order is kept when it holds the same items,
    /// otherwise the items are stored sorted.
    pub fn set_unordered_list<T: Serialize>(&mut self, key: &str, items: &[T]) {
        let items: Vec<Value> = items
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect();
        if items.is_empty() {
            self.set(key, Value::Null);
            return;
        }

        let items = sorted_values(&items);
        let unchanged = self
            .get(key)
            .and_then(Value::as_array)
            .is_some_and(|current| sorted_values(current) == items);
        if !unchanged {
            self.set(key, Value::from(items));
        }
    }

    /// Set a string map, storing null for an empty map
    pub fn set_string_map(&mut self, key: &str, entries: BTreeMap<String, String>) {
        if entries.is_empty() {
            self.set(key, Value::Null);
            return;
        }
        let object: Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        self.set(key, Value::Object(object));
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn sorted_values(items: &[Value]) -> Vec<Value> {
    let mut items = items.to_vec();
    items.sort_by(compare_values);
    items
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Validate a configuration; never touches the network
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic>;

    /// Create a new resource
    async fn create(&self, session: &Session, planned: &ResourceState)
        -> ResourceResult<ResourceState>;

    /// Read an existing resource; an empty state means it no longer exists
    async fn read(&self, session: &Session, current: &ResourceState)
        -> ResourceResult<ResourceState>;

    /// Update an existing resource
    async fn update(
        &self,
        session: &Session,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, session: &Session, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let _ = current;
        Ok(proposed.clone())
    }

    /// Attributes whose change forces replacement
    fn requires_replace(&self, current: &ResourceState, planned: &ResourceState) -> Vec<String> {
        let _ = (current, planned);
        Vec::new()
    }
}

/// Declarative description of one Kowabunga resource type
pub trait Descriptor: Send + Sync + 'static {
    /// API representation
    type Wire: Serialize + DeserializeOwned + WireObject + Send + Sync;

    const TYPE_NAME: &'static str;
    const KIND: Kind;
    const DESCRIPTION: &'static str;

    /// References to other objects, resolved before create and update
    const REFS: &'static [ParentRef] = &[];

    /// Resource-specific attributes; `id` and `timeouts` are added by the engine
    fn schema() -> SchemaBlock;

    fn to_wire(state: &ResourceState, refs: &Resolved) -> Result<Self::Wire>;

    /// Refresh `state` from the API representation. Write-only attributes
    /// and reference attributes are left untouched.
    fn from_wire(wire: &Self::Wire, state: &mut ResourceState);

    /// Extra query parameters of the create call
    fn create_query(state: &ResourceState) -> Vec<(String, String)> {
        let _ = state;
        Vec::new()
    }

    /// Cross-attribute checks beyond per-attribute validators
    fn check(config: &ResourceState) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }
}

// ============================================================================
// Shared attribute builders
// ============================================================================

pub(crate) fn name_attribute(what: &str) -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description(&format!("Name of the {}", what))
        .required()
}

pub(crate) fn description_attribute(what: &str) -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description(&format!("Description of the {}", what))
        .optional()
}

/// Reference to another object, by ID or by name
pub(crate) fn reference_attribute(kind: Kind) -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description(&format!("ID or name of the {}", kind))
        .required()
        .requires_replace()
}

pub(crate) fn optional_reference_attribute(kind: Kind) -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description(&format!("ID or name of the {}", kind))
        .optional()
        .requires_replace()
}

pub(crate) fn reference_list_attribute(kind: Kind) -> SchemaAttribute {
    SchemaAttribute::list(AttributeType::String)
        .with_description(&format!("IDs or names of {} objects", kind))
        .optional()
}

pub(crate) fn string_list_attribute(description: &str) -> SchemaAttribute {
    SchemaAttribute::list(AttributeType::String)
        .with_description(description)
        .optional()
}

/// Computed value that stays put across refreshes once known
pub(crate) fn computed_attribute(attribute: SchemaAttribute) -> SchemaAttribute {
    attribute.computed().use_state_for_unknown()
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(Managed::<Region>::new()),
        Box::new(Managed::<Zone>::new()),
        Box::new(Managed::<Host>::new()),
        Box::new(Managed::<StoragePool>::new()),
        Box::new(Managed::<StorageNfs>::new()),
        Box::new(Managed::<Template>::new()),
        Box::new(Managed::<NetGw>::new()),
        Box::new(Managed::<VNet>::new()),
        Box::new(Managed::<Subnet>::new()),
        Box::new(Managed::<Adapter>::new()),
        Box::new(Managed::<User>::new()),
        Box::new(Managed::<Team>::new()),
        Box::new(Managed::<Project>::new()),
        Box::new(Managed::<Volume>::new()),
        Box::new(Managed::<Instance>::new()),
        Box::new(Managed::<Kce>::new()),
        Box::new(Managed::<Kfs>::new()),
        Box::new(Managed::<Kgw>::new()),
        Box::new(Managed::<DnsRecord>::new()),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Round-trip helpers shared by the descriptor tests

    use super::*;

    /// Resolved references that map every candidate onto itself
    pub fn identity_refs<D: Descriptor>(state: &ResourceState) -> Resolved {
        let mut resolved = Resolved::new();
        for r in D::REFS {
            let ids = if r.many {
                state.get_string_list(r.attribute).unwrap_or_default()
            } else {
                state.get_string(r.attribute).into_iter().collect()
            };
            resolved.insert(r.attribute, ids);
        }
        resolved
    }

    /// `from_wire(to_wire(config))` must reproduce every attribute of
    /// `config` except the listed write-only ones.
    ///
    /// Refreshing a bare state must give back the same values up to list
    /// order and empty strings. Refreshing the configured state, as the
    /// engine does, must give them back exactly.
    pub fn assert_round_trip<D: Descriptor>(config: &ResourceState, write_only: &[&str]) {
        let wire = D::to_wire(config, &identity_refs::<D>(config)).unwrap();

        let mut bare = ResourceState::new();
        for r in D::REFS {
            if let Some(v) = config.get(r.attribute) {
                bare.set(r.attribute, v.clone());
            }
        }
        D::from_wire(&wire, &mut bare);

        let mut refreshed = config.clone();
        D::from_wire(&wire, &mut refreshed);

        for (key, value) in &config.values {
            if write_only.contains(&key.as_str()) {
                continue;
            }
            assert_eq!(
                canonical(bare.values.get(key).unwrap_or(&Value::Null)),
                canonical(value),
                "{}: attribute {} was not refreshed",
                D::TYPE_NAME,
                key
            );
            assert_eq!(
                refreshed.values.get(key).unwrap_or(&Value::Null),
                value,
                "{}: attribute {} did not survive the round trip",
                D::TYPE_NAME,
                key
            );
        }
    }

    fn canonical(value: &Value) -> Value {
        match value {
            Value::String(s) if s.is_empty() => Value::Null,
            Value::Array(items) => Value::from(sorted_values(items)),
            other => other.clone(),
        }
    }

    pub fn state(value: Value) -> ResourceState {
        ResourceState::from_value(&value).unwrap()
    }
}
