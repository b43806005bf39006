//! Generic CRUD engine
//!
//! Drives any [`Descriptor`] through the Terraform lifecycle. Every operation
//! holds the session lock for its whole duration: resolve references,
//! translate, call the API, translate back.

use crate::error::{ProviderError, Result};
use crate::resolver::{collection_path, query_params, resolve_refs};
use crate::resources::{Descriptor, Resource, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::session::Session;
use crate::timeouts::{self, Operation, TIMEOUTS_ATTRIBUTE};
use crate::validators::validate_block;
use async_trait::async_trait;
use kowabunga_common::models::WireObject;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

/// Schema version shared by every resource
pub const SCHEMA_VERSION: i64 = 1;

/// Resource backed by a descriptor
pub struct Managed<D> {
    _descriptor: PhantomData<fn() -> D>,
}

impl<D: Descriptor> Managed<D> {
    pub fn new() -> Self {
        Self {
            _descriptor: PhantomData,
        }
    }
}

impl<D: Descriptor> Default for Managed<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Full schema of a descriptor, including the engine-managed attributes
pub fn resource_schema<D: Descriptor>() -> ResourceSchema {
    let block = D::schema()
        .with_attribute(
            "id",
            SchemaAttribute::string()
                .with_description(&format!("{} identifier", D::KIND))
                .computed()
                .use_state_for_unknown(),
        )
        .with_attribute(TIMEOUTS_ATTRIBUTE, timeouts::schema_attribute())
        .with_description(D::DESCRIPTION);

    ResourceSchema::new(SCHEMA_VERSION, block)
}

/// Fill defaults and carry over prior values of unknown computed attributes
pub fn plan(
    block: &SchemaBlock,
    prior: Option<&ResourceState>,
    proposed: &ResourceState,
) -> ResourceState {
    let mut planned = proposed.clone();

    for (name, attr) in &block.attributes {
        if planned.get(name).is_some() {
            continue;
        }

        if let Some(default) = &attr.default {
            planned.set(name, default.clone());
        } else if attr.computed && attr.use_state_for_unknown {
            if let Some(value) = prior.and_then(|p| p.get(name)) {
                planned.set(name, value.clone());
            }
        }
    }

    for (name, nested) in &block.blocks {
        let items: Vec<Value> = planned
            .get_blocks(name)
            .iter()
            .map(|item| Value::Object(fill_defaults(&nested.block, item).to_object()))
            .collect();
        if !items.is_empty() {
            planned.set(name, Value::from(items));
        }
    }

    planned
}

/// Defaults of a nested block entry
fn fill_defaults(block: &SchemaBlock, item: &ResourceState) -> ResourceState {
    let mut filled = item.clone();
    for (name, attr) in &block.attributes {
        if let (None, Some(default)) = (filled.get(name), &attr.default) {
            filled.set(name, default.clone());
        }
    }
    filled
}

/// Attributes flagged `requires_replace` that differ between prior and planned
pub fn changed_replacing_attributes(
    block: &SchemaBlock,
    prior: &ResourceState,
    planned: &ResourceState,
) -> Vec<String> {
    let mut changed: Vec<String> = block
        .attributes
        .iter()
        .filter(|(_, attr)| attr.requires_replace)
        .filter(|(name, _)| prior.get(name) != planned.get(name))
        .map(|(name, _)| name.clone())
        .collect();
    changed.sort();
    changed
}

/// Run `fut` under the operation's ceiling
async fn with_timeout<T, F>(operation: Operation, state: &ResourceState, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let after = timeouts::timeout_for(state, operation);
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ProviderError::Timeout { operation, after })?
}

fn failure<D: Descriptor>(operation: Operation, error: &ProviderError) -> Vec<Diagnostic> {
    vec![error.to_diagnostic(&format!("Failed to {} {}", operation, D::KIND))]
}

fn require_id<D: Descriptor>(state: &ResourceState) -> ResourceResult<String> {
    state.get_string("id").ok_or_else(|| {
        vec![Diagnostic::error(&format!("{} ID is required", D::KIND))
            .with_attribute(vec!["id".to_string()])]
    })
}

/// Refreshed state: `base` updated from the API object, keyed by its ID
fn refreshed<D: Descriptor>(base: &ResourceState, id: &str, wire: &D::Wire) -> ResourceState {
    let mut state = base.clone();
    state.set("id", Value::from(wire.id().unwrap_or(id)));
    D::from_wire(wire, &mut state);
    state
}

#[async_trait]
impl<D: Descriptor> Resource for Managed<D> {
    fn type_name(&self) -> &str {
        D::TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        resource_schema::<D>()
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let schema = self.schema();
        let mut diagnostics = validate_block(&schema.block, &config.to_object(), &[]);
        diagnostics.extend(D::check(config));
        diagnostics
    }

    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        Ok(plan(&self.schema().block, current, proposed))
    }

    fn requires_replace(&self, current: &ResourceState, planned: &ResourceState) -> Vec<String> {
        changed_replacing_attributes(&self.schema().block, current, planned)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %D::KIND))]
    async fn create(
        &self,
        session: &Session,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let _guard = session.lock().await;
        let client = session.client();

        let result = with_timeout(Operation::Create, planned, async {
            let refs = resolve_refs(client, D::REFS, planned).await?;
            let wire = D::to_wire(planned, &refs)?;
            let path = collection_path(D::KIND, D::REFS, &refs)?;
            let mut query = query_params(D::REFS, &refs);
            query.extend(D::create_query(planned));

            let created: D::Wire = client.post(&path, &query, &wire).await?;
            let id = created
                .id()
                .ok_or(ProviderError::MissingId(D::KIND))?
                .to_string();
            Ok::<_, ProviderError>(refreshed::<D>(planned, &id, &created))
        })
        .await;

        match result {
            Ok(state) => {
                tracing::debug!(
                    "Created {} {}",
                    D::KIND,
                    state.get_string("id").unwrap_or_default()
                );
                Ok(state)
            }
            Err(e) => Err(failure::<D>(Operation::Create, &e)),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %D::KIND))]
    async fn read(
        &self,
        session: &Session,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let id = require_id::<D>(current)?;
        let _guard = session.lock().await;
        let client = session.client();

        let result = with_timeout(Operation::Read, current, async {
            let wire: D::Wire = client.get(&D::KIND.item_path(&id)).await?;
            Ok::<_, ProviderError>(wire)
        })
        .await;

        match result {
            Ok(wire) => Ok(refreshed::<D>(current, &id, &wire)),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} {} no longer exists", D::KIND, id);
                Ok(ResourceState::new())
            }
            Err(e) => Err(failure::<D>(Operation::Read, &e)),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %D::KIND))]
    async fn update(
        &self,
        session: &Session,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let id = require_id::<D>(current)?;
        let _guard = session.lock().await;
        let client = session.client();

        let result = with_timeout(Operation::Update, planned, async {
            let refs = resolve_refs(client, D::REFS, planned).await?;
            let wire = D::to_wire(planned, &refs)?;
            let updated: D::Wire = client.put(&D::KIND.item_path(&id), &wire).await?;
            Ok::<_, ProviderError>(refreshed::<D>(planned, &id, &updated))
        })
        .await;

        match result {
            Ok(state) => {
                tracing::debug!("Updated {} {}", D::KIND, id);
                Ok(state)
            }
            Err(e) => Err(failure::<D>(Operation::Update, &e)),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = %D::KIND))]
    async fn delete(&self, session: &Session, current: &ResourceState) -> ResourceResult<()> {
        let id = require_id::<D>(current)?;
        let _guard = session.lock().await;
        let client = session.client();

        let result = with_timeout(Operation::Delete, current, async {
            client.delete(&D::KIND.item_path(&id)).await?;
            Ok::<_, ProviderError>(())
        })
        .await;

        match result {
            Ok(()) => {
                tracing::debug!("Deleted {} {}", D::KIND, id);
                Ok(())
            }
            Err(e) => Err(failure::<D>(Operation::Delete, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{testing::state, Kgw, Zone};
    use serde_json::json;

    #[test]
    fn test_schema_adds_engine_attributes() {
        let schema = resource_schema::<Zone>();
        assert_eq!(schema.version, SCHEMA_VERSION);
        assert!(schema.block.attributes["id"].use_state_for_unknown);
        assert!(schema.block.attributes.contains_key(TIMEOUTS_ATTRIBUTE));
        assert!(schema.block.attributes["region"].requires_replace);
    }

    #[test]
    fn test_plan_keeps_known_id() {
        let block = resource_schema::<Zone>().block;
        let prior = state(json!({"id": "z-1", "region": "eu", "name": "eu-a"}));
        let proposed = state(json!({"id": null, "region": "eu", "name": "eu-b"}));

        let planned = plan(&block, Some(&prior), &proposed);
        assert_eq!(planned.get_string("id"), Some("z-1".to_string()));
        assert_eq!(planned.get_string("name"), Some("eu-b".to_string()));
    }

    #[test]
    fn test_plan_on_create_leaves_id_unknown() {
        let block = resource_schema::<Zone>().block;
        let proposed = state(json!({"region": "eu", "name": "eu-a"}));

        let planned = plan(&block, None, &proposed);
        assert_eq!(planned.get("id"), None);
    }

    #[test]
    fn test_plan_fills_defaults() {
        let block = SchemaBlock::new()
            .with_attribute("port", SchemaAttribute::number().with_default(json!(443)));
        let planned = plan(&block, None, &state(json!({"port": null})));
        assert_eq!(planned.get_i64("port"), Some(443));

        let planned = plan(&block, None, &state(json!({"port": 8443})));
        assert_eq!(planned.get_i64("port"), Some(8443));
    }

    #[test]
    fn test_plan_fills_nested_block_defaults() {
        let block = resource_schema::<Kgw>().block;
        let proposed = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "name": "gw",
            "firewall_rule": [{"ports": "22", "direction": "out"}]
        }));

        let planned = plan(&block, None, &proposed);
        let rules = planned.get_blocks("firewall_rule");
        assert_eq!(rules[0].get_string("direction"), Some("out".to_string()));
        assert_eq!(rules[0].get_string("protocol"), Some("tcp".to_string()));
        assert_eq!(rules[0].get_string("cidr"), Some("0.0.0.0/0".to_string()));
    }

    #[test]
    fn test_requires_replace_on_parent_change() {
        let block = resource_schema::<Zone>().block;
        let prior = state(json!({"id": "z-1", "region": "eu", "name": "eu-a"}));

        let renamed = state(json!({"id": "z-1", "region": "eu", "name": "eu-b"}));
        assert!(changed_replacing_attributes(&block, &prior, &renamed).is_empty());

        let moved = state(json!({"id": "z-1", "region": "us", "name": "eu-a"}));
        assert_eq!(
            changed_replacing_attributes(&block, &prior, &moved),
            vec!["region".to_string()]
        );
    }

    #[test]
    fn test_validate_reports_missing_parent() {
        let zone = Managed::<Zone>::new();
        let diags = zone.validate(&state(json!({"name": "eu-a"})));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute, Some(vec!["region".to_string()]));
    }
}
