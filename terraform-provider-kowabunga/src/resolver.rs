//! Name-or-ID resolution of references to other Kowabunga objects

use crate::client::KowabungaClient;
use crate::error::{ProviderError, Result};
use crate::resources::ResourceState;
use kowabunga_common::models::{Named, WireObject};
use kowabunga_common::Kind;
use std::collections::HashMap;

/// Resolve `candidate`, an ID or a name, to the ID of an existing object.
///
/// A direct fetch by ID is tried first. Otherwise every object of `kind` is
/// fetched in listing order and the first whose name matches exactly wins.
/// Duplicate names are not detected.
#[tracing::instrument(level = "debug", skip(client))]
pub async fn resolve(client: &KowabungaClient, kind: Kind, candidate: &str) -> Result<String> {
    let direct = kind.item_path(&urlencoding::encode(candidate));
    if let Ok(object) = client.get::<Named>(&direct).await {
        return Ok(object.id().unwrap_or(candidate).to_string());
    }

    tracing::warn!("'{}' is not a {} ID, looking it up by name", candidate, kind);

    for id in client.list(kind).await? {
        let object: Named = match client.get(&kind.item_path(&id)).await {
            Ok(object) => object,
            Err(e) => {
                tracing::debug!("Skipping {} {}: {}", kind, id, e);
                continue;
            }
        };

        if object.name() == candidate {
            return Ok(object.id().map(str::to_string).unwrap_or(id));
        }
    }

    Err(ProviderError::Unknown(kind))
}

/// Where a resolved reference goes in the API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Path segment of the parent collection (`/zone/{id}/vnet`)
    Scope,
    /// Query parameter of the create call
    Query(&'static str),
    /// Field of the request body, filled in by the resource's translator
    Body,
}

/// Attribute of a resource naming another object by ID or name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub attribute: &'static str,
    pub kind: Kind,
    pub placement: Placement,
    /// The attribute is a list of references
    pub many: bool,
}

impl ParentRef {
    pub const fn scope(attribute: &'static str, kind: Kind) -> Self {
        Self {
            attribute,
            kind,
            placement: Placement::Scope,
            many: false,
        }
    }

    pub const fn query(attribute: &'static str, kind: Kind, param: &'static str) -> Self {
        Self {
            attribute,
            kind,
            placement: Placement::Query(param),
            many: false,
        }
    }

    pub const fn body(attribute: &'static str, kind: Kind) -> Self {
        Self {
            attribute,
            kind,
            placement: Placement::Body,
            many: false,
        }
    }

    pub const fn body_list(attribute: &'static str, kind: Kind) -> Self {
        Self {
            attribute,
            kind,
            placement: Placement::Body,
            many: true,
        }
    }
}

/// IDs resolved for the references of one resource instance
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    ids: HashMap<&'static str, Vec<String>>,
}

impl Resolved {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: &'static str, ids: Vec<String>) {
        self.ids.insert(attribute, ids);
    }

    /// Resolved ID of a single reference
    pub fn id(&self, attribute: &str) -> Option<&str> {
        self.ids
            .get(attribute)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    /// Resolved IDs of a list reference, in configuration order
    pub fn ids(&self, attribute: &str) -> Vec<String> {
        self.ids.get(attribute).cloned().unwrap_or_default()
    }
}

/// Resolve every reference attribute set in `state`.
///
/// Scope references are mandatory; the others are skipped when unset.
pub async fn resolve_refs(
    client: &KowabungaClient,
    refs: &[ParentRef],
    state: &ResourceState,
) -> Result<Resolved> {
    let mut resolved = Resolved::new();

    for r in refs {
        if r.many {
            let mut ids = Vec::new();
            for candidate in state.get_string_list(r.attribute).unwrap_or_default() {
                ids.push(resolve(client, r.kind, &candidate).await?);
            }
            resolved.insert(r.attribute, ids);
            continue;
        }

        match state.get_string(r.attribute) {
            Some(candidate) => {
                let id = resolve(client, r.kind, &candidate).await?;
                resolved.insert(r.attribute, vec![id]);
            }
            None if r.placement == Placement::Scope => {
                return Err(ProviderError::MissingAttribute(r.attribute.to_string()));
            }
            None => {}
        }
    }

    Ok(resolved)
}

/// Collection path for creating a `kind` object under its scope references
pub fn collection_path(kind: Kind, refs: &[ParentRef], resolved: &Resolved) -> Result<String> {
    let mut path = String::new();

    for r in refs.iter().filter(|r| r.placement == Placement::Scope) {
        let id = resolved
            .id(r.attribute)
            .ok_or_else(|| ProviderError::MissingAttribute(r.attribute.to_string()))?;
        path.push_str(&r.kind.item_path(id));
    }

    path.push_str(&kind.list_path());
    Ok(path)
}

/// Query parameters carrying resolved references
pub fn query_params(refs: &[ParentRef], resolved: &Resolved) -> Vec<(String, String)> {
    refs.iter()
        .filter_map(|r| match r.placement {
            Placement::Query(param) => resolved
                .id(r.attribute)
                .map(|id| (param.to_string(), id.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE_REFS: &[ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::body_list("adapters", Kind::Adapter),
    ];

    const VOLUME_REFS: &[ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::query("pool", Kind::StoragePool, "poolId"),
        ParentRef::query("template", Kind::Template, "templateId"),
    ];

    #[test]
    fn test_collection_path() {
        let mut resolved = Resolved::new();
        resolved.insert("project", vec!["p-1".to_string()]);
        resolved.insert("zone", vec!["z-1".to_string()]);

        assert_eq!(
            collection_path(Kind::Instance, INSTANCE_REFS, &resolved).unwrap(),
            "/project/p-1/zone/z-1/instance"
        );
        assert_eq!(
            collection_path(Kind::Region, &[], &resolved).unwrap(),
            "/region"
        );
    }

    #[test]
    fn test_collection_path_requires_scope() {
        let resolved = Resolved::new();
        let err = collection_path(Kind::Instance, INSTANCE_REFS, &resolved).unwrap_err();
        assert!(matches!(err, ProviderError::MissingAttribute(attr) if attr == "project"));
    }

    #[test]
    fn test_query_params_skip_unset() {
        let mut resolved = Resolved::new();
        resolved.insert("pool", vec!["pool-1".to_string()]);

        assert_eq!(
            query_params(VOLUME_REFS, &resolved),
            vec![("poolId".to_string(), "pool-1".to_string())]
        );
    }

    #[test]
    fn test_resolved_lists() {
        let mut resolved = Resolved::new();
        resolved.insert("adapters", vec!["a-1".to_string(), "a-2".to_string()]);

        assert_eq!(resolved.id("adapters"), Some("a-1"));
        assert_eq!(resolved.ids("adapters").len(), 2);
        assert!(resolved.ids("volumes").is_empty());
    }
}
