//! Projects: tenants owning instances, volumes and services

use super::{
    computed_attribute, description_attribute, name_attribute, reference_list_attribute,
    string_list_attribute, Descriptor, ResourceState,
};
use crate::error::{ProviderError, Result};
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{AttributeType, Diagnostic, SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models::{self, Metadata, Quotas};
use kowabunga_common::{bytes_to_gb, gb_to_bytes, Kind};
use serde_json::json;

/// Default prefix length of the private subnet carved out per region
pub const DEFAULT_SUBNET_SIZE: i64 = 26;

pub struct Project;

fn quota(state: &ResourceState, key: &str) -> Result<i64> {
    match state.get_i64(key).unwrap_or(0) {
        q if q < 0 => Err(ProviderError::invalid(key, "quota must not be negative")),
        q => Ok(q),
    }
}

impl Descriptor for Project {
    type Wire = models::Project;

    const TYPE_NAME: &'static str = "kowabunga_project";
    const KIND: Kind = Kind::Project;
    const DESCRIPTION: &'static str = "Manages a Kowabunga project";
    const REFS: &'static [ParentRef] = &[
        ParentRef::body_list("teams", Kind::Team),
        ParentRef::body_list("regions", Kind::Region),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("name", name_attribute("project"))
            .with_attribute("desc", description_attribute("project"))
            .with_attribute(
                "owner",
                SchemaAttribute::string()
                    .with_description("Project owner")
                    .optional(),
            )
            .with_attribute(
                "email",
                SchemaAttribute::string()
                    .with_description("Contact email address")
                    .optional()
                    .validate(Validator::Email),
            )
            .with_attribute(
                "domain",
                SchemaAttribute::string()
                    .with_description("Internal DNS domain of the project")
                    .optional(),
            )
            .with_attribute(
                "subnet_size",
                SchemaAttribute::number()
                    .with_description("Prefix length of the private subnet allocated per region")
                    .with_default(json!(DEFAULT_SUBNET_SIZE))
                    .requires_replace(),
            )
            .with_attribute(
                "root_password",
                SchemaAttribute::string()
                    .with_description("Root password set on project instances")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "bootstrap_user",
                SchemaAttribute::string()
                    .with_description("Administrative user created on project instances")
                    .optional(),
            )
            .with_attribute(
                "bootstrap_pubkey",
                SchemaAttribute::string()
                    .with_description("SSH public key of the bootstrap user")
                    .optional(),
            )
            .with_attribute("teams", reference_list_attribute(Kind::Team))
            .with_attribute("regions", reference_list_attribute(Kind::Region))
            .with_attribute("tags", string_list_attribute("Project tags"))
            .with_attribute(
                "metadata",
                SchemaAttribute::map(AttributeType::String)
                    .with_description("Free-form key/value metadata")
                    .optional(),
            )
            .with_attribute(
                "max_vcpus",
                SchemaAttribute::number()
                    .with_description("vCPU quota, 0 for unlimited")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "max_memory",
                SchemaAttribute::number()
                    .with_description("Memory quota in GB, 0 for unlimited")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "max_storage",
                SchemaAttribute::number()
                    .with_description("Storage quota in GB, 0 for unlimited")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "max_instances",
                SchemaAttribute::number()
                    .with_description("Instance quota, 0 for unlimited")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "private_subnets",
                computed_attribute(
                    SchemaAttribute::map(AttributeType::String)
                        .with_description("Private subnet ID allocated in each region"),
                ),
            )
    }

    fn to_wire(state: &ResourceState, refs: &Resolved) -> Result<Self::Wire> {
        let metadatas = state
            .get_string_map("metadata")
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| Metadata { key, value })
            .collect();

        Ok(models::Project {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            owner: state.get_string("owner"),
            email: state.get_string("email"),
            domain: state.get_string("domain"),
            root_password: state.get_string("root_password"),
            bootstrap_user: state.get_string("bootstrap_user"),
            bootstrap_pubkey: state.get_string("bootstrap_pubkey"),
            teams: refs.ids("teams"),
            regions: refs.ids("regions"),
            tags: state.get_string_list("tags").unwrap_or_default(),
            metadatas,
            quotas: Quotas {
                vcpus: quota(state, "max_vcpus")?,
                memory: gb_to_bytes(quota(state, "max_memory")?),
                storage: gb_to_bytes(quota(state, "max_storage")?),
                instances: quota(state, "max_instances")?,
            },
            private_subnets: Vec::new(),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set_opt_string("owner", wire.owner.as_deref());
        state.set_opt_string("email", wire.email.as_deref());
        state.set_opt_string("domain", wire.domain.as_deref());
        state.set_opt_string("bootstrap_user", wire.bootstrap_user.as_deref());
        state.set_opt_string("bootstrap_pubkey", wire.bootstrap_pubkey.as_deref());
        state.set_unordered_list("tags", &wire.tags);
        state.set_string_map(
            "metadata",
            wire.metadatas
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        );
        state.set("max_vcpus", json!(wire.quotas.vcpus));
        state.set("max_memory", json!(bytes_to_gb(wire.quotas.memory)));
        state.set("max_storage", json!(bytes_to_gb(wire.quotas.storage)));
        state.set("max_instances", json!(wire.quotas.instances));
        state.set_string_map(
            "private_subnets",
            wire.private_subnets
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        );
    }

    fn create_query(state: &ResourceState) -> Vec<(String, String)> {
        let size = state.get_i64("subnet_size").unwrap_or(DEFAULT_SUBNET_SIZE);
        vec![("subnetSize".to_string(), size.to_string())]
    }

    fn check(config: &ResourceState) -> Vec<Diagnostic> {
        match config.get_i64("subnet_size") {
            Some(size) if !(8..=30).contains(&size) => vec![Diagnostic::error(
                "Invalid attribute value",
            )
            .with_detail("subnet_size must be a prefix length within 8-30")
            .with_attribute(vec!["subnet_size".to_string()])],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{assert_round_trip, state};
    use kowabunga_common::GB;

    fn acme() -> ResourceState {
        state(json!({
            "name": "acme",
            "desc": "ACME Corp.",
            "owner": "acme",
            "email": "ops@acme.example.com",
            "domain": "acme.internal",
            "subnet_size": 26,
            "root_password": "hunter2",
            "bootstrap_user": "kowabunga",
            "bootstrap_pubkey": "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample",
            "teams": ["ops"],
            "regions": ["eu-west"],
            "tags": ["web", "prod"],
            "metadata": {"cost-center": "42", "owner": "ops"},
            "max_vcpus": 64,
            "max_memory": 128,
            "max_storage": 1024,
            "max_instances": 20
        }))
    }

    #[test]
    fn test_project_round_trip() {
        assert_round_trip::<Project>(&acme(), &["root_password", "subnet_size"]);
    }

    #[test]
    fn test_project_quotas_are_sent_in_bytes() {
        let wire = Project::to_wire(&acme(), &Resolved::new()).unwrap();
        assert_eq!(wire.quotas.memory, 128 * GB);
        assert_eq!(wire.quotas.storage, 1024 * GB);
        assert_eq!(wire.metadatas[0].key, "cost-center");
    }

    #[test]
    fn test_project_rejects_negative_quota() {
        let mut config = acme();
        config.set("max_vcpus", json!(-1));
        assert!(Project::to_wire(&config, &Resolved::new()).is_err());
    }

    #[test]
    fn test_project_subnet_size_query() {
        assert_eq!(
            Project::create_query(&acme()),
            vec![("subnetSize".to_string(), "26".to_string())]
        );
        assert_eq!(
            Project::check(&state(json!({"subnet_size": 31})))[0].attribute,
            Some(vec!["subnet_size".to_string()])
        );
    }

    #[test]
    fn test_project_private_subnets_are_computed() {
        let wire = models::Project {
            name: "acme".to_string(),
            private_subnets: vec![Metadata {
                key: "eu-west".to_string(),
                value: "sn-1".to_string(),
            }],
            ..Default::default()
        };

        let mut refreshed = ResourceState::new();
        Project::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["private_subnets"], json!({"eu-west": "sn-1"}));
        assert_eq!(refreshed.values["metadata"], serde_json::Value::Null);
    }
}
