//! Volumes, raw instances and Kowabunga Compute Engines

use super::{
    computed_attribute, description_attribute, name_attribute, optional_reference_attribute,
    reference_attribute, reference_list_attribute, Descriptor, ResourceState,
};
use crate::error::{ProviderError, Result};
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models;
use kowabunga_common::{bytes_to_gb, gb_to_bytes, Kind};
use serde_json::json;

pub const VOLUME_TYPES: &[&str] = &["os", "iso", "disk"];

/// Positive size in GB, converted to bytes
fn size_in_bytes(state: &ResourceState, key: &str) -> Result<i64> {
    match state.require_i64(key)? {
        gb if gb <= 0 => Err(ProviderError::invalid(key, "size must be a positive number of GB")),
        gb => Ok(gb_to_bytes(gb)),
    }
}

fn positive(state: &ResourceState, key: &str) -> Result<i64> {
    match state.require_i64(key)? {
        n if n <= 0 => Err(ProviderError::invalid(key, "value must be positive")),
        n => Ok(n),
    }
}

fn size_attribute(description: &str) -> SchemaAttribute {
    SchemaAttribute::number()
        .with_description(description)
        .required()
}

pub struct Volume;

impl Descriptor for Volume {
    type Wire = models::Volume;

    const TYPE_NAME: &'static str = "kowabunga_volume";
    const KIND: Kind = Kind::Volume;
    const DESCRIPTION: &'static str = "Manages a block storage volume";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::query("pool", Kind::StoragePool, "poolId"),
        ParentRef::query("template", Kind::Template, "templateId"),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("pool", optional_reference_attribute(Kind::StoragePool))
            .with_attribute("template", optional_reference_attribute(Kind::Template))
            .with_attribute("name", name_attribute("volume"))
            .with_attribute("desc", description_attribute("volume"))
            .with_attribute(
                "type",
                SchemaAttribute::string()
                    .with_description("Volume type (os, iso or disk)")
                    .with_default(json!("disk"))
                    .requires_replace()
                    .validate(Validator::OneOf(VOLUME_TYPES)),
            )
            .with_attribute("size", size_attribute("Volume size in GB"))
            .with_attribute(
                "resizable",
                SchemaAttribute::bool()
                    .with_description("Whether the volume can be grown later")
                    .with_default(json!(false)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Volume {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            volume_type: state.get_string("type").unwrap_or_else(|| "disk".to_string()),
            size: size_in_bytes(state, "size")?,
            resizable: state.get_bool("resizable").unwrap_or(false),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("type", json!(wire.volume_type));
        state.set("size", json!(bytes_to_gb(wire.size)));
        state.set("resizable", json!(wire.resizable));
    }
}

pub struct Instance;

impl Descriptor for Instance {
    type Wire = models::Instance;

    const TYPE_NAME: &'static str = "kowabunga_instance";
    const KIND: Kind = Kind::Instance;
    const DESCRIPTION: &'static str = "Manages a raw virtual machine instance";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::body_list("adapters", Kind::Adapter),
        ParentRef::body_list("volumes", Kind::Volume),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("name", name_attribute("instance"))
            .with_attribute("desc", description_attribute("instance"))
            .with_attribute(
                "vcpus",
                SchemaAttribute::number()
                    .with_description("Number of virtual CPUs")
                    .required(),
            )
            .with_attribute("memory", size_attribute("Memory size in GB"))
            .with_attribute("adapters", reference_list_attribute(Kind::Adapter))
            .with_attribute("volumes", reference_list_attribute(Kind::Volume))
    }

    fn to_wire(state: &ResourceState, refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Instance {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            vcpus: positive(state, "vcpus")?,
            memory: size_in_bytes(state, "memory")?,
            // attach order is boot and NIC order, keep it as configured
            adapters: refs.ids("adapters"),
            volumes: refs.ids("volumes"),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("vcpus", json!(wire.vcpus));
        state.set("memory", json!(bytes_to_gb(wire.memory)));
    }
}

pub struct Kce;

impl Descriptor for Kce {
    type Wire = models::Kce;

    const TYPE_NAME: &'static str = "kowabunga_kce";
    const KIND: Kind = Kind::Kce;
    const DESCRIPTION: &'static str = "Manages a Kowabunga Compute Engine virtual machine";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::query("pool", Kind::StoragePool, "poolId"),
        ParentRef::query("template", Kind::Template, "templateId"),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("pool", optional_reference_attribute(Kind::StoragePool))
            .with_attribute("template", optional_reference_attribute(Kind::Template))
            .with_attribute("name", name_attribute("KCE"))
            .with_attribute("desc", description_attribute("KCE"))
            .with_attribute(
                "vcpus",
                SchemaAttribute::number()
                    .with_description("Number of virtual CPUs")
                    .required(),
            )
            .with_attribute("memory", size_attribute("Memory size in GB"))
            .with_attribute("disk", size_attribute("OS disk size in GB"))
            .with_attribute(
                "extra_disk",
                SchemaAttribute::number()
                    .with_description("Data disk size in GB, 0 for none")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "public",
                SchemaAttribute::bool()
                    .with_description("Whether to expose the instance on a public address")
                    .with_default(json!(false))
                    .requires_replace(),
            )
            .with_attribute(
                "ip",
                computed_attribute(
                    SchemaAttribute::string().with_description("Private IPv4 address"),
                ),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        let extra_disk = state.get_i64("extra_disk").unwrap_or(0);
        if extra_disk < 0 {
            return Err(ProviderError::invalid("extra_disk", "size must not be negative"));
        }

        Ok(models::Kce {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            vcpus: positive(state, "vcpus")?,
            memory: size_in_bytes(state, "memory")?,
            disk: size_in_bytes(state, "disk")?,
            data_disk: gb_to_bytes(extra_disk),
            ip: None,
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("vcpus", json!(wire.vcpus));
        state.set("memory", json!(bytes_to_gb(wire.memory)));
        state.set("disk", json!(bytes_to_gb(wire.disk)));
        state.set("extra_disk", json!(bytes_to_gb(wire.data_disk)));
        state.set_opt_string("ip", wire.ip.as_deref());
    }

    fn create_query(state: &ResourceState) -> Vec<(String, String)> {
        let public = state.get_bool("public").unwrap_or(false);
        vec![("public".to_string(), public.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{assert_round_trip, state};
    use kowabunga_common::GB;

    #[test]
    fn test_volume_round_trip() {
        let config = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "pool": "ssd",
            "template": "ubuntu-24.04",
            "name": "web-os",
            "desc": null,
            "type": "os",
            "size": 20,
            "resizable": true
        }));
        assert_round_trip::<Volume>(&config, &[]);

        let wire = Volume::to_wire(&config, &Resolved::new()).unwrap();
        assert_eq!(wire.size, 20 * GB);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["type"], "os");
    }

    #[test]
    fn test_volume_rejects_empty_size() {
        let config = state(json!({"project": "p", "zone": "z", "name": "v", "size": 0}));
        assert!(Volume::to_wire(&config, &Resolved::new()).is_err());
    }

    #[test]
    fn test_volume_type_change_forces_replacement() {
        assert!(Volume::schema().attributes["type"].requires_replace);
        assert!(!Volume::schema().attributes["size"].requires_replace);
    }

    #[test]
    fn test_instance_round_trip_keeps_attach_order() {
        let config = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "name": "web",
            "desc": "Web server",
            "vcpus": 2,
            "memory": 4,
            "adapters": ["eth1", "eth0"],
            "volumes": ["web-os", "web-data"]
        }));
        assert_round_trip::<Instance>(&config, &[]);

        let mut refs = Resolved::new();
        refs.insert("adapters", vec!["a-2".to_string(), "a-1".to_string()]);
        let wire = Instance::to_wire(&config, &refs).unwrap();
        assert_eq!(wire.adapters, vec!["a-2".to_string(), "a-1".to_string()]);
        assert_eq!(wire.memory, 4 * GB);
    }

    #[test]
    fn test_kce_round_trip() {
        let config = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "pool": null,
            "template": null,
            "name": "db",
            "desc": null,
            "vcpus": 4,
            "memory": 8,
            "disk": 32,
            "extra_disk": 100,
            "public": false
        }));
        assert_round_trip::<Kce>(&config, &["public"]);
    }

    #[test]
    fn test_kce_computed_ip_and_public_query() {
        let wire = models::Kce {
            id: Some("kce-1".to_string()),
            name: "db".to_string(),
            vcpus: 2,
            memory: 2 * GB,
            disk: 16 * GB,
            ip: Some("10.0.0.42".to_string()),
            ..Default::default()
        };
        let mut refreshed = ResourceState::new();
        Kce::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.get_string("ip"), Some("10.0.0.42".to_string()));
        assert_eq!(refreshed.get_i64("extra_disk"), Some(0));

        let query = Kce::create_query(&state(json!({"public": true})));
        assert_eq!(query, vec![("public".to_string(), "true".to_string())]);
    }
}
