//! Ceph storage pools, NFS backends and OS templates

use super::{
    description_attribute, name_attribute, optional_reference_attribute, reference_attribute,
    Descriptor, ResourceState,
};
use crate::error::Result;
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{AttributeType, SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models::{self, Cost};
use kowabunga_common::Kind;
use serde_json::{json, Value};

pub const TEMPLATE_OS: &[&str] = &["linux", "windows"];

pub struct StoragePool;

impl Descriptor for StoragePool {
    type Wire = models::StoragePool;

    const TYPE_NAME: &'static str = "kowabunga_storage_pool";
    const KIND: Kind = Kind::StoragePool;
    const DESCRIPTION: &'static str = "Manages a Ceph RBD storage pool";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::query("host", Kind::Host, "hostId"),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("host", optional_reference_attribute(Kind::Host))
            .with_attribute("name", name_attribute("storage pool"))
            .with_attribute("desc", description_attribute("storage pool"))
            .with_attribute(
                "pool",
                SchemaAttribute::string()
                    .with_description("Ceph RBD pool name")
                    .required(),
            )
            .with_attribute(
                "address",
                SchemaAttribute::string()
                    .with_description("Ceph monitor address")
                    .with_default(json!("localhost")),
            )
            .with_attribute(
                "port",
                SchemaAttribute::number()
                    .with_description("Ceph monitor port")
                    .with_default(json!(3300)),
            )
            .with_attribute(
                "secret_uuid",
                SchemaAttribute::string()
                    .with_description("libvirt secret UUID holding the Ceph key")
                    .optional(),
            )
            .with_attribute(
                "price",
                SchemaAttribute::number()
                    .with_description("Monthly cost of the pool")
                    .with_default(json!(0.0)),
            )
            .with_attribute(
                "currency",
                SchemaAttribute::string()
                    .with_description("Currency of the price")
                    .with_default(json!("EUR")),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::StoragePool {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            pool: state.require_string("pool")?,
            address: state.get_string("address").unwrap_or_else(|| "localhost".to_string()),
            port: state.get_i64("port").unwrap_or(3300),
            secret_uuid: state.get_string("secret_uuid"),
            cost: Cost {
                price: state.get_f64("price").unwrap_or_default(),
                currency: state.get_string("currency").unwrap_or_else(|| "EUR".to_string()),
            },
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("pool", json!(wire.pool));
        state.set("address", json!(wire.address));
        state.set("port", json!(wire.port));
        state.set_opt_string("secret_uuid", wire.secret_uuid.as_deref());
        state.set("price", Value::from(wire.cost.price));
        state.set("currency", json!(wire.cost.currency));
    }
}

pub struct StorageNfs;

impl Descriptor for StorageNfs {
    type Wire = models::StorageNfs;

    const TYPE_NAME: &'static str = "kowabunga_storage_nfs";
    const KIND: Kind = Kind::StorageNfs;
    const DESCRIPTION: &'static str = "Manages a CephFS-backed NFS storage";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("zone", Kind::Zone)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("name", name_attribute("NFS storage"))
            .with_attribute("desc", description_attribute("NFS storage"))
            .with_attribute(
                "endpoint",
                SchemaAttribute::string()
                    .with_description("NFS endpoint FQDN")
                    .required(),
            )
            .with_attribute(
                "fs",
                SchemaAttribute::string()
                    .with_description("CephFS filesystem name")
                    .with_default(json!("nfs")),
            )
            .with_attribute(
                "backends",
                SchemaAttribute::list(AttributeType::String)
                    .with_description("IPv4 addresses of the Ganesha backends")
                    .required()
                    .validate(Validator::Ipv4),
            )
            .with_attribute(
                "port",
                SchemaAttribute::number()
                    .with_description("NFS port")
                    .with_default(json!(2049)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::StorageNfs {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            endpoint: state.require_string("endpoint")?,
            fs: state.get_string("fs").unwrap_or_else(|| "nfs".to_string()),
            backends: state.get_string_list("backends").unwrap_or_default(),
            port: state.get_i64("port").unwrap_or(2049),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("endpoint", json!(wire.endpoint));
        state.set("fs", json!(wire.fs));
        state.set_unordered_list("backends", &wire.backends);
        state.set("port", json!(wire.port));
    }
}

pub struct Template;

impl Descriptor for Template {
    type Wire = models::Template;

    const TYPE_NAME: &'static str = "kowabunga_template";
    const KIND: Kind = Kind::Template;
    const DESCRIPTION: &'static str = "Manages an OS image template";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("pool", Kind::StoragePool)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("pool", reference_attribute(Kind::StoragePool))
            .with_attribute("name", name_attribute("template"))
            .with_attribute("desc", description_attribute("template"))
            .with_attribute(
                "os",
                SchemaAttribute::string()
                    .with_description("Operating system family (linux or windows)")
                    .with_default(json!("linux"))
                    .validate(Validator::OneOf(TEMPLATE_OS)),
            )
            .with_attribute(
                "source",
                SchemaAttribute::string()
                    .with_description("URL of the image to import")
                    .required()
                    .requires_replace(),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Template {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            os: state.get_string("os").unwrap_or_else(|| "linux".to_string()),
            source: state.require_string("source")?,
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("os", json!(wire.os));
        state.set("source", json!(wire.source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{assert_round_trip, state};

    #[test]
    fn test_storage_pool_round_trip() {
        let config = state(json!({
            "zone": "eu-west-a",
            "host": "kvm-01",
            "name": "ssd",
            "desc": "Fast pool",
            "pool": "rbd-ssd",
            "address": "10.50.0.2",
            "port": 3300,
            "secret_uuid": "e3f1c7a2-6d1b-4c55-9a3e-2b8f4c1d9e77",
            "price": 99.9,
            "currency": "USD"
        }));
        assert_round_trip::<StoragePool>(&config, &[]);
    }

    #[test]
    fn test_storage_nfs_round_trip_sorts_backends() {
        let config = state(json!({
            "zone": "eu-west-a",
            "name": "shared",
            "desc": "",
            "endpoint": "nfs.eu-west-a.example.com",
            "fs": "nfs",
            "backends": ["10.50.0.4", "10.50.0.3"],
            "port": 2049
        }));
        assert_round_trip::<StorageNfs>(&config, &[]);

        let mut wire = StorageNfs::to_wire(&config, &Resolved::new()).unwrap();
        wire.backends.reverse();
        let mut refreshed = ResourceState::new();
        StorageNfs::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["backends"], json!(["10.50.0.3", "10.50.0.4"]));
    }

    #[test]
    fn test_template_round_trip() {
        let config = state(json!({
            "pool": "ssd",
            "name": "ubuntu-24.04",
            "desc": "Ubuntu Noble",
            "os": "linux",
            "source": "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img"
        }));
        assert_round_trip::<Template>(&config, &[]);
    }
}
