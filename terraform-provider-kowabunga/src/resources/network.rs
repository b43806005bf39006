//! Network gateways, virtual networks, subnets and adapters

use super::{
    computed_attribute, description_attribute, name_attribute, reference_attribute,
    string_list_attribute, Descriptor, ResourceState,
};
use crate::error::{ProviderError, Result};
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{AttributeType, Diagnostic, SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models;
use kowabunga_common::net::{self, IpRange};
use kowabunga_common::Kind;
use serde_json::json;

pub const SUBNET_APPLICATIONS: &[&str] = &["user", "ceph"];

pub struct NetGw;

impl Descriptor for NetGw {
    type Wire = models::NetGw;

    const TYPE_NAME: &'static str = "kowabunga_netgw";
    const KIND: Kind = Kind::NetGw;
    const DESCRIPTION: &'static str = "Manages a zone network gateway";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("zone", Kind::Zone)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("name", name_attribute("network gateway"))
            .with_attribute("desc", description_attribute("network gateway"))
            .with_attribute(
                "address",
                SchemaAttribute::string()
                    .with_description("IPv4 address of the gateway API")
                    .required()
                    .validate(Validator::Ipv4),
            )
            .with_attribute(
                "port",
                SchemaAttribute::number()
                    .with_description("Port of the gateway API")
                    .with_default(json!(8080)),
            )
            .with_attribute(
                "token",
                SchemaAttribute::string()
                    .with_description("Gateway API token")
                    .optional()
                    .sensitive(),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::NetGw {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            address: state.require_string("address")?,
            port: state.get_i64("port").unwrap_or(8080),
            token: state.get_string("token"),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("address", json!(wire.address));
        state.set("port", json!(wire.port));
    }
}

pub struct VNet;

impl Descriptor for VNet {
    type Wire = models::VNet;

    const TYPE_NAME: &'static str = "kowabunga_vnet";
    const KIND: Kind = Kind::VNet;
    const DESCRIPTION: &'static str = "Manages a virtual network (VLAN)";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("zone", Kind::Zone)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("name", name_attribute("virtual network"))
            .with_attribute("desc", description_attribute("virtual network"))
            .with_attribute(
                "vlan",
                SchemaAttribute::number()
                    .with_description("VLAN ID, 0 for untagged")
                    .with_default(json!(0)),
            )
            .with_attribute(
                "interface",
                SchemaAttribute::string()
                    .with_description("Host bridge interface")
                    .required(),
            )
            .with_attribute(
                "private",
                SchemaAttribute::bool()
                    .with_description("Whether the network is private")
                    .with_default(json!(true)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        let vlan = state.get_i64("vlan").unwrap_or(0);
        if !(0..=4094).contains(&vlan) {
            return Err(ProviderError::invalid("vlan", "VLAN ID must be within 0-4094"));
        }

        Ok(models::VNet {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            vlan,
            interface: state.require_string("interface")?,
            private: state.get_bool("private").unwrap_or(true),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("vlan", json!(wire.vlan));
        state.set("interface", json!(wire.interface));
        state.set("private", json!(wire.private));
    }

    fn check(config: &ResourceState) -> Vec<Diagnostic> {
        match config.get_i64("vlan") {
            Some(vlan) if !(0..=4094).contains(&vlan) => vec![Diagnostic::error(
                "Invalid attribute value",
            )
            .with_detail("VLAN ID must be within 0-4094")
            .with_attribute(vec!["vlan".to_string()])],
            _ => Vec::new(),
        }
    }
}

pub struct Subnet;

fn parse_ranges(state: &ResourceState, key: &str) -> Result<Vec<IpRange>> {
    state
        .get_string_list(key)
        .unwrap_or_default()
        .iter()
        .map(|r| {
            r.parse::<IpRange>()
                .map_err(|e| ProviderError::invalid(key, e.to_string()))
        })
        .collect()
}

impl Descriptor for Subnet {
    type Wire = models::Subnet;

    const TYPE_NAME: &'static str = "kowabunga_subnet";
    const KIND: Kind = Kind::Subnet;
    const DESCRIPTION: &'static str = "Manages an IPv4 subnet of a virtual network";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("vnet", Kind::VNet)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("vnet", reference_attribute(Kind::VNet))
            .with_attribute("name", name_attribute("subnet"))
            .with_attribute("desc", description_attribute("subnet"))
            .with_attribute(
                "cidr",
                SchemaAttribute::string()
                    .with_description("Network address in CIDR notation")
                    .required()
                    .requires_replace()
                    .validate(Validator::Cidr),
            )
            .with_attribute(
                "gateway",
                SchemaAttribute::string()
                    .with_description("Default gateway address")
                    .required()
                    .validate(Validator::Ipv4),
            )
            .with_attribute(
                "dns",
                SchemaAttribute::string()
                    .with_description("DNS server address")
                    .optional()
                    .validate(Validator::Ipv4),
            )
            .with_attribute(
                "reserved",
                string_list_attribute("Address ranges excluded from allocation (first-last)")
                    .validate(Validator::IpRange),
            )
            .with_attribute(
                "gw_pool",
                string_list_attribute("Address ranges used by gateways (first-last)")
                    .validate(Validator::IpRange),
            )
            .with_attribute(
                "routes",
                string_list_attribute("Extra routes pushed to instances, in CIDR notation")
                    .validate(Validator::Cidr),
            )
            .with_attribute(
                "application",
                SchemaAttribute::string()
                    .with_description("Subnet usage (user or ceph)")
                    .with_default(json!("user"))
                    .validate(Validator::OneOf(SUBNET_APPLICATIONS)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Subnet {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            cidr: state.require_string("cidr")?,
            gateway: state.require_string("gateway")?,
            dns: state.get_string("dns"),
            reserved: parse_ranges(state, "reserved")?,
            gw_pool: parse_ranges(state, "gw_pool")?,
            routes: state.get_string_list("routes").unwrap_or_default(),
            application: state.get_string("application"),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        let ranges = |ranges: &[IpRange]| -> Vec<String> {
            ranges.iter().map(IpRange::to_string).collect()
        };

        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("cidr", json!(wire.cidr));
        state.set("gateway", json!(wire.gateway));
        state.set_opt_string("dns", wire.dns.as_deref());
        state.set_unordered_list("reserved", &ranges(&wire.reserved));
        state.set_unordered_list("gw_pool", &ranges(&wire.gw_pool));
        state.set_unordered_list("routes", &wire.routes);
        state.set("application", json!(wire.application.as_deref().unwrap_or("user")));
    }

    fn check(config: &ResourceState) -> Vec<Diagnostic> {
        let (Some(cidr), Some(gateway)) = (config.get_string("cidr"), config.get_string("gateway"))
        else {
            return Vec::new();
        };
        let Ok(gateway_addr) = net::parse_ipv4(&gateway) else {
            return Vec::new();
        };

        match net::cidr_contains(&cidr, gateway_addr) {
            Ok(false) => vec![Diagnostic::error("Invalid attribute value")
                .with_detail(&format!("Gateway {} is outside of {}", gateway, cidr))
                .with_attribute(vec!["gateway".to_string()])],
            _ => Vec::new(),
        }
    }
}

pub struct Adapter;

impl Descriptor for Adapter {
    type Wire = models::Adapter;

    const TYPE_NAME: &'static str = "kowabunga_adapter";
    const KIND: Kind = Kind::Adapter;
    const DESCRIPTION: &'static str = "Manages a virtual network adapter";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("subnet", Kind::Subnet)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("subnet", reference_attribute(Kind::Subnet))
            .with_attribute("name", name_attribute("adapter"))
            .with_attribute("desc", description_attribute("adapter"))
            .with_attribute(
                "mac",
                computed_attribute(
                    SchemaAttribute::string()
                        .with_description("Hardware address, generated when unset")
                        .optional()
                        .validate(Validator::MacAddress),
                ),
            )
            .with_attribute(
                "addresses",
                computed_attribute(
                    SchemaAttribute::list(AttributeType::String)
                        .with_description("IPv4 addresses, allocated when unset")
                        .optional()
                        .validate(Validator::Ipv4),
                ),
            )
            .with_attribute(
                "assign",
                SchemaAttribute::bool()
                    .with_description("Whether to allocate an address automatically")
                    .with_default(json!(true)),
            )
            .with_attribute(
                "reserved",
                SchemaAttribute::bool()
                    .with_description("Whether the adapter is reserved for platform use")
                    .with_default(json!(false)),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Adapter {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            mac: state.get_string("mac"),
            addresses: state.get_string_list("addresses").unwrap_or_default(),
            assign: state.get_bool("assign").unwrap_or(true),
            reserved: state.get_bool("reserved").unwrap_or(false),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set_opt_string("mac", wire.mac.as_deref());
        state.set_unordered_list("addresses", &wire.addresses);
        state.set("assign", json!(wire.assign));
        state.set("reserved", json!(wire.reserved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{assert_round_trip, state};

    #[test]
    fn test_netgw_round_trip() {
        let config = state(json!({
            "zone": "eu-west-a",
            "name": "gw-a",
            "desc": null,
            "address": "10.50.0.1",
            "port": 8080,
            "token": "s3cr3t"
        }));
        assert_round_trip::<NetGw>(&config, &["token"]);
    }

    #[test]
    fn test_vnet_round_trip() {
        let config = state(json!({
            "zone": "eu-west-a",
            "name": "private",
            "desc": "Private VLAN",
            "vlan": 102,
            "interface": "br102",
            "private": true
        }));
        assert_round_trip::<VNet>(&config, &[]);
    }

    #[test]
    fn test_vnet_rejects_out_of_range_vlan() {
        let config = state(json!({"zone": "z", "name": "n", "vlan": 5000, "interface": "br0"}));
        assert!(VNet::to_wire(&config, &Resolved::new()).is_err());
        assert_eq!(VNet::check(&config).len(), 1);
    }

    #[test]
    fn test_subnet_round_trip() {
        let config = state(json!({
            "vnet": "private",
            "name": "private-a",
            "desc": null,
            "cidr": "10.0.0.0/24",
            "gateway": "10.0.0.1",
            "dns": "10.0.0.1",
            "reserved": ["10.0.0.250-10.0.0.254", "10.0.0.1-10.0.0.10"],
            "gw_pool": ["10.0.0.240-10.0.0.249"],
            "routes": ["192.168.0.0/16", "172.16.0.0/12"],
            "application": "user"
        }));
        assert_round_trip::<Subnet>(&config, &[]);
    }

    #[test]
    fn test_subnet_wire_ranges() {
        let config = state(json!({
            "vnet": "private", "name": "a", "cidr": "10.0.0.0/24", "gateway": "10.0.0.1",
            "reserved": ["10.0.0.1-10.0.0.10"]
        }));
        let wire = Subnet::to_wire(&config, &Resolved::new()).unwrap();
        assert_eq!(wire.reserved[0].first, "10.0.0.1");
        assert_eq!(wire.reserved[0].last, "10.0.0.10");

        let bad = state(json!({
            "vnet": "private", "name": "a", "cidr": "10.0.0.0/24", "gateway": "10.0.0.1",
            "reserved": ["10.0.0.10-10.0.0.1"]
        }));
        assert!(Subnet::to_wire(&bad, &Resolved::new()).is_err());
    }

    #[test]
    fn test_subnet_gateway_must_be_inside_cidr() {
        let config = state(json!({"cidr": "10.0.0.0/24", "gateway": "10.0.1.1"}));
        let diags = Subnet::check(&config);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute, Some(vec!["gateway".to_string()]));

        let config = state(json!({"cidr": "10.0.0.0/24", "gateway": "10.0.0.1"}));
        assert!(Subnet::check(&config).is_empty());
    }

    #[test]
    fn test_adapter_round_trip() {
        let config = state(json!({
            "subnet": "private-a",
            "name": "eth0",
            "desc": null,
            "mac": "52:54:00:12:34:56",
            "addresses": ["10.0.0.20", "10.0.0.21"],
            "assign": false,
            "reserved": false
        }));
        assert_round_trip::<Adapter>(&config, &[]);
    }
}
