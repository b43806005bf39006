//! Managed project services: file systems, gateways and DNS records

use super::{
    computed_attribute, description_attribute, name_attribute, optional_reference_attribute,
    reference_attribute, Descriptor, ResourceState,
};
use crate::error::{ProviderError, Result};
use crate::resolver::{ParentRef, Resolved};
use crate::schema::{AttributeType, NestedBlock, SchemaAttribute, SchemaBlock};
use crate::validators::Validator;
use kowabunga_common::models::{self, KgwFirewallRule, KgwIpsec, KgwNat};
use kowabunga_common::Kind;
use serde_json::{json, Value};

pub const KFS_ACCESS_TYPES: &[&str] = &["RW", "RO"];
pub const KFS_PROTOCOLS: &[&str] = &["3", "4"];
pub const FIREWALL_DIRECTIONS: &[&str] = &["in", "out"];
pub const FIREWALL_PROTOCOLS: &[&str] = &["tcp", "udp"];
pub const IPSEC_DH_GROUPS: &[&str] = &["2", "5", "14", "15", "16", "19", "20", "21"];
pub const IPSEC_INTEGRITY_ALGORITHMS: &[&str] = &["SHA1", "SHA256", "SHA384", "SHA512"];
pub const IPSEC_ENCRYPTION_ALGORITHMS: &[&str] =
    &["AES128", "AES256", "CAMELLIA128", "CAMELLIA256"];

pub struct Kfs;

impl Descriptor for Kfs {
    type Wire = models::Kfs;

    const TYPE_NAME: &'static str = "kowabunga_kfs";
    const KIND: Kind = Kind::Kfs;
    const DESCRIPTION: &'static str = "Manages a Kowabunga File System NFS share";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
        ParentRef::query("nfs", Kind::StorageNfs, "nfsId"),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("nfs", optional_reference_attribute(Kind::StorageNfs))
            .with_attribute("name", name_attribute("KFS"))
            .with_attribute("desc", description_attribute("KFS"))
            .with_attribute(
                "access",
                SchemaAttribute::string()
                    .with_description("Access mode (RW or RO)")
                    .with_default(json!("RW"))
                    .validate(Validator::OneOf(KFS_ACCESS_TYPES)),
            )
            .with_attribute(
                "protocols",
                SchemaAttribute::list(AttributeType::Number)
                    .with_description("Allowed NFS protocol versions")
                    .with_default(json!([3, 4]))
                    .validate(Validator::OneOf(KFS_PROTOCOLS)),
            )
            .with_attribute(
                "endpoint",
                computed_attribute(
                    SchemaAttribute::string().with_description("NFS endpoint to mount"),
                ),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        let protocols = match state.get("protocols").and_then(Value::as_array) {
            Some(values) => values
                .iter()
                .map(|v| {
                    v.as_i64()
                        .ok_or_else(|| ProviderError::invalid("protocols", "expected a number"))
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![3, 4],
        };

        Ok(models::Kfs {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            access: state.get_string("access").unwrap_or_else(|| "RW".to_string()),
            protocols,
            endpoint: None,
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set("access", json!(wire.access));
        state.set_unordered_list("protocols", &wire.protocols);
        state.set_opt_string("endpoint", wire.endpoint.as_deref());
    }
}

pub struct Kgw;

fn nat_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_description("Port forwarding from a public address to a private one")
        .with_attribute(
            "private_ip",
            SchemaAttribute::string()
                .with_description("Private destination address")
                .required()
                .validate(Validator::Ipv4),
        )
        .with_attribute(
            "public_ip",
            SchemaAttribute::string()
                .with_description("Public address, the gateway's own when unset")
                .optional()
                .validate(Validator::Ipv4),
        )
        .with_attribute(
            "ports",
            SchemaAttribute::string()
                .with_description("Forwarded ports, e.g. \"80,443\" or \"8000-8100\"")
                .required()
                .validate(Validator::PortRange),
        )
}

fn firewall_rule_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_description("Firewall rule")
        .with_attribute(
            "direction",
            SchemaAttribute::string()
                .with_description("Traffic direction (in or out)")
                .with_default(json!("in"))
                .validate(Validator::OneOf(FIREWALL_DIRECTIONS)),
        )
        .with_attribute(
            "protocol",
            SchemaAttribute::string()
                .with_description("Transport protocol (tcp or udp)")
                .with_default(json!("tcp"))
                .validate(Validator::OneOf(FIREWALL_PROTOCOLS)),
        )
        .with_attribute(
            "ports",
            SchemaAttribute::string()
                .with_description("Ports, e.g. \"22\", \"80,443\" or \"8000-8100\"")
                .required()
                .validate(Validator::PortRange),
        )
        .with_attribute(
            "cidr",
            SchemaAttribute::string()
                .with_description("Peer network in CIDR notation")
                .with_default(json!("0.0.0.0/0"))
                .validate(Validator::Cidr),
        )
}

fn ipsec_phase(block: SchemaBlock, phase: u8, lifetime: &str) -> SchemaBlock {
    block
        .with_attribute(
            &format!("phase{}_dh_group", phase),
            SchemaAttribute::number()
                .with_description(&format!("Phase {} Diffie-Hellman group", phase))
                .with_default(json!(14))
                .validate(Validator::OneOf(IPSEC_DH_GROUPS)),
        )
        .with_attribute(
            &format!("phase{}_integrity_algorithm", phase),
            SchemaAttribute::string()
                .with_description(&format!("Phase {} integrity algorithm", phase))
                .with_default(json!("SHA512"))
                .validate(Validator::OneOf(IPSEC_INTEGRITY_ALGORITHMS)),
        )
        .with_attribute(
            &format!("phase{}_encryption_algorithm", phase),
            SchemaAttribute::string()
                .with_description(&format!("Phase {} encryption algorithm", phase))
                .with_default(json!("AES256"))
                .validate(Validator::OneOf(IPSEC_ENCRYPTION_ALGORITHMS)),
        )
        .with_attribute(
            &format!("phase{}_lifetime", phase),
            SchemaAttribute::string()
                .with_description(&format!("Phase {} key lifetime, e.g. \"8h\"", phase))
                .with_default(json!(lifetime))
                .validate(Validator::Duration),
        )
}

fn ipsec_block() -> SchemaBlock {
    let block = SchemaBlock::new()
        .with_description("Site-to-site IPsec tunnel")
        .with_attribute(
            "name",
            SchemaAttribute::string()
                .with_description("Name of the tunnel")
                .required(),
        )
        .with_attribute(
            "remote_peer",
            SchemaAttribute::string()
                .with_description("Public address of the remote peer")
                .required()
                .validate(Validator::Ipv4),
        )
        .with_attribute(
            "remote_subnet",
            SchemaAttribute::string()
                .with_description("Remote network in CIDR notation")
                .required()
                .validate(Validator::Cidr),
        )
        .with_attribute(
            "pre_shared_key",
            SchemaAttribute::string()
                .with_description("Tunnel pre-shared key")
                .required()
                .sensitive(),
        );

    ipsec_phase(ipsec_phase(block, 1, "8h"), 2, "1h")
}

fn to_nat(block: &ResourceState) -> Result<KgwNat> {
    Ok(KgwNat {
        private_ip: block.require_string("private_ip")?,
        public_ip: block.get_string("public_ip"),
        ports: block.require_string("ports")?,
    })
}

fn to_firewall_rule(block: &ResourceState) -> Result<KgwFirewallRule> {
    Ok(KgwFirewallRule {
        direction: block.get_string("direction").unwrap_or_else(|| "in".to_string()),
        protocol: block.get_string("protocol").unwrap_or_else(|| "tcp".to_string()),
        ports: block.require_string("ports")?,
        cidr: block.get_string("cidr").unwrap_or_else(|| "0.0.0.0/0".to_string()),
    })
}

fn to_ipsec(block: &ResourceState) -> Result<KgwIpsec> {
    let text = |key: &str, default: &str| block.get_string(key).unwrap_or_else(|| default.to_string());

    Ok(KgwIpsec {
        name: block.require_string("name")?,
        remote_peer: block.require_string("remote_peer")?,
        remote_subnet: block.require_string("remote_subnet")?,
        pre_shared_key: block.get_string("pre_shared_key"),
        phase1_dh_group: block.get_i64("phase1_dh_group").unwrap_or(14),
        phase1_integrity_algorithm: text("phase1_integrity_algorithm", "SHA512"),
        phase1_encryption_algorithm: text("phase1_encryption_algorithm", "AES256"),
        phase1_lifetime: text("phase1_lifetime", "8h"),
        phase2_dh_group: block.get_i64("phase2_dh_group").unwrap_or(14),
        phase2_integrity_algorithm: text("phase2_integrity_algorithm", "SHA512"),
        phase2_encryption_algorithm: text("phase2_encryption_algorithm", "AES256"),
        phase2_lifetime: text("phase2_lifetime", "1h"),
    })
}

impl Descriptor for Kgw {
    type Wire = models::Kgw;

    const TYPE_NAME: &'static str = "kowabunga_kgw";
    const KIND: Kind = Kind::Kgw;
    const DESCRIPTION: &'static str = "Manages a Kowabunga Gateway for a project";
    const REFS: &'static [ParentRef] = &[
        ParentRef::scope("project", Kind::Project),
        ParentRef::scope("zone", Kind::Zone),
    ];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("zone", reference_attribute(Kind::Zone))
            .with_attribute("name", name_attribute("KGW"))
            .with_attribute("desc", description_attribute("KGW"))
            .with_attribute(
                "public_ip",
                computed_attribute(
                    SchemaAttribute::string().with_description("Public IPv4 address"),
                ),
            )
            .with_attribute(
                "private_ip",
                computed_attribute(
                    SchemaAttribute::string().with_description("Private IPv4 address"),
                ),
            )
            .with_block("nat", NestedBlock::list(nat_block()))
            .with_block("firewall_rule", NestedBlock::list(firewall_rule_block()))
            .with_block("ipsec", NestedBlock::list(ipsec_block()))
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::Kgw {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            public_ip: None,
            private_ip: None,
            nats: state.get_blocks("nat").iter().map(to_nat).collect::<Result<_>>()?,
            firewall: state
                .get_blocks("firewall_rule")
                .iter()
                .map(to_firewall_rule)
                .collect::<Result<_>>()?,
            ipsec: state
                .get_blocks("ipsec")
                .iter()
                .map(to_ipsec)
                .collect::<Result<_>>()?,
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        // pre-shared keys are never returned; keep the configured ones by tunnel name
        let known_keys: Vec<(String, Value)> = state
            .get_blocks("ipsec")
            .into_iter()
            .filter_map(|b| Some((b.get_string("name")?, b.get("pre_shared_key")?.clone())))
            .collect();

        let nats: Vec<Value> = wire
            .nats
            .iter()
            .map(|n| json!({"private_ip": n.private_ip, "public_ip": n.public_ip, "ports": n.ports}))
            .collect();

        let firewall: Vec<Value> = wire
            .firewall
            .iter()
            .map(|r| {
                json!({
                    "direction": r.direction,
                    "protocol": r.protocol,
                    "ports": r.ports,
                    "cidr": r.cidr,
                })
            })
            .collect();

        let ipsec: Vec<Value> = wire
            .ipsec
            .iter()
            .map(|t| {
                let psk = known_keys
                    .iter()
                    .find(|(name, _)| *name == t.name)
                    .map(|(_, key)| key.clone())
                    .unwrap_or(Value::Null);
                json!({
                    "name": t.name,
                    "remote_peer": t.remote_peer,
                    "remote_subnet": t.remote_subnet,
                    "pre_shared_key": psk,
                    "phase1_dh_group": t.phase1_dh_group,
                    "phase1_integrity_algorithm": t.phase1_integrity_algorithm,
                    "phase1_encryption_algorithm": t.phase1_encryption_algorithm,
                    "phase1_lifetime": t.phase1_lifetime,
                    "phase2_dh_group": t.phase2_dh_group,
                    "phase2_integrity_algorithm": t.phase2_integrity_algorithm,
                    "phase2_encryption_algorithm": t.phase2_encryption_algorithm,
                    "phase2_lifetime": t.phase2_lifetime,
                })
            })
            .collect();

        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set_opt_string("public_ip", wire.public_ip.as_deref());
        state.set_opt_string("private_ip", wire.private_ip.as_deref());
        if nats.is_empty() {
            state.set("nat", json!([]));
        } else {
            state.set_unordered_list("nat", &nats);
        }
        state.set("firewall_rule", Value::from(firewall));
        state.set("ipsec", Value::from(ipsec));
    }
}

pub struct DnsRecord;

impl Descriptor for DnsRecord {
    type Wire = models::DnsRecord;

    const TYPE_NAME: &'static str = "kowabunga_dns_record";
    const KIND: Kind = Kind::DnsRecord;
    const DESCRIPTION: &'static str = "Manages a DNS record in a project's private domain";
    const REFS: &'static [ParentRef] = &[ParentRef::scope("project", Kind::Project)];

    fn schema() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute("project", reference_attribute(Kind::Project))
            .with_attribute("name", name_attribute("DNS record"))
            .with_attribute("desc", description_attribute("DNS record"))
            .with_attribute(
                "domain",
                computed_attribute(
                    SchemaAttribute::string().with_description("Domain the record belongs to"),
                ),
            )
            .with_attribute(
                "addresses",
                SchemaAttribute::list(AttributeType::String)
                    .with_description("IPv4 addresses the record resolves to")
                    .required()
                    .validate(Validator::Ipv4),
            )
    }

    fn to_wire(state: &ResourceState, _refs: &Resolved) -> Result<Self::Wire> {
        Ok(models::DnsRecord {
            id: None,
            name: state.require_string("name")?,
            description: state.get_string("desc"),
            domain: None,
            addresses: state.get_string_list("addresses").unwrap_or_default(),
        })
    }

    fn from_wire(wire: &Self::Wire, state: &mut ResourceState) {
        state.set("name", json!(wire.name));
        state.set_opt_string("desc", wire.description.as_deref());
        state.set_opt_string("domain", wire.domain.as_deref());
        state.set_unordered_list("addresses", &wire.addresses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{assert_round_trip, state};
    use crate::validators::validate_block;

    #[test]
    fn test_kfs_round_trip() {
        let config = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "nfs": "shared",
            "name": "home",
            "desc": null,
            "access": "RO",
            "protocols": [3, 4]
        }));
        assert_round_trip::<Kfs>(&config, &[]);
    }

    #[test]
    fn test_kfs_keeps_configured_protocol_order() {
        let config = state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "nfs": "shared",
            "name": "home",
            "desc": null,
            "access": "RW",
            "protocols": [4, 3]
        }));
        assert_round_trip::<Kfs>(&config, &[]);

        let mut wire = Kfs::to_wire(&config, &Resolved::new()).unwrap();
        wire.protocols = vec![3];
        let mut refreshed = config.clone();
        Kfs::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["protocols"], json!([3]));
    }

    #[test]
    fn test_kfs_rejects_unknown_protocol() {
        let block = Kfs::schema();
        let config = state(json!({
            "project": "acme", "zone": "z", "name": "home", "protocols": [3, 5]
        }));
        let diags = validate_block(&block, &config.to_object(), &[]);
        assert_eq!(diags.len(), 1);
    }

    fn gateway() -> ResourceState {
        state(json!({
            "project": "acme",
            "zone": "eu-west-a",
            "name": "acme-gw",
            "desc": null,
            "nat": [
                {"private_ip": "10.0.0.10", "public_ip": null, "ports": "80,443"},
                {"private_ip": "10.0.0.20", "public_ip": "203.0.113.7", "ports": "8000-8100"}
            ],
            "firewall_rule": [
                {"direction": "in", "protocol": "tcp", "ports": "22", "cidr": "198.51.100.0/24"},
                {"direction": "out", "protocol": "udp", "ports": "53", "cidr": "0.0.0.0/0"}
            ],
            "ipsec": [{
                "name": "hq",
                "remote_peer": "198.51.100.1",
                "remote_subnet": "192.168.0.0/16",
                "pre_shared_key": "s3cr3t",
                "phase1_dh_group": 14,
                "phase1_integrity_algorithm": "SHA256",
                "phase1_encryption_algorithm": "AES256",
                "phase1_lifetime": "8h",
                "phase2_dh_group": 14,
                "phase2_integrity_algorithm": "SHA256",
                "phase2_encryption_algorithm": "AES128",
                "phase2_lifetime": "1h"
            }]
        }))
    }

    #[test]
    fn test_kgw_round_trip_keeps_pre_shared_key() {
        let config = gateway();
        let wire = Kgw::to_wire(&config, &Resolved::new()).unwrap();
        assert_eq!(wire.ipsec[0].pre_shared_key.as_deref(), Some("s3cr3t"));

        let mut returned = wire.clone();
        returned.ipsec[0].pre_shared_key = None;
        returned.nats.reverse();

        let mut refreshed = config.clone();
        Kgw::from_wire(&returned, &mut refreshed);
        assert_eq!(refreshed.values["nat"], config.values["nat"]);
        assert_eq!(refreshed.values["firewall_rule"], config.values["firewall_rule"]);
        assert_eq!(refreshed.values["ipsec"], config.values["ipsec"]);
    }

    #[test]
    fn test_kgw_keeps_configured_nat_order() {
        let mut config = gateway();
        let mut nats = config.values["nat"].as_array().unwrap().clone();
        nats.reverse();
        config.set("nat", Value::from(nats));
        assert_round_trip::<Kgw>(&config, &["ipsec"]);

        let wire = Kgw::to_wire(&config, &Resolved::new()).unwrap();
        let mut refreshed = config.clone();
        Kgw::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["nat"], config.values["nat"]);
    }

    #[test]
    fn test_kgw_nested_block_validation() {
        let mut config = gateway();
        config.set(
            "firewall_rule",
            json!([{"direction": "sideways", "protocol": "tcp", "ports": "0", "cidr": "0.0.0.0/0"}]),
        );

        let diags = validate_block(&Kgw::schema(), &config.to_object(), &[]);
        let paths: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        assert!(paths.contains(&vec![
            "firewall_rule".to_string(),
            "0".to_string(),
            "direction".to_string()
        ]));
        assert!(paths.contains(&vec![
            "firewall_rule".to_string(),
            "0".to_string(),
            "ports".to_string()
        ]));
    }

    #[test]
    fn test_dns_record_round_trip() {
        let config = state(json!({
            "project": "acme",
            "name": "www",
            "desc": null,
            "addresses": ["10.0.0.10", "10.0.0.11"]
        }));
        assert_round_trip::<DnsRecord>(&config, &[]);

        let wire = models::DnsRecord {
            id: Some("r-1".to_string()),
            name: "www".to_string(),
            domain: Some("acme.internal".to_string()),
            addresses: vec!["10.0.0.11".to_string(), "10.0.0.10".to_string()],
            ..Default::default()
        };
        let mut refreshed = ResourceState::new();
        DnsRecord::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["addresses"], json!(["10.0.0.10", "10.0.0.11"]));

        // same addresses as configured, configured order wins
        let mut refreshed = state(json!({"addresses": ["10.0.0.11", "10.0.0.10"]}));
        DnsRecord::from_wire(&wire, &mut refreshed);
        assert_eq!(refreshed.values["addresses"], json!(["10.0.0.11", "10.0.0.10"]));
        assert_eq!(refreshed.get_string("domain"), Some("acme.internal".to_string()));
    }
}
