//! Attribute validators run during config validation
//!
//! All checks are pure: no state, no network.

use crate::error::{ProviderError, Result};
use crate::schema::{Diagnostic, SchemaBlock};
use kowabunga_common::net::{self, IpRange};
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]+(?:ms|s|m|h))+$").unwrap());

static DURATION_PART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)(ms|s|m|h)").unwrap());

static MAC_ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").unwrap());

pub const MAX_PORT: u32 = 65535;

/// Check attached to a schema attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Value must be one of the listed literals (numbers compare by text)
    OneOf(&'static [&'static str]),
    Email,
    Ipv4,
    Cidr,
    IpRange,
    /// Port, port list or port range: `80`, `22,443`, `8000-8100`
    PortRange,
    /// Duration such as `30m` or `1h30m`
    Duration,
    MacAddress,
}

impl Validator {
    /// Validate a single scalar value rendered as text
    pub fn check(&self, value: &str) -> Result<()> {
        match self {
            Self::OneOf(allowed) => validate_one_of(value, allowed),
            Self::Email => validate_email(value),
            Self::Ipv4 => validate_ipv4(value),
            Self::Cidr => validate_cidr(value),
            Self::IpRange => validate_ip_range(value),
            Self::PortRange => validate_port_range(value),
            Self::Duration => parse_duration(value).map(|_| ()),
            Self::MacAddress => validate_mac_address(value),
        }
    }

    /// Validate an attribute value; list elements and map values are checked
    /// one by one. Null values are left to the required-attribute check.
    pub fn validate(&self, path: &[String], value: &Value) -> Vec<Diagnostic> {
        match value {
            Value::Null | Value::Bool(_) => Vec::new(),
            Value::String(s) => self.diagnose(path, s),
            Value::Number(n) => self.diagnose(path, &n.to_string()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .flat_map(|(i, item)| self.validate(&child(path, &i.to_string()), item))
                .collect(),
            Value::Object(entries) => entries
                .iter()
                .flat_map(|(key, item)| self.validate(&child(path, key), item))
                .collect(),
        }
    }

    fn diagnose(&self, path: &[String], value: &str) -> Vec<Diagnostic> {
        match self.check(value) {
            Ok(()) => Vec::new(),
            Err(e) => vec![Diagnostic::error("Invalid attribute value")
                .with_detail(&e.to_string())
                .with_attribute(path.to_vec())],
        }
    }
}

fn child(path: &[String], step: &str) -> Vec<String> {
    let mut path = path.to_vec();
    path.push(step.to_string());
    path
}

/// Validate an object against a schema block: required and unsupported
/// attributes, read-only attributes, per-attribute validators and nested
/// blocks.
///
/// A required attribute absent from `values` is reported. A null value is an
/// unknown one, such as the ID of an object not created yet, and is left to
/// apply.
pub fn validate_block(block: &SchemaBlock, values: &Map<String, Value>, path: &[String]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (name, attr) in &block.attributes {
        let attr_path = child(path, name);
        let Some(value) = values.get(name) else {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error("Missing required argument")
                        .with_detail(&format!("The argument \"{}\" is required", name))
                        .with_attribute(attr_path),
                );
            }
            continue;
        };

        if value.is_null() {
            continue;
        }

        if attr.computed && !attr.optional && !attr.required {
            diagnostics.push(
                Diagnostic::error("Invalid configuration")
                    .with_detail(&format!("\"{}\" is computed and cannot be set", name))
                    .with_attribute(attr_path),
            );
            continue;
        }

        for validator in &attr.validators {
            diagnostics.extend(validator.validate(&attr_path, value));
        }
    }

    for (name, nested) in &block.blocks {
        let Some(items) = values.get(name).and_then(Value::as_array) else {
            continue;
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = child(&child(path, name), &i.to_string());
            match item.as_object() {
                Some(object) => {
                    diagnostics.extend(validate_block(&nested.block, object, &item_path))
                }
                None => diagnostics.push(
                    Diagnostic::error("Invalid block")
                        .with_detail(&format!("Each \"{}\" entry must be an object", name))
                        .with_attribute(item_path),
                ),
            }
        }
    }

    for name in values.keys() {
        if !block.attributes.contains_key(name) && !block.blocks.contains_key(name) {
            diagnostics.push(
                Diagnostic::error("Unsupported argument")
                    .with_detail(&format!("An argument named \"{}\" is not expected here", name))
                    .with_attribute(child(path, name)),
            );
        }
    }

    diagnostics
}

pub fn validate_one_of(value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ProviderError::Validation(format!(
            "\"{}\" must be one of: {}",
            value,
            allowed.join(", ")
        )))
    }
}

/// Email syntax, as accepted by an RFC 5321 mailbox parser
pub fn validate_email(email: &str) -> Result<()> {
    lettre::Address::from_str(email)
        .map(|_| ())
        .map_err(|e| ProviderError::Validation(format!("\"{}\" is not a valid email: {}", email, e)))
}

pub fn validate_ipv4(value: &str) -> Result<()> {
    net::parse_ipv4(value)
        .map(|_| ())
        .map_err(|e| ProviderError::Validation(e.to_string()))
}

pub fn validate_cidr(value: &str) -> Result<()> {
    net::parse_cidr(value)
        .map(|_| ())
        .map_err(|e| ProviderError::Validation(e.to_string()))
}

pub fn validate_ip_range(value: &str) -> Result<()> {
    IpRange::from_str(value)
        .map(|_| ())
        .map_err(|e| ProviderError::Validation(e.to_string()))
}

pub fn validate_mac_address(mac: &str) -> Result<()> {
    if MAC_ADDRESS_REGEX.is_match(mac) {
        Ok(())
    } else {
        Err(ProviderError::Validation(format!(
            "\"{}\" is not a valid MAC address",
            mac
        )))
    }
}

/// Comma-separated ports or ascending `low-high` ranges
pub fn validate_port_range(value: &str) -> Result<()> {
    let invalid = |why: &str| {
        ProviderError::Validation(format!("\"{}\" is not a valid port range: {}", value, why))
    };

    for term in value.split(',').map(str::trim) {
        let bounds: Vec<&str> = term.split('-').collect();
        match bounds.as_slice() {
            [port] => {
                parse_port(port).ok_or_else(|| invalid("ports must be within 1-65535"))?;
            }
            [low, high] => {
                let low = parse_port(low).ok_or_else(|| invalid("ports must be within 1-65535"))?;
                let high = parse_port(high).ok_or_else(|| invalid("ports must be within 1-65535"))?;
                if low > high {
                    return Err(invalid("range start is above its end"));
                }
            }
            _ => return Err(invalid("expected PORT or LOW-HIGH")),
        }
    }

    Ok(())
}

fn parse_port(value: &str) -> Option<u32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value
        .parse::<u32>()
        .ok()
        .filter(|p| (1..=MAX_PORT).contains(p))
}

/// Parse a duration made of `<n>h`, `<n>m`, `<n>s` and `<n>ms` parts
pub fn parse_duration(value: &str) -> Result<Duration> {
    if !DURATION_REGEX.is_match(value) {
        return Err(ProviderError::Validation(format!(
            "\"{}\" is not a valid duration (e.g. \"30s\", \"20m\", \"1h30m\")",
            value
        )));
    }

    let mut total = Duration::ZERO;
    for part in DURATION_PART_REGEX.captures_iter(value) {
        let amount: u64 = part[1]
            .parse()
            .map_err(|_| ProviderError::Validation(format!("\"{}\" is out of range", value)))?;
        let unit = match &part[2] {
            "h" => Duration::from_secs(3600),
            "m" => Duration::from_secs(60),
            "s" => Duration::from_secs(1),
            _ => Duration::from_millis(1),
        };
        total = unit
            .checked_mul(u32::try_from(amount).unwrap_or(u32::MAX))
            .and_then(|d| total.checked_add(d))
            .ok_or_else(|| ProviderError::Validation(format!("\"{}\" is out of range", value)))?;
    }

    Ok(total)
}
