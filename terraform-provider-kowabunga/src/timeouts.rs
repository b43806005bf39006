//! Per-operation time ceilings

use crate::resources::ResourceState;
use crate::schema::{AttributeType, SchemaAttribute};
use crate::validators::{parse_duration, Validator};
use std::fmt;
use std::time::Duration;

/// Name of the optional map attribute overriding the defaults
pub const TIMEOUTS_ATTRIBUTE: &str = "timeouts";

/// CRUD lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn key(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn default_timeout(self) -> Duration {
        match self {
            Self::Create => Duration::from_secs(30 * 60),
            Self::Read => Duration::from_secs(2 * 60),
            Self::Update | Self::Delete => Duration::from_secs(5 * 60),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ceiling for `operation`, honouring the resource's `timeouts` override
pub fn timeout_for(state: &ResourceState, operation: Operation) -> Duration {
    state
        .get(TIMEOUTS_ATTRIBUTE)
        .and_then(|t| t.get(operation.key()))
        .and_then(|v| v.as_str())
        .and_then(|s| parse_duration(s).ok())
        .unwrap_or_else(|| operation.default_timeout())
}

pub fn schema_attribute() -> SchemaAttribute {
    SchemaAttribute::map(AttributeType::String)
        .with_description(
            "Operation timeouts keyed by create, read, update or delete (e.g. \"45m\", \"1h30m\")",
        )
        .optional()
        .validate(Validator::Duration)
}
