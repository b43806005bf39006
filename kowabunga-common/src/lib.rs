//! Common types shared between the Kowabunga API client and the Terraform provider

pub mod models;
pub mod net;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes in one gigabyte, as the Kowabunga API counts them.
pub const GB: i64 = 1024 * 1024 * 1024;

/// Convert a size in GB into bytes. Saturates instead of overflowing.
pub fn gb_to_bytes(gb: i64) -> i64 {
    gb.saturating_mul(GB)
}

/// Convert a size in bytes into whole GB, rounding down.
pub fn bytes_to_gb(bytes: i64) -> i64 {
    bytes / GB
}

/// Kind of object exposed by the Kowabunga API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Region,
    Zone,
    Host,
    StoragePool,
    StorageNfs,
    Template,
    NetGw,
    VNet,
    Subnet,
    Adapter,
    User,
    Team,
    Project,
    Volume,
    Instance,
    Kce,
    Kfs,
    Kgw,
    DnsRecord,
}

impl Kind {
    /// Collection segment of the REST path (`/zone`, `/pool`, ...)
    pub fn collection(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Zone => "zone",
            Self::Host => "host",
            Self::StoragePool => "pool",
            Self::StorageNfs => "nfs",
            Self::Template => "template",
            Self::NetGw => "netgw",
            Self::VNet => "vnet",
            Self::Subnet => "subnet",
            Self::Adapter => "adapter",
            Self::User => "user",
            Self::Team => "team",
            Self::Project => "project",
            Self::Volume => "volume",
            Self::Instance => "instance",
            Self::Kce => "kce",
            Self::Kfs => "kfs",
            Self::Kgw => "kgw",
            Self::DnsRecord => "record",
        }
    }

    /// Human-readable label used in error messages
    pub fn label(self) -> &'static str {
        match self {
            Self::NetGw => "network gateway",
            Self::Kce => "KCE",
            Self::Kfs => "KFS",
            Self::Kgw => "KGW",
            Self::DnsRecord => "DNS record",
            other => other.collection(),
        }
    }

    /// Path listing every object of this kind
    pub fn list_path(self) -> String {
        format!("/{}", self.collection())
    }

    /// Path of a single object
    pub fn item_path(self, id: &str) -> String {
        format!("/{}/{}", self.collection(), id)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parsing errors for values exchanged with the API
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid IP range: {0}")]
    InvalidRange(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gb_conversion() {
        assert_eq!(gb_to_bytes(1), 1_073_741_824);
        assert_eq!(gb_to_bytes(0), 0);
        assert_eq!(bytes_to_gb(21_474_836_480), 20);
        assert_eq!(bytes_to_gb(1_073_741_823), 0);
    }

    #[test]
    fn test_gb_conversion_saturates() {
        assert_eq!(gb_to_bytes(i64::MAX), i64::MAX);
    }

    proptest! {
        #[test]
        fn gb_bytes_round_trip(n in 0i64..=(i64::MAX / GB)) {
            prop_assert_eq!(bytes_to_gb(gb_to_bytes(n)), n);
        }
    }

    #[test]
    fn test_kind_paths() {
        assert_eq!(Kind::StoragePool.list_path(), "/pool");
        assert_eq!(Kind::Zone.item_path("z-1"), "/zone/z-1");
        assert_eq!(Kind::DnsRecord.collection(), "record");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Kind::Zone.to_string(), "zone");
        assert_eq!(Kind::StorageNfs.to_string(), "nfs");
        assert_eq!(Kind::NetGw.to_string(), "network gateway");
    }
}
