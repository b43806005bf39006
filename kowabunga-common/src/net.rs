//! IPv4 address, CIDR and range helpers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Parse a dotted-quad IPv4 address
pub fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(value.to_string()))
}

/// Parse `a.b.c.d/prefix` into its network address and prefix length
pub fn parse_cidr(value: &str) -> Result<(Ipv4Addr, u8)> {
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| Error::InvalidCidr(value.to_string()))?;

    let addr = parse_ipv4(addr).map_err(|_| Error::InvalidCidr(value.to_string()))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| Error::InvalidCidr(value.to_string()))?;

    if prefix > 32 {
        return Err(Error::InvalidCidr(value.to_string()));
    }

    Ok((addr, prefix))
}

/// Whether `addr` lies inside the `cidr` network
pub fn cidr_contains(cidr: &str, addr: Ipv4Addr) -> Result<bool> {
    let (network, prefix) = parse_cidr(cidr)?;
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    Ok(u32::from(network) & mask == u32::from(addr) & mask)
}

/// Inclusive IPv4 address range, `first-last` on the Terraform side
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpRange {
    pub first: String,
    pub last: String,
}

impl FromStr for IpRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (first, last) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidRange(s.to_string()))?;
        let (first, last) = (first.trim(), last.trim());

        let lo = parse_ipv4(first).map_err(|_| Error::InvalidRange(s.to_string()))?;
        let hi = parse_ipv4(last).map_err(|_| Error::InvalidRange(s.to_string()))?;
        if lo > hi {
            return Err(Error::InvalidRange(s.to_string()));
        }

        Ok(Self {
            first: first.to_string(),
            last: last.to_string(),
        })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        assert_eq!(
            parse_cidr("10.0.0.0/24"),
            Ok((Ipv4Addr::new(10, 0, 0, 0), 24))
        );
        assert!(parse_cidr("10.0.0.0").is_err());
        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(parse_cidr("10.0.0/24").is_err());
        assert!(parse_cidr("10.0.0.0/abc").is_err());
    }

    #[test]
    fn test_cidr_contains() {
        assert_eq!(cidr_contains("10.0.0.0/24", Ipv4Addr::new(10, 0, 0, 42)), Ok(true));
        assert_eq!(cidr_contains("10.0.0.0/24", Ipv4Addr::new(10, 0, 1, 1)), Ok(false));
        assert_eq!(cidr_contains("0.0.0.0/0", Ipv4Addr::new(192, 168, 1, 1)), Ok(true));
    }

    #[test]
    fn test_ip_range() {
        let range: IpRange = "10.0.0.1-10.0.0.5".parse().unwrap();
        assert_eq!(range.first, "10.0.0.1");
        assert_eq!(range.last, "10.0.0.5");
        assert_eq!(range.to_string(), "10.0.0.1-10.0.0.5");

        assert!("10.0.0.5-10.0.0.1".parse::<IpRange>().is_err());
        assert!("10.0.0.1".parse::<IpRange>().is_err());
        assert!("10.0.0.1-foo".parse::<IpRange>().is_err());
    }
}
