//! IPv4 CIDR blocks.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tg_core::TopologyError;

/// An IPv4 network in CIDR notation.
///
/// Invariants:
/// - prefix length is 0..=32
/// - the address is the network address (host bits are zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// `0.0.0.0/0`
    pub const ANYWHERE: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, TopologyError> {
        if prefix > 32 {
            return Err(TopologyError::InvalidCidr(format!("{}/{}", address, prefix)));
        }
        let network = Ipv4Addr::from(u32::from(address) & Self::mask_bits(prefix));
        if network != address {
            return Err(TopologyError::InvalidCidr(format!("{}/{}", address, prefix)));
        }
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// First address past the end of the block, as an integer.
    fn end(&self) -> u64 {
        u64::from(u32::from(self.network)) + self.size()
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && u32::from(other.network) & Self::mask_bits(self.prefix) == u32::from(self.network)
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        let (a_start, b_start) = (
            u64::from(u32::from(self.network)),
            u64::from(u32::from(other.network)),
        );
        a_start < other.end() && b_start < self.end()
    }

    /// How many `/mask` blocks fit in this block.
    pub fn subnet_capacity(&self, mask: u8) -> usize {
        if mask < self.prefix || mask > 32 {
            return 0;
        }
        1usize << (mask - self.prefix)
    }

    /// The `index`-th `/mask` block inside this block, if it exists.
    pub fn subnet(&self, mask: u8, index: usize) -> Option<Ipv4Cidr> {
        if index >= self.subnet_capacity(mask) {
            return None;
        }
        let step = 1u64 << (32 - u32::from(mask));
        let start = u64::from(u32::from(self.network)) + step * index as u64;
        let address = Ipv4Addr::from(u32::try_from(start).ok()?);
        Some(Ipv4Cidr {
            network: address,
            prefix: mask,
        })
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| TopologyError::InvalidCidr(s.to_string()))?;
        let address = Ipv4Addr::from_str(addr).map_err(|_| TopologyError::InvalidCidr(s.to_string()))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| TopologyError::InvalidCidr(s.to_string()))?;
        Self::new(address, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert_eq!(cidr.size(), 65536);
    }

    #[test]
    fn test_rejects_host_bits_and_garbage() {
        assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("not-a-cidr/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_subnets() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(vpc.subnet_capacity(24), 256);
        assert_eq!(vpc.subnet(24, 0).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(vpc.subnet(24, 5).unwrap().to_string(), "10.0.5.0/24");
        assert!(vpc.subnet(24, 256).is_none());
        assert_eq!(vpc.subnet_capacity(8), 0);
    }

    #[test]
    fn test_contains_and_overlaps() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let a: Ipv4Cidr = "10.0.1.0/24".parse().unwrap();
        let b: Ipv4Cidr = "10.0.1.128/25".parse().unwrap();
        let c: Ipv4Cidr = "10.1.0.0/24".parse().unwrap();

        assert!(vpc.contains(&a));
        assert!(!vpc.contains(&c));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_serde_as_string() {
        let cidr: Ipv4Cidr = "192.168.0.0/24".parse().unwrap();
        let json = serde_json::to_string(&cidr).unwrap();
        assert_eq!(json, "\"192.168.0.0/24\"");
        let back: Ipv4Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr);
    }
}
