//! IP address and CIDR targets matched against the `ipv4` / `ipv6` grains.

use crate::TargetError;
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP network in CIDR notation.
///
/// Parsing is strict: host bits below the prefix must be zero.
///
/// ```
/// use tgt::IpNetwork;
///
/// let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
/// assert!(net.contains("10.1.2.3".parse().unwrap()));
/// assert!("10.0.0.1/8".parse::<IpNetwork>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Network address.
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits.
    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns `true` if `ip` is inside this network. Mixed families never match.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("'{addr}' is not a valid IP address"))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            None => max,
            Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("invalid prefix length '{p}'"))?,
            Some(p) => return Err(format!("invalid prefix length '{p}'")),
        };
        let net = Self { addr, prefix };
        if host_bits_set(addr, prefix) {
            return Err(format!("'{s}' has host bits set"));
        }
        Ok(net)
    }
}

fn host_bits_set(addr: IpAddr, prefix: u8) -> bool {
    match addr {
        IpAddr::V4(a) => u32::from(a) & !mask_v4(prefix) != 0,
        IpAddr::V6(a) => u128::from(a) & !mask_v6(prefix) != 0,
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// The pattern of an `S@` target: a literal address or a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpTarget {
    /// Matches minions that report exactly this address.
    Address(IpAddr),
    /// Matches minions with any address inside the network.
    Network(IpNetwork),
}

impl IpTarget {
    /// Parse an address or CIDR literal.
    ///
    /// # Errors
    ///
    /// [`TargetError::InvalidPattern`] if `pattern` is neither.
    pub fn parse(pattern: &str) -> Result<Self, TargetError> {
        if let Ok(addr) = pattern.parse::<IpAddr>() {
            return Ok(Self::Address(addr));
        }
        pattern
            .parse::<IpNetwork>()
            .map(Self::Network)
            .map_err(|reason| TargetError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason,
            })
    }

    /// The grain holding addresses of this target's family.
    #[must_use]
    pub fn grain_key(&self) -> &'static str {
        let v4 = match self {
            Self::Address(a) => a.is_ipv4(),
            Self::Network(n) => n.addr.is_ipv4(),
        };
        if v4 {
            "ipv4"
        } else {
            "ipv6"
        }
    }

    /// Check a single address.
    #[must_use]
    pub fn matches(&self, ip: IpAddr) -> bool {
        match self {
            Self::Address(a) => *a == ip,
            Self::Network(n) => n.contains(ip),
        }
    }

    /// Check a minion's grains. Unparsable entries in the address list are ignored.
    #[must_use]
    pub fn matches_grains(&self, grains: &Map<String, Value>) -> bool {
        let Some(addrs) = grains.get(self.grain_key()) else {
            return false;
        };
        let single;
        let addrs: &[Value] = match addrs {
            Value::Array(items) => items,
            other => {
                single = [other.clone()];
                &single
            }
        };
        addrs
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| s.trim().parse::<IpAddr>().ok())
            .any(|ip| self.matches(ip))
    }
}

impl fmt::Display for IpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "{a}"),
            Self::Network(n) => write!(f, "{n}"),
        }
    }
}
