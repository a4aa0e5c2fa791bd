//! Destination address codec.
//!
//! The first DATA frame of a connection opens with the tunnel target:
//! `addr_type:u8 | address | port:u16 BE`, with any remaining bytes
//! belonging to the first upstream payload.
//!
//! Address types: `0x01` IPv4 (4 bytes), `0x02` domain (1-byte length +
//! name), `0x03` IPv6 (16 bytes).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

const ADDR_TYPE_IPV4: u8 = 0x01;
const ADDR_TYPE_DOMAIN: u8 = 0x02;
const ADDR_TYPE_IPV6: u8 = 0x03;

/// A tunnel target address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip) => ip.fmt(f),
            Address::Domain(name) => name.fmt(f),
            Address::Ipv6(ip) => ip.fmt(f),
        }
    }
}

/// A tunnel target: address plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub address: Address,
    pub port: u16,
}

impl Destination {
    /// Build a destination from a host string, classifying IP literals.
    pub fn from_host(host: &str, port: u16) -> Self {
        let address = if let Ok(v4) = host.parse::<Ipv4Addr>() {
            Address::Ipv4(v4)
        } else if let Ok(v6) = host.parse::<Ipv6Addr>() {
            Address::Ipv6(v6)
        } else {
            Address::Domain(host.to_string())
        };
        Self { address, port }
    }

    /// Serialize for the leading bytes of the first DATA frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(1 + 16 + 2);
        match &self.address {
            Address::Ipv4(ip) => {
                data.push(ADDR_TYPE_IPV4);
                data.extend_from_slice(&ip.octets());
            }
            Address::Domain(name) => {
                data.push(ADDR_TYPE_DOMAIN);
                data.push(name.len() as u8);
                data.extend_from_slice(name.as_bytes());
            }
            Address::Ipv6(ip) => {
                data.push(ADDR_TYPE_IPV6);
                data.extend_from_slice(&ip.octets());
            }
        }
        data.extend_from_slice(&self.port.to_be_bytes());
        data
    }

    /// Parse a destination from the head of a DATA frame payload.
    ///
    /// Returns the destination and the leftover bytes, which are the first
    /// body bytes for the upstream connection.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8])> {
        let (&addr_type, rest) = data
            .split_first()
            .ok_or_else(|| Error::destination("empty payload"))?;

        let (address, rest) = match addr_type {
            ADDR_TYPE_IPV4 => {
                if rest.len() < 4 {
                    return Err(Error::destination("truncated IPv4 address"));
                }
                let octets: [u8; 4] = rest[..4].try_into().unwrap();
                (Address::Ipv4(Ipv4Addr::from(octets)), &rest[4..])
            }
            ADDR_TYPE_DOMAIN => {
                let (&len, rest) = rest
                    .split_first()
                    .ok_or_else(|| Error::destination("missing domain length"))?;
                let len = len as usize;
                if rest.len() < len {
                    return Err(Error::destination("truncated domain"));
                }
                let name = std::str::from_utf8(&rest[..len])
                    .map_err(|_| Error::destination("domain is not valid UTF-8"))?;
                (Address::Domain(name.to_string()), &rest[len..])
            }
            ADDR_TYPE_IPV6 => {
                if rest.len() < 16 {
                    return Err(Error::destination("truncated IPv6 address"));
                }
                let octets: [u8; 16] = rest[..16].try_into().unwrap();
                (Address::Ipv6(Ipv6Addr::from(octets)), &rest[16..])
            }
            other => {
                return Err(Error::destination(format!(
                    "unknown address type: 0x{other:02x}"
                )))
            }
        };

        if rest.len() < 2 {
            return Err(Error::destination("truncated port"));
        }
        let port = u16::from_be_bytes([rest[0], rest[1]]);

        Ok((Self { address, port }, &rest[2..]))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Address::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            other => write!(f, "{}:{}", other, self.port),
        }
    }
}
