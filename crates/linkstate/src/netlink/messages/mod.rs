//! Strongly-typed netlink message structures.
//!
//! Built from decoded [`Payload`](super::codec::Payload)s. These carry only
//! what the state tables keep; everything else stays in the `AttrMap`.

mod address;
mod link;
mod route;

pub use address::*;
pub use link::*;
pub use route::*;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Interpret raw address bytes as an IP address (4 or 16 bytes).
pub fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Format raw address bytes for display; unknown lengths print as hex.
pub fn format_addr(bytes: &[u8]) -> String {
    match ip_from_bytes(bytes) {
        Some(ip) => ip.to_string(),
        None => format_hw_addr(bytes),
    }
}

/// Format a hardware address as colon-separated hex.
pub fn format_hw_addr(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
