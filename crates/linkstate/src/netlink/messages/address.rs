//! Strongly-typed address message.

use std::net::IpAddr;

use crate::netlink::attr::AttrMap;
use crate::netlink::error::{Error, Result};
use crate::netlink::types::Scope;
use crate::netlink::types::addr::{IfAddrMsg, ifa, ifa_flags};

/// A parsed RTM_NEWADDR / RTM_DELADDR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMessage {
    pub family: u8,
    pub prefix_len: u8,
    pub scope: Scope,
    /// Owning interface index.
    pub index: u32,
    /// Local address bytes (IFA_LOCAL, else IFA_ADDRESS).
    pub address: Vec<u8>,
    /// Label (IFA_LABEL).
    pub label: Option<String>,
    /// IFA_F_* flags, from IFA_FLAGS when present.
    pub flags: u32,
}

impl AddressMessage {
    /// Build from a decoded family header and attributes.
    ///
    /// On point-to-point links IFA_ADDRESS is the peer, so IFA_LOCAL wins
    /// when both are present.
    pub fn from_parts(hdr: &IfAddrMsg, attrs: &AttrMap) -> Result<Self> {
        let address = attrs
            .bytes(ifa::LOCAL)
            .or_else(|| attrs.bytes(ifa::ADDRESS))
            .ok_or_else(|| Error::InvalidAttribute {
                kind: ifa::ADDRESS,
                reason: "address message without IFA_LOCAL or IFA_ADDRESS".into(),
            })?
            .to_vec();

        Ok(Self {
            family: hdr.ifa_family,
            prefix_len: hdr.ifa_prefixlen,
            scope: Scope::from(hdr.ifa_scope),
            index: hdr.ifa_index,
            address,
            label: attrs.string(ifa::LABEL)?,
            flags: attrs.u32(ifa::FLAGS).unwrap_or(hdr.ifa_flags as u32),
        })
    }

    /// The address as an `IpAddr`, if it has an IP length.
    pub fn ip(&self) -> Option<IpAddr> {
        super::ip_from_bytes(&self.address)
    }

    pub fn is_permanent(&self) -> bool {
        self.flags & ifa_flags::PERMANENT != 0
    }

    pub fn is_secondary(&self) -> bool {
        self.flags & ifa_flags::SECONDARY != 0
    }
}
