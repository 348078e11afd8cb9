//! Strongly-typed link message.

use crate::netlink::attr::AttrMap;
use crate::netlink::error::Result;
use crate::netlink::types::link::{IfInfoMsg, OperState, iff, ifla, ifla_info};

/// A parsed RTM_NEWLINK / RTM_DELLINK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMessage {
    /// Interface index.
    pub index: u32,
    /// Interface name (IFLA_IFNAME).
    pub name: Option<String>,
    /// Operational state (IFLA_OPERSTATE).
    pub oper_state: OperState,
    /// MTU (IFLA_MTU).
    pub mtu: Option<u32>,
    /// Hardware address (IFLA_ADDRESS).
    pub hw_addr: Option<Vec<u8>>,
    /// Device flags (IFF_*).
    pub flags: u32,
    /// Link kind from IFLA_LINKINFO (e.g. "bridge", "veth").
    pub kind: Option<String>,
    /// Master device index (IFLA_MASTER).
    pub master: Option<u32>,
}

impl LinkMessage {
    /// Build from a decoded family header and attributes.
    pub fn from_parts(hdr: &IfInfoMsg, attrs: &AttrMap) -> Result<Self> {
        let kind = match attrs.nested(ifla::LINKINFO) {
            Some(info) => info.string(ifla_info::KIND)?,
            None => None,
        };

        Ok(Self {
            index: hdr.ifi_index as u32,
            name: attrs.string(ifla::IFNAME)?,
            oper_state: attrs
                .u8(ifla::OPERSTATE)
                .map(OperState::from)
                .unwrap_or_default(),
            mtu: attrs.u32(ifla::MTU),
            hw_addr: attrs.bytes(ifla::ADDRESS).map(<[u8]>::to_vec),
            flags: hdr.ifi_flags,
            kind,
            master: attrs.u32(ifla::MASTER),
        })
    }

    /// Check if the interface is administratively up.
    pub fn is_up(&self) -> bool {
        self.flags & iff::UP != 0
    }

    /// Check if the interface is a loopback.
    pub fn is_loopback(&self) -> bool {
        self.flags & iff::LOOPBACK != 0
    }

    /// Check if the lower layer reports carrier.
    pub fn has_carrier(&self) -> bool {
        self.flags & iff::LOWER_UP != 0
    }
}
