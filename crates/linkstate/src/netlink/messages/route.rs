//! Strongly-typed route message.

use crate::netlink::attr::AttrMap;
use crate::netlink::error::Result;
use crate::netlink::types::Scope;
use crate::netlink::types::route::{RouteProtocol, RouteType, RtMsg, rta};

/// A parsed RTM_NEWROUTE / RTM_DELROUTE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMessage {
    pub family: u8,
    /// Destination prefix bytes; empty for a default route.
    pub dst: Vec<u8>,
    pub dst_len: u8,
    /// Table id, from RTA_TABLE when present.
    pub table: u32,
    /// Output interface, absent for blackhole and multipath routes.
    pub oif: Option<u32>,
    pub gateway: Option<Vec<u8>>,
    pub priority: Option<u32>,
    pub protocol: RouteProtocol,
    pub scope: Scope,
    pub route_type: RouteType,
}

impl RouteMessage {
    /// Build from a decoded family header and attributes.
    pub fn from_parts(hdr: &RtMsg, attrs: &AttrMap) -> Result<Self> {
        Ok(Self {
            family: hdr.rtm_family,
            dst: attrs.bytes(rta::DST).map(<[u8]>::to_vec).unwrap_or_default(),
            dst_len: hdr.rtm_dst_len,
            table: attrs.u32(rta::TABLE).unwrap_or(hdr.rtm_table as u32),
            oif: attrs.u32(rta::OIF),
            gateway: attrs.bytes(rta::GATEWAY).map(<[u8]>::to_vec),
            priority: attrs.u32(rta::PRIORITY),
            protocol: RouteProtocol::from(hdr.rtm_protocol),
            scope: Scope::from(hdr.rtm_scope),
            route_type: RouteType::from(hdr.rtm_type),
        })
    }

    /// True for 0.0.0.0/0 or ::/0.
    pub fn is_default(&self) -> bool {
        self.dst_len == 0
    }
}
