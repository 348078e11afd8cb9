//! Records held in the state tables and the immutable snapshot readers see.

use std::collections::BTreeMap;

use crate::netlink::messages::{AddressMessage, LinkMessage, RouteMessage};
use crate::netlink::types::Scope;
use crate::netlink::types::link::OperState;
use crate::netlink::types::route::{RouteProtocol, RouteType};

/// Store generation counter.
pub type Generation = u64;

/// A network interface keyed by kernel index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub oper_state: OperState,
    pub mtu: u32,
    pub hw_addr: Vec<u8>,
    /// IFF_* flags.
    pub flags: u32,
    /// Link kind from IFLA_LINKINFO.
    pub kind: Option<String>,
}

impl Interface {
    /// Create from a link notification.
    pub fn from_link(link: &LinkMessage) -> Self {
        Self {
            index: link.index,
            name: link.name.clone().unwrap_or_default(),
            oper_state: link.oper_state,
            mtu: link.mtu.unwrap_or(0),
            hw_addr: link.hw_addr.clone().unwrap_or_default(),
            flags: link.flags,
            kind: link.kind.clone(),
        }
    }

    /// Update in place from a later notification. Attributes the kernel
    /// left out keep their previous values.
    pub fn update(&mut self, link: &LinkMessage) {
        if let Some(name) = &link.name {
            self.name.clone_from(name);
        }
        if let Some(mtu) = link.mtu {
            self.mtu = mtu;
        }
        if let Some(hw) = &link.hw_addr {
            self.hw_addr.clone_from(hw);
        }
        if link.kind.is_some() {
            self.kind.clone_from(&link.kind);
        }
        self.oper_state = link.oper_state;
        self.flags = link.flags;
    }
}

/// Identity of an address: (interface index, family, address bytes, prefix).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressKey {
    pub index: u32,
    pub family: u8,
    pub address: Vec<u8>,
    pub prefix_len: u8,
}

/// An address assigned to an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub index: u32,
    pub family: u8,
    pub address: Vec<u8>,
    pub prefix_len: u8,
    pub scope: Scope,
    pub label: Option<String>,
    /// IFA_F_* flags.
    pub flags: u32,
}

impl Address {
    pub fn from_message(msg: &AddressMessage) -> Self {
        Self {
            index: msg.index,
            family: msg.family,
            address: msg.address.clone(),
            prefix_len: msg.prefix_len,
            scope: msg.scope,
            label: msg.label.clone(),
            flags: msg.flags,
        }
    }

    pub fn key(&self) -> AddressKey {
        AddressKey {
            index: self.index,
            family: self.family,
            address: self.address.clone(),
            prefix_len: self.prefix_len,
        }
    }
}

/// Identity of a route: (family, destination, prefix, table, output interface).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub family: u8,
    pub dst: Vec<u8>,
    pub dst_len: u8,
    pub table: u32,
    pub oif: Option<u32>,
}

/// A routing table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub family: u8,
    /// Empty for a default route.
    pub dst: Vec<u8>,
    pub dst_len: u8,
    pub table: u32,
    pub oif: Option<u32>,
    pub gateway: Option<Vec<u8>>,
    pub priority: Option<u32>,
    pub protocol: RouteProtocol,
    pub scope: Scope,
    pub route_type: RouteType,
}

impl Route {
    pub fn from_message(msg: &RouteMessage) -> Self {
        Self {
            family: msg.family,
            dst: msg.dst.clone(),
            dst_len: msg.dst_len,
            table: msg.table,
            oif: msg.oif,
            gateway: msg.gateway.clone(),
            priority: msg.priority,
            protocol: msg.protocol,
            scope: msg.scope,
            route_type: msg.route_type,
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey {
            family: self.family,
            dst: self.dst.clone(),
            dst_len: self.dst_len,
            table: self.table,
            oif: self.oif,
        }
    }
}

/// One consistent view of every table.
///
/// Snapshots are never mutated after publication; the store builds a new
/// one for every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub generation: Generation,
    pub interfaces: BTreeMap<u32, Interface>,
    pub addresses: BTreeMap<AddressKey, Address>,
    pub routes: BTreeMap<RouteKey, Route>,
    /// Set while the reconciler is degraded and the tables may be out of date.
    pub stale: bool,
}

impl Snapshot {
    pub fn interface(&self, index: u32) -> Option<&Interface> {
        self.interfaces.get(&index)
    }

    /// Look an interface up by name.
    pub fn interface_by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces.values().find(|i| i.name == name)
    }

    /// Addresses of one interface, ordered by family then address.
    pub fn addresses_of(&self, index: u32) -> impl Iterator<Item = &Address> {
        let start = AddressKey {
            index,
            family: 0,
            address: Vec::new(),
            prefix_len: 0,
        };
        self.addresses
            .range(start..)
            .take_while(move |(k, _)| k.index == index)
            .map(|(_, v)| v)
    }

    /// Check the ownership invariant: no address or route references a
    /// missing interface.
    pub fn is_consistent(&self) -> bool {
        self.addresses
            .keys()
            .all(|k| self.interfaces.contains_key(&k.index))
            && self
                .routes
                .keys()
                .all(|k| k.oif.is_none_or(|oif| self.interfaces.contains_key(&oif)))
    }
}
