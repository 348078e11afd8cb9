//! Link (network interface) message types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::attr::{AttrKind, Schema};
use crate::netlink::error::{Error, Result};

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct IfInfoMsg {
    /// Address family (usually AF_UNSPEC).
    pub ifi_family: u8,
    /// Padding.
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new interface info message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from the front of a payload, returning the rest.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8])> {
        Self::read_from_prefix(data).map_err(|_| Error::Truncated {
            expected: Self::SIZE,
            actual: data.len(),
        })
    }
}

/// IFLA_* attribute ids used by this crate.
pub mod ifla {
    pub const ADDRESS: u16 = 1;
    pub const BROADCAST: u16 = 2;
    pub const IFNAME: u16 = 3;
    pub const MTU: u16 = 4;
    pub const LINK: u16 = 5;
    pub const QDISC: u16 = 6;
    pub const MASTER: u16 = 10;
    pub const TXQLEN: u16 = 13;
    pub const OPERSTATE: u16 = 16;
    pub const LINKMODE: u16 = 17;
    pub const LINKINFO: u16 = 18;
    pub const IFALIAS: u16 = 20;
    pub const GROUP: u16 = 27;
    pub const PROMISCUITY: u16 = 30;
    pub const NUM_TX_QUEUES: u16 = 31;
    pub const NUM_RX_QUEUES: u16 = 32;
    pub const CARRIER: u16 = 33;
    pub const MIN_MTU: u16 = 50;
    pub const MAX_MTU: u16 = 51;
    pub const PERM_ADDRESS: u16 = 54;
}

/// Nested IFLA_INFO_* attribute ids.
pub mod ifla_info {
    pub const KIND: u16 = 1;
    pub const DATA: u16 = 2;
    pub const SLAVE_KIND: u16 = 4;
    pub const SLAVE_DATA: u16 = 5;
}

static LINKINFO_SCHEMA: Schema = Schema {
    name: "IFLA_LINKINFO",
    entries: &[
        (ifla_info::KIND, AttrKind::Bytes),
        (ifla_info::DATA, AttrKind::Bytes),
        (ifla_info::SLAVE_KIND, AttrKind::Bytes),
        (ifla_info::SLAVE_DATA, AttrKind::Bytes),
    ],
};

/// Attribute layout of RTM_NEWLINK / RTM_DELLINK.
pub static LINK_SCHEMA: Schema = Schema {
    name: "link",
    entries: &[
        (ifla::ADDRESS, AttrKind::Bytes),
        (ifla::BROADCAST, AttrKind::Bytes),
        (ifla::IFNAME, AttrKind::Bytes),
        (ifla::MTU, AttrKind::U32),
        (ifla::LINK, AttrKind::U32),
        (ifla::QDISC, AttrKind::Bytes),
        (ifla::MASTER, AttrKind::U32),
        (ifla::TXQLEN, AttrKind::U32),
        (ifla::OPERSTATE, AttrKind::U8),
        (ifla::LINKMODE, AttrKind::U8),
        (ifla::LINKINFO, AttrKind::Nested(&LINKINFO_SCHEMA)),
        (ifla::IFALIAS, AttrKind::Bytes),
        (ifla::GROUP, AttrKind::U32),
        (ifla::PROMISCUITY, AttrKind::U32),
        (ifla::NUM_TX_QUEUES, AttrKind::U32),
        (ifla::NUM_RX_QUEUES, AttrKind::U32),
        (ifla::CARRIER, AttrKind::U8),
        (ifla::MIN_MTU, AttrKind::U32),
        (ifla::MAX_MTU, AttrKind::U32),
        (ifla::PERM_ADDRESS, AttrKind::Bytes),
    ],
};

/// Interface flags (IFF_*).
pub mod iff {
    pub const UP: u32 = 0x1;
    pub const BROADCAST: u32 = 0x2;
    pub const LOOPBACK: u32 = 0x8;
    pub const POINTOPOINT: u32 = 0x10;
    pub const RUNNING: u32 = 0x40;
    pub const NOARP: u32 = 0x80;
    pub const PROMISC: u32 = 0x100;
    pub const MULTICAST: u32 = 0x1000;
    pub const LOWER_UP: u32 = 0x10000;
    pub const DORMANT: u32 = 0x20000;
}

/// Operational state (IF_OPER_*, RFC 2863).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OperState {
    #[default]
    Unknown = 0,
    NotPresent = 1,
    Down = 2,
    LowerLayerDown = 3,
    Testing = 4,
    Dormant = 5,
    Up = 6,
}

impl From<u8> for OperState {
    fn from(val: u8) -> Self {
        match val {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

impl OperState {
    /// Get the name of this state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOT_PRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        }
    }
}
