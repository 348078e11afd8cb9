//! Batch decoding of NETLINK_ROUTE datagrams and encoding of dump requests.
//!
//! A datagram holds one or more framed messages. [`decode`] turns every frame
//! into its own `Result`, so a bad message costs only itself: as long as the
//! outer length field is sane the next frame is still found and decoded.

use super::attr::AttrMap;
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError, NlMsgHdr, NlMsgType};
use super::types::addr::{ADDR_SCHEMA, IfAddrMsg};
use super::types::link::{IfInfoMsg, LINK_SCHEMA};
use super::types::route::{ROUTE_SCHEMA, RtMsg};

/// Decoded body of one netlink message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// RTM_NEWLINK, RTM_DELLINK or RTM_GETLINK.
    Link(IfInfoMsg, AttrMap),
    /// RTM_NEWADDR, RTM_DELADDR or RTM_GETADDR.
    Address(IfAddrMsg, AttrMap),
    /// RTM_NEWROUTE, RTM_DELROUTE or RTM_GETROUTE.
    Route(RtMsg, AttrMap),
    /// NLMSG_DONE, with the dump status the kernel appended (0 on success).
    Done(i32),
    /// NLMSG_ERROR. `errno` is negative; 0 is an ACK.
    Error {
        /// Negative errno, or 0.
        errno: i32,
        /// Header of the request that failed.
        request: NlMsgHdr,
    },
    /// NLMSG_OVERRUN.
    Overrun,
    /// NLMSG_NOOP.
    Noop,
    /// Any other message type, kept verbatim.
    Other(Vec<u8>),
}

/// One decoded netlink message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: NlMsgHdr,
    pub payload: Payload,
}

impl Message {
    /// Message type from the header.
    pub fn msg_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    /// Sequence number from the header.
    pub fn seq(&self) -> u32 {
        self.header.nlmsg_seq
    }

    /// Port id of the sender.
    pub fn port_id(&self) -> u32 {
        self.header.nlmsg_pid
    }
}

/// Decode every message framed in `data`.
pub fn decode(data: &[u8]) -> Vec<Result<Message>> {
    MessageIter::new(data)
        .map(|item| {
            let (header, payload) = item?;
            decode_payload(header, payload)
                .map(|payload| Message {
                    header: *header,
                    payload,
                })
                .map_err(|e| match e.into_malformed() {
                    Error::MalformedMessage(reason) => Error::MalformedMessage(format!(
                        "type {} seq {}: {}",
                        header.nlmsg_type, header.nlmsg_seq, reason
                    )),
                    other => other,
                })
        })
        .collect()
}

fn decode_payload(header: &NlMsgHdr, data: &[u8]) -> Result<Payload> {
    Ok(match header.nlmsg_type {
        NlMsgType::NOOP => Payload::Noop,
        NlMsgType::OVERRUN => Payload::Overrun,
        NlMsgType::DONE => {
            // Older kernels send an empty DONE.
            let status = data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .map(i32::from_ne_bytes)
                .unwrap_or(0);
            Payload::Done(status)
        }
        NlMsgType::ERROR => {
            let err = NlMsgError::from_bytes(data)?;
            Payload::Error {
                errno: err.error,
                request: err.msg,
            }
        }
        NlMsgType::RTM_NEWLINK | NlMsgType::RTM_DELLINK | NlMsgType::RTM_GETLINK => {
            let (hdr, attrs) = IfInfoMsg::split(data)?;
            Payload::Link(hdr, AttrMap::parse(attrs, &LINK_SCHEMA)?)
        }
        NlMsgType::RTM_NEWADDR | NlMsgType::RTM_DELADDR | NlMsgType::RTM_GETADDR => {
            let (hdr, attrs) = IfAddrMsg::split(data)?;
            Payload::Address(hdr, AttrMap::parse(attrs, &ADDR_SCHEMA)?)
        }
        NlMsgType::RTM_NEWROUTE | NlMsgType::RTM_DELROUTE | NlMsgType::RTM_GETROUTE => {
            let (hdr, attrs) = RtMsg::split(data)?;
            Payload::Route(hdr, AttrMap::parse(attrs, &ROUTE_SCHEMA)?)
        }
        _ => Payload::Other(data.to_vec()),
    })
}

/// The kernel tables a full dump covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Links,
    Addresses,
    Routes,
}

impl TableKind {
    /// All tables, in the order a resync dumps them.
    pub const ALL: [TableKind; 3] = [Self::Links, Self::Addresses, Self::Routes];

    /// RTM_GET* type requesting this table.
    pub fn request_type(self) -> u16 {
        match self {
            Self::Links => NlMsgType::RTM_GETLINK,
            Self::Addresses => NlMsgType::RTM_GETADDR,
            Self::Routes => NlMsgType::RTM_GETROUTE,
        }
    }

    /// Name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::Addresses => "addresses",
            Self::Routes => "routes",
        }
    }
}

/// A full-table dump request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpRequest {
    pub table: TableKind,
    /// Address family filter; AF_UNSPEC dumps every family.
    pub family: u8,
    pub seq: u32,
    pub port_id: u32,
}

impl DumpRequest {
    /// Create a request for every family of `table`.
    pub fn new(table: TableKind, seq: u32) -> Self {
        Self {
            table,
            family: super::types::family::AF_UNSPEC,
            seq,
            port_id: 0,
        }
    }

    /// Restrict the dump to one address family.
    pub fn with_family(mut self, family: u8) -> Self {
        self.family = family;
        self
    }

    /// Encode as a NLM_F_REQUEST | NLM_F_DUMP message.
    pub fn encode(&self) -> Vec<u8> {
        let mut builder = MessageBuilder::new(self.table.request_type(), NLM_F_REQUEST | NLM_F_DUMP);
        match self.table {
            TableKind::Links => {
                let mut hdr = IfInfoMsg::new();
                hdr.ifi_family = self.family;
                builder.append(&hdr);
            }
            TableKind::Addresses => builder.append(&IfAddrMsg::new().with_family(self.family)),
            TableKind::Routes => builder.append(&RtMsg::new().with_family(self.family)),
        }
        builder.set_seq(self.seq);
        builder.set_pid(self.port_id);
        builder.finish()
    }
}

/// Encode a dump request.
pub fn encode(request: &DumpRequest) -> Vec<u8> {
    request.encode()
}
