//! Request/response connection used for full-table dumps.
//!
//! The connection has its own socket with no multicast membership, so every
//! datagram it receives is a reply to one of its own requests.

use tracing::{debug, warn};

use super::codec::{self, DumpRequest, Message, Payload, TableKind};
use super::error::{Error, Result};
use super::messages::{AddressMessage, LinkMessage, RouteMessage};
use super::socket::NetlinkSocket;

/// High-level netlink connection.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a new NETLINK_ROUTE request socket.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Local port id.
    pub fn port_id(&self) -> u32 {
        self.socket.pid()
    }

    /// Send a dump request and collect every reply up to NLMSG_DONE.
    ///
    /// Replies carrying another sequence number (left over from an earlier
    /// dump that was abandoned) are skipped. Undecodable replies are logged
    /// and dropped. If any reply carries NLM_F_DUMP_INTR the dump is drained
    /// and then reported as [`Error::DumpInterrupted`].
    pub async fn dump(&self, table: TableKind, family: u8) -> Result<Vec<Message>> {
        let request = DumpRequest {
            table,
            family,
            seq: self.socket.next_seq(),
            port_id: self.socket.pid(),
        };
        self.socket.send(&codec::encode(&request)).await?;

        let mut responses = Vec::new();
        let mut interrupted = false;

        loop {
            let data = self.socket.recv_msg().await?;
            let mut done = false;

            for item in codec::decode(&data) {
                let msg = match item {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(table = table.name(), error = %e, "dropping undecodable dump reply");
                        continue;
                    }
                };

                if msg.seq() != request.seq {
                    continue;
                }
                if msg.header.is_dump_interrupted() {
                    interrupted = true;
                }

                match &msg.payload {
                    Payload::Done(status) if *status < 0 => return Err(Error::from_errno(*status)),
                    Payload::Done(_) => {
                        done = true;
                        break;
                    }
                    Payload::Error { errno, .. } if *errno != 0 => {
                        return Err(Error::from_errno(*errno));
                    }
                    Payload::Error { .. } | Payload::Noop => {}
                    _ => responses.push(msg),
                }
            }

            if done {
                break;
            }
        }

        if interrupted {
            return Err(Error::DumpInterrupted {
                table: table.name(),
            });
        }

        debug!(
            table = table.name(),
            family,
            count = responses.len(),
            "dump complete"
        );
        Ok(responses)
    }

    /// Dump all links.
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        let msgs = self.dump(TableKind::Links, 0).await?;
        Ok(typed(msgs, |p| match p {
            Payload::Link(h, a) => Some(LinkMessage::from_parts(h, a)),
            _ => None,
        }))
    }

    /// Dump all addresses of one family (AF_UNSPEC for all).
    pub async fn get_addresses(&self, family: u8) -> Result<Vec<AddressMessage>> {
        let msgs = self.dump(TableKind::Addresses, family).await?;
        Ok(typed(msgs, |p| match p {
            Payload::Address(h, a) => Some(AddressMessage::from_parts(h, a)),
            _ => None,
        }))
    }

    /// Dump all routes of one family (AF_UNSPEC for all).
    pub async fn get_routes(&self, family: u8) -> Result<Vec<RouteMessage>> {
        let msgs = self.dump(TableKind::Routes, family).await?;
        Ok(typed(msgs, |p| match p {
            Payload::Route(h, a) => Some(RouteMessage::from_parts(h, a)),
            _ => None,
        }))
    }
}

fn typed<T>(msgs: Vec<Message>, f: impl Fn(&Payload) -> Option<Result<T>>) -> Vec<T> {
    msgs.iter()
        .filter_map(|m| match f(&m.payload)? {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "dropping dump entry");
                None
            }
        })
        .collect()
}
