//! Kernel event source.
//!
//! [`EventSource`] owns a NETLINK_ROUTE socket subscribed to the configured
//! multicast groups and hands out decoded notifications one at a time.
//!
//! ```ignore
//! use linkstate::netlink::events::{EventSource, Group, SourceEvent};
//!
//! let mut source = EventSource::connect(&Group::ALL)?;
//! loop {
//!     match source.next().await? {
//!         SourceEvent::Network { event, seq, .. } => println!("{seq}: {event:?}"),
//!         SourceEvent::Overrun => println!("lost events, resync needed"),
//!         SourceEvent::Malformed(e) => eprintln!("dropped: {e}"),
//!         SourceEvent::Closed => break,
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::codec::{self, Message, Payload};
use super::error::{Error, Result};
use super::message::NlMsgType;
use super::messages::{AddressMessage, LinkMessage, RouteMessage};
use super::socket::rtnetlink_groups::*;
use super::socket::{NetlinkSocket, is_overrun};

/// Network events that can be received from the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A new link was created or an existing link changed.
    NewLink(LinkMessage),
    /// A link was deleted.
    DelLink(LinkMessage),
    /// A new address was added.
    NewAddress(AddressMessage),
    /// An address was removed.
    DelAddress(AddressMessage),
    /// A new route was added.
    NewRoute(RouteMessage),
    /// A route was removed.
    DelRoute(RouteMessage),
}

impl NetworkEvent {
    /// Returns true if this is a "new" event (add or change).
    pub fn is_new(&self) -> bool {
        matches!(
            self,
            NetworkEvent::NewLink(_) | NetworkEvent::NewAddress(_) | NetworkEvent::NewRoute(_)
        )
    }

    /// Returns true if this is a "delete" event.
    pub fn is_del(&self) -> bool {
        !self.is_new()
    }

    /// Interface index the event refers to, if any.
    pub fn ifindex(&self) -> Option<u32> {
        match self {
            NetworkEvent::NewLink(l) | NetworkEvent::DelLink(l) => Some(l.index),
            NetworkEvent::NewAddress(a) | NetworkEvent::DelAddress(a) => Some(a.index),
            NetworkEvent::NewRoute(r) | NetworkEvent::DelRoute(r) => r.oif,
        }
    }

    /// Build an event from a decoded message.
    ///
    /// Returns `None` for message types that are not link, address or route
    /// notifications (requests, control messages, other families).
    pub fn from_message(msg: &Message) -> Option<Result<Self>> {
        let ty = msg.msg_type();
        let event = match &msg.payload {
            Payload::Link(hdr, attrs) => {
                let link = LinkMessage::from_parts(hdr, attrs);
                match ty {
                    NlMsgType::RTM_NEWLINK => link.map(NetworkEvent::NewLink),
                    NlMsgType::RTM_DELLINK => link.map(NetworkEvent::DelLink),
                    _ => return None,
                }
            }
            Payload::Address(hdr, attrs) => {
                let addr = AddressMessage::from_parts(hdr, attrs);
                match ty {
                    NlMsgType::RTM_NEWADDR => addr.map(NetworkEvent::NewAddress),
                    NlMsgType::RTM_DELADDR => addr.map(NetworkEvent::DelAddress),
                    _ => return None,
                }
            }
            Payload::Route(hdr, attrs) => {
                let route = RouteMessage::from_parts(hdr, attrs);
                match ty {
                    NlMsgType::RTM_NEWROUTE => route.map(NetworkEvent::NewRoute),
                    NlMsgType::RTM_DELROUTE => route.map(NetworkEvent::DelRoute),
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(event.map_err(Error::into_malformed))
    }
}

/// Multicast groups the source can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Group {
    Link,
    Ipv4Addr,
    Ipv6Addr,
    Ipv4Route,
    Ipv6Route,
}

impl Group {
    /// Every group this crate understands.
    pub const ALL: [Group; 5] = [
        Group::Link,
        Group::Ipv4Addr,
        Group::Ipv6Addr,
        Group::Ipv4Route,
        Group::Ipv6Route,
    ];

    /// RTNLGRP_* number.
    pub fn id(self) -> u32 {
        match self {
            Group::Link => RTNLGRP_LINK,
            Group::Ipv4Addr => RTNLGRP_IPV4_IFADDR,
            Group::Ipv6Addr => RTNLGRP_IPV6_IFADDR,
            Group::Ipv4Route => RTNLGRP_IPV4_ROUTE,
            Group::Ipv6Route => RTNLGRP_IPV6_ROUTE,
        }
    }
}

/// One item produced by [`EventSource::next`].
#[derive(Debug)]
pub enum SourceEvent {
    /// A decoded notification with the header fields gap detection needs.
    Network {
        event: NetworkEvent,
        seq: u32,
        port_id: u32,
    },
    /// A message was dropped because it could not be decoded.
    Malformed(Error),
    /// The kernel dropped notifications (ENOBUFS or NLMSG_OVERRUN).
    Overrun,
    /// The source was closed through its [`CloseHandle`].
    Closed,
}

#[derive(Debug, Default)]
struct CloseState {
    closed: AtomicBool,
    notify: Notify,
}

/// Cloneable handle that shuts an [`EventSource`] down.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle {
    inner: Arc<CloseState>,
}

impl CloseHandle {
    /// Create an open handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the source. Pending and future `next()` calls return `Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolve once `close()` has been called.
    pub async fn closed(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Decoded kernel notifications from one subscribed socket.
pub struct EventSource {
    socket: NetlinkSocket,
    pending: VecDeque<SourceEvent>,
    close: CloseHandle,
}

impl EventSource {
    /// Open a socket and join `groups`.
    pub fn connect(groups: &[Group]) -> Result<Self> {
        Self::connect_with(groups, None, CloseHandle::new())
    }

    /// Open a socket with an optional SO_RCVBUF size, sharing `close` so a
    /// reconnected source stays closable through the same handle.
    pub fn connect_with(
        groups: &[Group],
        recv_buffer_size: Option<usize>,
        close: CloseHandle,
    ) -> Result<Self> {
        let mut socket = NetlinkSocket::new()?;
        if let Some(size) = recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        for group in groups {
            socket.add_membership(group.id())?;
        }
        debug!(port_id = socket.pid(), ?groups, "event source connected");

        Ok(Self {
            socket,
            pending: VecDeque::new(),
            close,
        })
    }

    /// Handle that closes this source.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Local port id of the subscribed socket.
    pub fn port_id(&self) -> u32 {
        self.socket.pid()
    }

    /// Wait for the next event.
    ///
    /// Receive failures other than ENOBUFS are returned as
    /// `Error::Connection`; the caller reconnects.
    pub async fn next(&mut self) -> Result<SourceEvent> {
        loop {
            if self.close.is_closed() {
                return Ok(SourceEvent::Closed);
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let received = tokio::select! {
                biased;
                _ = self.close.closed() => return Ok(SourceEvent::Closed),
                r = self.socket.recv_msg() => r,
            };

            match received {
                Ok(data) => self.pending.extend(events_from_datagram(&data)),
                Err(e) if is_overrun(&e) => return Ok(SourceEvent::Overrun),
                Err(e) => return Err(Error::connection("recv", e)),
            }
        }
    }
}

/// Turn one received datagram into source events, in order.
pub fn events_from_datagram(data: &[u8]) -> Vec<SourceEvent> {
    let mut out = Vec::new();
    for item in codec::decode(data) {
        let msg = match item {
            Ok(msg) => msg,
            Err(e) => {
                out.push(SourceEvent::Malformed(e));
                continue;
            }
        };
        if msg.payload == Payload::Overrun {
            out.push(SourceEvent::Overrun);
            continue;
        }
        match NetworkEvent::from_message(&msg) {
            Some(Ok(event)) => out.push(SourceEvent::Network {
                event,
                seq: msg.seq(),
                port_id: msg.port_id(),
            }),
            Some(Err(e)) => out.push(SourceEvent::Malformed(e)),
            None => trace!(msg_type = msg.msg_type(), "ignoring message"),
        }
    }
    out
}
