//! Async NETLINK_ROUTE plumbing: framing, attribute codec, typed messages,
//! the subscribed event source and the dump connection.
//!
//! # Dumping
//!
//! ```ignore
//! use linkstate::netlink::Connection;
//!
//! let conn = Connection::new()?;
//! for link in conn.get_links().await? {
//!     println!("{}: {}", link.index, link.name.unwrap_or_default());
//! }
//! ```
//!
//! # Event Monitoring
//!
//! ```ignore
//! use linkstate::netlink::events::{EventSource, Group, SourceEvent};
//!
//! let mut source = EventSource::connect(&[Group::Link])?;
//! while let SourceEvent::Network { event, .. } = source.next().await? {
//!     println!("{event:?}");
//! }
//! ```

pub mod attr;
pub mod builder;
pub mod codec;
pub mod connection;
mod error;
pub mod events;
pub mod message;
pub mod messages;
pub mod socket;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::MessageBuilder;
pub use codec::{DumpRequest, Message, Payload, TableKind, decode, encode};
pub use connection::Connection;
pub use error::{Error, Result};
pub use events::{CloseHandle, EventSource, Group, NetworkEvent, SourceEvent};
pub use message::{MessageIter, NlMsgHdr, NlMsgType};
