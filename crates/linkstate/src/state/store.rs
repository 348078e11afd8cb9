//! The authoritative state tables.
//!
//! A single owner mutates the [`Store`]; after every mutation it publishes a
//! fresh `Arc<Snapshot>` through a `tokio::sync::watch` channel. Readers hold
//! [`StoreReader`]s and only ever see whole snapshots.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::model::{Address, Generation, Interface, Route, Snapshot};
use crate::netlink::NetworkEvent;
use crate::netlink::messages::{AddressMessage, LinkMessage, RouteMessage};
use crate::netlink::types::family;

/// Result of checking a message sequence number against the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Sequence 0: a kernel-originated notification, not tracked.
    Unsequenced,
    /// First sequence seen from this port id; the watermark starts here.
    First,
    /// Exactly one past the watermark.
    InOrder,
    /// Equal to the watermark. One request can produce several
    /// notifications that share its sequence number.
    Same,
    /// Behind the watermark. Applied idempotently, watermark unchanged.
    Redelivery,
    /// Messages between `expected` and `actual` were lost.
    Gap { expected: u32, actual: u32 },
}

impl SequenceCheck {
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// Last applied (port id, sequence) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watermark {
    port_id: u32,
    seq: u32,
}

/// Mutable owner of the state tables.
pub struct Store {
    current: Snapshot,
    watermark: Option<Watermark>,
    tx: watch::Sender<Arc<Snapshot>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store at generation 0.
    ///
    /// The store is stale until the first [`replace_all`](Self::replace_all).
    pub fn new() -> Self {
        let current = Snapshot {
            stale: true,
            ..Default::default()
        };
        let (tx, _) = watch::channel(Arc::new(current.clone()));
        Self {
            current,
            watermark: None,
            tx,
        }
    }

    /// A cloneable read handle.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    pub fn generation(&self) -> Generation {
        self.current.generation
    }

    /// Apply one event and publish the result.
    ///
    /// Returns the generation after the event. Events that are ignored
    /// (unknown family, unknown parent interface, deleting something absent)
    /// leave the generation unchanged.
    pub fn apply(&mut self, event: &NetworkEvent) -> Generation {
        if self.apply_one(event) {
            self.publish();
        }
        self.current.generation
    }

    /// Apply a burst of events and publish once.
    pub fn apply_batch<'a>(&mut self, events: impl IntoIterator<Item = &'a NetworkEvent>) -> Generation {
        let mut changed = false;
        for event in events {
            changed |= self.apply_one(event);
        }
        if changed {
            self.publish();
        }
        self.current.generation
    }

    /// Replace every table with a full dump in one publication.
    ///
    /// Addresses and routes whose interface is not in `links` are dropped.
    /// A complete dump is fresh by definition, so the stale flag is cleared.
    pub fn replace_all(
        &mut self,
        links: Vec<LinkMessage>,
        addresses: Vec<AddressMessage>,
        routes: Vec<RouteMessage>,
    ) -> Generation {
        let mut next = Snapshot {
            generation: self.current.generation + 1,
            ..Default::default()
        };

        for link in &links {
            next.interfaces.insert(link.index, Interface::from_link(link));
        }

        let mut dropped = 0usize;
        for msg in &addresses {
            if !is_ip_family(msg.family) || !next.interfaces.contains_key(&msg.index) {
                dropped += 1;
                continue;
            }
            let addr = Address::from_message(msg);
            next.addresses.insert(addr.key(), addr);
        }
        for msg in &routes {
            let orphan = msg.oif.is_some_and(|oif| !next.interfaces.contains_key(&oif));
            if !is_ip_family(msg.family) || orphan {
                dropped += 1;
                continue;
            }
            let route = Route::from_message(msg);
            next.routes.insert(route.key(), route);
        }
        if dropped > 0 {
            debug!(dropped, "full replace skipped entries without a known interface");
        }

        self.current = next;
        self.publish();
        self.current.generation
    }

    /// Set or clear the stale flag. Publishes only on change.
    pub fn set_stale(&mut self, stale: bool) {
        if self.current.stale != stale {
            self.current.stale = stale;
            self.publish();
        }
    }

    pub fn is_stale(&self) -> bool {
        self.current.stale
    }

    /// Check `seq` from `port_id` against the watermark and advance it.
    pub fn observe_sequence(&mut self, port_id: u32, seq: u32) -> SequenceCheck {
        if seq == 0 {
            return SequenceCheck::Unsequenced;
        }

        let last = match self.watermark {
            Some(w) if w.port_id == port_id => w.seq,
            _ => {
                self.watermark = Some(Watermark { port_id, seq });
                return SequenceCheck::First;
            }
        };

        // Sequence 0 is never assigned, so a wrap from u32::MAX lands on 1.
        let mut distance = seq.wrapping_sub(last);
        if seq < last && distance < 1 << 31 {
            distance -= 1;
        }
        let check = match distance {
            0 => SequenceCheck::Same,
            1 => SequenceCheck::InOrder,
            d if d >= 1 << 31 => return SequenceCheck::Redelivery,
            _ => SequenceCheck::Gap {
                expected: last.wrapping_add(1).max(1),
                actual: seq,
            },
        };
        self.watermark = Some(Watermark { port_id, seq });
        check
    }

    /// Forget the watermark; the next sequenced message starts a new one.
    pub fn reset_watermark(&mut self) {
        self.watermark = None;
    }

    fn publish(&self) {
        self.tx.send_replace(Arc::new(self.current.clone()));
    }

    fn apply_one(&mut self, event: &NetworkEvent) -> bool {
        let tables = &mut self.current;
        let changed = match event {
            NetworkEvent::NewLink(link) => {
                match tables.interfaces.get_mut(&link.index) {
                    Some(iface) => iface.update(link),
                    None => {
                        tables
                            .interfaces
                            .insert(link.index, Interface::from_link(link));
                    }
                }
                true
            }
            NetworkEvent::DelLink(link) => {
                if tables.interfaces.remove(&link.index).is_none() {
                    debug!(index = link.index, "delete for unknown link");
                    return false;
                }
                tables.addresses.retain(|k, _| k.index != link.index);
                tables.routes.retain(|k, _| k.oif != Some(link.index));
                true
            }
            NetworkEvent::NewAddress(msg) => {
                if !is_ip_family(msg.family) {
                    debug!(family = msg.family, "ignoring address of unknown family");
                    return false;
                }
                if !tables.interfaces.contains_key(&msg.index) {
                    warn!(index = msg.index, "ignoring address for unknown interface");
                    return false;
                }
                let addr = Address::from_message(msg);
                tables.addresses.insert(addr.key(), addr);
                true
            }
            NetworkEvent::DelAddress(msg) => {
                let key = Address::from_message(msg).key();
                tables.addresses.remove(&key).is_some()
            }
            NetworkEvent::NewRoute(msg) => {
                if !is_ip_family(msg.family) {
                    debug!(family = msg.family, "ignoring route of unknown family");
                    return false;
                }
                if let Some(oif) = msg.oif {
                    if !tables.interfaces.contains_key(&oif) {
                        warn!(oif, "ignoring route via unknown interface");
                        return false;
                    }
                }
                let route = Route::from_message(msg);
                tables.routes.insert(route.key(), route);
                true
            }
            NetworkEvent::DelRoute(msg) => {
                let key = Route::from_message(msg).key();
                tables.routes.remove(&key).is_some()
            }
        };

        if changed {
            tables.generation += 1;
            debug!(generation = tables.generation, ?event, "applied");
        }
        changed
    }
}

fn is_ip_family(f: u8) -> bool {
    f == family::AF_INET || f == family::AF_INET6
}

/// Read handle onto the published snapshots.
#[derive(Debug, Clone)]
pub struct StoreReader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl StoreReader {
    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }

    /// The latest published snapshot, marked as seen for [`changed`](Self::changed).
    pub fn latest(&mut self) -> Arc<Snapshot> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait until a snapshot newer than the last one seen by this reader
    /// is published. Fails once the store has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<Snapshot>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
