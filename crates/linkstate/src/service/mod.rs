//! Read-only query surface over the store.
//!
//! [`QueryService`] answers every call from exactly one snapshot, so a
//! response never mixes two generations. [`ChangeNotifier`] turns bursts of
//! store publications into single [`ChangeBatch`]es.

pub mod dbus;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::netlink::messages::format_addr;
use crate::state::{Address, Generation, Interface, Route, Snapshot, StoreReader};

/// Errors returned to query clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("no interface named {0}")]
    NotFound(String),
    #[error("no interface with index {0}")]
    NotFoundIndex(u32),
}

/// Exported view of an interface: (index, name, state, mtu, hwaddr).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub index: u32,
    pub name: String,
    pub state: String,
    pub mtu: u32,
    pub hw_addr: Vec<u8>,
}

impl From<&Interface> for InterfaceRecord {
    fn from(iface: &Interface) -> Self {
        Self {
            index: iface.index,
            name: iface.name.clone(),
            state: iface.oper_state.name().to_string(),
            mtu: iface.mtu,
            hw_addr: iface.hw_addr.clone(),
        }
    }
}

/// Exported view of an address: (family, address, prefix length, scope).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub family: u8,
    pub address: String,
    pub prefix_len: u8,
    pub scope: u8,
}

impl From<&Address> for AddressRecord {
    fn from(addr: &Address) -> Self {
        Self {
            family: addr.family,
            address: format_addr(&addr.address),
            prefix_len: addr.prefix_len,
            scope: addr.scope.into(),
        }
    }
}

/// Exported view of a route: (family, destination, prefix length, table,
/// output interface or 0, gateway or "").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub family: u8,
    pub destination: String,
    pub prefix_len: u8,
    pub table: u32,
    pub oif: u32,
    pub gateway: String,
}

impl From<&Route> for RouteRecord {
    fn from(route: &Route) -> Self {
        let destination = if route.dst.is_empty() {
            "default".to_string()
        } else {
            format_addr(&route.dst)
        };
        Self {
            family: route.family,
            destination,
            prefix_len: route.dst_len,
            table: route.table,
            oif: route.oif.unwrap_or(0),
            gateway: route.gateway.as_deref().map(format_addr).unwrap_or_default(),
        }
    }
}

/// Query handlers. Cheap to clone; every clone reads the same store.
#[derive(Debug, Clone)]
pub struct QueryService {
    reader: StoreReader,
}

impl QueryService {
    pub fn new(reader: StoreReader) -> Self {
        Self { reader }
    }

    pub fn list_interfaces(&self) -> (Generation, Vec<InterfaceRecord>) {
        let snap = self.reader.snapshot();
        let records = snap.interfaces.values().map(InterfaceRecord::from).collect();
        (snap.generation, records)
    }

    pub fn get_interface(&self, name: &str) -> Result<(Generation, InterfaceRecord), QueryError> {
        let snap = self.reader.snapshot();
        snap.interface_by_name(name)
            .map(|i| (snap.generation, i.into()))
            .ok_or_else(|| QueryError::NotFound(name.to_string()))
    }

    pub fn get_interface_by_index(
        &self,
        index: u32,
    ) -> Result<(Generation, InterfaceRecord), QueryError> {
        let snap = self.reader.snapshot();
        snap.interface(index)
            .map(|i| (snap.generation, i.into()))
            .ok_or(QueryError::NotFoundIndex(index))
    }

    /// Addresses of one interface; empty when the index is unknown.
    pub fn list_addresses(&self, index: u32) -> (Generation, Vec<AddressRecord>) {
        let snap = self.reader.snapshot();
        let records = snap.addresses_of(index).map(AddressRecord::from).collect();
        (snap.generation, records)
    }

    pub fn list_routes(&self) -> (Generation, Vec<RouteRecord>) {
        let snap = self.reader.snapshot();
        let records = snap.routes.values().map(RouteRecord::from).collect();
        (snap.generation, records)
    }

    /// Current generation and stale flag.
    pub fn status(&self) -> (Generation, bool) {
        let snap = self.reader.snapshot();
        (snap.generation, snap.stale)
    }
}

/// Interfaces that changed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub generation: Generation,
    pub stale: bool,
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
    /// Interfaces whose attributes or addresses changed.
    pub changed: Vec<u32>,
}

impl ChangeBatch {
    /// Diff `old` against `new`.
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        let mut batch = Self {
            generation: new.generation,
            stale: new.stale,
            ..Default::default()
        };

        for (index, iface) in &new.interfaces {
            match old.interfaces.get(index) {
                None => batch.added.push(*index),
                Some(prev) if prev != iface => batch.changed.push(*index),
                Some(_) => {}
            }
        }
        batch.removed = old
            .interfaces
            .keys()
            .filter(|i| !new.interfaces.contains_key(i))
            .copied()
            .collect();

        let mut touched = BTreeSet::new();
        for (key, addr) in &new.addresses {
            if old.addresses.get(key) != Some(addr) {
                touched.insert(key.index);
            }
        }
        for key in old.addresses.keys() {
            if !new.addresses.contains_key(key) {
                touched.insert(key.index);
            }
        }
        for index in touched {
            if new.interfaces.contains_key(&index)
                && old.interfaces.contains_key(&index)
                && !batch.changed.contains(&index)
            {
                batch.changed.push(index);
            }
        }
        batch.changed.sort_unstable();
        batch
    }

    /// True if no interface was added, removed or changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Coalesces store publications into change batches.
pub struct ChangeNotifier {
    reader: StoreReader,
    last: Arc<Snapshot>,
    window: Duration,
}

impl ChangeNotifier {
    /// Start from the reader's current snapshot.
    pub fn new(mut reader: StoreReader, window: Duration) -> Self {
        let last = reader.latest();
        Self {
            reader,
            last,
            window,
        }
    }

    /// Wait for the next burst of changes.
    ///
    /// After the first publication the notifier waits `window` so that
    /// publications arriving meanwhile land in the same batch. Returns
    /// `None` once the store is gone.
    pub async fn next_batch(&mut self) -> Option<ChangeBatch> {
        loop {
            self.reader.changed().await.ok()?;
            if !self.window.is_zero() {
                tokio::time::sleep(self.window).await;
            }
            let current = self.reader.latest();
            let unchanged =
                current.generation == self.last.generation && current.stale == self.last.stale;
            if unchanged {
                continue;
            }
            let batch = ChangeBatch::between(&self.last, &current);
            self.last = current;
            return Some(batch);
        }
    }
}
