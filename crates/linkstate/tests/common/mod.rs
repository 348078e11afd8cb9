//! Common test utilities for integration tests.
//!
//! Provides message builders, a scriptable [`FakeDumper`] and helper
//! macros for tests that need a real kernel.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use linkstate::netlink::messages::{AddressMessage, LinkMessage, RouteMessage};
use linkstate::netlink::types::Scope;
use linkstate::netlink::types::family::{AF_INET, AF_INET6};
use linkstate::netlink::types::link::OperState;
use linkstate::netlink::types::route::{RouteProtocol, RouteType};
use linkstate::netlink::{Error, NetworkEvent, Result, SourceEvent};
use linkstate::Dumper;

/// A link notification payload.
pub fn link(index: u32, name: &str, state: OperState) -> LinkMessage {
    LinkMessage {
        index,
        name: Some(name.into()),
        oper_state: state,
        mtu: Some(1500),
        hw_addr: Some(vec![0x02, 0, 0, 0, 0, index as u8]),
        ..Default::default()
    }
}

/// An IPv4 address on `index`.
pub fn addr_v4(index: u32, ip: [u8; 4], prefix_len: u8) -> AddressMessage {
    AddressMessage {
        family: AF_INET,
        prefix_len,
        scope: Scope::Universe,
        index,
        address: ip.to_vec(),
        label: None,
        flags: 0,
    }
}

/// An IPv6 address on `index`.
pub fn addr_v6(index: u32, ip: [u8; 16], prefix_len: u8) -> AddressMessage {
    AddressMessage {
        family: AF_INET6,
        prefix_len,
        scope: Scope::Link,
        index,
        address: ip.to_vec(),
        label: None,
        flags: 0,
    }
}

/// An IPv4 route in the main table.
pub fn route_v4(dst: [u8; 4], dst_len: u8, oif: u32, gateway: Option<[u8; 4]>) -> RouteMessage {
    RouteMessage {
        family: AF_INET,
        dst: if dst_len == 0 { Vec::new() } else { dst.to_vec() },
        dst_len,
        table: 254,
        oif: Some(oif),
        gateway: gateway.map(|g| g.to_vec()),
        priority: None,
        protocol: RouteProtocol::Static,
        scope: Scope::Universe,
        route_type: RouteType::Unicast,
    }
}

/// Wrap an event the way the source hands it out.
pub fn network(event: NetworkEvent, port_id: u32, seq: u32) -> SourceEvent {
    SourceEvent::Network {
        event,
        seq,
        port_id,
    }
}

/// Dumper with scripted contents and failures.
#[derive(Default)]
pub struct FakeDumper {
    links: Mutex<Vec<LinkMessage>>,
    addresses: Mutex<Vec<AddressMessage>>,
    routes: Mutex<Vec<RouteMessage>>,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FakeDumper {
    pub fn new(links: Vec<LinkMessage>) -> Self {
        Self {
            links: Mutex::new(links),
            ..Default::default()
        }
    }

    pub fn with_addresses(self, addresses: Vec<AddressMessage>) -> Self {
        *self.addresses.lock().unwrap() = addresses;
        self
    }

    pub fn with_routes(self, routes: Vec<RouteMessage>) -> Self {
        *self.routes.lock().unwrap() = routes;
        self
    }

    /// Fail the next `n` link dumps.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn set_links(&self, links: Vec<LinkMessage>) {
        *self.links.lock().unwrap() = links;
    }

    /// Number of link dumps requested so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Dumper for FakeDumper {
    async fn dump_links(&self) -> Result<Vec<LinkMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::DumpInterrupted { table: "links" });
        }
        Ok(self.links.lock().unwrap().clone())
    }

    async fn dump_addresses(&self, family: u8) -> Result<Vec<AddressMessage>> {
        let all = self.addresses.lock().unwrap();
        Ok(all.iter().filter(|a| a.family == family).cloned().collect())
    }

    async fn dump_routes(&self, family: u8) -> Result<Vec<RouteMessage>> {
        let all = self.routes.lock().unwrap();
        Ok(all.iter().filter(|r| r.family == family).cloned().collect())
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Move the calling thread into a fresh network namespace.
///
/// Sockets opened afterwards on this thread, and processes it spawns, see
/// only the new namespace. Use with the current-thread test runtime.
pub fn isolate_netns() -> std::io::Result<()> {
    let rc = unsafe { libc::unshare(libc::CLONE_NEWNET) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Run `ip` with `args`, failing the test on error.
pub fn ip(args: &[&str]) {
    let status = std::process::Command::new("ip")
        .args(args)
        .status()
        .expect("failed to run ip");
    assert!(status.success(), "ip {:?} failed", args);
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return;
        }
    };
}
