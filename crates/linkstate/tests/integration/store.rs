//! Store behaviour seen through readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use linkstate::netlink::NetworkEvent;
use linkstate::netlink::types::link::OperState;
use linkstate::{QueryService, Store};

use crate::common::{addr_v4, addr_v6, link, route_v4};

#[test]
fn test_link_lifecycle_yields_surviving_set() {
    let mut store = Store::new();
    store.apply(&NetworkEvent::NewLink(link(1, "lo", OperState::Unknown)));
    store.apply(&NetworkEvent::NewLink(link(2, "eth0", OperState::Down)));
    store.apply(&NetworkEvent::NewLink(link(3, "eth1", OperState::Down)));
    store.apply(&NetworkEvent::NewLink(link(2, "wan0", OperState::Up)));
    store.apply(&NetworkEvent::DelLink(link(3, "eth1", OperState::Down)));

    let snap = store.snapshot();
    let names: Vec<_> = snap.interfaces.values().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["lo", "wan0"]);
    assert_eq!(snap.interface(2).unwrap().oper_state, OperState::Up);

    // Re-adding an identical link only moves the generation.
    let before = store.snapshot();
    let generation = store.apply(&NetworkEvent::NewLink(link(2, "wan0", OperState::Up)));
    let after = store.snapshot();
    assert_eq!(generation, before.generation + 1);
    assert_eq!(before.interfaces, after.interfaces);
}

#[test]
fn test_rename_keeps_addresses() {
    let mut store = Store::new();
    store.apply(&NetworkEvent::NewLink(link(2, "eth0", OperState::Up)));
    store.apply(&NetworkEvent::NewAddress(addr_v4(2, [10, 0, 0, 2], 24)));
    store.apply(&NetworkEvent::NewLink(link(2, "lan0", OperState::Up)));

    let svc = QueryService::new(store.reader());
    assert!(svc.get_interface("eth0").is_err());
    assert_eq!(svc.get_interface("lan0").unwrap().1.index, 2);
    assert_eq!(svc.list_addresses(2).1.len(), 1);
}

#[test]
fn test_delete_link_empties_addresses() {
    let mut store = Store::new();
    store.apply(&NetworkEvent::NewLink(link(4, "eth2", OperState::Up)));
    store.apply(&NetworkEvent::NewAddress(addr_v4(4, [10, 1, 0, 1], 24)));
    store.apply(&NetworkEvent::NewAddress(addr_v6(
        4,
        [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
        64,
    )));
    store.apply(&NetworkEvent::NewRoute(route_v4([10, 1, 0, 0], 24, 4, None)));

    let svc = QueryService::new(store.reader());
    assert_eq!(svc.list_addresses(4).1.len(), 2);
    assert_eq!(svc.list_routes().1.len(), 1);

    store.apply(&NetworkEvent::DelLink(link(4, "eth2", OperState::Up)));
    let (generation, addrs) = svc.list_addresses(4);
    assert!(addrs.is_empty());
    assert!(svc.list_routes().1.is_empty());
    assert_eq!(generation, store.generation());
}

#[test]
fn test_orphans_are_ignored() {
    let mut store = Store::new();
    let generation = store.apply(&NetworkEvent::NewAddress(addr_v4(9, [10, 9, 9, 9], 8)));
    assert_eq!(generation, 0);
    assert!(store.snapshot().addresses.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_snapshots_are_consistent() {
    let mut store = Store::new();
    store.apply(&NetworkEvent::NewLink(link(1, "lo", OperState::Unknown)));
    let reader = store.reader();
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..3 {
        let reader = reader.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut checked = 0u64;
            let mut last_generation = 0;
            while !done.load(Ordering::Acquire) {
                let snap = reader.snapshot();
                assert!(snap.is_consistent(), "generation {}", snap.generation);
                assert!(snap.generation >= last_generation);
                last_generation = snap.generation;
                checked += 1;
                tokio::task::yield_now().await;
            }
            checked
        }));
    }

    let writer = tokio::spawn(async move {
        for round in 0..500u32 {
            let index = 10 + round % 7;
            let octet = (round % 250) as u8;
            store.apply(&NetworkEvent::NewLink(link(index, "veth", OperState::Up)));
            store.apply(&NetworkEvent::NewAddress(addr_v4(index, [10, 0, 0, octet], 24)));
            store.apply(&NetworkEvent::NewRoute(route_v4([10, 0, octet, 0], 24, index, None)));
            if round % 3 == 0 {
                store.apply(&NetworkEvent::DelLink(link(index, "veth", OperState::Up)));
            }
            tokio::task::yield_now().await;
        }
        store
    });

    let store = writer.await.unwrap();
    done.store(true, Ordering::Release);
    for handle in readers {
        assert!(handle.await.unwrap() > 0);
    }
    assert!(store.snapshot().is_consistent());
}

#[test]
fn test_batch_publishes_once() {
    let mut store = Store::new();
    let mut reader = store.reader();
    let _ = reader.latest();

    let events = [
        NetworkEvent::NewLink(link(1, "lo", OperState::Unknown)),
        NetworkEvent::NewLink(link(2, "eth0", OperState::Up)),
        NetworkEvent::NewAddress(addr_v4(2, [192, 168, 0, 2], 24)),
    ];
    let generation = store.apply_batch(&events);
    assert_eq!(generation, 3);

    let snap = reader.latest();
    assert_eq!(snap.generation, 3);
    assert_eq!(snap.addresses.len(), 1);
}
