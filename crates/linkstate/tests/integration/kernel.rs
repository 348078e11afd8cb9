//! Tests against the running kernel.
//!
//! Dump tests work unprivileged. Tests that create interfaces need root and
//! run in a private network namespace.

use std::time::Duration;

use linkstate::netlink::types::family::AF_INET;
use linkstate::netlink::{CloseHandle, Connection, EventSource, Group, NetworkEvent, SourceEvent};
use linkstate::reconcile::DumpPlan;
use linkstate::sync::SyncLoop;
use linkstate::{Config, ReconcileOutcome, Reconciler, Store};

use crate::common::{ip, isolate_netns};

#[tokio::test]
async fn test_dump_links_has_loopback() {
    let conn = Connection::new().unwrap();
    let links = conn.get_links().await.unwrap();
    let lo = links
        .iter()
        .find(|l| l.is_loopback())
        .expect("no loopback interface");
    assert_eq!(lo.name.as_deref(), Some("lo"));
}

#[tokio::test]
async fn test_resync_from_kernel() {
    let conn = Connection::new().unwrap();
    let config = Config::default();
    let mut store = Store::new();
    let mut rec = Reconciler::new(
        config.reconcile.clone(),
        DumpPlan {
            address_families: config.address_families(),
            route_families: config.route_families(),
        },
    );

    let outcome = rec.resync(&mut store, &conn).await;
    assert!(matches!(outcome, ReconcileOutcome::Synced { generation: 1 }));

    let snap = store.snapshot();
    assert!(snap.interface_by_name("lo").is_some());
    assert!(snap.is_consistent());
}

#[tokio::test]
async fn test_route_dump_filters_family() {
    let conn = Connection::new().unwrap();
    let routes = conn.get_routes(AF_INET).await.unwrap();
    assert!(routes.iter().all(|r| r.family == AF_INET));
}

#[tokio::test]
async fn test_close_handle_stops_source() {
    let close = CloseHandle::new();
    let mut source = EventSource::connect_with(&[Group::Link], None, close.clone()).unwrap();
    close.close();
    let event = tokio::time::timeout(Duration::from_secs(1), source.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SourceEvent::Closed));
}

#[tokio::test]
async fn test_dummy_link_events() {
    require_root!();
    isolate_netns().unwrap();

    let mut source = EventSource::connect(&[Group::Link]).unwrap();
    ip(&["link", "add", "lsdummy0", "type", "dummy"]);

    let index = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), source.next())
            .await
            .expect("no event")
            .unwrap();
        if let SourceEvent::Network {
            event: NetworkEvent::NewLink(link),
            ..
        } = event
        {
            if link.name.as_deref() == Some("lsdummy0") {
                break link.index;
            }
        }
    };

    ip(&["link", "del", "lsdummy0"]);
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), source.next())
            .await
            .expect("no event")
            .unwrap();
        if let SourceEvent::Network {
            event: NetworkEvent::DelLink(link),
            ..
        } = event
        {
            assert_eq!(link.index, index);
            break;
        }
    }
}

#[tokio::test]
async fn test_sync_loop_follows_kernel() {
    require_root!();
    isolate_netns().unwrap();

    let config = Config::default();
    let close = CloseHandle::new();
    let source = EventSource::connect_with(&config.groups, None, close.clone()).unwrap();
    let sync = SyncLoop::new(&config, Store::new(), Connection::new().unwrap());
    let mut reader = sync.reader();

    let task = {
        let close = close.clone();
        tokio::spawn(async move { sync.run(source, &config, close).await })
    };

    ip(&["link", "add", "lsdummy1", "type", "dummy"]);
    ip(&["addr", "add", "198.51.100.1/24", "dev", "lsdummy1"]);

    let found = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let snap = reader.changed().await.unwrap();
            if let Some(iface) = snap.interface_by_name("lsdummy1") {
                if snap.addresses_of(iface.index).next().is_some() {
                    return iface.index;
                }
            }
        }
    })
    .await;
    assert!(found.is_ok(), "store never saw lsdummy1 with its address");

    close.close();
    task.await.unwrap().unwrap();
}
