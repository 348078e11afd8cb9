//! Query answers and change notification.

use std::time::Duration;

use linkstate::netlink::NetworkEvent;
use linkstate::netlink::types::link::OperState;
use linkstate::service::dbus::{interfaces_changed_signal, state_changed_signal};
use linkstate::{ChangeNotifier, QueryError, QueryService, Store};

use crate::common::{addr_v4, link, route_v4};

#[test]
fn test_every_answer_carries_one_generation() {
    let mut store = Store::new();
    store.apply(&NetworkEvent::NewLink(link(1, "lo", OperState::Unknown)));
    store.apply(&NetworkEvent::NewLink(link(2, "eth0", OperState::Up)));
    store.apply(&NetworkEvent::NewAddress(addr_v4(2, [192, 0, 2, 7], 24)));
    store.apply(&NetworkEvent::NewRoute(route_v4(
        [0, 0, 0, 0],
        0,
        2,
        Some([192, 0, 2, 1]),
    )));

    let svc = QueryService::new(store.reader());
    let (g1, ifaces) = svc.list_interfaces();
    let (g2, addrs) = svc.list_addresses(2);
    let (g3, routes) = svc.list_routes();
    assert_eq!((g1, g2, g3), (4, 4, 4));

    assert_eq!(ifaces.len(), 2);
    assert_eq!(addrs[0].address, "192.0.2.7");
    assert_eq!(addrs[0].prefix_len, 24);
    assert_eq!(routes[0].destination, "default");
    assert_eq!(routes[0].gateway, "192.0.2.1");
    assert_eq!(routes[0].oif, 2);

    assert!(svc.list_addresses(99).1.is_empty());
    assert_eq!(
        svc.get_interface("eth7"),
        Err(QueryError::NotFound("eth7".into()))
    );
    assert_eq!(
        svc.get_interface_by_index(7),
        Err(QueryError::NotFoundIndex(7))
    );
}

#[test]
fn test_unsynced_store_reports_stale() {
    let mut store = Store::new();
    let svc = QueryService::new(store.reader());
    assert_eq!(svc.status(), (0, true));
    assert!(svc.list_interfaces().1.is_empty());

    store.replace_all(vec![link(1, "lo", OperState::Unknown)], Vec::new(), Vec::new());
    assert_eq!(svc.status(), (1, false));
    assert_eq!(svc.get_interface("lo").unwrap().0, 1);
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_one_batch() {
    let mut store = Store::new();
    let mut notifier = ChangeNotifier::new(store.reader(), Duration::from_millis(50));

    let writer = tokio::spawn(async move {
        for index in 10..14 {
            store.apply(&NetworkEvent::NewLink(link(index, "veth", OperState::Up)));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store
    });

    let batch = notifier.next_batch().await.unwrap();
    assert_eq!(batch.generation, 4);
    assert_eq!(batch.added, vec![10, 11, 12, 13]);
    assert!(batch.removed.is_empty());

    let mut store = writer.await.unwrap();
    store.apply(&NetworkEvent::NewAddress(addr_v4(11, [10, 11, 0, 1], 16)));
    store.apply(&NetworkEvent::DelLink(link(12, "veth", OperState::Up)));

    let batch = notifier.next_batch().await.unwrap();
    assert_eq!(batch.generation, 6);
    assert_eq!(batch.changed, vec![11]);
    assert_eq!(batch.removed, vec![12]);

    let msg = interfaces_changed_signal(&batch).unwrap();
    assert_eq!(msg.member().as_deref(), Some("InterfacesChanged"));

    store.set_stale(false);
    let batch = notifier.next_batch().await.unwrap();
    assert!(!batch.stale);
    assert!(batch.is_empty());
    assert_eq!(
        state_changed_signal(batch.generation).unwrap().get1::<u64>(),
        Some(6)
    );

    drop(store);
    assert!(notifier.next_batch().await.is_none());
}
