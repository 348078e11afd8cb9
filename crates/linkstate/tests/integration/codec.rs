//! Decoding received datagrams into source events.

use linkstate::netlink::events::events_from_datagram;
use linkstate::netlink::message::{NLM_F_MULTI, NlMsgType};
use linkstate::netlink::types::addr::{IfAddrMsg, ifa};
use linkstate::netlink::types::family::AF_INET;
use linkstate::netlink::types::link::{IfInfoMsg, OperState, ifla};
use linkstate::netlink::{
    DumpRequest, MessageBuilder, NetworkEvent, Payload, SourceEvent, TableKind, decode, encode,
};

fn new_link(seq: u32, index: i32, name: &str) -> Vec<u8> {
    let mut b = MessageBuilder::new(NlMsgType::RTM_NEWLINK, 0);
    b.set_seq(seq);
    b.set_pid(4242);
    b.append(&IfInfoMsg::new().with_index(index));
    b.append_attr_str(ifla::IFNAME, name);
    b.append_attr_u32(ifla::MTU, 9000);
    b.append_attr_u8(ifla::OPERSTATE, 6);
    b.finish()
}

fn new_addr(seq: u32, index: u32, ip: [u8; 4]) -> Vec<u8> {
    let mut b = MessageBuilder::new(NlMsgType::RTM_NEWADDR, 0);
    b.set_seq(seq);
    b.append(&IfAddrMsg {
        ifa_family: AF_INET,
        ifa_prefixlen: 16,
        ifa_index: index,
        ..Default::default()
    });
    b.append_attr(ifa::LOCAL, &ip);
    b.finish()
}

/// A link message whose IFLA_IFNAME claims more bytes than it carries.
fn short_attr_link(seq: u32) -> Vec<u8> {
    let mut b = MessageBuilder::new(NlMsgType::RTM_NEWLINK, 0);
    b.set_seq(seq);
    b.append(&IfInfoMsg::new().with_index(7));
    b.append_bytes(&[0x40, 0x00, 0x03, 0x00, b'b', b'r', b'0', 0]);
    b.finish()
}

#[test]
fn test_datagram_with_malformed_message() {
    let mut datagram = new_link(1, 3, "eth3");
    datagram.extend(short_attr_link(2));
    datagram.extend(new_addr(3, 3, [172, 16, 0, 1]));

    let events = events_from_datagram(&datagram);
    assert_eq!(events.len(), 3);

    match &events[0] {
        SourceEvent::Network {
            event: NetworkEvent::NewLink(link),
            seq,
            port_id,
        } => {
            assert_eq!(link.name.as_deref(), Some("eth3"));
            assert_eq!(link.mtu, Some(9000));
            assert_eq!(link.oper_state, OperState::Up);
            assert_eq!((*seq, *port_id), (1, 4242));
        }
        other => panic!("unexpected {:?}", other),
    }

    match &events[1] {
        SourceEvent::Malformed(e) => assert!(e.is_malformed()),
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        &events[2],
        SourceEvent::Network { event: NetworkEvent::NewAddress(a), seq: 3, .. }
            if a.address == vec![172, 16, 0, 1] && a.prefix_len == 16
    ));
}

#[test]
fn test_overrun_in_datagram() {
    let mut datagram = MessageBuilder::new(NlMsgType::OVERRUN, NLM_F_MULTI).finish();
    datagram.extend(new_link(9, 1, "lo"));

    let events = events_from_datagram(&datagram);
    assert!(matches!(events[0], SourceEvent::Overrun));
    assert!(matches!(events[1], SourceEvent::Network { .. }));
}

#[test]
fn test_dump_request_decodes_back() {
    for table in TableKind::ALL {
        let req = DumpRequest::new(table, 0xdead_beef).with_family(AF_INET);
        let decoded = decode(&encode(&req));
        assert_eq!(decoded.len(), 1);

        let msg = decoded[0].as_ref().unwrap();
        assert_eq!(msg.seq(), 0xdead_beef);
        assert_eq!(msg.msg_type(), table.request_type());
        assert!(!matches!(msg.payload, Payload::Other(_)));
    }
}
