//! Netlink message fixtures for testing.
//!
//! Captured payloads are little-endian; framing helpers build the nlmsghdr
//! in native order. Every fixture returns a `Vec<u8>` holding complete
//! framed messages so tests can concatenate them into one datagram.

use super::builder::MessageBuilder;
use super::message::{NLM_F_MULTI, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, nlmsg_align};
use super::types::addr::{IfAddrMsg, ifa};
use super::types::link::{IfInfoMsg, OperState, ifla};
use super::types::route::{RtMsg, rta};

/// Wrap `payload` in a netlink header.
pub fn frame(msg_type: u16, seq: u32, flags: u16, payload: &[u8]) -> Vec<u8> {
    let mut hdr = NlMsgHdr::new(msg_type, flags);
    hdr.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
    hdr.nlmsg_seq = seq;
    let mut buf = hdr.as_bytes().to_vec();
    buf.extend_from_slice(payload);
    buf.resize(nlmsg_align(buf.len()), 0);
    buf
}

/// RTM_NEWLINK for the loopback interface.
/// Captured from: ip link show lo
pub fn link_loopback() -> Vec<u8> {
    let payload = [
        // ifinfomsg: family=0, type=772 (ARPHRD_LOOPBACK), index=1, flags=0x49
        0x00, 0x00, // family, pad
        0x04, 0x03, // type = 772
        0x01, 0x00, 0x00, 0x00, // index = 1
        0x49, 0x00, 0x00, 0x00, // flags = IFF_UP | IFF_LOOPBACK | IFF_RUNNING
        0x00, 0x00, 0x00, 0x00, // change = 0
        // IFLA_IFNAME = "lo"
        0x07, 0x00, // len = 7
        0x03, 0x00, // type = IFLA_IFNAME (3)
        b'l', b'o', 0x00, 0x00, // "lo\0" + padding
        // IFLA_MTU = 65536
        0x08, 0x00, // len = 8
        0x04, 0x00, // type = IFLA_MTU (4)
        0x00, 0x00, 0x01, 0x00, // mtu = 65536
        // IFLA_OPERSTATE = 0 (UNKNOWN)
        0x05, 0x00, // len = 5
        0x10, 0x00, // type = IFLA_OPERSTATE (16)
        0x00, 0x00, 0x00, 0x00, // operstate + padding
        // IFLA_ADDRESS = 00:00:00:00:00:00
        0x0a, 0x00, // len = 10
        0x01, 0x00, // type = IFLA_ADDRESS (1)
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // 6 bytes + padding
    ];
    frame(NlMsgType::RTM_NEWLINK, 0, 0, &payload)
}

/// RTM_NEWADDR for 127.0.0.1/8 on lo.
pub fn addr_loopback_v4() -> Vec<u8> {
    let payload = [
        // ifaddrmsg: family=AF_INET, prefixlen=8, flags=IFA_F_PERMANENT, scope=host, index=1
        0x02, 0x08, 0x80, 0xfe, // family, prefixlen, flags, scope
        0x01, 0x00, 0x00, 0x00, // index = 1
        // IFA_ADDRESS = 127.0.0.1
        0x08, 0x00, 0x01, 0x00, // len = 8, type = IFA_ADDRESS (1)
        0x7f, 0x00, 0x00, 0x01, //
        // IFA_LOCAL = 127.0.0.1
        0x08, 0x00, 0x02, 0x00, // len = 8, type = IFA_LOCAL (2)
        0x7f, 0x00, 0x00, 0x01, //
        // IFA_LABEL = "lo"
        0x07, 0x00, 0x03, 0x00, // len = 7, type = IFA_LABEL (3)
        b'l', b'o', 0x00, 0x00, // "lo\0" + padding
    ];
    frame(NlMsgType::RTM_NEWADDR, 0, 0, &payload)
}

/// RTM_NEWADDR for ::1/128 on lo.
pub fn addr_loopback_v6() -> Vec<u8> {
    let payload = [
        // ifaddrmsg: family=AF_INET6, prefixlen=128, flags=IFA_F_PERMANENT, scope=host, index=1
        0x0a, 0x80, 0x80, 0xfe, //
        0x01, 0x00, 0x00, 0x00, // index = 1
        // IFA_ADDRESS = ::1
        0x14, 0x00, 0x01, 0x00, // len = 20, type = IFA_ADDRESS (1)
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, //
    ];
    frame(NlMsgType::RTM_NEWADDR, 0, 0, &payload)
}

/// RTM_NEWROUTE for the IPv4 default route via 192.168.1.1 on index 2.
pub fn route_default_v4() -> Vec<u8> {
    let payload = [
        // rtmsg: family=AF_INET, dst_len=0, table=main, protocol=static, scope=universe, type=unicast
        0x02, 0x00, 0x00, 0x00, // family, dst_len, src_len, tos
        0xfe, 0x04, 0x00, 0x01, // table, protocol, scope, type
        0x00, 0x00, 0x00, 0x00, // flags
        // RTA_TABLE = 254
        0x08, 0x00, 0x0f, 0x00, // len = 8, type = RTA_TABLE (15)
        0xfe, 0x00, 0x00, 0x00, //
        // RTA_GATEWAY = 192.168.1.1
        0x08, 0x00, 0x05, 0x00, // len = 8, type = RTA_GATEWAY (5)
        0xc0, 0xa8, 0x01, 0x01, //
        // RTA_OIF = 2
        0x08, 0x00, 0x04, 0x00, // len = 8, type = RTA_OIF (4)
        0x02, 0x00, 0x00, 0x00, //
    ];
    frame(NlMsgType::RTM_NEWROUTE, 0, 0, &payload)
}

/// RTM_NEWLINK whose IFLA_IFNAME claims more bytes than the message holds.
/// The outer length is intact, so framing can continue past it.
pub fn truncated_link() -> Vec<u8> {
    let mut payload = IfInfoMsg::new().with_index(3).as_bytes().to_vec();
    payload.extend_from_slice(&[
        0x18, 0x00, 0x03, 0x00, // len = 24, type = IFLA_IFNAME
        b'e', b't', b'h', b'3', // only 4 of 20 payload bytes present
    ]);
    frame(NlMsgType::RTM_NEWLINK, 0, 0, &payload)
}

/// NLMSG_DONE terminating a dump.
pub fn done(seq: u32) -> Vec<u8> {
    frame(NlMsgType::DONE, seq, NLM_F_MULTI, &0i32.to_ne_bytes())
}

/// NLMSG_ERROR answering request `seq` with `errno` (0 for ACK).
pub fn ack(seq: u32, errno: i32) -> Vec<u8> {
    let mut request = NlMsgHdr::new(NlMsgType::RTM_GETLINK, 0);
    request.nlmsg_seq = seq;
    let mut payload = errno.to_ne_bytes().to_vec();
    payload.extend_from_slice(request.as_bytes());
    frame(NlMsgType::ERROR, seq, 0, &payload)
}

/// Build a link message from parts.
pub fn link(
    msg_type: u16,
    seq: u32,
    flags: u16,
    index: i32,
    name: &str,
    state: OperState,
) -> Vec<u8> {
    let mut b = MessageBuilder::new(msg_type, flags);
    b.append(&IfInfoMsg::new().with_index(index));
    b.append_attr_str(ifla::IFNAME, name);
    b.append_attr_u32(ifla::MTU, 1500);
    b.append_attr_u8(ifla::OPERSTATE, state as u8);
    b.append_attr(ifla::ADDRESS, &[0x02, 0, 0, 0, 0, index as u8]);
    b.set_seq(seq);
    b.finish()
}

/// Build an IPv4 address message from parts.
pub fn addr_v4(msg_type: u16, seq: u32, flags: u16, index: u32, ip: [u8; 4], prefix: u8) -> Vec<u8> {
    let mut hdr = IfAddrMsg::new().with_family(super::types::family::AF_INET);
    hdr.ifa_prefixlen = prefix;
    hdr.ifa_index = index;
    let mut b = MessageBuilder::new(msg_type, flags);
    b.append(&hdr);
    b.append_attr(ifa::ADDRESS, &ip);
    b.append_attr(ifa::LOCAL, &ip);
    b.set_seq(seq);
    b.finish()
}

/// Build an IPv4 unicast route message in the main table.
pub fn route_v4(
    msg_type: u16,
    seq: u32,
    flags: u16,
    dst: [u8; 4],
    dst_len: u8,
    oif: u32,
) -> Vec<u8> {
    let mut hdr = RtMsg::new().with_family(super::types::family::AF_INET);
    hdr.rtm_dst_len = dst_len;
    hdr.rtm_table = 254;
    hdr.rtm_type = 1;
    let mut b = MessageBuilder::new(msg_type, flags);
    b.append(&hdr);
    if dst_len > 0 {
        b.append_attr(rta::DST, &dst);
    }
    b.append_attr_u32(rta::TABLE, 254);
    b.append_attr_u32(rta::OIF, oif);
    b.set_seq(seq);
    b.finish()
}
