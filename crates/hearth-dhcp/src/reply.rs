//! Reply assembly: BOOTP field fill-in and destination selection.

use std::net::Ipv4Addr;

use crate::config::{Config, Subnet};
use crate::options::{self, DhcpOption, MessageType};
use crate::packet::{DhcpPacket, HType, MacAddr, Opcode};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

fn fixed_str<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    // leave at least one trailing NUL
    let n = s.len().min(N - 1);
    out[..n].copy_from_slice(&s.as_bytes()[..n]);
    out
}

/// Where a reply goes, per RFC 2131 §4.1: relayed replies go back to the
/// relay on the server port; otherwise NAKs are broadcast, and OFFER/ACK go
/// to ciaddr, to the offered address, or to broadcast depending on what the
/// client can already receive.
fn destination(
    mtype: MessageType,
    req: &DhcpPacket,
    ciaddr: Ipv4Addr,
    yiaddr: Ipv4Addr,
    giaddr: Ipv4Addr,
) -> (MacAddr, Ipv4Addr) {
    match mtype {
        MessageType::Nak => {
            if giaddr != Ipv4Addr::UNSPECIFIED {
                (req.src_mac, giaddr)
            } else {
                (MacAddr::BROADCAST, Ipv4Addr::BROADCAST)
            }
        }
        MessageType::Offer | MessageType::Ack => {
            if giaddr != Ipv4Addr::UNSPECIFIED {
                (req.src_mac, giaddr)
            } else if ciaddr != Ipv4Addr::UNSPECIFIED {
                (req.src_mac, ciaddr)
            } else if !req.is_broadcast() {
                (req.src_mac, yiaddr)
            } else {
                (MacAddr::BROADCAST, Ipv4Addr::BROADCAST)
            }
        }
        other => unreachable!("no destination rule for reply type {:?}", other),
    }
}

/// Build a reply to `req`. `options` must carry a message type and its order
/// is preserved on the wire. The source MAC is left zeroed for the link
/// layer to fill in on send.
pub fn build_reply(
    config: &Config,
    subnet: &Subnet,
    req: &DhcpPacket,
    ciaddr: Ipv4Addr,
    yiaddr: Ipv4Addr,
    siaddr: Ipv4Addr,
    giaddr: Ipv4Addr,
    options: Vec<DhcpOption>,
) -> DhcpPacket {
    let mtype =
        options::msg_type(&options).expect("reply built without a message type option");

    let (dst_mac, dst_ip) = destination(mtype, req, ciaddr, yiaddr, giaddr);
    let dst_port = if giaddr != Ipv4Addr::UNSPECIFIED {
        SERVER_PORT
    } else {
        CLIENT_PORT
    };

    DhcpPacket {
        op: Opcode::BootReply,
        htype: HType::Ether,
        hlen: 6,
        hops: 0,
        xid: req.xid,
        secs: 0,
        flags: req.flags,
        ciaddr,
        yiaddr,
        siaddr,
        giaddr,
        chaddr: req.chaddr,
        sname: fixed_str(&config.hostname),
        file: [0u8; 128],
        options,
        src_mac: MacAddr::ZERO,
        dst_mac,
        src_ip: subnet.interface.addr,
        dst_ip,
        src_port: SERVER_PORT,
        dst_port,
    }
}
