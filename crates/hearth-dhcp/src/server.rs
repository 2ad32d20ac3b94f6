//! Per-subnet receive loop: read a frame, decode, dispatch, send the reply.

use tracing::{info, warn};

use crate::config::{Config, Subnet};
use crate::lease_store::LeaseStore;
use crate::link::{Frame, Link};
use crate::packet::DhcpPacket;
use crate::state_machine;

/// Run one inbound frame through decode, dispatch, and encode.
pub fn process_frame(
    config: &Config,
    subnet: &Subnet,
    store: &mut LeaseStore,
    frame: &Frame,
) -> Option<Frame> {
    let pkt = match DhcpPacket::decode(frame) {
        Ok(p) => p,
        Err(e) => {
            warn!("Dropped packet: {}", e);
            return None;
        }
    };

    let reply = state_machine::handle_packet(config, subnet, store, &pkt)?;
    Some(reply.encode())
}

/// Serve one subnet forever. The task is the sole owner of this subnet's
/// lease store; per-packet failures are logged and never end the loop.
pub async fn run_subnet<L: Link>(config: &Config, subnet: Subnet, mut link: L) -> anyhow::Result<()> {
    let mut store = LeaseStore::new();
    info!(
        "serving {} on {} ({})",
        subnet.network, subnet.interface.name, subnet.interface.addr
    );

    loop {
        let frame = match link.recv().await {
            Ok(f) => f,
            Err(e) => {
                warn!("recv error on {}: {}", subnet.interface.name, e);
                continue;
            }
        };

        if let Some(reply) = process_frame(config, &subnet, &mut store, &frame) {
            if let Err(e) = link.send(&reply).await {
                warn!(
                    "Failed to send reply to {} on {}: {}",
                    reply.dst_ip, subnet.interface.name, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MessageType;
    use crate::packet::MAGIC_COOKIE;
    use crate::packet::MacAddr;
    use std::net::Ipv4Addr;

    fn setup() -> (Config, Subnet, LeaseStore) {
        let file: crate::config::DhcpConfig = serde_json::from_str(
            r#"{
                "subnets": [{
                    "interface": "eth0",
                    "address": "192.168.1.1",
                    "network": "192.168.1.0/24",
                    "range_start": "192.168.1.100",
                    "range_end": "192.168.1.200"
                }]
            }"#,
        )
        .unwrap();
        let config = file.resolve().unwrap();
        let subnet = config.subnets[0].clone();
        (config, subnet, LeaseStore::new())
    }

    fn discover_frame() -> Frame {
        let mut data = vec![0u8; 300];
        data[0] = 1; // BOOTREQUEST
        data[1] = 1; // Ethernet
        data[2] = 6;
        data[4..8].copy_from_slice(&0x31337u32.to_be_bytes());
        data[28..34].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        data[236..240].copy_from_slice(&MAGIC_COOKIE);
        data[240..243].copy_from_slice(&[53, 1, 1]); // DISCOVER
        data[243] = 255;
        Frame {
            src_mac: MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]),
            dst_mac: MacAddr::BROADCAST,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::BROADCAST,
            src_port: 68,
            dst_port: 67,
            payload: data,
        }
    }

    #[test]
    fn test_process_frame_offer() {
        let (config, subnet, mut store) = setup();
        let reply = process_frame(&config, &subnet, &mut store, &discover_frame()).unwrap();

        assert_eq!(reply.src_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(reply.src_port, 67);
        assert_eq!(reply.dst_port, 68);
        assert!(reply.payload.len() >= 300);

        let pkt = DhcpPacket::parse(&reply.payload).unwrap();
        assert_eq!(pkt.msg_type(), Some(MessageType::Offer));
        assert_eq!(pkt.yiaddr, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(pkt.xid, 0x31337);
    }

    #[test]
    fn test_process_frame_malformed() {
        let (config, subnet, mut store) = setup();

        let mut frame = discover_frame();
        frame.payload.truncate(100);
        assert!(process_frame(&config, &subnet, &mut store, &frame).is_none());

        let mut frame = discover_frame();
        frame.payload[236] = 0; // broken magic cookie
        assert!(process_frame(&config, &subnet, &mut store, &frame).is_none());

        assert!(store.is_empty());
    }
}
