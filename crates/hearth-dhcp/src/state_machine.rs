//! Per-message-type decision logic (RFC 2131 §4.3).
//!
//! Handlers return `Some(reply)` or `None` for a drop; the only side effect
//! is on the subnet's lease store. REQUEST distinguishes the client states
//! SELECTING / INIT-REBOOT / RENEWING-REBINDING by which of server id,
//! requested IP and ciaddr the packet carries.

use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::config::{Config, Subnet};
use crate::lease_store::{self, ClientId, Lease, LeaseStore};
use crate::options::{self, DhcpOption, MessageType};
use crate::packet::{DhcpPacket, HType, Opcode};
use crate::reply::build_reply;

const ZERO: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Servers only speak to well-formed Ethernet BOOTP requests.
pub fn valid_pkt(pkt: &DhcpPacket) -> bool {
    pkt.op == Opcode::BootRequest
        && pkt.htype == HType::Ether
        && pkt.hlen == 6
        && pkt.hops == 0
}

/// Validate and dispatch one inbound packet.
pub fn handle_packet(
    config: &Config,
    subnet: &Subnet,
    store: &mut LeaseStore,
    pkt: &DhcpPacket,
) -> Option<DhcpPacket> {
    if !valid_pkt(pkt) {
        warn!("Invalid packet shape from {}, dropping", pkt.mac_str());
        return None;
    }

    match pkt.msg_type() {
        Some(MessageType::Discover) => handle_discover(config, subnet, store, pkt),
        Some(MessageType::Request) => handle_request(config, subnet, store, pkt),
        Some(t @ (MessageType::Decline | MessageType::Release)) => {
            handle_decline_release(subnet, store, pkt, t)
        }
        Some(MessageType::Inform) => handle_inform(config, subnet, pkt),
        None => {
            warn!("Packet from {} has no dhcp msgtype", pkt.mac_str());
            None
        }
        Some(other) => {
            debug!("Unhandled msgtype {:?} from {}", other, pkt.mac_str());
            None
        }
    }
}

/// DISCOVER: offer an address. The store is not written; the binding is
/// only committed when the client comes back with a REQUEST.
fn handle_discover(
    config: &Config,
    subnet: &Subnet,
    store: &LeaseStore,
    pkt: &DhcpPacket,
) -> Option<DhcpPacket> {
    debug!("DHCPDISCOVER from {}", pkt.mac_str());
    let ourip = subnet.interface.addr;
    let client_id = ClientId::from_packet(pkt);
    let lease = store.lookup(&client_id).cloned();

    // Prefer what the client already had, then what it asks for, then the
    // first free address in the range.
    let addr = match &lease {
        Some(l) if !l.expired() => Some(l.addr),
        Some(l) if store.addr_available(l.addr) => Some(l.addr),
        _ => None,
    }
    .or_else(|| {
        options::requested_ip(&pkt.options).filter(|r| {
            lease_store::addr_in_range(*r, subnet.range) && store.addr_available(*r)
        })
    })
    .or_else(|| store.usable_addr(subnet.range));

    let Some(addr) = addr else {
        warn!(
            "No address to offer {} on {}, pool exhausted",
            client_id, subnet.interface.name
        );
        return None;
    };

    let lease_time = options::lease_time(&pkt.options)
        .filter(|t| config.lease_time_good(*t))
        .unwrap_or_else(|| match &lease {
            Some(l) if !l.expired() => l.timeleft(),
            _ => config.default_lease_time(subnet),
        });
    let t1 = (f64::from(lease_time) * f64::from(config.t1_ratio)).round() as u32;
    let t2 = (f64::from(lease_time) * f64::from(config.t2_ratio)).round() as u32;

    info!("DHCPOFFER {} to {}", addr, client_id);

    let mut opts = vec![
        DhcpOption::MsgType(MessageType::Offer),
        DhcpOption::SubnetMask(subnet.network.netmask()),
        DhcpOption::LeaseTime(lease_time),
        DhcpOption::RenewalT1(t1),
        DhcpOption::RebindingT2(t2),
        DhcpOption::ServerId(ourip),
    ];
    if let Some(vc) = options::vendor_class_id(&pkt.options) {
        opts.push(DhcpOption::VendorClassId(vc.to_vec()));
    }
    if let Some(preqs) = options::param_request(&pkt.options) {
        opts.extend(options::options_from_parameter_requests(preqs, &subnet.options));
    }

    Some(build_reply(
        config, subnet, pkt, ZERO, addr, ourip, pkt.giaddr, opts,
    ))
}

fn handle_request(
    config: &Config,
    subnet: &Subnet,
    store: &mut LeaseStore,
    pkt: &DhcpPacket,
) -> Option<DhcpPacket> {
    debug!("DHCPREQUEST from {}", pkt.mac_str());
    let ourip = subnet.interface.addr;
    let client_id = ClientId::from_packet(pkt);
    let sid = options::server_id(&pkt.options);
    let reqip = options::requested_ip(&pkt.options);
    let lease = store.lookup(&client_id).cloned();

    match (sid, reqip, lease) {
        // SELECTING: the client picked a server; the request must name us.
        (Some(sid), Some(reqip), _) => {
            if sid != ourip {
                debug!("DHCPREQUEST from {} selects server {}", client_id, sid);
                return None;
            }
            if pkt.ciaddr != ZERO {
                warn!("SELECTING request from {} with ciaddr set", client_id);
                return None;
            }
            if !lease_store::addr_in_range(reqip, subnet.range) {
                return Some(nak(config, subnet, pkt, "Requested address is not in subnet range"));
            }
            if !store.addr_available(reqip) {
                return Some(nak(config, subnet, pkt, "Requested address is not available"));
            }
            let lease = Lease::new(client_id, reqip, config.default_lease_time(subnet));
            Some(ack(config, subnet, store, pkt, lease))
        }
        // INIT-REBOOT: verifying a previously held address after reboot.
        (None, Some(reqip), Some(lease)) => {
            if pkt.ciaddr != ZERO {
                warn!("INIT-REBOOT request from {} with ciaddr set", client_id);
                return None;
            }
            if lease.expired() && !store.addr_available(reqip) {
                return Some(nak(config, subnet, pkt, "Lease has expired and address is taken"));
            }
            if pkt.giaddr == ZERO && !lease_store::addr_in_range(reqip, subnet.range) {
                return Some(nak(config, subnet, pkt, "Requested address is not in subnet range"));
            }
            if lease.addr != reqip {
                return Some(nak(config, subnet, pkt, "Requested address is incorrect"));
            }
            let fresh = Lease::new(lease.client_id, lease.addr, config.default_lease_time(subnet));
            Some(ack(config, subnet, store, pkt, fresh))
        }
        // RENEWING / REBINDING: extending a running lease; ciaddr names it.
        (None, None, Some(lease)) => {
            if pkt.ciaddr == ZERO {
                warn!("Renewal request from {} without ciaddr", client_id);
                return None;
            }
            if lease.expired() && !store.addr_available(lease.addr) {
                return Some(nak(config, subnet, pkt, "Lease has expired and address is taken"));
            }
            if lease.addr != pkt.ciaddr {
                return Some(nak(config, subnet, pkt, "Requested address is incorrect"));
            }
            let fresh = Lease::new(lease.client_id, lease.addr, config.default_lease_time(subnet));
            Some(ack(config, subnet, store, pkt, fresh))
        }
        _ => {
            debug!("Unrecognized DHCPREQUEST variant from {}", client_id);
            None
        }
    }
}

/// Commit `lease` and acknowledge it.
fn ack(
    config: &Config,
    subnet: &Subnet,
    store: &mut LeaseStore,
    pkt: &DhcpPacket,
    lease: Lease,
) -> DhcpPacket {
    let ourip = subnet.interface.addr;
    let client_id = ClientId::from_packet(pkt);
    let (lease_time, t1, t2) = lease.timeleft3(config.t1_ratio, config.t2_ratio);

    info!("DHCPACK {} to {}", lease.addr, client_id);

    let mut opts = vec![
        DhcpOption::MsgType(MessageType::Ack),
        DhcpOption::SubnetMask(subnet.network.netmask()),
        DhcpOption::LeaseTime(lease_time),
        DhcpOption::RenewalT1(t1),
        DhcpOption::RebindingT2(t2),
        DhcpOption::ServerId(ourip),
    ];
    if let Some(vc) = options::vendor_class_id(&pkt.options) {
        opts.push(DhcpOption::VendorClassId(vc.to_vec()));
    }
    if let Some(preqs) = options::param_request(&pkt.options) {
        opts.extend(options::options_from_parameter_requests(preqs, &subnet.options));
    }

    let yiaddr = lease.addr;
    store.replace(client_id, lease);

    build_reply(
        config, subnet, pkt, pkt.ciaddr, yiaddr, ourip, pkt.giaddr, opts,
    )
}

fn nak(config: &Config, subnet: &Subnet, pkt: &DhcpPacket, reason: &str) -> DhcpPacket {
    let ourip = subnet.interface.addr;
    warn!("DHCPNAK to {}: {}", pkt.mac_str(), reason);

    let mut opts = vec![
        DhcpOption::MsgType(MessageType::Nak),
        DhcpOption::ServerId(ourip),
        DhcpOption::Message(reason.to_string()),
    ];
    if let Some(id) = options::client_id(&pkt.options) {
        opts.push(DhcpOption::ClientId(id.to_vec()));
    }
    if let Some(vc) = options::vendor_class_id(&pkt.options) {
        opts.push(DhcpOption::VendorClassId(vc.to_vec()));
    }

    build_reply(config, subnet, pkt, ZERO, ZERO, ZERO, pkt.giaddr, opts)
}

/// DECLINE and RELEASE both retire the client's lease; only the log line
/// differs. Neither is answered.
fn handle_decline_release(
    subnet: &Subnet,
    store: &mut LeaseStore,
    pkt: &DhcpPacket,
    mtype: MessageType,
) -> Option<DhcpPacket> {
    debug!("{:?} from {}", mtype, pkt.mac_str());
    let ourip = subnet.interface.addr;
    let client_id = ClientId::from_packet(pkt);

    let Some(sid) = options::server_id(&pkt.options) else {
        warn!("{:?} from {} without server id", mtype, client_id);
        return None;
    };
    if sid != ourip {
        return None;
    }
    let Some(reqip) = options::requested_ip(&pkt.options) else {
        warn!("{:?} from {} without requested address", mtype, client_id);
        return None;
    };
    if store.lookup(&client_id).is_none() {
        warn!("{:?} from {} for unknown lease", mtype, client_id);
        return None;
    }

    store.remove(&client_id);
    let msg = options::message(&pkt.options).unwrap_or("unspecified");
    info!("{:?} of {} by {}: {}", mtype, reqip, client_id, msg);
    None
}

/// INFORM: the client has an address already and only wants parameters.
/// The lease store is untouched.
fn handle_inform(config: &Config, subnet: &Subnet, pkt: &DhcpPacket) -> Option<DhcpPacket> {
    debug!("DHCPINFORM from {}", pkt.mac_str());
    if pkt.ciaddr == ZERO {
        warn!("DHCPINFORM from {} without ciaddr", pkt.mac_str());
        return None;
    }
    let ourip = subnet.interface.addr;

    let mut opts = vec![
        DhcpOption::MsgType(MessageType::Ack),
        DhcpOption::ServerId(ourip),
    ];
    if let Some(vc) = options::vendor_class_id(&pkt.options) {
        opts.push(DhcpOption::VendorClassId(vc.to_vec()));
    }
    if let Some(preqs) = options::param_request(&pkt.options) {
        opts.extend(options::options_from_parameter_requests(preqs, &subnet.options));
    }

    info!("DHCPACK (inform) to {}", pkt.mac_str());
    Some(build_reply(
        config, subnet, pkt, pkt.ciaddr, ZERO, ourip, pkt.giaddr, opts,
    ))
}
