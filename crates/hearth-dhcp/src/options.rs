//! DHCP option TLVs (RFC 2132)

use std::net::Ipv4Addr;

/// DHCP option codes (RFC 2132)
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS_SERVER: u8 = 6;
pub const OPT_HOSTNAME: u8 = 12;
pub const OPT_DOMAIN_NAME: u8 = 15;
pub const OPT_BROADCAST_ADDR: u8 = 28;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MSG_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_PARAM_REQUEST: u8 = 55;
pub const OPT_MESSAGE: u8 = 56;
pub const OPT_MAX_MSG_SIZE: u8 = 57;
pub const OPT_RENEWAL_T1: u8 = 58;
pub const OPT_REBINDING_T2: u8 = 59;
pub const OPT_VENDOR_CLASS: u8 = 60;
pub const OPT_CLIENT_ID: u8 = 61;
pub const OPT_END: u8 = 255;
pub const OPT_PAD: u8 = 0;

/// DHCP message types (option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
    Unknown(u8),
}

impl MessageType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
            Self::Unknown(other) => *other,
        }
    }
}

/// A parsed DHCP option. One variant per tag the server works with;
/// anything else is carried opaquely in `Unknown` and re-encoded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DnsServer(Vec<Ipv4Addr>),
    Hostname(String),
    DomainName(String),
    BroadcastAddr(Ipv4Addr),
    RequestedIp(Ipv4Addr),
    LeaseTime(u32),
    MsgType(MessageType),
    ServerId(Ipv4Addr),
    ParamRequest(Vec<u8>),
    Message(String),
    MaxMsgSize(u16),
    RenewalT1(u32),
    RebindingT2(u32),
    VendorClassId(Vec<u8>),
    ClientId(Vec<u8>),
    Unknown(u8, Vec<u8>),
}

impl DhcpOption {
    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OPT_SUBNET_MASK,
            Self::Router(_) => OPT_ROUTER,
            Self::DnsServer(_) => OPT_DNS_SERVER,
            Self::Hostname(_) => OPT_HOSTNAME,
            Self::DomainName(_) => OPT_DOMAIN_NAME,
            Self::BroadcastAddr(_) => OPT_BROADCAST_ADDR,
            Self::RequestedIp(_) => OPT_REQUESTED_IP,
            Self::LeaseTime(_) => OPT_LEASE_TIME,
            Self::MsgType(_) => OPT_MSG_TYPE,
            Self::ServerId(_) => OPT_SERVER_ID,
            Self::ParamRequest(_) => OPT_PARAM_REQUEST,
            Self::Message(_) => OPT_MESSAGE,
            Self::MaxMsgSize(_) => OPT_MAX_MSG_SIZE,
            Self::RenewalT1(_) => OPT_RENEWAL_T1,
            Self::RebindingT2(_) => OPT_REBINDING_T2,
            Self::VendorClassId(_) => OPT_VENDOR_CLASS,
            Self::ClientId(_) => OPT_CLIENT_ID,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Decode one option body. A known tag with a malformed body is kept
    /// opaquely so re-encoding preserves the original bytes.
    fn from_tlv(code: u8, data: &[u8]) -> Self {
        match code {
            OPT_SUBNET_MASK => match read_ipv4(data) {
                Some(ip) => Self::SubnetMask(ip),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_ROUTER => match read_ipv4_list(data) {
                Some(ips) => Self::Router(ips),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_DNS_SERVER => match read_ipv4_list(data) {
                Some(ips) => Self::DnsServer(ips),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_HOSTNAME => match String::from_utf8(data.to_vec()) {
                Ok(s) => Self::Hostname(s),
                Err(_) => Self::Unknown(code, data.to_vec()),
            },
            OPT_DOMAIN_NAME => match String::from_utf8(data.to_vec()) {
                Ok(s) => Self::DomainName(s),
                Err(_) => Self::Unknown(code, data.to_vec()),
            },
            OPT_BROADCAST_ADDR => match read_ipv4(data) {
                Some(ip) => Self::BroadcastAddr(ip),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_REQUESTED_IP => match read_ipv4(data) {
                Some(ip) => Self::RequestedIp(ip),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_LEASE_TIME => match read_u32(data) {
                Some(v) => Self::LeaseTime(v),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_MSG_TYPE => match data {
                [t] => Self::MsgType(MessageType::from_code(*t)),
                _ => Self::Unknown(code, data.to_vec()),
            },
            OPT_SERVER_ID => match read_ipv4(data) {
                Some(ip) => Self::ServerId(ip),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_PARAM_REQUEST => Self::ParamRequest(data.to_vec()),
            OPT_MESSAGE => match String::from_utf8(data.to_vec()) {
                Ok(s) => Self::Message(s),
                Err(_) => Self::Unknown(code, data.to_vec()),
            },
            OPT_MAX_MSG_SIZE => match data {
                [a, b] => Self::MaxMsgSize(u16::from_be_bytes([*a, *b])),
                _ => Self::Unknown(code, data.to_vec()),
            },
            OPT_RENEWAL_T1 => match read_u32(data) {
                Some(v) => Self::RenewalT1(v),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_REBINDING_T2 => match read_u32(data) {
                Some(v) => Self::RebindingT2(v),
                None => Self::Unknown(code, data.to_vec()),
            },
            OPT_VENDOR_CLASS => Self::VendorClassId(data.to_vec()),
            OPT_CLIENT_ID => Self::ClientId(data.to_vec()),
            _ => Self::Unknown(code, data.to_vec()),
        }
    }

    /// Encode the option body (without code/length).
    fn body(&self) -> Vec<u8> {
        match self {
            Self::SubnetMask(ip)
            | Self::BroadcastAddr(ip)
            | Self::RequestedIp(ip)
            | Self::ServerId(ip) => ip.octets().to_vec(),
            Self::Router(ips) | Self::DnsServer(ips) => {
                ips.iter().flat_map(|ip| ip.octets()).collect()
            }
            Self::Hostname(s) | Self::DomainName(s) | Self::Message(s) => s.as_bytes().to_vec(),
            Self::LeaseTime(v) | Self::RenewalT1(v) | Self::RebindingT2(v) => {
                v.to_be_bytes().to_vec()
            }
            Self::MsgType(t) => vec![t.code()],
            Self::MaxMsgSize(v) => v.to_be_bytes().to_vec(),
            Self::ParamRequest(data) | Self::VendorClassId(data) | Self::ClientId(data) => {
                data.clone()
            }
            Self::Unknown(_, data) => data.clone(),
        }
    }
}

fn read_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    match data {
        [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => None,
    }
}

fn read_ipv4_list(data: &[u8]) -> Option<Vec<Ipv4Addr>> {
    if data.is_empty() || data.len() % 4 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect(),
    )
}

fn read_u32(data: &[u8]) -> Option<u32> {
    match data {
        [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Parse DHCP options from bytes (after the magic cookie).
/// PAD bytes are skipped, END terminates, a truncated TLV stops the scan.
pub fn parse_options(data: &[u8]) -> Vec<DhcpOption> {
    let mut options = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let code = data[i];
        if code == OPT_END {
            break;
        }
        if code == OPT_PAD {
            i += 1;
            continue;
        }

        i += 1;
        if i >= data.len() {
            break;
        }

        let len = data[i] as usize;
        i += 1;

        if i + len > data.len() {
            break;
        }

        options.push(DhcpOption::from_tlv(code, &data[i..i + len]));
        i += len;
    }

    options
}

/// Encode DHCP options to bytes, terminated with END.
pub fn encode_options(options: &[DhcpOption]) -> Vec<u8> {
    let mut buf = Vec::new();
    for opt in options {
        let body = opt.body();
        buf.push(opt.code());
        buf.push(body.len() as u8);
        buf.extend_from_slice(&body);
    }
    buf.push(OPT_END);
    buf
}

/// Get the DHCP message type.
pub fn msg_type(opts: &[DhcpOption]) -> Option<MessageType> {
    opts.iter().find_map(|o| match o {
        DhcpOption::MsgType(t) => Some(*t),
        _ => None,
    })
}

/// Get the requested IP address (option 50).
pub fn requested_ip(opts: &[DhcpOption]) -> Option<Ipv4Addr> {
    opts.iter().find_map(|o| match o {
        DhcpOption::RequestedIp(ip) => Some(*ip),
        _ => None,
    })
}

/// Get the server identifier (option 54).
pub fn server_id(opts: &[DhcpOption]) -> Option<Ipv4Addr> {
    opts.iter().find_map(|o| match o {
        DhcpOption::ServerId(ip) => Some(*ip),
        _ => None,
    })
}

/// Get the client identifier bytes (option 61).
pub fn client_id(opts: &[DhcpOption]) -> Option<&[u8]> {
    opts.iter().find_map(|o| match o {
        DhcpOption::ClientId(id) => Some(id.as_slice()),
        _ => None,
    })
}

/// Get the parameter request list (option 55).
pub fn param_request(opts: &[DhcpOption]) -> Option<&[u8]> {
    opts.iter().find_map(|o| match o {
        DhcpOption::ParamRequest(codes) => Some(codes.as_slice()),
        _ => None,
    })
}

/// Get the requested lease time in seconds (option 51).
pub fn lease_time(opts: &[DhcpOption]) -> Option<u32> {
    opts.iter().find_map(|o| match o {
        DhcpOption::LeaseTime(t) => Some(*t),
        _ => None,
    })
}

/// Get the vendor class identifier bytes (option 60).
pub fn vendor_class_id(opts: &[DhcpOption]) -> Option<&[u8]> {
    opts.iter().find_map(|o| match o {
        DhcpOption::VendorClassId(v) => Some(v.as_slice()),
        _ => None,
    })
}

/// Get the error/info message (option 56).
pub fn message(opts: &[DhcpOption]) -> Option<&str> {
    opts.iter().find_map(|o| match o {
        DhcpOption::Message(m) => Some(m.as_str()),
        _ => None,
    })
}

/// Select the subset of `defaults` the client asked for in its parameter
/// request list, in request order. A repeated tag counts once (first
/// occurrence wins); tags we have no default for are skipped.
pub fn options_from_parameter_requests(
    preqs: &[u8],
    defaults: &[DhcpOption],
) -> Vec<DhcpOption> {
    let mut seen: Vec<u8> = Vec::with_capacity(preqs.len());
    let mut out = Vec::new();
    for &code in preqs {
        if seen.contains(&code) {
            continue;
        }
        seen.push(code);
        if let Some(opt) = defaults.iter().find(|o| o.code() == code) {
            out.push(opt.clone());
        }
    }
    out
}
