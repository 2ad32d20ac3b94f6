//! DHCPv4 packet model and parser/serializer (RFC 2131)

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

use crate::link::Frame;
use crate::options::{self, DhcpOption, MessageType};

/// DHCP magic cookie
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Broadcast bit in the BOOTP flags field
pub const FLAG_BROADCAST: u16 = 0x8000;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("packet too short: {0} bytes (minimum 240)")]
    TooShort(usize),
    #[error("invalid magic cookie")]
    InvalidMagic,
}

/// BOOTP op field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    BootRequest,
    BootReply,
    Unknown(u8),
}

impl Opcode {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::BootRequest,
            2 => Self::BootReply,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::BootRequest => 1,
            Self::BootReply => 2,
            Self::Unknown(other) => *other,
        }
    }
}

/// BOOTP hardware type (RFC 1700 "arp-parameters")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HType {
    Ether,
    Unknown(u8),
}

impl HType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Ether,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Ether => 1,
            Self::Unknown(other) => *other,
        }
    }
}

/// Ethernet MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

#[derive(Error, Debug)]
#[error("invalid MAC address: {0}")]
pub struct MacParseError(String);

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| MacParseError(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

/// Parsed DHCPv4 packet: the BOOTP header, options, and the transport
/// envelope the frame arrived with (or should leave with).
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    pub op: Opcode,
    pub htype: HType,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
    // Transport envelope
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl DhcpPacket {
    /// Parse a DHCP payload from raw bytes. The envelope fields are zeroed;
    /// use [`DhcpPacket::decode`] to carry them over from a frame.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < 240 {
            return Err(PacketError::TooShort(data.len()));
        }

        // Magic cookie sits at offset 236
        if data[236..240] != MAGIC_COOKIE {
            return Err(PacketError::InvalidMagic);
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = if data.len() > 240 {
            options::parse_options(&data[240..])
        } else {
            vec![]
        };

        Ok(DhcpPacket {
            op: Opcode::from_code(data[0]),
            htype: HType::from_code(data[1]),
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            sname,
            file,
            options,
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            src_port: 0,
            dst_port: 0,
        })
    }

    /// Decode a link frame: parse the payload and keep the envelope.
    pub fn decode(frame: &Frame) -> Result<Self, PacketError> {
        let mut pkt = Self::parse(&frame.payload)?;
        pkt.src_mac = frame.src_mac;
        pkt.dst_mac = frame.dst_mac;
        pkt.src_ip = frame.src_ip;
        pkt.dst_ip = frame.dst_ip;
        pkt.src_port = frame.src_port;
        pkt.dst_port = frame.dst_port;
        Ok(pkt)
    }

    /// Serialize the BOOTP payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(576);

        buf.push(self.op.code());
        buf.push(self.htype.code());
        buf.push(self.hlen);
        buf.push(self.hops);
        buf.extend_from_slice(&self.xid.to_be_bytes());
        buf.extend_from_slice(&self.secs.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.ciaddr.octets());
        buf.extend_from_slice(&self.yiaddr.octets());
        buf.extend_from_slice(&self.siaddr.octets());
        buf.extend_from_slice(&self.giaddr.octets());
        buf.extend_from_slice(&self.chaddr);
        buf.extend_from_slice(&self.sname);
        buf.extend_from_slice(&self.file);
        buf.extend_from_slice(&MAGIC_COOKIE);

        let opt_bytes = options::encode_options(&self.options);
        buf.extend_from_slice(&opt_bytes);

        // Pad to the conventional 300-byte minimum
        while buf.len() < 300 {
            buf.push(0);
        }

        buf
    }

    /// Encode to a link frame using the packet's envelope fields.
    pub fn encode(&self) -> Frame {
        Frame {
            src_mac: self.src_mac,
            dst_mac: self.dst_mac,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            src_port: self.src_port,
            dst_port: self.dst_port,
            payload: self.to_bytes(),
        }
    }

    /// Client hardware address as bytes (`hlen`-limited)
    pub fn mac_bytes(&self) -> &[u8] {
        let len = self.hlen.min(16) as usize;
        &self.chaddr[..len]
    }

    /// Client hardware address as a formatted string (aa:bb:cc:dd:ee:ff)
    pub fn mac_str(&self) -> String {
        self.mac_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Get the DHCP message type
    pub fn msg_type(&self) -> Option<MessageType> {
        options::msg_type(&self.options)
    }

    /// Check if the broadcast flag is set
    pub fn is_broadcast(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_discover() -> Vec<u8> {
        let mut pkt = vec![0u8; 300];
        pkt[0] = 1; // BOOTREQUEST
        pkt[1] = 1; // Ethernet
        pkt[2] = 6; // MAC length
        // XID
        pkt[4..8].copy_from_slice(&0x12345678u32.to_be_bytes());
        // MAC address
        pkt[28..34].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        // Magic cookie
        pkt[236..240].copy_from_slice(&MAGIC_COOKIE);
        // Options: DHCP Message Type = DISCOVER
        pkt[240] = 53;
        pkt[241] = 1;
        pkt[242] = 1;
        pkt[243] = 255; // END
        pkt
    }

    #[test]
    fn test_parse_discover() {
        let data = make_discover();
        let pkt = DhcpPacket::parse(&data).unwrap();
        assert_eq!(pkt.op, Opcode::BootRequest);
        assert_eq!(pkt.htype, HType::Ether);
        assert_eq!(pkt.xid, 0x12345678);
        assert_eq!(pkt.mac_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(pkt.msg_type(), Some(MessageType::Discover));
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            DhcpPacket::parse(&[0u8; 100]),
            Err(PacketError::TooShort(100))
        ));
    }

    #[test]
    fn test_parse_bad_magic() {
        let mut data = make_discover();
        data[236] = 0;
        assert!(matches!(
            DhcpPacket::parse(&data),
            Err(PacketError::InvalidMagic)
        ));
    }

    #[test]
    fn test_roundtrip() {
        let data = make_discover();
        let pkt = DhcpPacket::parse(&data).unwrap();
        let serialized = pkt.to_bytes();
        assert!(serialized.len() >= 300);
        let pkt2 = DhcpPacket::parse(&serialized).unwrap();
        assert_eq!(pkt2.xid, pkt.xid);
        assert_eq!(pkt2.mac_str(), pkt.mac_str());
        assert_eq!(pkt2.msg_type(), pkt.msg_type());
        assert_eq!(pkt2.options, pkt.options);
    }

    #[test]
    fn test_decode_keeps_envelope() {
        let frame = Frame {
            src_mac: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            dst_mac: MacAddr::BROADCAST,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::BROADCAST,
            src_port: 68,
            dst_port: 67,
            payload: make_discover(),
        };
        let pkt = DhcpPacket::decode(&frame).unwrap();
        assert_eq!(pkt.src_mac.to_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(pkt.src_port, 68);
        assert_eq!(pkt.dst_ip, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_mac_parse() {
        let mac: MacAddr = "00:11:22:aa:bb:cc".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]);
        assert!("00:11:22".parse::<MacAddr>().is_err());
        assert!("00:11:22:aa:bb:cc:dd".parse::<MacAddr>().is_err());
        assert!("zz:11:22:aa:bb:cc".parse::<MacAddr>().is_err());
    }
}
