//! Link abstraction: one frame in, one frame out, per subnet.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::Result;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use crate::packet::MacAddr;
use crate::reply::SERVER_PORT;

/// A datagram plus its transport envelope. The link implementation owns the
/// actual L2/L3/UDP framing; the engine only reads and fills these fields.
#[derive(Debug, Clone)]
pub struct Frame {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

/// Capability to read and send one frame at a time on a subnet's interface.
pub trait Link: Send {
    fn recv(&mut self) -> impl Future<Output = Result<Frame>> + Send;
    fn send(&mut self, frame: &Frame) -> impl Future<Output = Result<()>> + Send;
}

/// UDP/67 link with SO_BROADCAST, bound to one interface. The kernel does
/// the L2 work, so MAC fields are informational here: unicast replies are
/// addressed by IP and the broadcast MAC maps to 255.255.255.255.
pub struct UdpLink {
    socket: tokio::net::UdpSocket,
    buf: Box<[u8; 1500]>,
}

impl UdpLink {
    pub fn bind(interface: &str) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;

        let addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SERVER_PORT).into();
        socket.bind(&addr.into())?;

        #[cfg(target_os = "linux")]
        if !interface.is_empty() {
            socket.bind_device(Some(interface.as_bytes()))?;
            info!("DHCP socket bound to interface {}", interface);
        }

        socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(socket.into())?;
        info!("DHCP socket listening on 0.0.0.0:{}", SERVER_PORT);

        Ok(Self {
            socket,
            buf: Box::new([0u8; 1500]),
        })
    }
}

impl Link for UdpLink {
    async fn recv(&mut self) -> Result<Frame> {
        let (len, src) = self.socket.recv_from(&mut self.buf[..]).await?;
        let (src_ip, src_port) = match src {
            SocketAddr::V4(v4) => (*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => (Ipv4Addr::UNSPECIFIED, v6.port()),
        };
        Ok(Frame {
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            src_ip,
            src_port,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            dst_port: SERVER_PORT,
            payload: self.buf[..len].to_vec(),
        })
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let dst_ip = if frame.dst_mac == MacAddr::BROADCAST {
            Ipv4Addr::BROADCAST
        } else {
            frame.dst_ip
        };
        let dst = SocketAddrV4::new(dst_ip, frame.dst_port);
        self.socket.send_to(&frame.payload, SocketAddr::from(dst)).await?;
        Ok(())
    }
}
