pub mod config;
pub mod options;
pub mod packet;
pub mod lease_store;
pub mod reply;
pub mod state_machine;
pub mod link;
pub mod server;

pub use config::{Config, DhcpConfig, Subnet};
pub use lease_store::{ClientId, Lease, LeaseStore};
pub use link::{Frame, Link, UdpLink};
pub use packet::DhcpPacket;
