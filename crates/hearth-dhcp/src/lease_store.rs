//! In-memory lease database, one per subnet.
//!
//! Leases are keyed by client identity and expire lazily: an expired lease
//! stays in the map but no longer blocks its address. The subnet task is the
//! only writer, so no locking is needed.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::options;
use crate::packet::DhcpPacket;

/// Stable identity of a client: the Client-Identifier option when present,
/// otherwise (htype, chaddr). A client that changes its identifier is a
/// different client even on the same hardware.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientId {
    Id(Vec<u8>),
    Hw(u8, Vec<u8>),
}

impl ClientId {
    pub fn from_packet(pkt: &DhcpPacket) -> Self {
        match options::client_id(&pkt.options) {
            Some(id) if !id.is_empty() => Self::Id(id.to_vec()),
            _ => Self::Hw(pkt.htype.code(), pkt.mac_bytes().to_vec()),
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = match self {
            Self::Id(id) => id,
            Self::Hw(_, addr) => addr,
        };
        let hex = bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":");
        match self {
            Self::Id(_) => write!(f, "id:{}", hex),
            Self::Hw(htype, _) => write!(f, "hw{}:{}", htype, hex),
        }
    }
}

/// A committed address binding. Times are monotonic so freshness decisions
/// survive wall-clock jumps.
#[derive(Debug, Clone)]
pub struct Lease {
    pub client_id: ClientId,
    pub addr: Ipv4Addr,
    pub tm_start: Instant,
    pub tm_end: Instant,
}

impl Lease {
    pub fn new(client_id: ClientId, addr: Ipv4Addr, lease_time: u32) -> Self {
        let now = Instant::now();
        Self {
            client_id,
            addr,
            tm_start: now,
            tm_end: now + Duration::from_secs(u64::from(lease_time)),
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.tm_end
    }

    /// Seconds remaining, rounded, clamped at 0.
    pub fn timeleft(&self) -> u32 {
        let left = self.tm_end.saturating_duration_since(Instant::now());
        left.as_secs_f64().round() as u32
    }

    /// Remaining lifetime plus the fractional T1/T2 values derived from it.
    pub fn timeleft3(&self, t1_ratio: f32, t2_ratio: f32) -> (u32, u32, u32) {
        let left = self.timeleft();
        let t1 = (left as f64 * f64::from(t1_ratio)).round() as u32;
        let t2 = (left as f64 * f64::from(t2_ratio)).round() as u32;
        (left, t1, t2)
    }
}

/// True if `addr` lies within the inclusive range.
pub fn addr_in_range(addr: Ipv4Addr, range: (Ipv4Addr, Ipv4Addr)) -> bool {
    let (low, high) = range;
    u32::from(low) <= u32::from(addr) && u32::from(addr) <= u32::from(high)
}

/// Per-subnet lease database keyed by client identity.
#[derive(Debug, Default)]
pub struct LeaseStore {
    leases: HashMap<ClientId, Lease>,
}

impl LeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, client_id: &ClientId) -> Option<&Lease> {
        self.leases.get(client_id)
    }

    /// Insert or overwrite the lease for `client_id`.
    pub fn replace(&mut self, client_id: ClientId, lease: Lease) {
        assert_eq!(
            client_id, lease.client_id,
            "lease stored under a foreign client id"
        );
        self.leases.insert(client_id, lease);
    }

    /// No-op if the client has no lease.
    pub fn remove(&mut self, client_id: &ClientId) {
        self.leases.remove(client_id);
    }

    /// True iff no unexpired lease holds `addr`.
    pub fn addr_available(&self, addr: Ipv4Addr) -> bool {
        !self
            .leases
            .values()
            .any(|l| l.addr == addr && !l.expired())
    }

    /// First available address in the inclusive range, scanning from the
    /// bottom. Deterministic: replaying the same state yields the same
    /// address. `None` iff every address is held by an unexpired lease.
    pub fn usable_addr(&self, range: (Ipv4Addr, Ipv4Addr)) -> Option<Ipv4Addr> {
        let (low, high) = range;
        (u32::from(low)..=u32::from(high))
            .map(Ipv4Addr::from)
            .find(|addr| self.addr_available(*addr))
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> ClientId {
        ClientId::Hw(1, vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, n])
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    const RANGE: (Ipv4Addr, Ipv4Addr) =
        (Ipv4Addr::new(192, 168, 1, 100), Ipv4Addr::new(192, 168, 1, 200));

    #[test]
    fn test_replace_and_lookup() {
        let mut store = LeaseStore::new();
        assert!(store.lookup(&cid(1)).is_none());

        store.replace(cid(1), Lease::new(cid(1), ip(100), 3600));
        assert_eq!(store.lookup(&cid(1)).unwrap().addr, ip(100));

        // overwrite with a new address
        store.replace(cid(1), Lease::new(cid(1), ip(101), 3600));
        assert_eq!(store.lookup(&cid(1)).unwrap().addr, ip(101));
        assert_eq!(store.len(), 1);

        store.remove(&cid(1));
        assert!(store.is_empty());
        // removing again is a no-op
        store.remove(&cid(1));
    }

    #[test]
    #[should_panic(expected = "foreign client id")]
    fn test_replace_rejects_mismatched_key() {
        let mut store = LeaseStore::new();
        store.replace(cid(1), Lease::new(cid(2), ip(100), 3600));
    }

    #[test]
    fn test_addr_available() {
        let mut store = LeaseStore::new();
        assert!(store.addr_available(ip(100)));

        store.replace(cid(1), Lease::new(cid(1), ip(100), 3600));
        assert!(!store.addr_available(ip(100)));
        assert!(store.addr_available(ip(101)));

        // an expired lease does not block its address
        store.replace(cid(2), Lease::new(cid(2), ip(101), 0));
        assert!(store.addr_available(ip(101)));
    }

    #[test]
    fn test_usable_addr_first_fit() {
        let mut store = LeaseStore::new();
        assert_eq!(store.usable_addr(RANGE), Some(ip(100)));

        store.replace(cid(1), Lease::new(cid(1), ip(100), 3600));
        assert_eq!(store.usable_addr(RANGE), Some(ip(101)));

        // expired leases free their address up again
        store.replace(cid(2), Lease::new(cid(2), ip(101), 0));
        assert_eq!(store.usable_addr(RANGE), Some(ip(101)));
    }

    #[test]
    fn test_usable_addr_exhaustion() {
        let mut store = LeaseStore::new();
        let small = (ip(100), ip(102));
        for n in 0..3u8 {
            store.replace(
                cid(n),
                Lease::new(cid(n), ip(100 + n), 3600),
            );
        }
        assert_eq!(store.usable_addr(small), None);

        // one lease expiring makes the pool usable again
        store.replace(cid(1), Lease::new(cid(1), ip(101), 0));
        assert_eq!(store.usable_addr(small), Some(ip(101)));
    }

    #[test]
    fn test_addr_in_range() {
        assert!(addr_in_range(ip(100), RANGE));
        assert!(addr_in_range(ip(200), RANGE));
        assert!(addr_in_range(ip(150), RANGE));
        assert!(!addr_in_range(ip(99), RANGE));
        assert!(!addr_in_range(ip(201), RANGE));
        assert!(!addr_in_range(Ipv4Addr::new(10, 0, 0, 1), RANGE));
    }

    #[test]
    fn test_timeleft() {
        let lease = Lease::new(cid(1), ip(100), 3600);
        assert!(!lease.expired());
        let left = lease.timeleft();
        assert!(left >= 3599 && left <= 3600);

        let gone = Lease::new(cid(1), ip(100), 0);
        assert!(gone.expired());
        assert_eq!(gone.timeleft(), 0);
    }

    #[test]
    fn test_timeleft3_ratios() {
        let lease = Lease::new(cid(1), ip(100), 3600);
        let (lt, t1, t2) = lease.timeleft3(0.5, 0.875);
        assert!(t1 <= t2 && t2 <= lt);
        // T1 is half the lifetime, T2 is 87.5% of it (rounded)
        assert_eq!(t1, (lt as f64 * 0.5).round() as u32);
        assert_eq!(t2, (lt as f64 * 0.875).round() as u32);
    }
}
