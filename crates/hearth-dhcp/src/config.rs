//! Server configuration: the serde file model and its resolved runtime form.
//!
//! The file keeps addresses as strings; `resolve` turns them into typed
//! values once at startup so the hot path never re-parses.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::DhcpOption;
use crate::packet::MacAddr;

/// Default fraction of the lease time after which the client renews (T1).
pub const T1_RATIO: f32 = 0.5;
/// Default fraction of the lease time after which the client rebinds (T2).
pub const T2_RATIO: f32 = 0.875;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_lease_time")]
    pub default_lease_time_secs: u32,
    #[serde(default = "default_min_lease_time")]
    pub min_lease_time_secs: u32,
    #[serde(default = "default_max_lease_time")]
    pub max_lease_time_secs: u32,
    #[serde(default = "default_t1_ratio")]
    pub t1_ratio: f32,
    #[serde(default = "default_t2_ratio")]
    pub t2_ratio: f32,
    #[serde(default)]
    pub subnets: Vec<SubnetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetConfig {
    pub interface: String,
    pub address: String,
    #[serde(default)]
    pub mac: String,
    pub network: String,
    pub range_start: String,
    pub range_end: String,
    #[serde(default)]
    pub lease_time_secs: Option<u32>,
    #[serde(default)]
    pub routers: Vec<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub domain: String,
}

fn default_hostname() -> String {
    "hearth".to_string()
}

fn default_lease_time() -> u32 {
    3600
}

fn default_min_lease_time() -> u32 {
    60
}

fn default_max_lease_time() -> u32 {
    86400
}

fn default_t1_ratio() -> f32 {
    T1_RATIO
}

fn default_t2_ratio() -> f32 {
    T2_RATIO
}

impl Default for DhcpConfig {
    fn default() -> Self {
        serde_json::from_str("{}").unwrap()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("subnet {subnet}: invalid {field} '{value}'")]
    Invalid {
        subnet: String,
        field: &'static str,
        value: String,
    },
    #[error("subnet {subnet}: range {low}-{high} is not inside {network}")]
    RangeOutsideNetwork {
        subnet: String,
        low: Ipv4Addr,
        high: Ipv4Addr,
        network: Ipv4Net,
    },
    #[error("subnet {subnet}: range start {low} is above range end {high}")]
    RangeInverted {
        subnet: String,
        low: Ipv4Addr,
        high: Ipv4Addr,
    },
}

/// The network interface a subnet is served on.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub mac: MacAddr,
}

/// Resolved per-subnet configuration.
#[derive(Debug, Clone)]
pub struct Subnet {
    pub network: Ipv4Net,
    pub interface: Interface,
    pub range: (Ipv4Addr, Ipv4Addr),
    pub lease_time: Option<u32>,
    /// Server defaults handed out on request, filtered by the client's
    /// parameter request list.
    pub options: Vec<DhcpOption>,
}

/// Resolved global configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub hostname: String,
    pub default_lease_time: u32,
    pub min_lease_time: u32,
    pub max_lease_time: u32,
    pub t1_ratio: f32,
    pub t2_ratio: f32,
    pub subnets: Vec<Subnet>,
}

impl Config {
    /// Lease time for this subnet, falling back to the global default.
    pub fn default_lease_time(&self, subnet: &Subnet) -> u32 {
        subnet.lease_time.unwrap_or(self.default_lease_time)
    }

    /// True if a client-requested lease time is within the configured bounds.
    pub fn lease_time_good(&self, t: u32) -> bool {
        self.min_lease_time <= t && t <= self.max_lease_time
    }
}

impl SubnetConfig {
    fn invalid(&self, field: &'static str, value: &str) -> ConfigError {
        ConfigError::Invalid {
            subnet: self.interface.clone(),
            field,
            value: value.to_string(),
        }
    }

    pub fn resolve(&self) -> Result<Subnet, ConfigError> {
        let network: Ipv4Net = self
            .network
            .parse()
            .map_err(|_| self.invalid("network", &self.network))?;
        let addr: Ipv4Addr = self
            .address
            .parse()
            .map_err(|_| self.invalid("address", &self.address))?;
        let mac: MacAddr = if self.mac.is_empty() {
            MacAddr::ZERO
        } else {
            self.mac.parse().map_err(|_| self.invalid("mac", &self.mac))?
        };
        let low: Ipv4Addr = self
            .range_start
            .parse()
            .map_err(|_| self.invalid("range_start", &self.range_start))?;
        let high: Ipv4Addr = self
            .range_end
            .parse()
            .map_err(|_| self.invalid("range_end", &self.range_end))?;

        if u32::from(low) > u32::from(high) {
            return Err(ConfigError::RangeInverted {
                subnet: self.interface.clone(),
                low,
                high,
            });
        }
        if !network.contains(&low) || !network.contains(&high) {
            return Err(ConfigError::RangeOutsideNetwork {
                subnet: self.interface.clone(),
                low,
                high,
                network,
            });
        }

        let mut options = Vec::new();
        if !self.routers.is_empty() {
            let routers = self
                .routers
                .iter()
                .map(|r| r.parse().map_err(|_| self.invalid("routers", r)))
                .collect::<Result<Vec<Ipv4Addr>, _>>()?;
            options.push(DhcpOption::Router(routers));
        }
        if !self.dns_servers.is_empty() {
            let servers = self
                .dns_servers
                .iter()
                .map(|d| d.parse().map_err(|_| self.invalid("dns_servers", d)))
                .collect::<Result<Vec<Ipv4Addr>, _>>()?;
            options.push(DhcpOption::DnsServer(servers));
        }
        if !self.domain.is_empty() {
            options.push(DhcpOption::DomainName(self.domain.clone()));
        }
        options.push(DhcpOption::BroadcastAddr(network.broadcast()));

        Ok(Subnet {
            network,
            interface: Interface {
                name: self.interface.clone(),
                addr,
                mac,
            },
            range: (low, high),
            lease_time: self.lease_time_secs,
            options,
        })
    }
}

impl DhcpConfig {
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let subnets = self
            .subnets
            .iter()
            .map(SubnetConfig::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Config {
            hostname: self.hostname.clone(),
            default_lease_time: self.default_lease_time_secs,
            min_lease_time: self.min_lease_time_secs,
            max_lease_time: self.max_lease_time_secs,
            t1_ratio: self.t1_ratio,
            t2_ratio: self.t2_ratio,
            subnets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DhcpConfig::default();
        assert_eq!(config.hostname, "hearth");
        assert_eq!(config.default_lease_time_secs, 3600);
        assert_eq!(config.min_lease_time_secs, 60);
        assert_eq!(config.max_lease_time_secs, 86400);
        assert!(config.subnets.is_empty());
    }

    fn subnet_json() -> &'static str {
        r#"{
            "interface": "eth0",
            "address": "192.168.1.1",
            "mac": "02:00:00:00:00:01",
            "network": "192.168.1.0/24",
            "range_start": "192.168.1.100",
            "range_end": "192.168.1.200",
            "routers": ["192.168.1.1"],
            "dns_servers": ["192.168.1.1", "1.1.1.1"],
            "domain": "lan"
        }"#
    }

    #[test]
    fn test_resolve_subnet() {
        let sc: SubnetConfig = serde_json::from_str(subnet_json()).unwrap();
        let subnet = sc.resolve().unwrap();
        assert_eq!(subnet.interface.addr, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(subnet.network.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(
            subnet.range,
            (Ipv4Addr::new(192, 168, 1, 100), Ipv4Addr::new(192, 168, 1, 200))
        );
        // routers, dns, domain, broadcast
        assert_eq!(subnet.options.len(), 4);
        assert!(subnet
            .options
            .contains(&DhcpOption::BroadcastAddr(Ipv4Addr::new(192, 168, 1, 255))));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let mut sc: SubnetConfig = serde_json::from_str(subnet_json()).unwrap();
        sc.network = "not-a-network".into();
        assert!(matches!(sc.resolve(), Err(ConfigError::Invalid { .. })));

        let mut sc: SubnetConfig = serde_json::from_str(subnet_json()).unwrap();
        sc.range_start = "192.168.1.201".into();
        sc.range_end = "192.168.1.100".into();
        assert!(matches!(sc.resolve(), Err(ConfigError::RangeInverted { .. })));

        let mut sc: SubnetConfig = serde_json::from_str(subnet_json()).unwrap();
        sc.range_end = "10.0.0.5".into();
        assert!(matches!(
            sc.resolve(),
            Err(ConfigError::RangeOutsideNetwork { .. })
        ));
    }

    #[test]
    fn test_lease_time_bounds() {
        let config = DhcpConfig::default().resolve().unwrap();
        assert!(config.lease_time_good(60));
        assert!(config.lease_time_good(3600));
        assert!(config.lease_time_good(86400));
        assert!(!config.lease_time_good(59));
        assert!(!config.lease_time_good(86401));
    }

    #[test]
    fn test_per_subnet_lease_time() {
        let json = format!(
            r#"{{"subnets": [{}]}}"#,
            subnet_json()
        );
        let mut fc: DhcpConfig = serde_json::from_str(&json).unwrap();
        fc.subnets[0].lease_time_secs = Some(600);
        let config = fc.resolve().unwrap();
        assert_eq!(config.default_lease_time(&config.subnets[0]), 600);

        fc.subnets[0].lease_time_secs = None;
        let config = fc.resolve().unwrap();
        assert_eq!(config.default_lease_time(&config.subnets[0]), 3600);
    }
}
