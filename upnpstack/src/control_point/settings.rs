use std::net::IpAddr;
use std::str::FromStr;

use crate::ssdp::MAX_AGE;

/// Network prefix of the inbound allowlist, e.g. `192.168.1.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid network address: {}", s))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("invalid prefix length: {}", s))?,
            None => max,
        };
        Ok(Self { addr, prefix })
    }
}

/// Runtime parameters of a [`ControlPoint`](super::ControlPoint).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPointSettings {
    /// `http://host:port` prefix of the hosted description URLs
    pub base_url: String,
    /// Addresses to listen on; empty means every local address
    pub bind_addresses: Vec<IpAddr>,
    pub ipv6: bool,
    pub max_age: u32,
    /// Inbound allowlist; empty means "known hosts only"
    pub allowed_networks: Vec<IpNetwork>,
    pub search_on_start: bool,
    pub search_port: Option<u16>,
    pub workers: usize,
    pub worker_queue: usize,
    pub gena_default_timeout: u32,
    pub gena_max_timeout: u32,
}

impl Default for ControlPointSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            bind_addresses: Vec::new(),
            ipv6: false,
            max_age: MAX_AGE,
            allowed_networks: Vec::new(),
            search_on_start: true,
            search_port: None,
            workers: 4,
            worker_queue: 256,
            gena_default_timeout: 1800,
            gena_max_timeout: 7200,
        }
    }
}
