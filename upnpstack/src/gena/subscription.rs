use std::net::{IpAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::GenaError;

/// Largest sequence number; the next one is 1, never 0.
pub const SEQ_NUMBER_MAX: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub sid: String,
    pub usn: String,
    pub callbacks: Vec<String>,
    pub ips: Vec<IpAddr>,
    /// Next sequence number to deliver
    pub seq: u32,
    pub timeout: u32,
    /// Subscribed variables, `None` for all
    pub variables: Option<Vec<String>>,
    /// Changes accumulated since the last delivery
    pub moderated_changes: u32,
    pub time_updated: Option<Instant>,
}

impl Subscription {
    pub(crate) fn new(
        usn: &str,
        callbacks: Vec<String>,
        ips: Vec<IpAddr>,
        timeout: u32,
        variables: Option<Vec<String>>,
    ) -> Self {
        Self {
            sid: derive_sid(&callbacks),
            usn: usn.to_string(),
            callbacks,
            ips,
            seq: 1,
            timeout,
            variables,
            moderated_changes: 0,
            time_updated: None,
        }
    }

    /// Applies the moderation rules to an event touching `touched`.
    ///
    /// Returns the sequence number to send, and advances the counter, when
    /// the event is approved.
    pub(crate) fn approve_seq_for_event(
        &mut self,
        touched: &[&str],
        interval: Duration,
        delta: u32,
        now: Instant,
    ) -> Option<u32> {
        if let Some(filter) = &self.variables
            && !touched.iter().any(|t| filter.iter().any(|f| f == t))
        {
            return None;
        }

        self.moderated_changes = self.moderated_changes.saturating_add(1);

        if !interval.is_zero()
            && let Some(last) = self.time_updated
            && now.saturating_duration_since(last) < interval
        {
            return None;
        }
        if delta > 0 && self.moderated_changes < delta {
            return None;
        }

        let seq = self.seq;
        self.seq = if seq >= SEQ_NUMBER_MAX { 1 } else { seq + 1 };
        self.moderated_changes = 0;
        self.time_updated = Some(now);
        Some(seq)
    }
}

/// `uuid:` + UUIDv5 of the sorted callback URLs.
pub fn derive_sid(callbacks: &[String]) -> String {
    let mut sorted: Vec<&str> = callbacks.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let name = sorted.join(" ");
    format!("uuid:{}", Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
}

/// Reads the `<url>` tokens of a `CALLBACK` header.
pub fn parse_callbacks(header: &str) -> Result<Vec<String>, GenaError> {
    let mut callbacks = Vec::new();
    let mut rest = header.trim();
    while let Some(start) = rest.find('<') {
        let end = rest[start..]
            .find('>')
            .ok_or_else(|| GenaError::InvalidCallback(header.to_string()))?;
        let token = rest[start + 1..start + end].trim();
        let url = Url::parse(token).map_err(|_| GenaError::InvalidCallback(token.to_string()))?;
        if url.scheme() != "http" || url.host_str().is_none() {
            return Err(GenaError::InvalidCallback(token.to_string()));
        }
        callbacks.push(token.to_string());
        rest = &rest[start + end + 1..];
    }
    if callbacks.is_empty() {
        return Err(GenaError::InvalidCallback(header.to_string()));
    }
    Ok(callbacks)
}

/// Resolves the hosts of callback URLs; unresolvable hosts are skipped.
pub(crate) fn resolve_ips(callbacks: &[String]) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for callback in callbacks {
        let Ok(url) = Url::parse(callback) else {
            continue;
        };
        let resolved: Vec<IpAddr> = match url.host() {
            Some(url::Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(url::Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(url::Host::Domain(host)) => {
                let port = url.port_or_known_default().unwrap_or(80);
                match (host, port).to_socket_addrs() {
                    Ok(addrs) => addrs.map(|a| a.ip()).collect(),
                    Err(e) => {
                        debug!("cannot resolve callback host {}: {}", host, e);
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };
        for ip in resolved {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips
}

/// Reads `Second-<n>` or `Second-infinite`; `infinite` maps to `u32::MAX`.
pub fn parse_timeout_header(header: &str) -> Result<u32, GenaError> {
    let value = header.trim();
    let seconds = value
        .get(..7)
        .filter(|p| p.eq_ignore_ascii_case("second-"))
        .map(|_| &value[7..])
        .ok_or_else(|| GenaError::InvalidTimeout(value.to_string()))?;
    if seconds.eq_ignore_ascii_case("infinite") {
        return Ok(u32::MAX);
    }
    seconds
        .parse()
        .map_err(|_| GenaError::InvalidTimeout(value.to_string()))
}
