//! SSDP frames: HTTP/1.1 headers over UDP, without a body.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpError, quirks};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    /// `NOTIFY * HTTP/1.1` or `M-SEARCH * HTTP/1.1`
    Request { method: String },
    /// `HTTP/1.1 200 OK`
    Response { status: u16 },
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Request { method } => write!(f, "{} * HTTP/1.1", method),
            StartLine::Response { status } => write!(f, "HTTP/1.1 {} OK", status),
        }
    }
}

/// An SSDP message.
///
/// Header names are stored uppercased; [`SsdpMessage::get`] is therefore
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpMessage {
    start: StartLine,
    headers: Vec<(String, String)>,
}

impl SsdpMessage {
    pub fn notify() -> Self {
        Self::request("NOTIFY")
    }

    pub fn search() -> Self {
        Self::request("M-SEARCH")
    }

    fn request(method: &str) -> Self {
        Self {
            start: StartLine::Request {
                method: method.to_string(),
            },
            headers: Vec::new(),
        }
    }

    pub fn response() -> Self {
        Self {
            start: StartLine::Response { status: 200 },
            headers: Vec::new(),
        }
    }

    /// Sets a header, replacing a previous value.
    pub fn header(mut self, name: &str, value: impl ToString) -> Self {
        let name = name.to_ascii_uppercase();
        let value = value.to_string();
        match self.headers.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start, StartLine::Response { .. })
    }

    pub fn is_notify(&self) -> bool {
        self.method() == Some("NOTIFY")
    }

    pub fn is_search(&self) -> bool {
        self.method() == Some("M-SEARCH")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn nt(&self) -> Option<&str> {
        self.get("NT")
    }

    pub fn nts(&self) -> Option<&str> {
        self.get("NTS")
    }

    pub fn usn(&self) -> Option<&str> {
        self.get("USN")
    }

    pub fn st(&self) -> Option<&str> {
        self.get("ST")
    }

    pub fn location(&self) -> Option<&str> {
        self.get("LOCATION")
    }

    pub fn server(&self) -> Option<&str> {
        self.get("SERVER")
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get("USER-AGENT")
    }

    pub fn man(&self) -> Option<&str> {
        self.get("MAN")
    }

    pub fn mx(&self) -> Option<u32> {
        self.number("MX")
    }

    pub fn bootid(&self) -> Option<u32> {
        self.number("BOOTID.UPNP.ORG")
    }

    pub fn configid(&self) -> Option<u32> {
        self.number("CONFIGID.UPNP.ORG")
    }

    pub fn next_bootid(&self) -> Option<u32> {
        self.number("NEXTBOOTID.UPNP.ORG")
    }

    pub fn search_port(&self) -> Option<u16> {
        self.get("SEARCHPORT.UPNP.ORG")
            .and_then(|v| v.trim().parse().ok())
    }

    fn number(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// `max-age` of the `CACHE-CONTROL` header, [`MAX_AGE`] when absent or unreadable.
    pub fn max_age(&self) -> u32 {
        parse_max_age(self.get("CACHE-CONTROL"))
    }

    /// Parses a datagram.
    ///
    /// Returns `None` for anything that is not a `NOTIFY *`, `M-SEARCH *` or
    /// `HTTP/1.x 200` frame.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.lines();
        let first = lines.next()?.trim();

        let start = match parse_start_line(first) {
            Some(start) => start,
            None => {
                trace!("Unknown SSDP start line: {}", first);
                return None;
            }
        };

        let mut message = Self {
            start,
            headers: Vec::new(),
        };
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    message = message.header(name.trim(), value.trim());
                }
                _ => trace!("Skipping malformed header: '{}'", line),
            }
        }
        Some(message)
    }

    /// Serialises the frame with its `HOST`, `SERVER` and `CONTENT-LENGTH`
    /// headers.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{}\r\n", self.start);
        if !self.is_response() && self.get("HOST").is_none() {
            out.push_str(&format!("HOST: {}:{}\r\n", SSDP_MULTICAST_ADDR, SSDP_PORT));
        }
        if !self.is_search() && self.get("SERVER").is_none() {
            out.push_str(&format!("SERVER: {}\r\n", quirks::server_string()));
        }
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        if self.get("CONTENT-LENGTH").is_none() {
            out.push_str("CONTENT-LENGTH: 0\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Bytes of a multicast request. Responses are unicast only.
    pub fn request_bytes(&self) -> Result<Vec<u8>, SsdpError> {
        if self.is_response() {
            return Err(SsdpError::Unsupported(
                "responses cannot be multicast".to_string(),
            ));
        }
        Ok(self.to_bytes())
    }
}

fn parse_start_line(line: &str) -> Option<StartLine> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    let third = parts.next();

    if first.to_ascii_uppercase().starts_with("HTTP/") {
        let status: u16 = second.parse().ok()?;
        return (status == 200).then_some(StartLine::Response { status });
    }

    let method = first.to_ascii_uppercase();
    if (method == "NOTIFY" || method == "M-SEARCH")
        && second == "*"
        && third.is_some_and(|v| v.to_ascii_uppercase().starts_with("HTTP/"))
    {
        return Some(StartLine::Request { method });
    }
    None
}

fn parse_max_age(value: Option<&str>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!(
            "Could not parse max-age from CACHE-CONTROL: '{}', using default {}",
            v, MAX_AGE
        );
    }
    MAX_AGE
}
