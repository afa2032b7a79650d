//! USN (Unique Service Name) codec.
//!
//! A USN announced over SSDP has one of the following shapes:
//!
//! ```text
//! uuid:<uuid>
//! uuid:<uuid>::upnp:rootdevice
//! uuid:<uuid>::urn:<domain>:<class>:<type>:<version>
//! ```
//!
//! [`get_identifier`] splits it into an [`Identifier`], [`Identifier::build_usn`]
//! goes the other way.

use std::fmt;

/// Suffix used by root devices in their dedicated announcement.
pub const ROOTDEVICE: &str = "upnp:rootdevice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierClass {
    Unknown,
    Rootdevice,
    Device,
    Service,
}

impl IdentifierClass {
    fn from_urn_class(class: &str) -> Self {
        match class.to_ascii_lowercase().as_str() {
            "device" => IdentifierClass::Device,
            "service" => IdentifierClass::Service,
            _ => IdentifierClass::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierClass::Unknown => "unknown",
            IdentifierClass::Rootdevice => "rootdevice",
            IdentifierClass::Device => "device",
            IdentifierClass::Service => "service",
        }
    }
}

impl fmt::Display for IdentifierClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured view of a USN.
///
/// `device` is the lookup key shared by every USN of the same device: the
/// UUID lowercased with its hyphens removed. `uuid` keeps the announced form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub device: String,
    pub bootid: Option<u32>,
    pub configid: Option<u32>,
    pub uuid: String,
    pub class: IdentifierClass,
    pub usn: String,
    pub urn: Option<String>,
    pub domain: Option<String>,
    pub type_: Option<String>,
    pub version: Option<String>,
}

impl Identifier {
    /// Builds `uuid:<uuid>[::<urn>]`.
    pub fn build_usn(uuid: &str, urn: Option<&str>) -> String {
        let uuid = strip_uuid_prefix(uuid).unwrap_or(uuid);
        match urn {
            Some(urn) if !urn.is_empty() => format!("uuid:{}::{}", uuid, urn),
            _ => format!("uuid:{}", uuid),
        }
    }

    pub fn rootdevice_usn(uuid: &str) -> String {
        Self::build_usn(uuid, Some(ROOTDEVICE))
    }

    /// Parsed `version` field, `None` when absent or not numeric.
    pub fn version_number(&self) -> Option<u32> {
        self.version.as_deref().and_then(|v| v.parse().ok())
    }

    /// `urn:<domain>:<class>:<type>` without the version.
    pub fn unversioned_urn(&self) -> Option<String> {
        match (&self.domain, &self.type_) {
            (Some(domain), Some(type_)) => {
                Some(format!("urn:{}:{}:{}", domain, self.class, type_))
            }
            _ => None,
        }
    }

    pub fn is_rootdevice(&self) -> bool {
        self.class == IdentifierClass::Rootdevice
    }
}

/// Returns the UUID part without its `uuid:` prefix, matched case-insensitively.
fn strip_uuid_prefix(value: &str) -> Option<&str> {
    match value.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("uuid:") => Some(&value[5..]),
        _ => None,
    }
}

/// Lookup key of a UUID: lowercase, without hyphens.
pub fn device_key(uuid: &str) -> String {
    let uuid = strip_uuid_prefix(uuid).unwrap_or(uuid);
    uuid.chars()
        .filter(|c| *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Components of `urn:<domain>:<class>:<type>:<version>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrnParts<'a> {
    pub domain: &'a str,
    pub class: &'a str,
    pub type_: &'a str,
    pub version: &'a str,
}

impl UrnParts<'_> {
    pub fn version_number(&self) -> Option<u32> {
        self.version.parse().ok()
    }
}

pub fn parse_urn(urn: &str) -> Option<UrnParts<'_>> {
    let parts: Vec<&str> = urn.split(':').collect();
    if parts.len() != 5
        || !parts[0].eq_ignore_ascii_case("urn")
        || parts[1..].iter().any(|p| p.is_empty())
    {
        return None;
    }
    Some(UrnParts {
        domain: parts[1],
        class: parts[2],
        type_: parts[3],
        version: parts[4],
    })
}

/// Parses a USN into an [`Identifier`].
///
/// Returns `None` if `usn` does not start with `uuid:` or carries an empty UUID.
/// A suffix that is neither `upnp:rootdevice` nor a well formed
/// `urn:<domain>:<class>:<type>:<version>` leaves the class `Unknown`.
pub fn get_identifier(usn: &str, bootid: Option<u32>, configid: Option<u32>) -> Option<Identifier> {
    let usn = usn.trim();
    let (head, tail) = match usn.split_once("::") {
        Some((head, tail)) => (head, Some(tail)),
        None => (usn, None),
    };

    let uuid = strip_uuid_prefix(head)?;
    if uuid.is_empty() {
        return None;
    }

    let mut identifier = Identifier {
        device: device_key(uuid),
        bootid,
        configid,
        uuid: uuid.to_string(),
        class: IdentifierClass::Unknown,
        usn: usn.to_string(),
        urn: None,
        domain: None,
        type_: None,
        version: None,
    };

    match tail {
        Some(tail) if tail.eq_ignore_ascii_case(ROOTDEVICE) => {
            identifier.class = IdentifierClass::Rootdevice;
        }
        Some(tail) => {
            if let Some(urn) = parse_urn(tail) {
                identifier.urn = Some(tail.to_string());
                identifier.domain = Some(urn.domain.to_string());
                identifier.class = IdentifierClass::from_urn_class(urn.class);
                identifier.type_ = Some(urn.type_.to_string());
                identifier.version = Some(urn.version.to_string());
            }
        }
        None => {}
    }

    Some(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_usn() {
        let id = get_identifier(
            "uuid:1234-ABCD::urn:schemas-upnp-org:device:MediaServer:1",
            Some(3),
            Some(7),
        )
        .unwrap();

        assert_eq!(id.uuid, "1234-ABCD");
        assert_eq!(id.device, "1234abcd");
        assert_eq!(id.class, IdentifierClass::Device);
        assert_eq!(id.domain.as_deref(), Some("schemas-upnp-org"));
        assert_eq!(id.type_.as_deref(), Some("MediaServer"));
        assert_eq!(id.version.as_deref(), Some("1"));
        assert_eq!(id.version_number(), Some(1));
        assert_eq!(id.bootid, Some(3));
        assert_eq!(id.configid, Some(7));
        assert_eq!(
            id.unversioned_urn().as_deref(),
            Some("urn:schemas-upnp-org:device:MediaServer")
        );
    }

    #[test]
    fn test_service_usn_round_trip() {
        let usn = Identifier::build_usn(
            "uuid:5678",
            Some("urn:schemas-upnp-org:service:ContentDirectory:2"),
        );
        assert_eq!(usn, "uuid:5678::urn:schemas-upnp-org:service:ContentDirectory:2");

        let id = get_identifier(&usn, None, None).unwrap();
        assert_eq!(id.uuid, "5678");
        assert_eq!(id.class, IdentifierClass::Service);
        assert_eq!(id.type_.as_deref(), Some("ContentDirectory"));
        assert_eq!(id.version.as_deref(), Some("2"));
        assert_eq!(id.usn, usn);
    }

    #[test]
    fn test_rootdevice_usn() {
        let id = get_identifier(&Identifier::rootdevice_usn("abc"), None, None).unwrap();
        assert!(id.is_rootdevice());
        assert!(id.urn.is_none());
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let id = get_identifier("UUID:AbC", None, None).unwrap();
        assert_eq!(id.uuid, "AbC");
        assert_eq!(id.device, "abc");
        assert_eq!(id.class, IdentifierClass::Unknown);
    }

    #[test]
    fn test_parse_urn() {
        let urn = parse_urn("urn:schemas-upnp-org:service:AVTransport:3").unwrap();
        assert_eq!(urn.class, "service");
        assert_eq!(urn.version_number(), Some(3));
        assert!(parse_urn("urn:a:b:c").is_none());
        assert!(parse_urn("urn:a::c:1").is_none());
    }

    #[test]
    fn test_malformed_usn() {
        assert!(get_identifier("urn:schemas-upnp-org:device:MediaServer:1", None, None).is_none());
        assert!(get_identifier("uuid:", None, None).is_none());
        assert!(get_identifier("", None, None).is_none());

        let id = get_identifier("uuid:1::urn:bad", None, None).unwrap();
        assert_eq!(id.class, IdentifierClass::Unknown);
        assert!(id.urn.is_none());
    }
}
