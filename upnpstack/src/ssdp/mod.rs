//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Construction et analyse des trames HTTP-sur-UDP de SSDP, écoute multicast
//! et émission des annonces.
//!
//! ## Architecture
//!
//! - [`SsdpMessage`] : trame NOTIFY, M-SEARCH ou réponse unicast
//! - [`Announcement`] : annonce d'un USN (alive, update, byebye, résultat de recherche)
//! - [`SsdpTransport`] / [`UdpTransport`] : émission multicast et unicast
//! - [`SsdpListener`] : boucle de réception sur un socket
//! - [`quirks`] : variantes de l'en-tête `SERVER` pour les clients capricieux
//!
//! ## Constantes SSDP
//!
//! - **Multicast IPv4**: 239.255.255.250:1900
//! - **Multicast IPv6**: ff02::c, ff04::c, ff05::c, ff08::c, ff0e::c
//! - **Max-Age**: 1800 secondes par défaut

mod announce;
pub mod errors;
mod listener;
mod message;
pub mod quirks;
mod transport;

use std::net::{Ipv4Addr, Ipv6Addr};

pub use announce::{Announcement, AnnouncementKind};
pub use errors::SsdpError;
pub use listener::{ListenerHandle, SsdpHandler, SsdpListener};
pub use message::{SsdpMessage, StartLine};
pub use transport::{SsdpTransport, UdpTransport};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Groupes IPv6 : link, admin, site, organisation et global
pub const SSDP_IPV6_GROUPS: [Ipv6Addr; 5] = [
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xc),
    Ipv6Addr::new(0xff04, 0, 0, 0, 0, 0, 0, 0xc),
    Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0, 0xc),
    Ipv6Addr::new(0xff08, 0, 0, 0, 0, 0, 0, 0xc),
    Ipv6Addr::new(0xff0e, 0, 0, 0, 0, 0, 0, 0xc),
];

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité des annonces (en secondes)
pub const MAX_AGE: u32 = 1800;

/// Attente maximale acceptée pour un M-SEARCH (en secondes)
pub const MX_MAX: u32 = 5;

pub const SSDP_ALL: &str = "ssdp:all";
pub const SSDP_DISCOVER: &str = "\"ssdp:discover\"";
