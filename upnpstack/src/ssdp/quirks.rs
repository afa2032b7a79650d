//! Process-wide interoperability switches for the `SERVER` header.
//!
//! Some clients only talk to servers claiming to run a specific OS or to speak
//! `UPnP/1.0`. Quirks are bits added to a global mask; they apply to every
//! outgoing message.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{info, warn};

pub const SERVER_LINUX: u32 = 1;
pub const SERVER_WINDOWS: u32 = 1 << 1;
pub const UPNP_1_0: u32 = 1 << 2;

static QUIRKS: AtomicU32 = AtomicU32::new(0);

pub fn quirk_from_name(name: &str) -> Option<u32> {
    match name.trim().to_ascii_lowercase().as_str() {
        "server_linux" => Some(SERVER_LINUX),
        "server_windows" => Some(SERVER_WINDOWS),
        "upnp_1_0" => Some(UPNP_1_0),
        _ => None,
    }
}

/// Adds `bits` to the global mask.
pub fn add_quirks(bits: u32) {
    QUIRKS.fetch_or(bits, Ordering::Relaxed);
}

/// Adds every known quirk in `names`; unknown names are logged and skipped.
pub fn add_quirks_by_name<S: AsRef<str>>(names: &[S]) {
    for name in names {
        match quirk_from_name(name.as_ref()) {
            Some(bit) => {
                info!("SSDP quirk enabled: {}", name.as_ref());
                add_quirks(bit);
            }
            None => warn!("Unknown SSDP quirk: {}", name.as_ref()),
        }
    }
}

pub fn quirks() -> u32 {
    QUIRKS.load(Ordering::Relaxed)
}

pub fn has_quirk(bit: u32) -> bool {
    quirks() & bit != 0
}

/// `SERVER` header value for a given quirk mask.
pub fn server_string_for(mask: u32) -> String {
    let os = if mask & SERVER_LINUX != 0 {
        "Linux/3.0".to_string()
    } else if mask & SERVER_WINDOWS != 0 {
        "Windows/10.0".to_string()
    } else {
        upnputils::get_os_string()
    };
    let upnp = if mask & UPNP_1_0 != 0 {
        "UPnP/1.0 UPnP/2.0"
    } else {
        "UPnP/2.0"
    };
    format!("{} {} upnpstack/{}", os, upnp, env!("CARGO_PKG_VERSION"))
}

/// `SERVER` header value under the current global mask.
pub fn server_string() -> String {
    server_string_for(quirks())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quirk_names() {
        assert_eq!(quirk_from_name("server_linux"), Some(SERVER_LINUX));
        assert_eq!(quirk_from_name(" UPNP_1_0 "), Some(UPNP_1_0));
        assert_eq!(quirk_from_name("nope"), None);
    }

    #[test]
    fn test_server_string_variants() {
        let plain = server_string_for(0);
        assert!(plain.contains(" UPnP/2.0 upnpstack/"));
        assert!(!plain.contains("UPnP/1.0"));

        let linux = server_string_for(SERVER_LINUX | UPNP_1_0);
        assert!(linux.starts_with("Linux/3.0 UPnP/1.0 UPnP/2.0"));

        let windows = server_string_for(SERVER_WINDOWS);
        assert!(windows.starts_with("Windows/10.0 "));
    }
}
