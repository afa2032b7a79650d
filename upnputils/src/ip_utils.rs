use get_if_addrs::get_if_addrs;
use std::net::{IpAddr, UdpSocket};
use tracing::warn;

/// Devine l'adresse IP locale de la machine.
///
/// Crée un socket UDP et le "connecte" vers un serveur DNS public : aucun paquet
/// n'est émis, mais le système choisit l'interface de sortie, dont on lit l'adresse.
/// En cas d'échec, retourne `127.0.0.1`.
pub fn guess_local_ip() -> IpAddr {
    let fallback = IpAddr::from([127, 0, 0, 1]);
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip();
                }
            }
            fallback
        }
        Err(_) => fallback,
    }
}

/// Liste les adresses IP non-loopback des interfaces réseau.
///
/// Les adresses IPv6 ne sont retournées que si `include_ipv6` est vrai ; les
/// adresses IPv6 link-local (`fe80::/10`) sont conservées car SSDP s'en sert
/// pour le groupe `ff02::c`.
///
/// Une erreur d'énumération des interfaces donne une liste vide : l'appelant
/// se rabat alors sur les adresses génériques (`0.0.0.0` / `::`).
pub fn list_local_addresses(include_ipv6: bool) -> Vec<IpAddr> {
    let interfaces = match get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut result: Vec<IpAddr> = Vec::new();
    for iface in interfaces {
        let ip = iface.ip();
        if ip.is_loopback() || (ip.is_ipv6() && !include_ipv6) {
            continue;
        }
        if !result.contains(&ip) {
            result.push(ip);
        }
    }
    result
}
