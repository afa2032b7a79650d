/// Utilitaires système pour la pile UPnP.
///
/// - [`guess_local_ip`] : devine l'adresse IP locale utilisée pour les connexions sortantes
/// - [`list_local_addresses`] : liste les adresses des interfaces réseau (hors loopback)
/// - [`get_os_string`] : nom et version du système, pour l'en-tête SSDP `SERVER`
mod ip_utils;

pub use ip_utils::{guess_local_ip, list_local_addresses};

/// Retourne une chaîne décrivant le système d'exploitation et sa version.
///
/// # Format
/// - macOS: "macOS/15.1"
/// - Linux: "Linux/6.5.0" ou "Ubuntu/22.04"
/// - Windows: "Windows/10.0.19045"
/// - Autre: "{OS}/Unknown"
///
/// Les caractères interdits dans un jeton `product/version` (espaces) sont
/// remplacés par des tirets, le résultat est directement utilisable dans un
/// en-tête `SERVER`.
pub fn get_os_string() -> String {
    let info = os_info::get();
    let os_type = format!("{:?}", info.os_type()).replace(' ', "-");

    let version = info.version();
    if version != &os_info::Version::Unknown {
        format!("{}/{}", os_type, version.to_string().replace(' ', "-"))
    } else {
        format!("{}/Unknown", os_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_string_has_product_and_version() {
        let os = get_os_string();
        let (product, version) = os.split_once('/').expect("product/version");
        assert!(!product.is_empty());
        assert!(!version.is_empty());
        assert!(!os.contains(' '));
    }
}
