//! Extension de `upnpconfig::Config` pour la pile UPnP
//!
//! Le trait [`UpnpStackConfigExt`] expose les clés `upnp.*` de la
//! configuration et construit les [`ControlPointSettings`] correspondants.
//!
//! ```yaml
//! upnp:
//!   bind_addresses: []
//!   ipv6: false
//!   max_age: 1800
//!   allowed_networks: ["192.168.1.0/24"]
//!   quirks: ["upnp_1_0"]
//!   gena:
//!     default_timeout: 1800
//!     max_timeout: 7200
//! ```

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_yaml::Value;
use tracing::warn;
use upnpconfig::{Config, impl_bool_config, impl_string_list_config, impl_usize_config};

use crate::control_point::{ControlPointSettings, IpNetwork};
use crate::ssdp::{MAX_AGE, quirks};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_WORKER_QUEUE: usize = 256;
const DEFAULT_HTTP_TIMEOUT: usize = 10;
const DEFAULT_GENA_TIMEOUT: usize = 1800;
const DEFAULT_GENA_MAX_TIMEOUT: usize = 7200;
const DEFAULT_FRIENDLY_NAME: &str = "UPnP Stack";

/// Trait d'extension pour la configuration UPnP
///
/// # Exemple
///
/// ```rust,ignore
/// use upnpconfig::get_config;
/// use upnpstack::UpnpStackConfigExt;
///
/// let config = get_config();
/// config.apply_quirks();
/// let settings = config.control_point_settings()?;
/// ```
pub trait UpnpStackConfigExt {
    fn get_upnp_workers(&self) -> Result<usize>;
    fn set_upnp_workers(&self, size: usize) -> Result<()>;

    fn get_upnp_worker_queue(&self) -> Result<usize>;
    fn set_upnp_worker_queue(&self, size: usize) -> Result<()>;

    /// Durée de validité des annonces SSDP, en secondes (défaut : 1800)
    fn get_upnp_max_age(&self) -> Result<usize>;
    fn set_upnp_max_age(&self, size: usize) -> Result<()>;

    /// Timeout des requêtes HTTP sortantes, en secondes
    fn get_upnp_http_timeout(&self) -> Result<usize>;
    fn set_upnp_http_timeout(&self, size: usize) -> Result<()>;

    fn get_gena_default_timeout(&self) -> Result<usize>;
    fn set_gena_default_timeout(&self, size: usize) -> Result<()>;

    fn get_gena_max_timeout(&self) -> Result<usize>;
    fn set_gena_max_timeout(&self, size: usize) -> Result<()>;

    fn get_upnp_ipv6(&self) -> Result<bool>;
    fn set_upnp_ipv6(&self, value: bool) -> Result<()>;

    fn get_upnp_search_on_start(&self) -> Result<bool>;
    fn set_upnp_search_on_start(&self, value: bool) -> Result<()>;

    fn get_upnp_bind_addresses(&self) -> Result<Vec<String>>;
    fn set_upnp_bind_addresses(&self, values: Vec<String>) -> Result<()>;

    fn get_upnp_allowed_networks(&self) -> Result<Vec<String>>;
    fn set_upnp_allowed_networks(&self, values: Vec<String>) -> Result<()>;

    /// Noms des quirks SSDP (`server_linux`, `server_windows`, `upnp_1_0`)
    fn get_upnp_quirks(&self) -> Result<Vec<String>>;
    fn set_upnp_quirks(&self, values: Vec<String>) -> Result<()>;

    /// Nom affiché du device hébergé par défaut
    fn get_device_friendly_name(&self) -> String;

    /// UDN du device hébergé par défaut, généré et sauvegardé au premier appel
    fn get_device_udn(&self) -> Result<String>;

    /// `http://<host>:<port>`, préfixe des URLs des devices hébergés
    fn get_upnp_base_url(&self) -> String;

    fn get_http_timeout_duration(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_upnp_http_timeout()? as u64))
    }

    /// Active les quirks configurés pour tout le processus.
    fn apply_quirks(&self) -> Result<()> {
        let names = self.get_upnp_quirks()?;
        quirks::add_quirks_by_name(&names);
        Ok(())
    }

    /// Construit les paramètres du point de contrôle.
    ///
    /// Une adresse ou un réseau invalide est une erreur.
    fn control_point_settings(&self) -> Result<ControlPointSettings> {
        let bind_addresses = self
            .get_upnp_bind_addresses()?
            .iter()
            .map(|a| {
                a.parse::<IpAddr>()
                    .map_err(|_| anyhow!("invalid bind address: {}", a))
            })
            .collect::<Result<Vec<_>>>()?;
        let allowed_networks = self
            .get_upnp_allowed_networks()?
            .iter()
            .map(|n| n.parse::<IpNetwork>().map_err(|e| anyhow!(e)))
            .collect::<Result<Vec<_>>>()?;

        let max_age = u32::try_from(self.get_upnp_max_age()?).unwrap_or(MAX_AGE);
        let default_timeout = u32::try_from(self.get_gena_default_timeout()?).unwrap_or(u32::MAX);
        let max_timeout = u32::try_from(self.get_gena_max_timeout()?).unwrap_or(u32::MAX);
        if default_timeout > max_timeout {
            warn!(
                "GENA default timeout {} above maximum {}",
                default_timeout, max_timeout
            );
        }

        Ok(ControlPointSettings {
            base_url: self.get_upnp_base_url(),
            bind_addresses,
            ipv6: self.get_upnp_ipv6()?,
            max_age,
            allowed_networks,
            search_on_start: self.get_upnp_search_on_start()?,
            search_port: None,
            workers: self.get_upnp_workers()?.max(1),
            worker_queue: self.get_upnp_worker_queue()?.max(1),
            gena_default_timeout: default_timeout.min(max_timeout),
            gena_max_timeout: max_timeout,
        })
    }
}

impl UpnpStackConfigExt for Config {
    impl_usize_config!(
        get_upnp_workers,
        set_upnp_workers,
        &["upnp", "workers"],
        DEFAULT_WORKERS
    );
    impl_usize_config!(
        get_upnp_worker_queue,
        set_upnp_worker_queue,
        &["upnp", "worker_queue"],
        DEFAULT_WORKER_QUEUE
    );
    impl_usize_config!(
        get_upnp_max_age,
        set_upnp_max_age,
        &["upnp", "max_age"],
        MAX_AGE as usize
    );
    impl_usize_config!(
        get_upnp_http_timeout,
        set_upnp_http_timeout,
        &["upnp", "http_timeout"],
        DEFAULT_HTTP_TIMEOUT
    );
    impl_usize_config!(
        get_gena_default_timeout,
        set_gena_default_timeout,
        &["upnp", "gena", "default_timeout"],
        DEFAULT_GENA_TIMEOUT
    );
    impl_usize_config!(
        get_gena_max_timeout,
        set_gena_max_timeout,
        &["upnp", "gena", "max_timeout"],
        DEFAULT_GENA_MAX_TIMEOUT
    );
    impl_bool_config!(get_upnp_ipv6, set_upnp_ipv6, &["upnp", "ipv6"], false);
    impl_bool_config!(
        get_upnp_search_on_start,
        set_upnp_search_on_start,
        &["upnp", "search_on_start"],
        true
    );
    impl_string_list_config!(
        get_upnp_bind_addresses,
        set_upnp_bind_addresses,
        &["upnp", "bind_addresses"]
    );
    impl_string_list_config!(
        get_upnp_allowed_networks,
        set_upnp_allowed_networks,
        &["upnp", "allowed_networks"]
    );
    impl_string_list_config!(get_upnp_quirks, set_upnp_quirks, &["upnp", "quirks"]);

    fn get_device_friendly_name(&self) -> String {
        match self.get_value(&["upnp", "device", "friendly_name"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => DEFAULT_FRIENDLY_NAME.to_string(),
        }
    }

    fn get_device_udn(&self) -> Result<String> {
        self.get_or_create_udn(&["upnp", "device", "udn"])
    }

    fn get_upnp_base_url(&self) -> String {
        let host = self.get_base_url();
        if host.starts_with("http://") || host.starts_with("https://") {
            return host.trim_end_matches('/').to_string();
        }
        format!("http://{}:{}", host, self.get_http_port())
    }
}
