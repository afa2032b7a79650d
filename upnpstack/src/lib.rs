//! # upnpstack
//!
//! UPnP device host and control point.
//!
//! - [`ssdp`] : découverte multicast (annonces, recherches, réponses)
//! - [`devices`] / [`services`] : modèle des devices et services, hébergés ou découverts
//! - [`soap`] : enveloppes de contrôle
//! - [`gena`] : abonnements et notifications d'événements
//! - [`control_point`] : registre des USN, ordonnanceur et routage HTTP
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use upnpstack::control_point::{ControlPoint, ControlPointSettings};
//! use upnpstack::hooks::HookBus;
//! use upnpstack::http::UreqHttpClient;
//! use upnpstack::ssdp::UdpTransport;
//!
//! let transport = Arc::new(UdpTransport::new(false)?);
//! let http = Arc::new(UreqHttpClient::new(Duration::from_secs(10)));
//! let cp = ControlPoint::new(ControlPointSettings::default(), transport, http, HookBus::new())?;
//! cp.start()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config_ext;
pub mod control_point;
pub mod devices;
pub mod gena;
pub mod hooks;
pub mod http;
pub mod identifier;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod tasks;
pub mod value_ranges;
pub mod variable_types;
pub(crate) mod xml;

pub use crate::config_ext::UpnpStackConfigExt;
pub use crate::control_point::{ControlPoint, ControlPointError, ControlPointSettings};
pub use crate::identifier::{Identifier, get_identifier};
