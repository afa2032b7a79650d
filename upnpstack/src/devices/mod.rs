//! Module pour les devices UPnP.
//!
//! Deux variantes concrètes partagent la vue [`DeviceView`] :
//!
//! - [`HostedDevice`] : device implémenté localement, décrit par
//!   [`HostedDevice::get_xml`] et servi par le `ControlPoint`
//! - [`DiscoveredDevice`] : device distant, construit à partir de sa
//!   description XML par [`DiscoveredDevice::init_xml_desc`]
//! - [`DeviceError`](errors::DeviceError) : erreurs liées aux devices
//!
//! # Exemple
//!
//! ```ignore
//! use upnpstack::devices::{DeviceInfo, HostedDevice};
//!
//! let info = DeviceInfo::new("Salon", "upnpstack", "upnpd");
//! let mut device = HostedDevice::new("MediaServer", 1, info)?;
//! device.add_service(content_directory)?;
//! device.init_device("http://192.168.1.10:8080");
//! let xml = device.get_xml()?;
//! ```

mod discovered;
pub mod errors;
mod hosted;
mod info;

use crate::identifier::Identifier;

pub use discovered::DiscoveredDevice;
pub use errors::DeviceError;
pub use hosted::HostedDevice;
pub use info::{DeviceInfo, Icon, IconSet};

/// XML namespace of device descriptions.
pub const DEVICE_NS: &str = "urn:schemas-upnp-org:device-1-0";

/// Read access shared by hosted and discovered devices.
pub trait DeviceView {
    /// UDN without the `uuid:` prefix.
    fn udn(&self) -> &str;

    /// Full `urn:<domain>:device:<type>:<version>`.
    fn device_type(&self) -> String;

    fn info(&self) -> &DeviceInfo;

    fn spec_version(&self) -> (u32, u32);

    fn configid(&self) -> u32;

    fn icons(&self) -> Vec<Icon>;

    /// Service types in declaration order, duplicates included.
    fn service_types(&self) -> Vec<String>;

    fn service_ids(&self) -> Vec<String>;

    /// UDNs of the direct embedded devices.
    fn embedded_udns(&self) -> Vec<String>;

    fn is_managed(&self) -> bool;

    fn friendly_name(&self) -> &str {
        &self.info().friendly_name
    }

    fn usn(&self) -> String {
        Identifier::build_usn(self.udn(), Some(self.device_type().as_str()))
    }

    /// Service types without duplicates, first occurrence kept.
    fn unique_service_types(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for service_type in self.service_types() {
            if !unique.iter().any(|t| t.eq_ignore_ascii_case(&service_type)) {
                unique.push(service_type);
            }
        }
        unique
    }
}
