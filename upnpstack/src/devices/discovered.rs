use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;
use xmltree::Element;

use crate::devices::info::parse_icon_list;
use crate::devices::{DeviceError, DeviceInfo, DeviceView, Icon};
use crate::http::HttpClient;
use crate::identifier::{Identifier, IdentifierClass, device_key};
use crate::services::{RemoteService, ServiceInfo, parse_spec_version};
use crate::xml::{child_elements, child_text, parse_element};

/// Device découvert sur le réseau.
///
/// Construit en une seule passe à partir de la description XML : une erreur
/// à n'importe quelle étape abandonne toute la construction.
#[derive(Debug)]
pub struct DiscoveredDevice {
    udn: String,
    device_type: String,
    info: DeviceInfo,
    spec_version: (u32, u32),
    configid: u32,
    url_base: String,
    icons: Vec<Icon>,
    services: Vec<Arc<RemoteService>>,
    embedded: Vec<DiscoveredDevice>,
}

impl DiscoveredDevice {
    /// Parses the description fetched from `location` for `identifier`.
    pub fn init_xml_desc(
        identifier: &Identifier,
        location: &str,
        xml: &[u8],
    ) -> Result<Self, DeviceError> {
        let root = parse_element(xml)?;
        if root.name != "root" {
            return Err(DeviceError::NotDeviceDescription(root.name));
        }

        let configid = match root.attributes.get("configId") {
            Some(value) => value.trim().parse::<u32>().ok(),
            None => None,
        };
        if let (Some(announced), Some(found)) = (identifier.configid, configid)
            && announced != found
        {
            return Err(DeviceError::ConfigIdMismatch { announced, found });
        }

        let spec_version = parse_spec_version(&root);
        let url_base = child_text(&root, "URLBase")
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| location.to_string());
        let base =
            Url::parse(&url_base).map_err(|_| DeviceError::InvalidUrl(url_base.clone()))?;

        let device_elem = root
            .get_child("device")
            .ok_or_else(|| DeviceError::MissingElement("device".to_string()))?;
        let device = Self::init_embedded_device_xml_tree(
            device_elem,
            &base,
            spec_version,
            configid.unwrap_or(0),
        )?;

        device.check_describes(identifier)?;
        debug!(
            udn = %device.udn,
            "parsed description of {} ({} services, {} embedded devices)",
            device.info.friendly_name,
            device.services.len(),
            device.embedded.len()
        );
        Ok(device)
    }

    /// Parses one `device` element and its `deviceList` recursively.
    fn init_embedded_device_xml_tree(
        elem: &Element,
        base: &Url,
        spec_version: (u32, u32),
        configid: u32,
    ) -> Result<Self, DeviceError> {
        let udn = child_text(elem, "UDN")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DeviceError::MissingElement("UDN".to_string()))?;
        let udn = udn.strip_prefix("uuid:").unwrap_or(&udn).to_string();
        let device_type = child_text(elem, "deviceType")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DeviceError::MissingElement("deviceType".to_string()))?;

        let mut info = DeviceInfo::from_element(elem);
        if let Some(url) = info.presentation_url.take() {
            info.presentation_url = Some(resolve(base, &url));
        }

        let icons = parse_icon_list(elem)
            .into_iter()
            .map(|mut icon| {
                icon.url = resolve(base, &icon.url);
                icon
            })
            .collect();

        let mut services = Vec::new();
        if let Some(list) = elem.get_child("serviceList") {
            for service in child_elements(list).filter(|e| e.name == "service") {
                let info = ServiceInfo::from_element(service, Some(base))
                    .ok_or_else(|| DeviceError::InvalidService(udn.clone()))?;
                services.push(Arc::new(RemoteService::new(info)));
            }
        }

        let mut embedded = Vec::new();
        if let Some(list) = elem.get_child("deviceList") {
            for device in child_elements(list).filter(|e| e.name == "device") {
                embedded.push(Self::init_embedded_device_xml_tree(
                    device,
                    base,
                    spec_version,
                    configid,
                )?);
            }
        }

        Ok(Self {
            udn,
            device_type,
            info,
            spec_version,
            configid,
            url_base: base.to_string(),
            icons,
            services,
            embedded,
        })
    }

    /// Checks that the document describes the device announced by `identifier`.
    ///
    /// A rootdevice announcement must match the root UDN; a device
    /// announcement must match the type of the described device.
    pub fn check_describes(&self, identifier: &Identifier) -> Result<(), DeviceError> {
        let target = if identifier.class == IdentifierClass::Rootdevice {
            Some(self).filter(|d| device_key(&d.udn) == identifier.device)
        } else {
            self.find_device(&identifier.device)
        };
        let target = target.ok_or_else(|| DeviceError::UdnMismatch(identifier.uuid.clone()))?;

        if identifier.class == IdentifierClass::Device
            && let Some(urn) = &identifier.urn
            && !target.device_type.eq_ignore_ascii_case(urn)
        {
            return Err(DeviceError::DeviceTypeMismatch {
                announced: urn.clone(),
                found: target.device_type.clone(),
            });
        }
        Ok(())
    }

    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    pub fn services(&self) -> &[Arc<RemoteService>] {
        &self.services
    }

    pub fn embedded_devices(&self) -> &[DiscoveredDevice] {
        &self.embedded
    }

    pub fn find_device(&self, udn: &str) -> Option<&DiscoveredDevice> {
        let key = device_key(udn);
        if device_key(&self.udn) == key {
            return Some(self);
        }
        self.embedded.iter().find_map(|d| d.find_device(&key))
    }

    /// Returns the service with `service_id`, fetching its SCPD on first access.
    pub fn get_service(
        &self,
        service_id: &str,
        http: &dyn HttpClient,
    ) -> Result<Arc<RemoteService>, DeviceError> {
        let service = self
            .services
            .iter()
            .find(|s| s.service_id().eq_ignore_ascii_case(service_id))
            .ok_or_else(|| DeviceError::UnknownService(service_id.to_string()))?;
        service.init_scpd(http).inspect_err(|e| {
            warn!(udn = %self.udn, "cannot initialise service {}: {}", service_id, e);
        })?;
        Ok(service.clone())
    }
}

fn resolve(base: &Url, value: &str) -> String {
    match base.join(value) {
        Ok(url) => url.to_string(),
        Err(_) => value.to_string(),
    }
}

impl DeviceView for DiscoveredDevice {
    fn udn(&self) -> &str {
        &self.udn
    }

    fn device_type(&self) -> String {
        self.device_type.clone()
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn spec_version(&self) -> (u32, u32) {
        self.spec_version
    }

    fn configid(&self) -> u32 {
        self.configid
    }

    fn icons(&self) -> Vec<Icon> {
        self.icons.clone()
    }

    fn service_types(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| s.service_type().to_string())
            .collect()
    }

    fn service_ids(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| s.service_id().to_string())
            .collect()
    }

    fn embedded_udns(&self) -> Vec<String> {
        self.embedded.iter().map(|d| d.udn.clone()).collect()
    }

    fn is_managed(&self) -> bool {
        false
    }
}
