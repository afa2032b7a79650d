use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use tracing::debug;
use uuid::Uuid;
use xmltree::{Element, XMLNode};

use crate::devices::info::icon_list_element;
use crate::devices::{DEVICE_NS, DeviceError, DeviceInfo, DeviceView, Icon, IconSet};
use crate::identifier::device_key;
use crate::services::{HostedService, ServiceInfo, spec_version_element};
use crate::xml::{element_to_string, push_text_child};

/// Device implémenté par ce processus.
///
/// Les URLs sont construites à partir de l'UDN :
///
/// ```text
/// /upnp/<udn>/desc
/// /upnp/<udn>/icons/<file>
/// /upnp/<udn>/<serviceId>/xml
/// /upnp/<udn>/<serviceId>/control
/// /upnp/<udn>/<serviceId>/eventsub
/// ```
///
/// Un device embarqué est décrit dans le document de son device racine.
#[derive(Debug)]
pub struct HostedDevice {
    udn: String,
    domain: String,
    type_: String,
    version: u32,
    info: DeviceInfo,
    spec_version: (u32, u32),
    configid: AtomicU32,
    base_url: String,
    icons: Option<IconSet>,
    services: Vec<Arc<HostedService>>,
    embedded: Vec<HostedDevice>,
}

impl HostedDevice {
    pub fn new(type_: &str, version: u32, info: DeviceInfo) -> Result<Self, DeviceError> {
        if version == 0 {
            return Err(DeviceError::InvalidVersion);
        }
        Ok(Self {
            udn: String::new(),
            domain: "schemas-upnp-org".to_string(),
            type_: type_.to_string(),
            version,
            info,
            spec_version: (2, 0),
            configid: AtomicU32::new(0),
            base_url: String::new(),
            icons: None,
            services: Vec::new(),
            embedded: Vec::new(),
        })
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// Fixes the UDN, with or without its `uuid:` prefix.
    pub fn with_udn(mut self, udn: &str) -> Self {
        self.udn = udn.strip_prefix("uuid:").unwrap_or(udn).to_string();
        self
    }

    /// Sets the advertised icons; a set with no source and no external
    /// prefix could not be fetched and is left out of the description.
    pub fn with_icons(mut self, icons: IconSet) -> Self {
        self.icons = Some(icons);
        self
    }

    /// Mimetype and bytes of the icon file served under `<path>/icons/`.
    pub fn icon(&self, file: &str) -> Option<(String, Vec<u8>)> {
        self.icons.as_ref()?.load(file)
    }

    pub fn add_service(&mut self, service: HostedService) -> Result<Arc<HostedService>, DeviceError> {
        if self.service(service.service_id()).is_some() {
            return Err(DeviceError::ServiceAlreadyExists(
                service.service_id().to_string(),
            ));
        }
        let service = Arc::new(service);
        self.services.push(service.clone());
        Ok(service)
    }

    pub fn add_embedded_device(&mut self, device: HostedDevice) -> Result<(), DeviceError> {
        if !device.udn.is_empty() && self.find_device(&device.udn).is_some() {
            return Err(DeviceError::DeviceAlreadyExists(device.udn.clone()));
        }
        self.embedded.push(device);
        Ok(())
    }

    /// Generates missing UDNs and binds the device tree to `base_url`
    /// (`http://host:port`).
    pub fn init_device(&mut self, base_url: &str) {
        if self.udn.is_empty() {
            self.udn = Uuid::new_v4().to_string();
            debug!(udn = %self.udn, "generated UDN for {}", self.type_);
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        for device in &mut self.embedded {
            device.init_device(base_url);
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> String {
        format!("/upnp/{}", self.udn)
    }

    pub fn description_path(&self) -> String {
        format!("{}/desc", self.path())
    }

    /// Absolute URL of the description document.
    pub fn location(&self) -> String {
        format!("{}{}", self.base_url, self.description_path())
    }

    pub fn set_configid(&self, configid: u32) {
        self.configid.store(configid, Ordering::Relaxed);
        for device in &self.embedded {
            device.set_configid(configid);
        }
    }

    pub fn services(&self) -> &[Arc<HostedService>] {
        &self.services
    }

    /// Looks a service up by id, ignoring case.
    pub fn service(&self, service_id: &str) -> Option<&Arc<HostedService>> {
        self.services
            .iter()
            .find(|s| s.service_id().eq_ignore_ascii_case(service_id))
    }

    pub fn embedded_devices(&self) -> &[HostedDevice] {
        &self.embedded
    }

    /// Finds this device or one of its descendants by UDN.
    pub fn find_device(&self, udn: &str) -> Option<&HostedDevice> {
        let key = device_key(udn);
        if device_key(&self.udn) == key {
            return Some(self);
        }
        self.embedded.iter().find_map(|d| d.find_device(&key))
    }

    /// This device followed by its descendants, depth first.
    pub fn all_devices(&self) -> Vec<&HostedDevice> {
        let mut devices = vec![self];
        for device in &self.embedded {
            devices.extend(device.all_devices());
        }
        devices
    }

    pub fn service_info(&self, service: &HostedService) -> ServiceInfo {
        let prefix = format!("{}/{}", self.path(), service.service_id());
        ServiceInfo {
            service_type: service.service_type().to_string(),
            service_id_urn: service.service_id_urn().to_string(),
            scpd_url: format!("{}/xml", prefix),
            control_url: format!("{}/control", prefix),
            event_sub_url: format!("{}/eventsub", prefix),
        }
    }

    /// Serialises the description document of this device tree.
    pub fn get_xml(&self) -> Result<String, DeviceError> {
        let mut root = Element::new("root");
        root.attributes
            .insert("xmlns".to_string(), DEVICE_NS.to_string());
        root.attributes
            .insert("configId".to_string(), self.configid().to_string());
        root.children
            .push(XMLNode::Element(spec_version_element(self.spec_version)));
        root.children.push(XMLNode::Element(self.xml_walker()));

        element_to_string(&root).map_err(|e| DeviceError::XmlWrite(e.to_string()))
    }

    fn xml_walker(&self) -> Element {
        let mut elem = Element::new("device");
        push_text_child(&mut elem, "deviceType", &self.device_type());
        self.info.write_to(&mut elem);
        push_text_child(&mut elem, "UDN", &format!("uuid:{}", self.udn));

        let icons = self.icons();
        if !icons.is_empty() {
            elem.children
                .push(XMLNode::Element(icon_list_element(&icons)));
        }

        if !self.services.is_empty() {
            let mut list = Element::new("serviceList");
            for service in &self.services {
                list.children
                    .push(XMLNode::Element(self.service_info(service).to_element()));
            }
            elem.children.push(XMLNode::Element(list));
        }

        if !self.embedded.is_empty() {
            let mut list = Element::new("deviceList");
            for device in &self.embedded {
                list.children.push(XMLNode::Element(device.xml_walker()));
            }
            elem.children.push(XMLNode::Element(list));
        }

        if let Some(url) = &self.info.presentation_url {
            push_text_child(&mut elem, "presentationURL", url);
        }
        elem
    }
}

impl DeviceView for HostedDevice {
    fn udn(&self) -> &str {
        &self.udn
    }

    fn device_type(&self) -> String {
        format!("urn:{}:device:{}:{}", self.domain, self.type_, self.version)
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn spec_version(&self) -> (u32, u32) {
        self.spec_version
    }

    fn configid(&self) -> u32 {
        self.configid.load(Ordering::Relaxed)
    }

    fn icons(&self) -> Vec<Icon> {
        match &self.icons {
            Some(set) if set.is_reachable() => set.icons(&format!("{}/icons", self.path())),
            _ => Vec::new(),
        }
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
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ActionDef, ActionResult, ServiceBuilder, StateVariableDef};
    use crate::variable_types::StateVarType;
    use crate::xml::{child_text, parse_element};

    fn service(id: &str) -> HostedService {
        ServiceBuilder::new(&format!("urn:schemas-upnp-org:service:{}:1", id), id)
            .variable(StateVariableDef::argument("A_ARG_TYPE_Value", StateVarType::String))
            .action(ActionDef::new("Get").output("Value", "A_ARG_TYPE_Value"))
            .handler("Get", |_, _| Ok(ActionResult::Value("x".into())))
            .build()
            .unwrap()
    }

    fn device() -> HostedDevice {
        let mut device = HostedDevice::new("MediaServer", 1, DeviceInfo::new("Salon", "acme", "box"))
            .unwrap()
            .with_icons(IconSet::new("logo").with_source(|_, icon| {
                (icon.width == 48).then(|| b"PNG".to_vec())
            }));
        device.add_service(service("ContentDirectory")).unwrap();
        device.add_service(service("ConnectionManager")).unwrap();

        let mut child = HostedDevice::new("Printer", 2, DeviceInfo::new("Child", "acme", "p"))
            .unwrap()
            .with_udn("uuid:child-1");
        child.add_service(service("Print")).unwrap();
        device.add_embedded_device(child).unwrap();
        device
    }

    #[test]
    fn test_init_device_generates_udn() {
        let mut device = device();
        device.init_device("http://10.0.0.1:8080/");
        assert_eq!(device.udn().len(), 36);
        assert_eq!(device.embedded_udns(), vec!["child-1".to_string()]);
        assert_eq!(
            device.location(),
            format!("http://10.0.0.1:8080/upnp/{}/desc", device.udn())
        );
        assert!(device.find_device("CHILD-1").is_some());
        assert_eq!(device.all_devices().len(), 2);
    }

    #[test]
    fn test_duplicate_service_is_rejected() {
        let mut device = device();
        assert!(matches!(
            device.add_service(service("contentdirectory")),
            Err(DeviceError::ServiceAlreadyExists(_))
        ));
    }

    #[test]
    fn test_zero_version_is_rejected() {
        assert!(matches!(
            HostedDevice::new("X", 0, DeviceInfo::default()),
            Err(DeviceError::InvalidVersion)
        ));
    }

    #[test]
    fn test_get_xml() {
        let mut device = device().with_udn("root-1");
        device.init_device("http://h:1");
        device.set_configid(7);

        let xml = device.get_xml().unwrap();
        let root = parse_element(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attributes.get("configId").map(String::as_str), Some("7"));

        let dev = root.get_child("device").unwrap();
        assert_eq!(
            child_text(dev, "deviceType").as_deref(),
            Some("urn:schemas-upnp-org:device:MediaServer:1")
        );
        assert_eq!(child_text(dev, "UDN").as_deref(), Some("uuid:root-1"));
        assert_eq!(dev.get_child("iconList").unwrap().children.len(), 4);

        let services = dev.get_child("serviceList").unwrap();
        let first = services.get_child("service").unwrap();
        assert_eq!(
            child_text(first, "controlURL").as_deref(),
            Some("/upnp/root-1/ContentDirectory/control")
        );

        let embedded = dev
            .get_child("deviceList")
            .and_then(|l| l.get_child("device"))
            .unwrap();
        assert_eq!(child_text(embedded, "UDN").as_deref(), Some("uuid:child-1"));
    }

    #[test]
    fn test_icon_lookup() {
        let device = device();
        let (mimetype, bytes) = device.icon("logo_48x48_24.jpg").unwrap();
        assert_eq!(mimetype, "image/jpeg");
        assert_eq!(bytes, b"PNG".to_vec());
        assert!(device.icon("logo_120x120_24.png").is_none());
        assert!(device.icon("desc").is_none());

        let plain = HostedDevice::new("Printer", 1, DeviceInfo::new("p", "acme", "p"))
            .unwrap()
            .with_icons(IconSet::new("logo"));
        assert!(plain.icons().is_empty());
        assert!(plain.icon("logo_48x48_24.png").is_none());
    }

    #[test]
    fn test_unique_service_types() {
        let mut device = HostedDevice::new("X", 1, DeviceInfo::default()).unwrap();
        device
            .add_service(
                ServiceBuilder::new("urn:schemas-upnp-org:service:Print:1", "Print1")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        device
            .add_service(
                ServiceBuilder::new("urn:schemas-upnp-org:service:Print:1", "Print2")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(device.service_ids().len(), 2);
        assert_eq!(device.unique_service_types().len(), 1);
    }
}
