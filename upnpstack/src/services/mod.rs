//! # Services UPnP
//!
//! - [`Scpd`] : tables d'actions et de variables d'une SCPD
//! - [`HostedService`] / [`ServiceBuilder`] : service implémenté localement,
//!   appels SOAP dispatchés vers des handlers enregistrés à la construction
//! - [`RemoteService`] : proxy d'un service découvert, SCPD chargée à la demande
//! - [`ServiceInfo`] : entrée `serviceList` d'une description de device

mod actions;
pub mod callable;
mod errors;
mod hosted;
mod remote;
mod scpd;
mod state_variable;

use url::Url;
use xmltree::Element;

use crate::xml::{child_text, push_text_child};

pub use actions::{ActionDef, ArgumentDef, Direction};
pub use errors::{ActionError, ScpdError};
pub use hosted::{
    ActionArgs, ActionHandler, ActionResult, EventSink, HostedService, ServiceBuilder,
};
pub use remote::RemoteService;
pub use scpd::{QUERY_STATE_VARIABLE, SERVICE_NS, Scpd, query_state_variable_action};
pub(crate) use scpd::{parse_spec_version, spec_version_element};
pub use state_variable::StateVariableDef;

/// A `service` entry of a device description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_type: String,
    pub service_id_urn: String,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

fn resolve(base: Option<&Url>, value: &str) -> String {
    match base.and_then(|b| b.join(value).ok()) {
        Some(url) => url.to_string(),
        None => value.to_string(),
    }
}

impl ServiceInfo {
    /// Last segment of the service id URN.
    pub fn service_id(&self) -> &str {
        self.service_id_urn
            .rsplit(':')
            .next()
            .unwrap_or(&self.service_id_urn)
    }

    /// Reads a `service` element, resolving its URLs against `base`.
    pub fn from_element(elem: &Element, base: Option<&Url>) -> Option<Self> {
        let service_type = child_text(elem, "serviceType").filter(|s| !s.is_empty())?;
        let service_id_urn = child_text(elem, "serviceId").filter(|s| !s.is_empty())?;
        let url = |name: &str| child_text(elem, name).map(|v| resolve(base, &v));

        Some(Self {
            service_type,
            service_id_urn,
            scpd_url: url("SCPDURL")?,
            control_url: url("controlURL")?,
            event_sub_url: url("eventSubURL").unwrap_or_default(),
        })
    }

    pub fn to_element(&self) -> Element {
        let mut elem = Element::new("service");
        push_text_child(&mut elem, "serviceType", &self.service_type);
        push_text_child(&mut elem, "serviceId", &self.service_id_urn);
        push_text_child(&mut elem, "SCPDURL", &self.scpd_url);
        push_text_child(&mut elem, "controlURL", &self.control_url);
        push_text_child(&mut elem, "eventSubURL", &self.event_sub_url);
        elem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_element;

    #[test]
    fn test_service_info_resolves_urls() {
        let xml = br#"<service>
            <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
            <SCPDURL>/cd/scpd.xml</SCPDURL>
            <controlURL>cd/control</controlURL>
            <eventSubURL>http://other:1/ev</eventSubURL>
        </service>"#;
        let elem = parse_element(xml).unwrap();
        let base = Url::parse("http://10.0.0.2:8200/desc/root.xml").unwrap();
        let info = ServiceInfo::from_element(&elem, Some(&base)).unwrap();

        assert_eq!(info.service_id(), "ContentDirectory");
        assert_eq!(info.scpd_url, "http://10.0.0.2:8200/cd/scpd.xml");
        assert_eq!(info.control_url, "http://10.0.0.2:8200/desc/cd/control");
        assert_eq!(info.event_sub_url, "http://other:1/ev");
    }

    #[test]
    fn test_service_info_requires_type() {
        let elem = parse_element(b"<service><serviceId>x</serviceId></service>").unwrap();
        assert!(ServiceInfo::from_element(&elem, None).is_none());
    }
}
