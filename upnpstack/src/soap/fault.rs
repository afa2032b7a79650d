//! SOAP Faults pour UPnP

use std::fmt;

use xmltree::{Element, XMLNode};

use crate::soap::UPNP_CONTROL_NS;
use crate::soap::builder::build_soap_envelope_with_body;
use crate::xml::{child_text, push_text_child};

/// Erreur SOAP (Fault)
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    /// Code du fault (ex: "s:Client")
    pub fault_code: String,

    /// Description de l'erreur
    pub fault_string: String,

    /// Détails UPnP optionnels
    pub upnp_error: Option<UpnpError>,
}

/// Erreur UPnP spécifique
#[derive(Debug, Clone, PartialEq)]
pub struct UpnpError {
    /// Code d'erreur UPnP (ex: 401, 501)
    pub error_code: u16,

    pub error_description: String,
}

impl SoapFault {
    /// Crée un fault SOAP simple
    pub fn new(fault_code: &str, fault_string: &str) -> Self {
        Self {
            fault_code: fault_code.to_string(),
            fault_string: fault_string.to_string(),
            upnp_error: None,
        }
    }

    /// Fault `s:Client` / `UPnPError` tel qu'attendu par les points de contrôle
    pub fn upnp(error_code: u16, error_description: &str) -> Self {
        Self {
            fault_code: "s:Client".to_string(),
            fault_string: "UPnPError".to_string(),
            upnp_error: Some(UpnpError {
                error_code,
                error_description: error_description.to_string(),
            }),
        }
    }

    pub fn error_code(&self) -> Option<u16> {
        self.upnp_error.as_ref().map(|e| e.error_code)
    }

    pub fn to_xml(&self) -> Result<String, xmltree::Error> {
        let code = self.upnp_error.as_ref().map(|e| e.error_code);
        let desc = self
            .upnp_error
            .as_ref()
            .map(|e| e.error_description.as_str());
        build_soap_fault(&self.fault_code, &self.fault_string, code, desc)
    }

    /// Relit un élément `Fault` extrait d'un corps SOAP
    pub(crate) fn from_element(fault: &Element) -> Self {
        let upnp_error = fault
            .get_child("detail")
            .and_then(|d| d.get_child("UPnPError"))
            .map(|e| UpnpError {
                error_code: child_text(e, "errorCode")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0),
                error_description: child_text(e, "errorDescription").unwrap_or_default(),
            });

        Self {
            fault_code: child_text(fault, "faultcode").unwrap_or_default(),
            fault_string: child_text(fault, "faultstring").unwrap_or_default(),
            upnp_error,
        }
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.upnp_error {
            Some(e) => write!(f, "{} ({}: {})", self.fault_string, e.error_code, e.error_description),
            None => write!(f, "{}: {}", self.fault_code, self.fault_string),
        }
    }
}

/// Construit un SOAP Fault XML
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message d'erreur
/// * `upnp_error_code` - Code d'erreur UPnP optionnel (ex: 401)
/// * `upnp_error_desc` - Description d'erreur UPnP optionnelle
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<u16>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");
    push_text_child(&mut fault, "faultcode", fault_code);
    push_text_child(&mut fault, "faultstring", fault_string);

    // detail (si erreur UPnP)
    if let Some(code) = upnp_error_code {
        let mut upnp_error = Element::new("UPnPError");
        upnp_error
            .attributes
            .insert("xmlns".to_string(), UPNP_CONTROL_NS.to_string());
        push_text_child(&mut upnp_error, "errorCode", &code.to_string());
        push_text_child(
            &mut upnp_error,
            "errorDescription",
            upnp_error_desc.unwrap_or_default(),
        );

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    build_soap_envelope_with_body(fault)
}
