//! Parser SOAP pour actions UPnP

use std::collections::HashMap;

use crate::soap::{SoapBody, SoapEnvelope, SoapFault, SoapHeader};
use crate::xml::{child_elements, parse_element};

/// Action UPnP extraite d'une enveloppe SOAP
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "Play", "SetAVTransportURI")
    pub name: String,

    /// Namespace de l'action (ex: "urn:schemas-upnp-org:service:AVTransport:1")
    pub namespace: Option<String>,

    /// Arguments de l'action
    pub args: HashMap<String, String>,
}

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,

    #[error("Unexpected response element {found}, expected {expected}")]
    UnexpectedResponse { expected: String, found: String },

    #[error("SOAP fault: {0}")]
    Fault(SoapFault),
}

/// Parse une action SOAP à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let action_elem = envelope
        .body
        .first_element()
        .ok_or(SoapParseError::NoAction)?;

    // Format: <u:ActionName xmlns:u="service-urn">...</u:ActionName>
    let args = child_elements(action_elem)
        .map(|e| (e.name.clone(), e.get_text().unwrap_or_default().to_string()))
        .collect();

    Ok(SoapAction {
        name: action_elem.name.clone(),
        namespace: action_elem.namespace.clone(),
        args,
    })
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let root = parse_element(xml)?;

    if root.name != "Envelope" {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = child_elements(&root)
        .find(|e| e.name == "Header")
        .map(|e| SoapHeader { content: e.clone() });

    let body_elem = child_elements(&root)
        .find(|e| e.name == "Body")
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

/// Parse la réponse à `action` et retourne ses valeurs dans l'ordre du document
///
/// Un `Fault` dans le corps est retourné comme [`SoapParseError::Fault`].
pub fn parse_soap_response(xml: &[u8], action: &str) -> Result<Vec<(String, String)>, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let elem = envelope
        .body
        .first_element()
        .ok_or(SoapParseError::NoAction)?;

    if elem.name == "Fault" {
        return Err(SoapParseError::Fault(SoapFault::from_element(elem)));
    }

    let expected = format!("{}Response", action);
    if elem.name != expected {
        return Err(SoapParseError::UnexpectedResponse {
            expected,
            found: elem.name.clone(),
        });
    }

    Ok(child_elements(elem)
        .map(|e| (e.name.clone(), e.get_text().unwrap_or_default().to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::build_soap_response;

    #[test]
    fn test_parse_simple_action() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <InstanceID>0</InstanceID>
      <Speed>1</Speed>
    </u:Play>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Play");
        assert_eq!(
            action.namespace,
            Some("urn:schemas-upnp-org:service:AVTransport:1".to_string())
        );
        assert_eq!(action.args.get("InstanceID"), Some(&"0".to_string()));
        assert_eq!(action.args.get("Speed"), Some(&"1".to_string()));
    }

    #[test]
    fn test_parse_action_no_args() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Stop xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Stop");
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_not_an_envelope() {
        assert!(matches!(
            parse_soap_action(b"<root/>"),
            Err(SoapParseError::MissingEnvelope)
        ));
        assert!(matches!(
            parse_soap_action(b"not xml"),
            Err(SoapParseError::XmlError(_))
        ));
    }

    #[test]
    fn test_parse_response_keeps_order() {
        let values = vec![
            ("B".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ];
        let xml = build_soap_response("urn:x:service:Y:1", "Get", &values).unwrap();
        let parsed = parse_soap_response(xml.as_bytes(), "Get").unwrap();
        assert_eq!(parsed, values);

        assert!(matches!(
            parse_soap_response(xml.as_bytes(), "Other"),
            Err(SoapParseError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_fault_response() {
        let xml = SoapFault::upnp(402, "Invalid Args").to_xml().unwrap();
        match parse_soap_response(xml.as_bytes(), "Get") {
            Err(SoapParseError::Fault(fault)) => {
                assert_eq!(fault.error_code(), Some(402));
                assert_eq!(fault.fault_code, "s:Client");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
