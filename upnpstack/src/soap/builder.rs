//! Construction d'enveloppes SOAP

use xmltree::{Element, XMLNode};

use crate::soap::{SOAP_ENCODING_NS, SOAP_ENVELOPE_NS};
use crate::xml::{element_to_string, push_text_child};

pub(crate) fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    // Body
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    // Envelope
    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING_NS.to_string());
    envelope.children.push(XMLNode::Element(body));

    element_to_string(&envelope)
}

fn build_action_element<'a, I>(service_urn: &str, name: &str, values: I) -> Element
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut elem = Element::new(&format!("u:{}", name));
    elem.attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());
    for (key, value) in values {
        push_text_child(&mut elem, key, value);
    }
    elem
}

/// Construit une réponse SOAP UPnP
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - Nom de l'action (ex: "GetPositionInfo")
/// * `values` - Valeurs de retour, dans l'ordre de déclaration
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(String, String)],
) -> Result<String, xmltree::Error> {
    let elem = build_action_element(
        service_urn,
        &format!("{}Response", action),
        values.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );
    build_soap_envelope_with_body(elem)
}

/// Construit une requête SOAP UPnP
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let elem = build_action_element(service_urn, action, args.iter().copied());
    build_soap_envelope_with_body(elem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response() {
        let values = vec![
            ("Track".to_string(), "5".to_string()),
            ("TrackDuration".to_string(), "00:03:45".to_string()),
        ];

        let xml = build_soap_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetPositionInfo",
            &values,
        )
        .unwrap();

        assert!(xml.contains("GetPositionInfoResponse"));
        assert!(xml.contains("<Track>5</Track>"));
        assert!(xml.contains("<TrackDuration>00:03:45</TrackDuration>"));
        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
    }

    #[test]
    fn test_build_empty_response() {
        let xml = build_soap_response("urn:schemas-upnp-org:service:AVTransport:1", "Stop", &[])
            .unwrap();

        assert!(xml.contains("StopResponse"));
        assert!(xml.contains("xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\""));
    }

    #[test]
    fn test_request_escapes_text() {
        let xml = build_soap_request("urn:x:service:Y:1", "Echo", &[("Text", "a<b&c")]).unwrap();
        assert!(xml.contains("a&lt;b&amp;c"));
    }
}
