//! # Module SOAP - Simple Object Access Protocol
//!
//! Enveloppes SOAP 1.1 utilisées par le contrôle UPnP, dans les deux sens :
//!
//! - côté service hébergé : [`parse_soap_action`] puis [`build_soap_response`]
//!   ou [`build_soap_fault`]
//! - côté point de contrôle : [`build_soap_request`] puis [`parse_soap_response`]
//!
//! ## Example
//!
//! ```
//! use upnpstack::soap::{build_soap_request, parse_soap_action};
//!
//! let xml = build_soap_request(
//!     "urn:schemas-upnp-org:service:AVTransport:1",
//!     "Play",
//!     &[("InstanceID", "0"), ("Speed", "1")],
//! ).unwrap();
//!
//! let action = parse_soap_action(xml.as_bytes()).unwrap();
//! assert_eq!(action.name, "Play");
//! assert_eq!(action.args.get("Speed"), Some(&"1".to_string()));
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{SoapFault, UpnpError, build_soap_fault};
pub use parser::{SoapAction, SoapParseError, parse_soap_action, parse_soap_envelope, parse_soap_response};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// Codes d'erreur SOAP UPnP standards
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u16 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u16 = 402;

    /// Variable d'état inconnue (QueryStateVariable)
    pub const INVALID_VAR: u16 = 404;

    /// Action échouée
    pub const ACTION_FAILED: u16 = 501;

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: u16 = 600;

    /// Argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u16 = 601;

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u16 = 602;

    /// Mémoire insuffisante
    pub const OUT_OF_MEMORY: u16 = 603;

    /// Intervention humaine requise
    pub const HUMAN_INTERVENTION_REQUIRED: u16 = 604;

    /// Argument sous forme de chaîne trop long
    pub const STRING_ARGUMENT_TOO_LONG: u16 = 605;
}
