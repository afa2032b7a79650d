//! Erreurs relatives aux devices UPnP.

use thiserror::Error;

use crate::services::ScpdError;

/// Erreurs liées aux devices UPnP.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    XmlWrite(String),

    #[error("Not a device description (root element is {0})")]
    NotDeviceDescription(String),

    #[error("Missing {0} element")]
    MissingElement(String),

    /// Le configId de la description ne correspond pas à l'annonce
    #[error("configId mismatch: announced {announced}, description has {found}")]
    ConfigIdMismatch { announced: u32, found: u32 },

    /// L'UDN annoncé n'est pas décrit par le document
    #[error("UDN {0} is not described by the document")]
    UdnMismatch(String),

    #[error("Device type mismatch: announced {announced}, description has {found}")]
    DeviceTypeMismatch { announced: String, found: String },

    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("Invalid service entry in device {0}")]
    InvalidService(String),

    /// Service déjà existant
    #[error("Service '{0}' already exists in device")]
    ServiceAlreadyExists(String),

    /// Device déjà existant
    #[error("Device '{0}' already exists")]
    DeviceAlreadyExists(String),

    /// Version invalide
    #[error("Device version must be > 0")]
    InvalidVersion,

    #[error("Unknown service {0}")]
    UnknownService(String),

    #[error("Service description error: {0}")]
    Scpd(#[from] ScpdError),
}
