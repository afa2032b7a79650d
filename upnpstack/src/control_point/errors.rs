use thiserror::Error;

use crate::devices::DeviceError;
use crate::ssdp::SsdpError;
use crate::tasks::WorkerError;

#[derive(Error, Debug)]
pub enum ControlPointError {
    #[error("Device {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Unknown device {0}")]
    UnknownDevice(String),

    /// Seul un device racine peut être retiré
    #[error("Device {0} is embedded in another device")]
    EmbeddedDevice(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("SSDP error: {0}")]
    Ssdp(#[from] SsdpError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
