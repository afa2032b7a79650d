use thiserror::Error;

#[derive(Error, Debug)]
pub enum SsdpError {
    #[error("SSDP socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed SSDP message: {0}")]
    Malformed(String),

    #[error("Missing {0} header")]
    MissingHeader(String),

    /// Une réponse unicast ne passe jamais par l'émission multicast
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}
