use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateValueError {
    #[error("Unknown data type: {0}")]
    UnknownType(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Range error: {0}")]
    RangeError(String),

    #[error("Value not allowed: {0}")]
    NotAllowed(String),
}
