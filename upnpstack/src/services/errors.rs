use thiserror::Error;

use crate::http::HttpError;
use crate::soap::{SoapFault, error_codes};
use crate::variable_types::StateValueError;

/// Errors raised while parsing or building a service description.
#[derive(Error, Debug)]
pub enum ScpdError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    XmlWrite(String),

    #[error("Not an SCPD document (root element is {0})")]
    NotScpd(String),

    #[error("Missing {0} element")]
    MissingElement(String),

    #[error("Unknown dataType '{data_type}' for state variable {variable}")]
    UnknownDataType { variable: String, data_type: String },

    #[error("allowedValueList is only valid on string variables ({0})")]
    AllowedValuesOnNonString(String),

    #[error("allowedValueRange is only valid on numeric variables ({0})")]
    RangeOnNonNumeric(String),

    #[error("State variable {0} declares both allowedValueList and allowedValueRange")]
    ConflictingConstraints(String),

    #[error("Invalid value for state variable {variable}: {source}")]
    InvalidValue {
        variable: String,
        source: StateValueError,
    },

    #[error("Argument {argument} of action {action} references unknown state variable {variable}")]
    UnknownRelatedVariable {
        action: String,
        argument: String,
        variable: String,
    },

    #[error("Invalid direction '{direction}' for argument {argument} of action {action}")]
    InvalidDirection {
        action: String,
        argument: String,
        direction: String,
    },

    #[error("Action {0} declares more than one return value")]
    MultipleReturnValues(String),

    #[error("Duplicate definition of {0}")]
    Duplicate(String),

    #[error("No handler registered for action {0}")]
    MissingHandler(String),

    #[error("Handler registered for undeclared action {0}")]
    UnknownAction(String),

    #[error("Cannot fetch SCPD: {0}")]
    Fetch(#[from] HttpError),
}

/// Errors raised by an action call, each mapped to a UPnP error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Invalid action {0}")]
    InvalidAction(String),

    #[error("Missing required argument {0}")]
    MissingArgument(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid state variable {0}")]
    InvalidVariable(String),

    #[error("Invalid value for argument {argument}: {reason}")]
    ArgumentValueInvalid { argument: String, reason: String },

    #[error("Value of argument {0} is out of range")]
    ArgumentValueOutOfRange(String),

    #[error("Action failed: {0}")]
    Failed(String),

    #[error("Remote UPnP error {code}: {description}")]
    Remote { code: u16, description: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ActionError::Failed(msg.into())
    }

    pub fn code(&self) -> u16 {
        match self {
            ActionError::InvalidAction(_) => error_codes::INVALID_ACTION,
            ActionError::MissingArgument(_) | ActionError::InvalidArgs(_) => {
                error_codes::INVALID_ARGS
            }
            ActionError::InvalidVariable(_) => error_codes::INVALID_VAR,
            ActionError::ArgumentValueInvalid { .. } => error_codes::ARGUMENT_VALUE_INVALID,
            ActionError::ArgumentValueOutOfRange(_) => error_codes::ARGUMENT_VALUE_OUT_OF_RANGE,
            ActionError::Failed(_) | ActionError::Transport(_) => error_codes::ACTION_FAILED,
            ActionError::Remote { code, .. } => *code,
        }
    }

    /// Short UPnP description sent in `errorDescription`.
    pub fn description(&self) -> String {
        match self {
            ActionError::InvalidAction(_) => "Invalid Action".to_string(),
            ActionError::MissingArgument(_) | ActionError::InvalidArgs(_) => {
                "Invalid Args".to_string()
            }
            ActionError::InvalidVariable(_) => "Invalid Var".to_string(),
            ActionError::ArgumentValueInvalid { .. } => "Argument Value Invalid".to_string(),
            ActionError::ArgumentValueOutOfRange(_) => "Argument Value Out of Range".to_string(),
            ActionError::Failed(msg) => msg.clone(),
            ActionError::Transport(msg) => msg.clone(),
            ActionError::Remote { description, .. } => description.clone(),
        }
    }

    pub fn to_fault(&self) -> SoapFault {
        SoapFault::upnp(self.code(), &self.description())
    }
}

impl From<&ActionError> for SoapFault {
    fn from(err: &ActionError) -> Self {
        err.to_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ActionError::InvalidAction("X".into()).code(), 401);
        assert_eq!(ActionError::MissingArgument("A".into()).code(), 402);
        assert_eq!(ActionError::ArgumentValueOutOfRange("A".into()).code(), 601);
        assert_eq!(
            ActionError::Remote {
                code: 714,
                description: "Illegal MIME-type".into()
            }
            .to_fault()
            .error_code(),
            Some(714)
        );
    }
}
