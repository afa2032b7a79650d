use crate::services::ActionError;
use crate::value_ranges::ValueRange;
use crate::variable_types::{NativeType, StateValue, StateValueError, StateVarType, get_native};

/// A `stateVariable` entry of a service description.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariableDef {
    pub name: String,
    pub data_type: StateVarType,
    pub native_type: NativeType,
    pub send_events: bool,
    pub multicast: bool,
    pub default_value: Option<String>,
    pub allowed_values: Option<Vec<String>>,
    pub value_range: Option<ValueRange>,
}

impl StateVariableDef {
    /// Evented, non multicast variable without constraint.
    pub fn new(name: &str, data_type: StateVarType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            native_type: data_type.native_type(),
            send_events: true,
            multicast: false,
            default_value: None,
            allowed_values: None,
            value_range: None,
        }
    }

    /// `A_ARG_TYPE_*` style helper variable: never evented.
    pub fn argument(name: &str, data_type: StateVarType) -> Self {
        Self::new(name, data_type).no_events()
    }

    pub fn no_events(mut self) -> Self {
        self.send_events = false;
        self
    }

    pub fn multicast(mut self) -> Self {
        self.multicast = true;
        self
    }

    pub fn xmlns(mut self, urn: &str) -> Self {
        self.native_type = NativeType::Xmlns {
            urn: urn.to_string(),
        };
        self
    }

    pub fn default_value(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    pub fn allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn value_range(mut self, range: ValueRange) -> Self {
        self.value_range = Some(range);
        self
    }

    /// Decodes a wire value and checks it against the declared constraints.
    pub fn decode(&self, wire: &str) -> Result<StateValue, StateValueError> {
        let value = get_native(&self.native_type, wire)?;

        if let Some(allowed) = &self.allowed_values {
            if !allowed.iter().any(|a| a == wire) {
                return Err(StateValueError::NotAllowed(format!(
                    "'{}' is not in the allowed list of {}",
                    wire, self.name
                )));
            }
        }

        if let Some(range) = &self.value_range {
            if !range.is_in_range(&value) {
                return Err(StateValueError::RangeError(format!(
                    "'{}' is out of the range of {}",
                    wire, self.name
                )));
            }
        }

        Ok(value)
    }

    /// Same as [`decode`](Self::decode) with errors mapped to UPnP codes
    /// 600 (invalid) and 601 (out of range) for `argument`.
    pub fn decode_argument(&self, argument: &str, wire: &str) -> Result<StateValue, ActionError> {
        self.decode(wire).map_err(|e| match e {
            StateValueError::RangeError(_) | StateValueError::NotAllowed(_) => {
                ActionError::ArgumentValueOutOfRange(argument.to_string())
            }
            other => ActionError::ArgumentValueInvalid {
                argument: argument.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_values() {
        let var = StateVariableDef::new("TransportState", StateVarType::String)
            .allowed_values(&["PLAYING", "STOPPED"]);
        assert!(var.decode("PLAYING").is_ok());
        assert!(matches!(
            var.decode_argument("State", "PAUSED"),
            Err(ActionError::ArgumentValueOutOfRange(_))
        ));
    }

    #[test]
    fn test_range_and_type() {
        let var = StateVariableDef::argument("Volume", StateVarType::UI2).value_range(
            ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap(),
        );
        assert_eq!(var.decode("42").unwrap(), StateValue::UI2(42));
        assert!(matches!(
            var.decode_argument("DesiredVolume", "101"),
            Err(ActionError::ArgumentValueOutOfRange(_))
        ));
        assert!(matches!(
            var.decode_argument("DesiredVolume", "loud"),
            Err(ActionError::ArgumentValueInvalid { .. })
        ));
        assert!(!var.send_events);
    }
}
