//! Bornes (`allowedValueRange`) des variables numériques.

use crate::variable_types::{StateValue, StateValueError};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    min: StateValue,
    max: StateValue,
    step: Option<StateValue>,
}

impl ValueRange {
    pub fn new(min: StateValue, max: StateValue) -> Result<Self, StateValueError> {
        let (Some(lo), Some(hi)) = (min.as_f64(), max.as_f64()) else {
            return Err(StateValueError::TypeError(
                "value range bounds must be numeric".to_string(),
            ));
        };

        if lo > hi {
            return Err(StateValueError::RangeError(
                "Minimum cannot be greater than maximum".to_string(),
            ));
        }

        Ok(Self {
            min,
            max,
            step: None,
        })
    }

    pub fn with_step(mut self, step: StateValue) -> Result<Self, StateValueError> {
        match step.as_f64() {
            Some(s) if s > 0.0 => {
                self.step = Some(step);
                Ok(self)
            }
            _ => Err(StateValueError::RangeError(
                "step must be a positive number".to_string(),
            )),
        }
    }

    pub fn minimum(&self) -> &StateValue {
        &self.min
    }

    pub fn maximum(&self) -> &StateValue {
        &self.max
    }

    pub fn step(&self) -> Option<&StateValue> {
        self.step.as_ref()
    }

    /// True when `value` lies between the bounds and on a step boundary.
    pub fn is_in_range(&self, value: &StateValue) -> bool {
        let (Some(v), Some(lo), Some(hi)) = (value.as_f64(), self.min.as_f64(), self.max.as_f64())
        else {
            return false;
        };

        if v < lo || v > hi {
            return false;
        }

        match self.step.as_ref().and_then(StateValue::as_f64) {
            Some(step) => {
                let steps = (v - lo) / step;
                (steps - steps.round()).abs() < 1e-9
            }
            None => true,
        }
    }
}
