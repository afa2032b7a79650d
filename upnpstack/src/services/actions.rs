use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDef {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
    pub retval: bool,
}

/// An `action` entry of a service description.
///
/// `arguments` keeps the declaration order; the accessors split it into the
/// input arguments, the optional return value and the other outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDef {
    pub name: String,
    pub arguments: Vec<ArgumentDef>,
}

impl ActionDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: Vec::new(),
        }
    }

    fn push(mut self, name: &str, direction: Direction, variable: &str, retval: bool) -> Self {
        self.arguments.push(ArgumentDef {
            name: name.to_string(),
            direction,
            related_state_variable: variable.to_string(),
            retval,
        });
        self
    }

    pub fn input(self, name: &str, variable: &str) -> Self {
        self.push(name, Direction::In, variable, false)
    }

    pub fn output(self, name: &str, variable: &str) -> Self {
        self.push(name, Direction::Out, variable, false)
    }

    pub fn retval(self, name: &str, variable: &str) -> Self {
        self.push(name, Direction::Out, variable, true)
    }

    pub fn argument_variables(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.arguments.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn return_variable(&self) -> Option<&ArgumentDef> {
        self.arguments
            .iter()
            .find(|a| a.direction == Direction::Out && a.retval)
    }

    pub fn result_variables(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.arguments
            .iter()
            .filter(|a| a.direction == Direction::Out && !a.retval)
    }

    /// Output arguments: the return value first, then the results in
    /// declaration order.
    pub fn outputs(&self) -> Vec<&ArgumentDef> {
        self.return_variable()
            .into_iter()
            .chain(self.result_variables())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_split() {
        let action = ActionDef::new("Browse")
            .input("ObjectID", "A_ARG_TYPE_ObjectID")
            .output("NumberReturned", "A_ARG_TYPE_Count")
            .retval("Result", "A_ARG_TYPE_Result")
            .input("Filter", "A_ARG_TYPE_Filter");

        let inputs: Vec<_> = action.argument_variables().map(|a| a.name.as_str()).collect();
        assert_eq!(inputs, ["ObjectID", "Filter"]);

        let outputs: Vec<_> = action.outputs().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(outputs, ["Result", "NumberReturned"]);
    }
}
