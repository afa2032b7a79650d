use std::{fmt, str::FromStr};

use crate::variable_types::{BinaryEncoding, NativeType, StateValueError, StateVarType};

impl fmt::Display for StateVarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            StateVarType::UI1 => "ui1",
            StateVarType::UI2 => "ui2",
            StateVarType::UI4 => "ui4",
            StateVarType::UI8 => "ui8",
            StateVarType::I1 => "i1",
            StateVarType::I2 => "i2",
            StateVarType::I4 => "i4",
            StateVarType::I8 => "i8",
            StateVarType::Int => "int",
            StateVarType::R4 => "r4",
            StateVarType::R8 => "r8",
            StateVarType::Number => "number",
            StateVarType::Float => "float",
            StateVarType::Fixed14_4 => "fixed.14.4",
            StateVarType::Char => "char",
            StateVarType::String => "string",
            StateVarType::Boolean => "boolean",
            StateVarType::BinBase64 => "bin.base64",
            StateVarType::BinHex => "bin.hex",
            StateVarType::Date => "date",
            StateVarType::DateTime => "dateTime",
            StateVarType::DateTimeTZ => "dateTime.tz",
            StateVarType::Time => "time",
            StateVarType::TimeTZ => "time.tz",
            StateVarType::UUID => "uuid",
            StateVarType::URI => "uri",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for StateVarType {
    type Err = StateValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ui1" => Ok(StateVarType::UI1),
            "ui2" => Ok(StateVarType::UI2),
            "ui4" => Ok(StateVarType::UI4),
            "ui8" => Ok(StateVarType::UI8),
            "i1" => Ok(StateVarType::I1),
            "i2" => Ok(StateVarType::I2),
            "i4" => Ok(StateVarType::I4),
            "i8" => Ok(StateVarType::I8),
            "int" => Ok(StateVarType::Int),
            "r4" => Ok(StateVarType::R4),
            "r8" => Ok(StateVarType::R8),
            "number" => Ok(StateVarType::Number),
            "float" => Ok(StateVarType::Float),
            "fixed.14.4" => Ok(StateVarType::Fixed14_4),
            "char" => Ok(StateVarType::Char),
            "string" => Ok(StateVarType::String),
            "boolean" => Ok(StateVarType::Boolean),
            "bin.base64" => Ok(StateVarType::BinBase64),
            "bin.hex" => Ok(StateVarType::BinHex),
            "date" => Ok(StateVarType::Date),
            "datetime" => Ok(StateVarType::DateTime),
            "datetime.tz" => Ok(StateVarType::DateTimeTZ),
            "time" => Ok(StateVarType::Time),
            "time.tz" => Ok(StateVarType::TimeTZ),
            "uuid" => Ok(StateVarType::UUID),
            "uri" => Ok(StateVarType::URI),
            _ => Err(StateValueError::UnknownType(s.to_string())),
        }
    }
}

impl StateVarType {
    /// Native representation of the type.
    pub fn native_type(&self) -> NativeType {
        match self {
            StateVarType::UI1 => NativeType::Int { bits: 8, signed: false },
            StateVarType::UI2 => NativeType::Int { bits: 16, signed: false },
            StateVarType::UI4 => NativeType::Int { bits: 32, signed: false },
            StateVarType::UI8 => NativeType::Int { bits: 64, signed: false },
            StateVarType::I1 => NativeType::Int { bits: 8, signed: true },
            StateVarType::I2 => NativeType::Int { bits: 16, signed: true },
            StateVarType::I4 | StateVarType::Int => NativeType::Int { bits: 32, signed: true },
            StateVarType::I8 => NativeType::Int { bits: 64, signed: true },
            StateVarType::R4 => NativeType::Float { bits: 32 },
            StateVarType::R8 | StateVarType::Number | StateVarType::Float => {
                NativeType::Float { bits: 64 }
            }
            StateVarType::Fixed14_4 => NativeType::Fixed14_4,
            StateVarType::Char => NativeType::Char,
            StateVarType::String => NativeType::Str,
            StateVarType::Boolean => NativeType::Bool,
            StateVarType::BinBase64 => NativeType::Bytes(BinaryEncoding::Base64),
            StateVarType::BinHex => NativeType::Bytes(BinaryEncoding::Hex),
            StateVarType::Date => NativeType::Date,
            StateVarType::DateTime => NativeType::DateTime { tz: false },
            StateVarType::DateTimeTZ => NativeType::DateTime { tz: true },
            StateVarType::Time => NativeType::Time { tz: false },
            StateVarType::TimeTZ => NativeType::Time { tz: true },
            StateVarType::UUID => NativeType::Uuid,
            StateVarType::URI => NativeType::Uri,
        }
    }

    pub fn bit_size(&self) -> Option<u8> {
        match self.native_type() {
            NativeType::Int { bits, .. } | NativeType::Float { bits } => Some(bits),
            NativeType::Fixed14_4 => Some(64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.native_type(),
            NativeType::Int { .. } | NativeType::Float { .. } | NativeType::Fixed14_4
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.native_type(), NativeType::Int { .. })
    }

    pub fn is_string(&self) -> bool {
        matches!(self, StateVarType::String)
    }
}
