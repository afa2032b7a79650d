use std::fmt;

use crate::variable_types::StateVarType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryEncoding {
    Base64,
    Hex,
}

/// Native representation of an SCPD `dataType`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    Fixed14_4,
    Char,
    Str,
    Bool,
    Bytes(BinaryEncoding),
    Date,
    DateTime { tz: bool },
    Time { tz: bool },
    Uri,
    Uuid,
    /// `string` carrying an XML fragment typed by a `type` attribute.
    Xmlns { urn: String },
}

impl NativeType {
    /// Inclusive bounds of an integer type.
    pub fn int_bounds(&self) -> Option<(i128, i128)> {
        match self {
            NativeType::Int { bits, signed: true } => {
                let half = 1i128 << (bits - 1);
                Some((-half, half - 1))
            }
            NativeType::Int { bits, signed: false } => Some((0, (1i128 << bits) - 1)),
            _ => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NativeType::Int { bits, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, bits)
            }
            NativeType::Float { bits } => write!(f, "f{}", bits),
            NativeType::Fixed14_4 => write!(f, "fixed.14.4"),
            NativeType::Char => write!(f, "char"),
            NativeType::Str => write!(f, "string"),
            NativeType::Bool => write!(f, "boolean"),
            NativeType::Bytes(BinaryEncoding::Base64) => write!(f, "bytes(base64)"),
            NativeType::Bytes(BinaryEncoding::Hex) => write!(f, "bytes(hex)"),
            NativeType::Date => write!(f, "date"),
            NativeType::DateTime { tz } => write!(f, "dateTime{}", if *tz { ".tz" } else { "" }),
            NativeType::Time { tz } => write!(f, "time{}", if *tz { ".tz" } else { "" }),
            NativeType::Uri => write!(f, "uri"),
            NativeType::Uuid => write!(f, "uuid"),
            NativeType::Xmlns { urn } => write!(f, "xml({})", urn),
        }
    }
}

/// Maps an SCPD `dataType` (and its optional `type` attribute) to a [`NativeType`].
///
/// Returns `None` for an unknown or malformed type so the caller decides whether
/// it is fatal.
pub fn get_native_type(data_type: &str, type_attr: Option<&str>) -> Option<NativeType> {
    let var_type: StateVarType = data_type.parse().ok()?;
    match type_attr.map(str::trim) {
        Some(urn) if !urn.is_empty() && var_type == StateVarType::String => {
            Some(NativeType::Xmlns {
                urn: urn.to_string(),
            })
        }
        _ => Some(var_type.native_type()),
    }
}
