//! # Types des variables d'état UPnP
//!
//! Ce module fait le lien entre les types déclarés dans une SCPD (`dataType`)
//! et les valeurs Rust manipulées par les services.
//!
//! - [`StateVarType`] : les types UPnP (`ui1`, `string`, `dateTime.tz`, ...)
//! - [`NativeType`] : la représentation native d'un type, avec sa largeur,
//!   son encodage binaire ou son namespace XML
//! - [`StateValue`] : une valeur native
//! - [`get_native`] / [`get_upnp_value`] : conversion stricte chaîne ⇄ valeur
//!
//! La conversion est le seul point de validation des arguments SOAP reçus :
//! toute valeur qui ne respecte pas le type déclaré est rejetée, jamais tronquée.

mod errors;
mod native;
mod type_methods;
mod wire;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

pub use errors::StateValueError;
pub use native::{BinaryEncoding, NativeType, get_native_type};
pub use wire::{get_native, get_upnp_value, is_canonical_uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVarType {
    UI1,        // Unsigned 8-bit integer
    UI2,        // Unsigned 16-bit integer
    UI4,        // Unsigned 32-bit integer
    UI8,        // Unsigned 64-bit integer
    I1,         // Signed 8-bit integer
    I2,         // Signed 16-bit integer
    I4,         // Signed 32-bit integer
    I8,         // Signed 64-bit integer
    Int,        // Synonymous with i4
    R4,         // 32-bit floating point
    R8,         // 64-bit floating point
    Number,     // Synonymous with r8
    Float,      // Synonymous with r8
    Fixed14_4,  // Fixed-point decimal
    Char,       // Single Unicode character
    String,     // Character string
    Boolean,    // Boolean value
    BinBase64,  // Base64-encoded binary
    BinHex,     // Hex-encoded binary
    Date,       // Date (YYYY-MM-DD)
    DateTime,   // DateTime without timezone
    DateTimeTZ, // DateTime with timezone
    Time,       // Time without timezone
    TimeTZ,     // Time with timezone
    UUID,       // Universally unique identifier
    URI,        // Uniform Resource Identifier
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    Fixed14_4(f64),
    Char(char),
    String(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTZ(DateTime<FixedOffset>),
    Time(NaiveTime),
    TimeTZ(NaiveTime, FixedOffset),
    UUID(Uuid),
    URI(Url),
}

impl StateValue {
    /// Integer value of an integer variant.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            StateValue::UI1(v) => Some(*v as i128),
            StateValue::UI2(v) => Some(*v as i128),
            StateValue::UI4(v) => Some(*v as i128),
            StateValue::UI8(v) => Some(*v as i128),
            StateValue::I1(v) => Some(*v as i128),
            StateValue::I2(v) => Some(*v as i128),
            StateValue::I4(v) => Some(*v as i128),
            StateValue::I8(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Numeric value of any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::R4(v) => Some(*v as f64),
            StateValue::R8(v) | StateValue::Fixed14_4(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            StateValue::UI1(_) => "ui1",
            StateValue::UI2(_) => "ui2",
            StateValue::UI4(_) => "ui4",
            StateValue::UI8(_) => "ui8",
            StateValue::I1(_) => "i1",
            StateValue::I2(_) => "i2",
            StateValue::I4(_) => "i4",
            StateValue::I8(_) => "i8",
            StateValue::R4(_) => "r4",
            StateValue::R8(_) => "r8",
            StateValue::Fixed14_4(_) => "fixed.14.4",
            StateValue::Char(_) => "char",
            StateValue::String(_) => "string",
            StateValue::Boolean(_) => "boolean",
            StateValue::Bytes(_) => "bytes",
            StateValue::Date(_) => "date",
            StateValue::DateTime(_) => "dateTime",
            StateValue::DateTimeTZ(_) => "dateTime.tz",
            StateValue::Time(_) => "time",
            StateValue::TimeTZ(_, _) => "time.tz",
            StateValue::UUID(_) => "uuid",
            StateValue::URI(_) => "uri",
        }
    }
}

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$native> for StateValue {
                fn from(value: $native) -> Self {
                    StateValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_native! {
    u8 => UI1,
    u16 => UI2,
    u32 => UI4,
    u64 => UI8,
    i8 => I1,
    i16 => I2,
    i32 => I4,
    i64 => I8,
    f32 => R4,
    f64 => R8,
    char => Char,
    bool => Boolean,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeTZ,
    NaiveTime => Time,
    Uuid => UUID,
    Url => URI,
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}
