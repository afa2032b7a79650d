use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use crate::variable_types::{BinaryEncoding, NativeType, StateValue, StateValueError};

const FIXED_14_4_LIMIT: f64 = 1e14;

/// Vérifie la forme canonique 8-4-4-4-12 d'un UUID
pub fn is_canonical_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

fn parse_error(native: &NativeType, value: &str) -> StateValueError {
    StateValueError::ParseError(format!("'{}' is not a valid {}", value, native))
}

fn type_error(native: &NativeType, value: &StateValue) -> StateValueError {
    StateValueError::TypeError(format!("cannot encode {} as {}", value.kind(), native))
}

fn int_value(bits: u8, signed: bool, v: i128) -> StateValue {
    match (bits, signed) {
        (8, false) => StateValue::UI1(v as u8),
        (16, false) => StateValue::UI2(v as u16),
        (32, false) => StateValue::UI4(v as u32),
        (64, false) => StateValue::UI8(v as u64),
        (8, true) => StateValue::I1(v as i8),
        (16, true) => StateValue::I2(v as i16),
        (32, true) => StateValue::I4(v as i32),
        _ => StateValue::I8(v as i64),
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = match value.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hours, minutes) = value[1..].split_once(':').unwrap_or((&value[1..], "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_time_tz(value: &str) -> Option<(NaiveTime, FixedOffset)> {
    let split = value
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '+' | '-' | 'Z' | 'z'))
        .map(|(i, _)| i)?;
    let (time, offset) = value.split_at(split);
    Some((parse_time(time)?, parse_offset(offset)?))
}

/// Décode une valeur reçue sur le réseau vers sa représentation native
///
/// La validation est stricte : une valeur qui ne correspond pas exactement
/// au type déclaré est rejetée.
pub fn get_native(native: &NativeType, wire: &str) -> Result<StateValue, StateValueError> {
    let trimmed = wire.trim();
    match native {
        NativeType::Int { bits, signed } => {
            let v: i128 = trimmed
                .strip_prefix('+')
                .unwrap_or(trimmed)
                .parse()
                .map_err(|_| parse_error(native, wire))?;
            let (min, max) = native.int_bounds().unwrap_or((i128::MIN, i128::MAX));
            if v < min || v > max {
                return Err(StateValueError::RangeError(format!(
                    "{} does not fit in {}",
                    v, native
                )));
            }
            Ok(int_value(*bits, *signed, v))
        }
        NativeType::Float { bits: 32 } => {
            let v: f32 = trimmed.parse().map_err(|_| parse_error(native, wire))?;
            if !v.is_finite() {
                return Err(parse_error(native, wire));
            }
            Ok(StateValue::R4(v))
        }
        NativeType::Float { .. } => {
            let v: f64 = trimmed.parse().map_err(|_| parse_error(native, wire))?;
            if !v.is_finite() {
                return Err(parse_error(native, wire));
            }
            Ok(StateValue::R8(v))
        }
        NativeType::Fixed14_4 => {
            let v: f64 = trimmed.parse().map_err(|_| parse_error(native, wire))?;
            if !v.is_finite() || v.abs() >= FIXED_14_4_LIMIT {
                return Err(StateValueError::RangeError(format!(
                    "{} does not fit in fixed.14.4",
                    wire
                )));
            }
            Ok(StateValue::Fixed14_4(v))
        }
        NativeType::Char => {
            let mut chars = wire.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(StateValue::Char(c)),
                _ => Err(parse_error(native, wire)),
            }
        }
        NativeType::Str | NativeType::Xmlns { .. } => Ok(StateValue::String(wire.to_string())),
        NativeType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(StateValue::Boolean(true)),
            "0" | "false" | "no" => Ok(StateValue::Boolean(false)),
            _ => Err(parse_error(native, wire)),
        },
        NativeType::Bytes(BinaryEncoding::Base64) => STANDARD
            .decode(trimmed)
            .map(StateValue::Bytes)
            .map_err(|_| parse_error(native, wire)),
        NativeType::Bytes(BinaryEncoding::Hex) => hex::decode(trimmed)
            .map(StateValue::Bytes)
            .map_err(|_| parse_error(native, wire)),
        NativeType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(StateValue::Date)
            .map_err(|_| parse_error(native, wire)),
        NativeType::DateTime { tz: false } => {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
                .map(StateValue::DateTime)
                .map_err(|_| parse_error(native, wire))
        }
        NativeType::DateTime { tz: true } => DateTime::parse_from_rfc3339(trimmed)
            .map(StateValue::DateTimeTZ)
            .map_err(|_| parse_error(native, wire)),
        NativeType::Time { tz: false } => parse_time(trimmed)
            .map(StateValue::Time)
            .ok_or_else(|| parse_error(native, wire)),
        NativeType::Time { tz: true } => parse_time_tz(trimmed)
            .map(|(t, o)| StateValue::TimeTZ(t, o))
            .ok_or_else(|| parse_error(native, wire)),
        NativeType::Uri => match Url::parse(trimmed) {
            Ok(url) if !url.scheme().is_empty() => Ok(StateValue::URI(url)),
            _ => Err(parse_error(native, wire)),
        },
        NativeType::Uuid => {
            if !is_canonical_uuid(trimmed) {
                return Err(parse_error(native, wire));
            }
            Uuid::parse_str(trimmed)
                .map(StateValue::UUID)
                .map_err(|_| parse_error(native, wire))
        }
    }
}

/// Encode une valeur native vers sa forme réseau UPnP
///
/// Une [`StateValue::String`] fournie pour un type non textuel est d'abord
/// décodée avec [`get_native`], ce qui la valide. Un entier qui ne tient pas
/// dans la largeur déclarée provoque une erreur, jamais une troncature.
pub fn get_upnp_value(native: &NativeType, value: &StateValue) -> Result<String, StateValueError> {
    if let StateValue::String(s) = value {
        if !matches!(native, NativeType::Str | NativeType::Xmlns { .. }) {
            let decoded = get_native(native, s)?;
            return get_upnp_value(native, &decoded);
        }
    }

    match native {
        NativeType::Int { .. } => {
            let v = value.as_i128().ok_or_else(|| type_error(native, value))?;
            let (min, max) = native.int_bounds().unwrap_or((i128::MIN, i128::MAX));
            if v < min || v > max {
                return Err(StateValueError::TypeError(format!(
                    "{} does not fit in {}",
                    v, native
                )));
            }
            Ok(v.to_string())
        }
        NativeType::Float { bits } => {
            let v = value.as_f64().ok_or_else(|| type_error(native, value))?;
            if !v.is_finite() || (*bits == 32 && v.abs() > f32::MAX as f64) {
                return Err(StateValueError::TypeError(format!(
                    "{} does not fit in {}",
                    v, native
                )));
            }
            match value {
                StateValue::R4(f) => Ok(f.to_string()),
                _ if *bits == 32 => Ok((v as f32).to_string()),
                _ => Ok(v.to_string()),
            }
        }
        NativeType::Fixed14_4 => {
            let v = value.as_f64().ok_or_else(|| type_error(native, value))?;
            if !v.is_finite() || v.abs() >= FIXED_14_4_LIMIT {
                return Err(StateValueError::TypeError(format!(
                    "{} does not fit in fixed.14.4",
                    v
                )));
            }
            Ok(format!("{:.4}", v))
        }
        NativeType::Char => match value {
            StateValue::Char(c) => Ok(c.to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Str | NativeType::Xmlns { .. } => match value {
            StateValue::String(s) => Ok(s.clone()),
            StateValue::Char(c) => Ok(c.to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Bool => match value {
            StateValue::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Bytes(encoding) => match value {
            StateValue::Bytes(bytes) => Ok(match encoding {
                BinaryEncoding::Base64 => STANDARD.encode(bytes),
                BinaryEncoding::Hex => hex::encode(bytes),
            }),
            _ => Err(type_error(native, value)),
        },
        NativeType::Date => match value {
            StateValue::Date(d) => Ok(d.format("%Y-%m-%d").to_string()),
            StateValue::DateTime(dt) => Ok(dt.format("%Y-%m-%d").to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::DateTime { tz: false } => match value {
            StateValue::DateTime(dt) => Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::DateTime { tz: true } => match value {
            StateValue::DateTimeTZ(dt) => Ok(dt.to_rfc3339()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Time { tz: false } => match value {
            StateValue::Time(t) => Ok(t.format("%H:%M:%S").to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Time { tz: true } => match value {
            StateValue::TimeTZ(t, offset) => Ok(format!("{}{}", t.format("%H:%M:%S"), offset)),
            _ => Err(type_error(native, value)),
        },
        NativeType::Uri => match value {
            StateValue::URI(url) => Ok(url.to_string()),
            _ => Err(type_error(native, value)),
        },
        NativeType::Uuid => match value {
            StateValue::UUID(uuid) => Ok(uuid.hyphenated().to_string()),
            _ => Err(type_error(native, value)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(bits: u8, signed: bool) -> NativeType {
        NativeType::Int { bits, signed }
    }

    #[test]
    fn test_integer_bounds_are_identity() {
        let cases = [
            (int(8, false), StateValue::UI1(u8::MAX)),
            (int(16, false), StateValue::UI2(u16::MAX)),
            (int(32, false), StateValue::UI4(u32::MAX)),
            (int(64, false), StateValue::UI8(u64::MAX)),
            (int(8, true), StateValue::I1(i8::MIN)),
            (int(16, true), StateValue::I2(i16::MIN)),
            (int(32, true), StateValue::I4(i32::MAX)),
            (int(64, true), StateValue::I8(i64::MIN)),
        ];
        for (native, value) in cases {
            let wire = get_upnp_value(&native, &value).unwrap();
            assert_eq!(get_native(&native, &wire).unwrap(), value);
        }
    }

    #[test]
    fn test_integer_overflow_is_rejected() {
        assert!(matches!(
            get_upnp_value(&int(8, false), &StateValue::UI2(256)),
            Err(StateValueError::TypeError(_))
        ));
        assert!(matches!(
            get_upnp_value(&int(16, true), &StateValue::I4(-40000)),
            Err(StateValueError::TypeError(_))
        ));
        assert!(matches!(
            get_upnp_value(&int(32, false), &StateValue::I1(-1)),
            Err(StateValueError::TypeError(_))
        ));
        assert!(get_native(&int(8, false), "256").is_err());
        assert!(get_native(&int(8, true), "-129").is_err());
        assert!(get_native(&int(32, true), "12abc").is_err());
    }

    #[test]
    fn test_narrow_value_into_wider_type() {
        assert_eq!(
            get_upnp_value(&int(32, false), &StateValue::UI1(200)).unwrap(),
            "200"
        );
    }

    #[test]
    fn test_floats() {
        let native = NativeType::Float { bits: 64 };
        assert_eq!(get_upnp_value(&native, &StateValue::R8(1.5)).unwrap(), "1.5");
        assert_eq!(get_native(&native, "-2.25").unwrap(), StateValue::R8(-2.25));
        assert!(get_native(&native, "NaN").is_err());
        assert!(
            get_upnp_value(&NativeType::Float { bits: 32 }, &StateValue::R8(1e300)).is_err()
        );
    }

    #[test]
    fn test_fixed_14_4() {
        let native = NativeType::Fixed14_4;
        assert_eq!(
            get_upnp_value(&native, &StateValue::Fixed14_4(3.5)).unwrap(),
            "3.5000"
        );
        assert_eq!(get_upnp_value(&native, &StateValue::I4(2)).unwrap(), "2.0000");
        assert!(get_native(&native, "100000000000000").is_err());
    }

    #[test]
    fn test_boolean() {
        assert_eq!(
            get_upnp_value(&NativeType::Bool, &StateValue::Boolean(true)).unwrap(),
            "1"
        );
        assert_eq!(
            get_upnp_value(&NativeType::Bool, &StateValue::Boolean(false)).unwrap(),
            "0"
        );
        assert_eq!(
            get_native(&NativeType::Bool, "TRUE").unwrap(),
            StateValue::Boolean(true)
        );
        assert!(get_native(&NativeType::Bool, "2").is_err());
    }

    #[test]
    fn test_binary_encodings() {
        let bytes = StateValue::Bytes(vec![0, 1, 0xfe, 0xff]);
        let b64 = NativeType::Bytes(BinaryEncoding::Base64);
        let hex = NativeType::Bytes(BinaryEncoding::Hex);

        assert_eq!(get_upnp_value(&b64, &bytes).unwrap(), "AAH+/w==");
        assert_eq!(get_upnp_value(&hex, &bytes).unwrap(), "0001feff");
        assert_eq!(get_native(&b64, "AAH+/w==").unwrap(), bytes);
        assert_eq!(get_native(&hex, "0001FEFF").unwrap(), bytes);
        assert!(get_native(&hex, "0g").is_err());
    }

    #[test]
    fn test_dates_and_times() {
        let date = NativeType::Date;
        let datetime = NativeType::DateTime { tz: false };
        let datetime_tz = NativeType::DateTime { tz: true };
        let time_tz = NativeType::Time { tz: true };

        let d = get_native(&date, "2024-02-29").unwrap();
        assert_eq!(get_upnp_value(&date, &d).unwrap(), "2024-02-29");
        assert!(get_native(&date, "2023-02-29").is_err());

        let dt = get_native(&datetime, "2024-01-02T03:04:05").unwrap();
        assert_eq!(get_upnp_value(&datetime, &dt).unwrap(), "2024-01-02T03:04:05");

        let dtz = get_native(&datetime_tz, "2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(
            get_upnp_value(&datetime_tz, &dtz).unwrap(),
            "2024-01-02T03:04:05+02:00"
        );

        let ttz = get_native(&time_tz, "10:20:30-05:30").unwrap();
        assert_eq!(get_upnp_value(&time_tz, &ttz).unwrap(), "10:20:30-05:30");
        assert!(get_native(&time_tz, "10:20:30").is_err());
    }

    #[test]
    fn test_uuid_validation() {
        let native = NativeType::Uuid;
        let ok = "123e4567-E89B-12d3-a456-426614174000";
        assert!(get_upnp_value(&native, &StateValue::String(ok.to_string())).is_ok());

        for bad in [
            "123e4567e89b12d3a456426614174000",
            "{123e4567-e89b-12d3-a456-426614174000}",
            "123e4567-e89b-12d3-a456-42661417400g",
            "123e4567-e89b-12d3-a4564-26614174000",
            "",
        ] {
            assert!(
                get_upnp_value(&native, &StateValue::String(bad.to_string())).is_err(),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_uri_requires_scheme() {
        let native = NativeType::Uri;
        assert!(get_native(&native, "http://example.com/a").is_ok());
        assert!(get_native(&native, "/relative/path").is_err());
        assert!(get_upnp_value(&native, &StateValue::String("no scheme".into())).is_err());
    }

    #[test]
    fn test_char_and_strings() {
        assert_eq!(
            get_native(&NativeType::Char, "é").unwrap(),
            StateValue::Char('é')
        );
        assert!(get_native(&NativeType::Char, "ab").is_err());
        assert_eq!(
            get_native(&NativeType::Str, "  padded ").unwrap(),
            StateValue::String("  padded ".to_string())
        );
        assert!(get_upnp_value(&NativeType::Str, &StateValue::I4(1)).is_err());
    }
}
