//! Text and little-endian byte marshaling for CANopen data types.
//!
//! Integers are always decoded as unsigned, whatever their declared
//! signedness, and negative integers never encode.

use crate::error::CodecError;
use crate::types::{DataType, Value};

/// Parses decimal or `0x` prefixed hex, empty text reading as zero.
pub fn parse_integer(text: &str) -> Option<i128> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Converts configuration text into a value of `data_type`.
pub fn value_from_text(data_type: DataType, text: &str) -> Result<Value, CodecError> {
    let invalid = || CodecError::InvalidText {
        data_type,
        text: text.to_string(),
    };

    if data_type.is_boolean() {
        return parse_integer(text)
            .map(|v| Value::Boolean(v != 0))
            .ok_or_else(invalid);
    }
    if data_type.is_integer() {
        return parse_integer(text).map(Value::Integer).ok_or_else(invalid);
    }
    if data_type.is_real() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Value::Real(0.0));
        }
        return trimmed.parse::<f64>().map(Value::Real).map_err(|_| invalid());
    }

    match data_type {
        DataType::OctetString => {
            let trimmed = text.trim();
            match hex::decode(trimmed) {
                Ok(bytes) => Ok(Value::Bytes(bytes)),
                Err(_) => Ok(Value::Bytes(text.as_bytes().to_vec())),
            }
        }
        // Strings, time types and structured types are kept as written
        _ => Ok(Value::Text(text.to_string())),
    }
}

/// Encodes `value` as the little-endian representation of `data_type`.
pub fn bytes_from_value(data_type: DataType, value: &Value) -> Result<Vec<u8>, CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        data_type,
        value: value.to_string(),
    };

    if data_type.is_boolean() {
        return match value {
            Value::Boolean(b) => Ok(vec![u8::from(*b)]),
            Value::Integer(v) => Ok(vec![u8::from(*v != 0)]),
            _ => Err(mismatch()),
        };
    }

    if data_type.is_integer() {
        let number = match value {
            Value::Integer(v) => *v,
            Value::Boolean(b) => i128::from(*b),
            _ => return Err(mismatch()),
        };
        let size = data_type.size().unwrap_or(8);
        if number < 0 || (number as u128) >> (size * 8) != 0 {
            return Err(CodecError::EncodeOverflow {
                data_type,
                value: number.to_string(),
            });
        }
        return Ok((number as u128).to_le_bytes()[..size].to_vec());
    }

    if data_type.is_real() {
        let number = match value {
            Value::Real(v) => *v,
            Value::Integer(v) => *v as f64,
            _ => return Err(mismatch()),
        };
        return Ok(match data_type {
            DataType::Real32 => (number as f32).to_le_bytes().to_vec(),
            _ => number.to_le_bytes().to_vec(),
        });
    }

    match value {
        Value::Text(text) => Ok(text.as_bytes().to_vec()),
        Value::Bytes(bytes) => Ok(bytes.clone()),
        _ => Err(mismatch()),
    }
}

/// Decodes little-endian `bytes` as `data_type`.
pub fn value_from_bytes(data_type: DataType, bytes: &[u8]) -> Result<Value, CodecError> {
    let bytes = match data_type.size() {
        Some(size) if bytes.len() < size => {
            return Err(CodecError::SizeMismatch {
                data_type,
                expected: size,
                actual: bytes.len(),
            });
        }
        Some(size) => &bytes[..size],
        None => bytes,
    };

    if data_type.is_boolean() {
        return Ok(Value::Boolean(bytes[0] != 0));
    }
    if data_type.is_integer() {
        let mut buf = [0u8; 16];
        buf[..bytes.len()].copy_from_slice(bytes);
        return Ok(Value::Integer(u128::from_le_bytes(buf) as i128));
    }

    match data_type {
        DataType::Real32 => {
            let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Ok(Value::Real(f64::from(f32::from_le_bytes(raw))))
        }
        DataType::Real64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(Value::Real(f64::from_le_bytes(raw)))
        }
        DataType::VisibleString | DataType::UnicodeString => {
            let trimmed = match bytes.iter().rposition(|b| *b != 0) {
                Some(last) => &bytes[..=last],
                None => &[][..],
            };
            String::from_utf8(trimmed.to_vec())
                .map(Value::Text)
                .map_err(|_| CodecError::InvalidText {
                    data_type,
                    text: String::from_utf8_lossy(bytes).into_owned(),
                })
        }
        _ => Ok(Value::Bytes(bytes.to_vec())),
    }
}
