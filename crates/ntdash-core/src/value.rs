//! Table values
//!
//! Every entry in a table holds one of a small set of kinds. `Unassigned`
//! marks the absence of a value and is never handed to a typed listener.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{NtError, NtResult};

/// A value stored at a path
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// No value at this path
    #[default]
    Unassigned,
    Bool(bool),
    Double(f64),
    String(String),
    /// Opaque byte payload
    Raw(#[serde(with = "serde_bytes")] Vec<u8>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
}

/// The kind of a [`Value`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Unassigned,
    Bool,
    Double,
    String,
    Raw,
    DoubleArray,
    StringArray,
}

impl ValueKind {
    /// Name used in messages and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Unassigned => "unassigned",
            ValueKind::Bool => "bool",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Raw => "raw",
            ValueKind::DoubleArray => "double-array",
            ValueKind::StringArray => "string-array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ValueKind::Bool),
            "double" | "number" => Ok(ValueKind::Double),
            "string" => Ok(ValueKind::String),
            "raw" | "bytes" => Ok(ValueKind::Raw),
            "double-array" | "double[]" => Ok(ValueKind::DoubleArray),
            "string-array" | "string[]" => Ok(ValueKind::StringArray),
            other => Err(format!(
                "unknown value kind '{}' (expected bool, double, string, raw, double-array or string-array)",
                other
            )),
        }
    }
}

impl Value {
    /// The kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unassigned => ValueKind::Unassigned,
            Value::Bool(_) => ValueKind::Bool,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Raw(_) => ValueKind::Raw,
            Value::DoubleArray(_) => ValueKind::DoubleArray,
            Value::StringArray(_) => ValueKind::StringArray,
        }
    }

    /// False only for [`Value::Unassigned`]
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Value::Unassigned)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_double_array(&self) -> Option<&[f64]> {
        match self {
            Value::DoubleArray(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(values) => Some(values),
            _ => None,
        }
    }

    /// Parse command-line text into a value of the given kind
    ///
    /// Arrays are comma-separated (an empty string is an empty array),
    /// raw payloads are base64.
    pub fn parse_as(kind: ValueKind, input: &str) -> NtResult<Self> {
        let invalid = |details: String| NtError::InvalidValue {
            kind,
            input: input.to_string(),
            details,
        };

        match kind {
            ValueKind::Bool => match input.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid("expected true or false".to_string())),
            },
            ValueKind::Double => input
                .trim()
                .parse()
                .map(Value::Double)
                .map_err(|e: std::num::ParseFloatError| invalid(e.to_string())),
            ValueKind::String => Ok(Value::String(input.to_string())),
            ValueKind::Raw => base64::engine::general_purpose::STANDARD
                .decode(input.trim())
                .map(Value::Raw)
                .map_err(|e| invalid(e.to_string())),
            ValueKind::DoubleArray => split_list(input)
                .map(|item| item.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map(Value::DoubleArray)
                .map_err(|e| invalid(e.to_string())),
            ValueKind::StringArray => Ok(Value::StringArray(
                split_list(input).map(str::to_string).collect(),
            )),
            ValueKind::Unassigned => Err(invalid("cannot write an unassigned value".to_string())),
        }
    }
}

fn split_list(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unassigned => f.write_str("(unassigned)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::Raw(bytes) => f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            Value::DoubleArray(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::StringArray(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Raw(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::DoubleArray(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StringArray(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Value::Unassigned.kind(), ValueKind::Unassigned);
        assert_eq!(Value::from(1.5).kind(), ValueKind::Double);
        assert_eq!(Value::from("l").kind(), ValueKind::String);
        assert_eq!(
            Value::from(vec!["a".to_string()]).kind(),
            ValueKind::StringArray
        );
        assert!(!Value::default().is_assigned());
    }

    #[test]
    fn test_accessors_reject_other_kinds() {
        let value = Value::Double(3.0);
        assert_eq!(value.as_double(), Some(3.0));
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_str(), None);
        assert!(value.as_string_array().is_none());
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(
            Value::parse_as(ValueKind::Bool, "TRUE").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            Value::parse_as(ValueKind::Double, " 4.25 ").unwrap(),
            Value::Double(4.25)
        );
        assert_eq!(
            Value::parse_as(ValueKind::StringArray, "a, b,c").unwrap(),
            Value::StringArray(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            Value::parse_as(ValueKind::DoubleArray, "").unwrap(),
            Value::DoubleArray(vec![])
        );
        assert_eq!(
            Value::parse_as(ValueKind::Raw, "AQID").unwrap(),
            Value::Raw(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_parse_as_errors() {
        assert!(matches!(
            Value::parse_as(ValueKind::Double, "fast"),
            Err(NtError::InvalidValue { .. })
        ));
        assert!(Value::parse_as(ValueKind::Bool, "maybe").is_err());
        assert!(Value::parse_as(ValueKind::Unassigned, "").is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("boolean".parse::<ValueKind>(), Ok(ValueKind::Bool));
        assert_eq!("string[]".parse::<ValueKind>(), Ok(ValueKind::StringArray));
        assert!("matrix".parse::<ValueKind>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(
            Value::StringArray(vec!["a".into(), "b".into()]).to_string(),
            "[a, b]"
        );
        assert_eq!(Value::Unassigned.to_string(), "(unassigned)");
    }
}
