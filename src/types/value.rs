use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::DataType;

/// A typed scalar literal, as carried by `Constant` input values and by
/// scalar-literal node options (§3, §4.2 "literal materialization").
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Boolean(_) => DataType::Boolean,
            Scalar::Integer(_) => DataType::Integer,
            // Numeric literals are Decimal per §4.4 "Literal type".
            Scalar::Decimal(_) => DataType::Decimal,
            Scalar::Number(_) => DataType::Number,
            Scalar::String(_) => DataType::String,
            Scalar::Timestamp(_) => DataType::Timestamp,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Decimal(d) => write!(f, "{d}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => write!(f, "{s}"),
            Scalar::Timestamp(t) => write!(f, "{t}"),
        }
    }
}

/// A node-option value: either a scalar or one of the structured schemas
/// parsed by the constructor parser (§4.7).
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Scalar(Scalar),
    Select(String),
    Structured(serde_json::Value),
}

impl OptionValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            OptionValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Scalar(s) => write!(f, "{s}"),
            OptionValue::Select(s) => write!(f, "{s}"),
            OptionValue::Structured(v) => write!(f, "{v}"),
        }
    }
}
