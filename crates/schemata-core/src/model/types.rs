//! Column data types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A column data type.
///
/// Declarations and the live catalog spell types differently
/// (`varchar(255)` vs `character varying(255)`, `timestamptz` vs
/// `timestamp with time zone`); [`DataType::parse`] folds every spelling into
/// one variant so the differ can compare them structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// `boolean`
    Boolean,
    /// `smallint`
    SmallInt,
    /// `integer`
    Integer,
    /// `bigint`
    BigInt,
    /// `real`
    Real,
    /// `double precision`
    DoublePrecision,
    /// `numeric(p, s)`
    Numeric {
        /// Total digits.
        precision: Option<u32>,
        /// Digits after the decimal point.
        scale: Option<u32>,
    },
    /// `text`
    Text,
    /// `character varying(n)`
    Varchar(Option<u32>),
    /// `character(n)`
    Char(Option<u32>),
    /// `uuid`
    Uuid,
    /// `date`
    Date,
    /// `time without time zone`
    Time,
    /// `time with time zone`
    TimeTz,
    /// `timestamp without time zone`
    Timestamp,
    /// `timestamp with time zone`
    TimestampTz,
    /// `interval`
    Interval,
    /// `bytea`
    Bytea,
    /// `json`
    Json,
    /// `jsonb`
    Jsonb,
    /// `inet`
    Inet,
    /// A user-defined enum type.
    Enum(String),
    /// An array of another type.
    Array(Box<DataType>),
    /// Any other type, typically provided by an extension (`earth`,
    /// `vector(512)`). Kept verbatim in lower case.
    Custom(String),
}

/// Error returned when a type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid data type '{0}'")]
pub struct ParseTypeError(pub String);

impl DataType {
    /// Parses a type spelled either the way authors write it or the way
    /// `format_type()` reports it.
    ///
    /// Unknown names become [`DataType::Custom`]; the registry later turns
    /// custom names that match a registered enum into [`DataType::Enum`].
    pub fn parse(input: &str) -> Result<Self, ParseTypeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseTypeError(input.to_string()));
        }

        if let Some(inner) = trimmed.strip_suffix("[]") {
            return Ok(Self::Array(Box::new(Self::parse(inner)?)));
        }

        // Quoted identifiers keep their case.
        if trimmed.starts_with('"') {
            let name = trimmed.trim_matches('"').replace("\"\"", "\"");
            if name.is_empty() {
                return Err(ParseTypeError(input.to_string()));
            }
            return Ok(Self::Custom(name));
        }

        let lower = collapse_spaces(&trimmed.to_ascii_lowercase());
        let lower = lower.strip_prefix("public.").unwrap_or(&lower).to_string();
        let (base, args) = split_modifiers(&lower).ok_or_else(|| ParseTypeError(input.into()))?;

        let ty = match (base.as_str(), args.as_slice()) {
            ("boolean" | "bool", []) => Self::Boolean,
            ("smallint" | "int2", []) => Self::SmallInt,
            ("integer" | "int" | "int4", []) => Self::Integer,
            ("bigint" | "int8", []) => Self::BigInt,
            ("real" | "float4", []) => Self::Real,
            ("double precision" | "float8", []) => Self::DoublePrecision,
            ("numeric" | "decimal", []) => Self::Numeric {
                precision: None,
                scale: None,
            },
            ("numeric" | "decimal", [p]) => Self::Numeric {
                precision: Some(*p),
                scale: None,
            },
            ("numeric" | "decimal", [p, s]) => Self::Numeric {
                precision: Some(*p),
                scale: Some(*s),
            },
            ("text", []) => Self::Text,
            ("character varying" | "varchar", []) => Self::Varchar(None),
            ("character varying" | "varchar", [n]) => Self::Varchar(Some(*n)),
            ("character" | "char" | "bpchar", []) => Self::Char(None),
            ("character" | "char" | "bpchar", [n]) => Self::Char(Some(*n)),
            ("uuid", []) => Self::Uuid,
            ("date", []) => Self::Date,
            ("time" | "time without time zone", []) => Self::Time,
            ("timetz" | "time with time zone", []) => Self::TimeTz,
            ("timestamp" | "timestamp without time zone", []) => Self::Timestamp,
            ("timestamptz" | "timestamp with time zone", []) => Self::TimestampTz,
            ("interval", []) => Self::Interval,
            ("bytea", []) => Self::Bytea,
            ("json", []) => Self::Json,
            ("jsonb", []) => Self::Jsonb,
            ("inet", []) => Self::Inet,
            _ => Self::Custom(lower),
        };
        Ok(ty)
    }

    /// Returns `true` if converting a column from `self` to `target` can
    /// never lose data.
    #[must_use]
    pub fn converts_losslessly_to(&self, target: &Self) -> bool {
        use DataType::{
            BigInt, Char, DoublePrecision, Integer, Json, Jsonb, Numeric, Real, SmallInt, Text,
            Timestamp, TimestampTz, Varchar,
        };

        if self == target {
            return true;
        }
        match (self, target) {
            (_, Text) => !matches!(self, Self::Array(_) | Self::Bytea),
            (SmallInt, Integer | BigInt) | (Integer, BigInt) | (Real, DoublePrecision) => true,
            (
                SmallInt | Integer | BigInt,
                Numeric {
                    precision: None, ..
                },
            ) => true,
            (Varchar(_) | Char(_) | Self::Enum(_) | Self::Uuid, Varchar(None)) => true,
            (Varchar(Some(from)) | Char(Some(from)), Varchar(Some(to))) => to >= from,
            (Timestamp, TimestampTz) | (Json, Jsonb) => true,
            _ => false,
        }
    }

    /// Name of the enum this type refers to, looking through arrays.
    #[must_use]
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            Self::Enum(name) => Some(name),
            Self::Array(inner) => inner.enum_name(),
            _ => None,
        }
    }

    /// Name of the custom type this type refers to, looking through arrays.
    #[must_use]
    pub fn custom_name(&self) -> Option<&str> {
        match self {
            Self::Custom(name) => Some(name),
            Self::Array(inner) => inner.custom_name(),
            _ => None,
        }
    }

    /// Replaces custom type names that match a known enum with enum
    /// references.
    pub(crate) fn resolve_enums(&mut self, is_enum: &impl Fn(&str) -> bool) {
        match self {
            Self::Custom(name) if is_enum(name) => *self = Self::Enum(std::mem::take(name)),
            Self::Array(inner) => inner.resolve_enums(is_enum),
            _ => {}
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::SmallInt => f.write_str("smallint"),
            Self::Integer => f.write_str("integer"),
            Self::BigInt => f.write_str("bigint"),
            Self::Real => f.write_str("real"),
            Self::DoublePrecision => f.write_str("double precision"),
            Self::Numeric { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => write!(f, "numeric({p},{s})"),
                (Some(p), None) => write!(f, "numeric({p})"),
                _ => f.write_str("numeric"),
            },
            Self::Text => f.write_str("text"),
            Self::Varchar(Some(n)) => write!(f, "character varying({n})"),
            Self::Varchar(None) => f.write_str("character varying"),
            Self::Char(Some(n)) => write!(f, "character({n})"),
            Self::Char(None) => f.write_str("character"),
            Self::Uuid => f.write_str("uuid"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time without time zone"),
            Self::TimeTz => f.write_str("time with time zone"),
            Self::Timestamp => f.write_str("timestamp without time zone"),
            Self::TimestampTz => f.write_str("timestamp with time zone"),
            Self::Interval => f.write_str("interval"),
            Self::Bytea => f.write_str("bytea"),
            Self::Json => f.write_str("json"),
            Self::Jsonb => f.write_str("jsonb"),
            Self::Inet => f.write_str("inet"),
            Self::Enum(name) | Self::Custom(name) => {
                if name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_(),. ".contains(c)) {
                    f.write_str(name)
                } else {
                    write!(f, "\"{}\"", name.replace('"', "\"\""))
                }
            }
            Self::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = ParseTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

fn collapse_spaces(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `numeric(10, 2)` into (`numeric`, [10, 2]). Modifiers that are not
/// plain integers keep the whole string as the base name. Handles the
/// `timestamp(3) with time zone` placement as well.
fn split_modifiers(input: &str) -> Option<(String, Vec<u32>)> {
    let Some(open) = input.find('(') else {
        return Some((input.to_string(), Vec::new()));
    };
    let close = input[open..].find(')')? + open;
    let inner = &input[open + 1..close];
    let args: Option<Vec<u32>> = inner.split(',').map(|a| a.trim().parse().ok()).collect();
    let Some(args) = args else {
        return Some((input.to_string(), Vec::new()));
    };
    let base = format!("{}{}", input[..open].trim_end(), &input[close + 1..]);
    let base = collapse_spaces(&base);
    // Precision on time types is not tracked.
    if base.starts_with("timestamp") || base.starts_with("time") {
        return Some((base, Vec::new()));
    }
    Some((base, args))
}
