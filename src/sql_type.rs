//! Defines an enum of the declared column types of a remote table and routines for conversion to and from string.
//!
//! Each declared type also knows how a row builder should pull a value of that type out of a raw remote row:
//! either through an unboxed primitive accessor, or as a reference (the value is kept as-is).
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// These are the declared types that a column of a remote table can have.
/// Notes:
///   - Type name aliases like `varchar` for `text` are accepted when parsing, but always display
///     with the canonical name.
///   - `Any` covers complex or store-specific types (arrays, structs, user types) that this crate
///     does not interpret.
pub enum SqlType {
    Bool,
    Int32,
    Int64,
    Real,
    Decimal,
    Text,
    Blob,
    Date,
    Timestamp,
    Any,
}

/// A machine primitive that can be extracted without boxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int32,
    Int64,
    Double,
}

impl SqlType {
    /// the primitive a column of this type unboxes to, or None if it must be extracted by reference.
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            SqlType::Bool => Some(Primitive::Bool),
            SqlType::Int32 => Some(Primitive::Int32),
            SqlType::Int64 => Some(Primitive::Int64),
            SqlType::Real => Some(Primitive::Double),
            SqlType::Decimal
            | SqlType::Text
            | SqlType::Blob
            | SqlType::Date
            | SqlType::Timestamp
            | SqlType::Any => None,
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Bool => "boolean".fmt(f),
            SqlType::Int32 => "integer".fmt(f),
            SqlType::Int64 => "bigint".fmt(f),
            SqlType::Real => "double".fmt(f),
            SqlType::Decimal => "decimal".fmt(f),
            SqlType::Text => "text".fmt(f),
            SqlType::Blob => "blob".fmt(f),
            SqlType::Date => "date".fmt(f),
            SqlType::Timestamp => "timestamp".fmt(f),
            SqlType::Any => "any".fmt(f),
        }
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::Bool => "bool".fmt(f),
            Primitive::Int32 => "i32".fmt(f),
            Primitive::Int64 => "i64".fmt(f),
            Primitive::Double => "f64".fmt(f),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unable to parse SqlType from declared type name: {0}.")]
    ParseSqlTypeError(String),
}

impl FromStr for SqlType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(SqlType::Bool),
            "int" | "int4" | "integer" => Ok(SqlType::Int32),
            "bigint" | "int8" => Ok(SqlType::Int64),
            "real" | "float" | "double" | "float8" => Ok(SqlType::Real),
            "decimal" | "numeric" => Ok(SqlType::Decimal),
            "text" | "string" | "varchar" | "char" => Ok(SqlType::Text),
            "blob" | "bytea" | "binary" => Ok(SqlType::Blob),
            "date" => Ok(SqlType::Date),
            "timestamp" => Ok(SqlType::Timestamp),
            "any" | "array" | "struct" | "other" => Ok(SqlType::Any),
            x => Err(Error::ParseSqlTypeError(String::from(x))),
        }
    }
}

#[test]
fn test_parse_sql_type() {
    let cases = vec![
        ("INT", SqlType::Int32),
        ("integer", SqlType::Int32),
        ("BigInt", SqlType::Int64),
        ("varchar", SqlType::Text),
        ("double", SqlType::Real),
        ("numeric", SqlType::Decimal),
        ("struct", SqlType::Any),
    ];
    for (input, expected) in cases {
        assert_eq!(SqlType::from_str(input), Ok(expected));
    }
    assert_eq!(
        SqlType::from_str("geometry"),
        Err(Error::ParseSqlTypeError("geometry".to_string()))
    );
}

#[test]
fn test_primitive_classification() {
    assert_eq!(SqlType::Int64.primitive(), Some(Primitive::Int64));
    assert_eq!(SqlType::Bool.primitive(), Some(Primitive::Bool));
    assert_eq!(SqlType::Real.primitive(), Some(Primitive::Double));
    assert_eq!(SqlType::Text.primitive(), None);
    assert_eq!(SqlType::Decimal.primitive(), None);
    assert_eq!(SqlType::Any.primitive(), None);
}
