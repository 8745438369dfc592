//! Defines an enum of all the possible values that a remote store can return in one column of a row.
//!
//! The `get_*` accessors behave like the typed getters of a positional result set: they unbox a value
//! into a primitive, coercing between numeric kinds, and reading a NULL as zero (or false).

use crate::sql_type::Primitive;

#[derive(Debug, Clone, PartialEq)]
/// can hold any value returned by a remote store.
/// Values that the store reports as decimals, dates or timestamps arrive as `Text`.
pub enum SqlValue {
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
    Real(f64),
    Bool(bool),
    Null(),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Int(x) => x.fmt(f),
            SqlValue::Text(x) => x.fmt(f),
            SqlValue::Blob(_) => "<BLOB>".fmt(f),
            SqlValue::Real(x) => x.fmt(f),
            SqlValue::Bool(x) => x.fmt(f),
            SqlValue::Null() => "NULL".fmt(f),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unable to convert {from} to {to}.")]
    TypeError { from: String, to: Primitive },
    #[error("Value {value} out of range for {to}.")]
    OutOfRange { value: String, to: Primitive },
}

/// -2^63 and 2^63, exactly representable as f64.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

impl SqlValue {
    fn type_error(&self, to: Primitive) -> Error {
        Error::TypeError {
            from: self.type_name().to_string(),
            to,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Int(_) => "int",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::Real(_) => "real",
            SqlValue::Bool(_) => "bool",
            SqlValue::Null() => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null())
    }

    pub fn get_bool(&self) -> Result<bool, Error> {
        match self {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(i) => Ok(*i != 0),
            SqlValue::Real(f) => Ok(*f != 0.0),
            SqlValue::Text(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(self.type_error(Primitive::Bool)),
            },
            SqlValue::Null() => Ok(false),
            SqlValue::Blob(_) => Err(self.type_error(Primitive::Bool)),
        }
    }

    pub fn get_i64(&self) -> Result<i64, Error> {
        match self {
            SqlValue::Int(i) => Ok(*i),
            SqlValue::Bool(b) => Ok(*b as i64),
            // Truncates toward zero. NaN, infinities and values past the i64 range are errors.
            SqlValue::Real(f) if (I64_LOWER..I64_UPPER).contains(f) => Ok(*f as i64),
            SqlValue::Real(f) => Err(Error::OutOfRange {
                value: f.to_string(),
                to: Primitive::Int64,
            }),
            SqlValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.type_error(Primitive::Int64)),
            SqlValue::Null() => Ok(0),
            SqlValue::Blob(_) => Err(self.type_error(Primitive::Int64)),
        }
    }

    pub fn get_i32(&self) -> Result<i32, Error> {
        let i = match self.get_i64() {
            Ok(i) => i,
            Err(Error::OutOfRange { value, .. }) => {
                return Err(Error::OutOfRange {
                    value,
                    to: Primitive::Int32,
                })
            }
            Err(Error::TypeError { .. }) => return Err(self.type_error(Primitive::Int32)),
        };
        i32::try_from(i).map_err(|_| Error::OutOfRange {
            value: i.to_string(),
            to: Primitive::Int32,
        })
    }

    pub fn get_f64(&self) -> Result<f64, Error> {
        match self {
            SqlValue::Real(f) => Ok(*f),
            SqlValue::Int(i) => Ok(*i as f64),
            SqlValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.type_error(Primitive::Double)),
            SqlValue::Null() => Ok(0.0),
            SqlValue::Blob(_) => Err(self.type_error(Primitive::Double)),
        }
    }
}

#[test]
fn test_get_primitives_from_null() {
    let v = SqlValue::Null();
    assert_eq!(v.get_bool(), Ok(false));
    assert_eq!(v.get_i32(), Ok(0));
    assert_eq!(v.get_i64(), Ok(0));
    assert_eq!(v.get_f64(), Ok(0.0));
}

#[test]
fn test_get_primitives_coerce() {
    assert_eq!(SqlValue::Int(7).get_f64(), Ok(7.0));
    assert_eq!(SqlValue::Real(2.9).get_i64(), Ok(2));
    assert_eq!(SqlValue::Text(" 12 ".to_string()).get_i32(), Ok(12));
    assert_eq!(SqlValue::Text("TRUE".to_string()).get_bool(), Ok(true));
    assert_eq!(SqlValue::Int(0).get_bool(), Ok(false));
}

#[test]
fn test_get_primitives_errors() {
    assert_eq!(
        SqlValue::Text("abc".to_string()).get_i64(),
        Err(Error::TypeError {
            from: "text".to_string(),
            to: Primitive::Int64
        })
    );
    assert!(SqlValue::Blob(vec![1]).get_f64().is_err());
    assert_eq!(
        SqlValue::Int(i64::MAX).get_i32(),
        Err(Error::OutOfRange {
            value: i64::MAX.to_string(),
            to: Primitive::Int32
        })
    );
}

#[test]
fn test_get_i64_rejects_reals_outside_range() {
    assert_eq!(SqlValue::Real(-2.9).get_i64(), Ok(-2));
    assert_eq!(SqlValue::Real(-9.223_372_036_854_775_808e18).get_i64(), Ok(i64::MIN));
    for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e19, -1e19, 9.223_372_036_854_775_808e18] {
        assert_eq!(
            SqlValue::Real(f).get_i64(),
            Err(Error::OutOfRange {
                value: f.to_string(),
                to: Primitive::Int64
            })
        );
    }
    assert_eq!(
        SqlValue::Real(1e19).get_i32(),
        Err(Error::OutOfRange {
            value: 1e19_f64.to_string(),
            to: Primitive::Int32
        })
    );
}
